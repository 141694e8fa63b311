//! Workflow service: submission, review decisions, audit and recovery.
//!
//! Wires an [`Executor`] to a [`ReviewQueue`] so that every pause registers
//! exactly one review ticket, and exposes the operations the CLI and REST
//! layers call. Submissions and decisions return as soon as the thread is
//! durable; execution continues on a spawned task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use ledgerflow_types::checkpoint::{
    AuditEntry, AuditTrail, Checkpoint, ThreadStatus, ThreadSummary,
};
use ledgerflow_types::error::{CheckpointError, ReviewError};
use ledgerflow_types::review::{Decision, ReviewContext, ReviewTicket, TicketStatus};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::graph::{CompiledGraph, GraphState};
use crate::repository::checkpoint::CheckpointStore;
use crate::repository::review::ReviewQueue;
use crate::workflow::{Executor, ExecutorError, PauseHandler, RunOutcome};

// ---------------------------------------------------------------------------
// Reviewable state
// ---------------------------------------------------------------------------

/// State that can be paused for a human decision.
pub trait ReviewableState: GraphState {
    /// What the reviewer sees on the ticket.
    fn review_context(&self) -> ReviewContext;

    /// Fields injected into the paused snapshot when a decision arrives.
    fn decision_patch(decision: Decision, notes: Option<&str>) -> Value;

    /// Whether a decision patch has already been injected.
    fn has_decision(&self) -> bool;

    /// Stage label reported back to the decision maker.
    fn stage_after(decision: Decision) -> &'static str;
}

/// Registers a review ticket whenever a thread pauses.
pub struct ReviewTicketHook<Q: ReviewQueue> {
    queue: Arc<Q>,
}

impl<Q: ReviewQueue> ReviewTicketHook<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }
}

impl<S: ReviewableState, Q: ReviewQueue> PauseHandler<S> for ReviewTicketHook<Q> {
    fn on_pause<'a>(
        &'a self,
        thread_id: &'a str,
        next_node: &'a str,
        state: &'a S,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async move {
            let context = state.review_context();
            let ticket = self
                .queue
                .create(thread_id, &context)
                .await
                .map_err(|e| e.to_string())?;
            tracing::info!(
                thread_id,
                ticket_id = ticket.ticket_id.as_str(),
                node = next_node,
                "review ticket registered"
            );
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("thread '{0}' not found")]
    ThreadNotFound(String),

    #[error("thread '{thread_id}' is {status}, not awaiting review")]
    NotPaused {
        thread_id: String,
        status: ThreadStatus,
    },

    #[error("state codec error: {0}")]
    StateCodec(String),
}

/// Acknowledgement returned when a decision is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionAck {
    pub ticket_id: String,
    pub thread_id: String,
    pub decision: Decision,
    pub next_stage: String,
}

/// What `recover` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Threads driven forward: RUNNING ones, plus PAUSED ones whose decision
    /// was injected before the resume was lost. With `recover` these carry
    /// the status the run ended in; with `recover_in_background` the status
    /// found at scan time.
    pub resumed: Vec<ThreadSummary>,
    /// Tickets re-registered for PAUSED threads that had none.
    pub tickets_registered: Vec<String>,
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// WorkflowService
// ---------------------------------------------------------------------------

/// Service orchestrating the thread lifecycle.
///
/// Generic over the state and storage traits to maintain clean
/// architecture -- ledgerflow-core never depends on ledgerflow-infra.
pub struct WorkflowService<S, C, Q>
where
    S: ReviewableState,
    C: CheckpointStore + 'static,
    Q: ReviewQueue + 'static,
{
    executor: Arc<Executor<S, C>>,
    store: Arc<C>,
    queue: Arc<Q>,
}

impl<S, C, Q> WorkflowService<S, C, Q>
where
    S: ReviewableState,
    C: CheckpointStore + 'static,
    Q: ReviewQueue + 'static,
{
    pub fn new(graph: CompiledGraph<S>, store: Arc<C>, queue: Arc<Q>) -> Self {
        let hook = Arc::new(ReviewTicketHook::new(Arc::clone(&queue)));
        let executor = Executor::new(graph, Arc::clone(&store)).with_pause_handler(hook);
        Self {
            executor: Arc::new(executor),
            store,
            queue,
        }
    }

    pub fn executor(&self) -> &Arc<Executor<S, C>> {
        &self.executor
    }

    /// Create a thread and schedule it. Returns the new thread id once the
    /// seed checkpoint is durable.
    pub async fn submit(&self, initial: S) -> Result<String, ServiceError> {
        let thread_id = Uuid::now_v7().to_string();
        let seeded = self.executor.start(&thread_id, initial).await?;
        if seeded.status == ThreadStatus::Running {
            self.spawn_run(thread_id.clone());
        }
        Ok(thread_id)
    }

    /// Create a thread and run it in the caller's task until it pauses,
    /// completes or fails.
    pub async fn run_to_pause(&self, initial: S) -> Result<RunOutcome<S>, ServiceError> {
        let thread_id = Uuid::now_v7().to_string();
        Ok(self.executor.run(&thread_id, Some(initial)).await?)
    }

    pub async fn list_pending_reviews(&self) -> Result<Vec<ReviewTicket>, ServiceError> {
        Ok(self.queue.list_pending().await?)
    }

    pub async fn review_ticket(&self, ticket_id: &str) -> Result<ReviewTicket, ServiceError> {
        self.queue
            .get(ticket_id)
            .await?
            .ok_or_else(|| ReviewError::TicketNotFound(ticket_id.to_string()).into())
    }

    /// Resolve a ticket, inject the decision and schedule resumption.
    pub async fn submit_decision(
        &self,
        ticket_id: &str,
        decision: Decision,
        notes: Option<&str>,
    ) -> Result<DecisionAck, ServiceError> {
        let ack = self.apply_decision(ticket_id, decision, notes).await?;
        self.spawn_run(ack.thread_id.clone());
        Ok(ack)
    }

    /// Like [`submit_decision`](Self::submit_decision) but runs the resumed
    /// thread in the caller's task.
    pub async fn decide_and_run(
        &self,
        ticket_id: &str,
        decision: Decision,
        notes: Option<&str>,
    ) -> Result<(DecisionAck, RunOutcome<S>), ServiceError> {
        let ack = self.apply_decision(ticket_id, decision, notes).await?;
        let outcome = self.executor.run(&ack.thread_id, None).await?;
        Ok((ack, outcome))
    }

    async fn apply_decision(
        &self,
        ticket_id: &str,
        decision: Decision,
        notes: Option<&str>,
    ) -> Result<DecisionAck, ServiceError> {
        let ticket = self.review_ticket(ticket_id).await?;
        if ticket.status == TicketStatus::Completed {
            return Err(ReviewError::AlreadyResolved(ticket_id.to_string()).into());
        }

        let latest = self.thread(&ticket.thread_id).await?;
        if latest.status != ThreadStatus::Paused {
            return Err(ServiceError::NotPaused {
                thread_id: ticket.thread_id,
                status: latest.status,
            });
        }

        // Resolving first guarantees a ticket resumes its thread at most once.
        let resolved = self.queue.resolve(ticket_id, decision, notes).await?;
        self.store
            .inject_pending_fields(&resolved.thread_id, &S::decision_patch(decision, notes))
            .await?;

        tracing::info!(
            ticket_id,
            thread_id = resolved.thread_id.as_str(),
            decision = %decision,
            "decision recorded"
        );

        Ok(DecisionAck {
            ticket_id: resolved.ticket_id,
            thread_id: resolved.thread_id,
            decision,
            next_stage: S::stage_after(decision).to_string(),
        })
    }

    /// Latest checkpoint of a thread.
    pub async fn thread(&self, thread_id: &str) -> Result<Checkpoint, ServiceError> {
        self.store
            .latest(thread_id)
            .await?
            .ok_or_else(|| ServiceError::ThreadNotFound(thread_id.to_string()))
    }

    pub async fn list_threads(
        &self,
        status: Option<ThreadStatus>,
    ) -> Result<Vec<ThreadSummary>, ServiceError> {
        Ok(self.store.list_threads(status).await?)
    }

    /// Ordered history of every committed step of a thread.
    pub async fn audit_trail(&self, thread_id: &str) -> Result<AuditTrail, ServiceError> {
        let history = self.store.history(thread_id).await?;
        let latest = history
            .last()
            .ok_or_else(|| ServiceError::ThreadNotFound(thread_id.to_string()))?;
        Ok(AuditTrail {
            thread_id: thread_id.to_string(),
            status: latest.status,
            next_node: latest.next_node.clone(),
            steps: history.iter().map(AuditEntry::from).collect(),
        })
    }

    /// Restart-time sweep, awaiting every resumed run.
    ///
    /// - PAUSED threads without a pending ticket get one, unless their
    ///   snapshot already carries a decision, in which case they are resumed.
    /// - RUNNING threads are driven forward from their latest checkpoint.
    pub async fn recover(&self) -> Result<RecoveryReport, ServiceError> {
        let mut report = RecoveryReport::default();
        let to_resume = self.recovery_scan(&mut report).await?;

        let results = join_all(
            to_resume
                .iter()
                .map(|summary| self.executor.run(&summary.thread_id, None)),
        )
        .await;

        for (summary, result) in to_resume.iter().zip(results) {
            match result {
                Ok(outcome) => report.resumed.push(ThreadSummary {
                    thread_id: outcome.thread_id,
                    status: outcome.status,
                    step: outcome.step,
                    next_node: outcome.next_node,
                    updated_at: chrono::Utc::now(),
                }),
                Err(err) => {
                    tracing::error!(
                        thread_id = summary.thread_id.as_str(),
                        error = %err,
                        "recovery run failed"
                    );
                    report.errors.push(format!("{}: {err}", summary.thread_id));
                }
            }
        }

        Ok(report)
    }

    /// Same sweep as [`recover`](Self::recover), but resumed threads run on
    /// spawned tasks. Returns once tickets are registered and runs scheduled,
    /// so a server can start accepting requests without waiting on workers.
    pub async fn recover_in_background(&self) -> Result<RecoveryReport, ServiceError> {
        let mut report = RecoveryReport::default();
        let to_resume = self.recovery_scan(&mut report).await?;
        for summary in &to_resume {
            self.spawn_run(summary.thread_id.clone());
        }
        report.resumed = to_resume;
        Ok(report)
    }

    /// Register missing tickets and collect the threads that need a run.
    async fn recovery_scan(
        &self,
        report: &mut RecoveryReport,
    ) -> Result<Vec<ThreadSummary>, ServiceError> {
        let mut to_resume = Vec::new();

        for summary in self.store.list_threads(Some(ThreadStatus::Paused)).await? {
            if self.queue.pending_for_thread(&summary.thread_id).await?.is_some() {
                continue;
            }
            let latest = self.thread(&summary.thread_id).await?;
            let state: S = match serde_json::from_value(latest.snapshot) {
                Ok(state) => state,
                Err(err) => {
                    tracing::error!(
                        thread_id = summary.thread_id.as_str(),
                        error = %err,
                        "paused snapshot does not decode"
                    );
                    report.errors.push(format!("{}: {err}", summary.thread_id));
                    continue;
                }
            };

            // Decision injected, resume lost before it was scheduled.
            if state.has_decision() {
                tracing::info!(
                    thread_id = summary.thread_id.as_str(),
                    "paused thread already decided, resuming"
                );
                to_resume.push(summary);
                continue;
            }

            let ticket = self
                .queue
                .create(&summary.thread_id, &state.review_context())
                .await?;
            tracing::info!(
                thread_id = summary.thread_id.as_str(),
                ticket_id = ticket.ticket_id.as_str(),
                "re-registered missing review ticket"
            );
            report.tickets_registered.push(ticket.ticket_id);
        }

        to_resume.extend(self.store.list_threads(Some(ThreadStatus::Running)).await?);
        Ok(to_resume)
    }

    fn spawn_run(&self, thread_id: String) {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            match executor.run(&thread_id, None).await {
                Ok(outcome) => tracing::info!(
                    thread_id = thread_id.as_str(),
                    status = %outcome.status,
                    step = outcome.step,
                    "run finished"
                ),
                Err(err) => tracing::error!(
                    thread_id = thread_id.as_str(),
                    error = %err,
                    "run aborted"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FnNode, GraphBuilder, NodeContext, NodeError, merge_field};
    use crate::repository::memory::{MemoryCheckpointStore, MemoryReviewQueue};
    use ledgerflow_types::checkpoint::{END, START};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Claim {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decision: Option<Decision>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paid: Option<bool>,
    }

    impl GraphState for Claim {
        fn merge(&mut self, update: Self) {
            merge_field(&mut self.amount, update.amount);
            merge_field(&mut self.decision, update.decision);
            merge_field(&mut self.paid, update.paid);
        }
    }

    impl ReviewableState for Claim {
        fn review_context(&self) -> ReviewContext {
            ReviewContext {
                business_id: "C-1".to_string(),
                counterparty: "Claimant".to_string(),
                amount: self.amount.unwrap_or(0.0),
                reason: "manual check".to_string(),
                locator: String::new(),
            }
        }

        fn decision_patch(decision: Decision, _notes: Option<&str>) -> Value {
            json!({ "decision": decision })
        }

        fn has_decision(&self) -> bool {
            self.decision.is_some()
        }

        fn stage_after(decision: Decision) -> &'static str {
            match decision {
                Decision::Accept => "PAY",
                Decision::Reject => "TERMINATED",
            }
        }
    }

    type Service = WorkflowService<Claim, MemoryCheckpointStore, MemoryReviewQueue>;

    fn service() -> Service {
        let graph = GraphBuilder::new()
            .add_node(
                "intake",
                FnNode::new(|_ctx: NodeContext, _s: Claim| async move {
                    Ok::<_, NodeError>(Claim::default())
                }),
            )
            .add_node(
                "review",
                FnNode::new(|_ctx: NodeContext, s: Claim| async move {
                    s.decision
                        .map(|_| Claim::default())
                        .ok_or_else(|| NodeError::MissingInput("decision".to_string()))
                }),
            )
            .add_node(
                "pay",
                FnNode::new(|_ctx: NodeContext, _s: Claim| async move {
                    Ok::<_, NodeError>(Claim {
                        paid: Some(true),
                        ..Claim::default()
                    })
                }),
            )
            .add_edge(START, "intake")
            .add_edge("intake", "review")
            .add_conditional_edges(
                "review",
                |s: &Claim| match s.decision {
                    Some(Decision::Accept) => "pay".to_string(),
                    _ => END.to_string(),
                },
                &["pay", END],
            )
            .add_edge("pay", END)
            .pause_before("review")
            .compile()
            .unwrap();

        WorkflowService::new(
            graph,
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(MemoryReviewQueue::new("http://localhost/review")),
        )
    }

    async fn wait_for(service: &Service, thread_id: &str, status: ThreadStatus) -> Checkpoint {
        for _ in 0..200 {
            let latest = service.thread(thread_id).await.unwrap();
            if latest.status == status {
                return latest;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("thread {thread_id} never reached {status}");
    }

    fn claim() -> Claim {
        Claim {
            amount: Some(250.0),
            ..Claim::default()
        }
    }

    #[tokio::test]
    async fn test_submit_pauses_and_registers_one_ticket() {
        let service = service();
        let thread_id = service.submit(claim()).await.unwrap();

        let paused = wait_for(&service, &thread_id, ThreadStatus::Paused).await;
        assert_eq!(paused.next_node, "review");

        let pending = service.list_pending_reviews().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].thread_id, thread_id);
        assert_eq!(pending[0].context.amount, 250.0);
        assert_eq!(pending[0].context.locator, "http://localhost/review/T-1");
    }

    #[tokio::test]
    async fn test_decision_resumes_thread() {
        let service = service();
        let paused = service.run_to_pause(claim()).await.unwrap();
        assert_eq!(paused.status, ThreadStatus::Paused);

        let ack = service
            .submit_decision("T-1", Decision::Accept, Some("ok"))
            .await
            .unwrap();
        assert_eq!(ack.thread_id, paused.thread_id);
        assert_eq!(ack.next_stage, "PAY");

        let done = wait_for(&service, &paused.thread_id, ThreadStatus::Completed).await;
        assert_eq!(done.snapshot["paid"], true);

        let trail = service.audit_trail(&paused.thread_id).await.unwrap();
        let nodes: Vec<_> = trail.steps.iter().filter_map(|s| s.node.as_deref()).collect();
        assert_eq!(nodes, vec!["intake", "review", "pay"]);
        assert_eq!(trail.status, ThreadStatus::Completed);
    }

    #[tokio::test]
    async fn test_decision_is_accepted_only_once() {
        let service = service();
        service.run_to_pause(claim()).await.unwrap();

        let (_, outcome) = service
            .decide_and_run("T-1", Decision::Reject, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, ThreadStatus::Completed);
        assert!(outcome.state.paid.is_none());

        let again = service.submit_decision("T-1", Decision::Accept, None).await;
        assert!(matches!(
            again,
            Err(ServiceError::Review(ReviewError::AlreadyResolved(_)))
        ));
        let unknown = service.submit_decision("T-7", Decision::Accept, None).await;
        assert!(matches!(
            unknown,
            Err(ServiceError::Review(ReviewError::TicketNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_audit_trail_unknown_thread() {
        let service = service();
        let err = service.audit_trail("missing").await;
        assert!(matches!(err, Err(ServiceError::ThreadNotFound(_))));
    }

    #[tokio::test]
    async fn test_recover_registers_missing_ticket_and_resumes_running() {
        let service = service();

        // A paused thread whose ticket registration was lost.
        let lost = Checkpoint::seed("lost", json!({"amount": 5.0}), "review", ThreadStatus::Paused);
        service.store.append(&lost).await.unwrap();

        // A thread that crashed while running.
        let crashed = Checkpoint::seed("crashed", json!({}), "intake", ThreadStatus::Running);
        service.store.append(&crashed).await.unwrap();

        let report = service.recover().await.unwrap();
        // One ticket from the sweep; the resumed thread's pause adds the other.
        assert_eq!(report.tickets_registered.len(), 1);
        assert_eq!(report.resumed.len(), 1);
        assert_eq!(report.resumed[0].status, ThreadStatus::Paused);
        assert!(report.errors.is_empty());
        assert_eq!(service.list_pending_reviews().await.unwrap().len(), 2);

        let again = service.recover().await.unwrap();
        assert!(again.tickets_registered.is_empty());
        assert!(again.resumed.is_empty());
    }

    #[tokio::test]
    async fn test_recover_resumes_decided_thread_without_new_ticket() {
        let service = service();
        let paused = service.run_to_pause(claim()).await.unwrap();

        // Decision resolved and injected, but the resume never ran.
        service
            .queue
            .resolve("T-1", Decision::Accept, None)
            .await
            .unwrap();
        service
            .store
            .inject_pending_fields(&paused.thread_id, &Claim::decision_patch(Decision::Accept, None))
            .await
            .unwrap();

        let report = service.recover().await.unwrap();
        assert!(report.tickets_registered.is_empty());
        assert_eq!(report.resumed.len(), 1);
        assert_eq!(report.resumed[0].status, ThreadStatus::Completed);

        let done = service.thread(&paused.thread_id).await.unwrap();
        assert_eq!(done.snapshot["paid"], true);
        assert!(service.list_pending_reviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_in_background_schedules_runs() {
        let service = service();

        let crashed = Checkpoint::seed("crashed", json!({}), "intake", ThreadStatus::Running);
        service.store.append(&crashed).await.unwrap();
        let lost = Checkpoint::seed("lost", json!({"amount": 5.0}), "review", ThreadStatus::Paused);
        service.store.append(&lost).await.unwrap();

        let report = service.recover_in_background().await.unwrap();
        assert_eq!(report.tickets_registered.len(), 1);
        assert_eq!(report.resumed.len(), 1);
        assert_eq!(report.resumed[0].thread_id, "crashed");
        assert_eq!(report.resumed[0].status, ThreadStatus::Running);

        wait_for(&service, "crashed", ThreadStatus::Paused).await;
        for _ in 0..200 {
            if service.list_pending_reviews().await.unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let pending = service.list_pending_reviews().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|t| t.thread_id == "crashed"));
    }
}
