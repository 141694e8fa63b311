//! Invoice processing workflow.
//!
//! ```text
//! __start__ -> intake -> understand -> prepare -> retrieve -> match_two_way
//! match_two_way => checkpoint_hitl | reconcile
//! checkpoint_hitl -> [pause] hitl_decision => reconcile | __end__
//! reconcile -> approve -> posting -> notify -> complete -> __end__
//! ```

pub mod nodes;
mod state;

use std::sync::Arc;

use ledgerflow_types::checkpoint::{END, START};
use ledgerflow_types::invoice::{InvoiceState, MatchResult};
use ledgerflow_types::review::Decision;

use crate::capability::BoxCapabilityRouter;
use crate::graph::{CompiledGraph, GraphBuilder, GraphError};

pub use nodes::{InvoiceStages, Stage, StageNode, StageSettings};

/// Pool serving deterministic, in-house operations.
pub const COMMON_POOL: &str = "common";
/// Pool serving operations that reach external systems.
pub const ATLAS_POOL: &str = "atlas";

/// Build and validate the invoice graph.
pub fn build_invoice_graph(
    router: Arc<BoxCapabilityRouter>,
    settings: StageSettings,
) -> Result<CompiledGraph<InvoiceState>, GraphError> {
    let stages = Arc::new(InvoiceStages::new(router, settings));

    let mut builder = GraphBuilder::new();
    for stage in Stage::ALL {
        builder = builder.add_node(stage.name(), StageNode::new(stage, Arc::clone(&stages)));
    }

    builder
        .add_edge(START, Stage::Intake.name())
        .add_edge(Stage::Intake.name(), Stage::Understand.name())
        .add_edge(Stage::Understand.name(), Stage::Prepare.name())
        .add_edge(Stage::Prepare.name(), Stage::Retrieve.name())
        .add_edge(Stage::Retrieve.name(), Stage::MatchTwoWay.name())
        .add_conditional_edges(
            Stage::MatchTwoWay.name(),
            route_after_match,
            &[Stage::CheckpointHitl.name(), Stage::Reconcile.name()],
        )
        .add_edge(Stage::CheckpointHitl.name(), Stage::HitlDecision.name())
        .add_conditional_edges(
            Stage::HitlDecision.name(),
            route_after_review,
            &[Stage::Reconcile.name(), END],
        )
        .add_edge(Stage::Reconcile.name(), Stage::Approve.name())
        .add_edge(Stage::Approve.name(), Stage::Posting.name())
        .add_edge(Stage::Posting.name(), Stage::Notify.name())
        .add_edge(Stage::Notify.name(), Stage::Complete.name())
        .add_edge(Stage::Complete.name(), END)
        .pause_before(Stage::HitlDecision.name())
        .compile()
}

fn route_after_match(state: &InvoiceState) -> String {
    match state.match_result {
        Some(MatchResult::Matched) => Stage::Reconcile.name().to_string(),
        _ => Stage::CheckpointHitl.name().to_string(),
    }
}

fn route_after_review(state: &InvoiceState) -> String {
    match state.human_decision {
        Some(Decision::Accept) => Stage::Reconcile.name().to_string(),
        _ => END.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::scripted::ScriptedRouter;
    use crate::repository::checkpoint::CheckpointStore;
    use crate::repository::memory::{MemoryCheckpointStore, MemoryReviewQueue};
    use crate::service::WorkflowService;
    use crate::workflow::Executor;
    use ledgerflow_types::capability::ToolOutcome;
    use ledgerflow_types::checkpoint::ThreadStatus;
    use ledgerflow_types::invoice::InvoiceSubmission;
    use serde_json::json;

    fn scripted(match_score: f64) -> Arc<ScriptedRouter> {
        Arc::new(
            ScriptedRouter::new()
                .respond(
                    "accept_invoice_payload",
                    ToolOutcome::success(json!({"status": "success", "raw_id": "RAW-1"})),
                )
                .respond("ocr_extract", ToolOutcome::success(json!({"text": "INVOICE INV-1 PO P-1"})))
                .respond(
                    "parse_line_items",
                    ToolOutcome::success(json!({
                        "parsed_data": {
                            "po_number": "P-1",
                            "total_amount": 1000.0,
                            "line_items": [{"desc": "Hosting", "amount": 1000.0}],
                            "parsed_dates": {"due_date": "2026-11-30"}
                        }
                    })),
                )
                .respond(
                    "normalize_vendor",
                    ToolOutcome::success(json!({"normalized_name": "ACME CORP"})),
                )
                .respond(
                    "enrich_vendor",
                    ToolOutcome::success(json!({"vendor_data": {"email": "ap@acme.test", "risk": "low"}})),
                )
                .respond("compute_flags", ToolOutcome::success(json!({"flags": []})))
                .respond(
                    "fetch_erp_data",
                    ToolOutcome::success(json!({
                        "data": {
                            "purchase_orders": [{"po_number": "P-0"}, {"po_number": "P-1", "amount": 1000.0}],
                            "grns": [{"grn": "G-1"}],
                            "history": []
                        }
                    })),
                )
                .respond(
                    "compute_match_score",
                    ToolOutcome::success(json!({"score": match_score, "notes": "scored"})),
                )
                .respond(
                    "build_accounting_entries",
                    ToolOutcome::success(json!({
                        "entries": [
                            {"type": "DEBIT", "account_code": "6000", "amount": 1000.0},
                            {"type": "CREDIT", "account_code": "2000", "amount": 1000.0}
                        ]
                    })),
                )
                .respond("post_to_erp", ToolOutcome::success(json!({"txn_id": "TXN-1"})))
                .respond("schedule_payment", ToolOutcome::success(json!({"payment_id": "PAY-1"}))),
        )
    }

    fn graph(router: &Arc<ScriptedRouter>) -> CompiledGraph<InvoiceState> {
        let settings = StageSettings {
            match_threshold: 0.90,
            ..StageSettings::default()
        };
        build_invoice_graph(
            Arc::new(BoxCapabilityRouter::new(Arc::clone(router))),
            settings,
        )
        .unwrap()
    }

    fn invoice() -> InvoiceState {
        InvoiceState::from_submission(InvoiceSubmission {
            invoice_id: "INV-1".to_string(),
            vendor_name: "Acme Corp".to_string(),
            amount: 1000.0,
            currency: "USD".to_string(),
            attachments: vec!["inv-1.pdf".to_string()],
        })
    }

    fn service(
        router: &Arc<ScriptedRouter>,
    ) -> WorkflowService<InvoiceState, MemoryCheckpointStore, MemoryReviewQueue> {
        WorkflowService::new(
            graph(router),
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(MemoryReviewQueue::new("http://localhost:8080/review")),
        )
    }

    #[test]
    fn test_graph_compiles_with_every_stage() {
        let router = scripted(0.95);
        let graph = graph(&router);
        assert_eq!(graph.start_node(), "intake");
        assert_eq!(graph.node_names().len(), Stage::ALL.len());
        assert!(graph.pauses_before("hitl_decision"));
        assert!(!graph.pauses_before("checkpoint_hitl"));
    }

    #[tokio::test]
    async fn test_high_score_completes_without_review() {
        let router = scripted(0.92);
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));

        let outcome = executor.run("t-auto", Some(invoice())).await.unwrap();

        assert_eq!(outcome.status, ThreadStatus::Completed);
        assert_eq!(outcome.state.match_result, Some(MatchResult::Matched));
        assert_eq!(outcome.state.approver.as_deref(), Some("Auto-Approval Policy"));
        assert_eq!(outcome.state.erp_txn_id.as_deref(), Some("TXN-1"));
        assert_eq!(outcome.state.payment_id.as_deref(), Some("PAY-1"));
        assert_eq!(outcome.state.notified, Some(true));
        assert_eq!(outcome.state.stage.as_deref(), Some("COMPLETED"));
        assert_eq!(router.count("accept_or_reject_invoice"), 0);
        assert_eq!(router.count("send_notification"), 2);

        let history = executor.store().history("t-auto").await.unwrap();
        let nodes: Vec<_> = history.iter().filter_map(|c| c.node.as_deref()).collect();
        assert_eq!(
            nodes,
            vec![
                "intake", "understand", "prepare", "retrieve", "match_two_way", "reconcile",
                "approve", "posting", "notify", "complete"
            ]
        );
    }

    #[tokio::test]
    async fn test_low_score_pauses_then_accept_completes() {
        let router = scripted(0.62);
        let service = service(&router);

        let paused = service.run_to_pause(invoice()).await.unwrap();
        assert_eq!(paused.status, ThreadStatus::Paused);
        assert_eq!(paused.next_node, "hitl_decision");
        assert_eq!(paused.state.match_result, Some(MatchResult::Failed));
        assert_eq!(router.count("post_to_erp"), 0);

        let pending = service.list_pending_reviews().await.unwrap();
        assert_eq!(pending.len(), 1);
        let ticket = &pending[0];
        assert_eq!(ticket.ticket_id, "T-1");
        assert_eq!(ticket.thread_id, paused.thread_id);
        assert_eq!(ticket.context.business_id, "INV-1");
        assert_eq!(ticket.context.counterparty, "ACME CORP");
        assert_eq!(ticket.context.reason, "Match score 0.62 below threshold 0.90");
        assert_eq!(ticket.context.locator, "http://localhost:8080/review/T-1");

        let (ack, done) = service
            .decide_and_run("T-1", Decision::Accept, Some("ok"))
            .await
            .unwrap();
        assert_eq!(ack.next_stage, "RECONCILE");
        assert_eq!(done.status, ThreadStatus::Completed);
        assert_eq!(done.state.erp_txn_id.as_deref(), Some("TXN-1"));
        assert_eq!(done.state.reviewer_notes.as_deref(), Some("ok"));
        assert_eq!(done.state.approver.as_deref(), Some("Human Reviewer"));
        assert_eq!(router.count("accept_or_reject_invoice"), 1);

        assert!(service.list_pending_reviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_terminates_without_posting() {
        let router = scripted(0.40);
        let service = service(&router);
        service.run_to_pause(invoice()).await.unwrap();

        let (ack, done) = service
            .decide_and_run("T-1", Decision::Reject, Some("duplicate"))
            .await
            .unwrap();

        assert_eq!(ack.next_stage, "TERMINATED");
        assert_eq!(done.status, ThreadStatus::Completed);
        assert_eq!(done.state.stage.as_deref(), Some("REQUIRES_MANUAL_HANDLING"));
        assert_eq!(router.count("post_to_erp"), 0);
        assert_eq!(router.count("build_accounting_entries"), 0);
    }

    #[tokio::test]
    async fn test_scorer_application_error_routes_to_review() {
        let router = scripted(0.99);
        router.enqueue(
            "compute_match_score",
            ToolOutcome::application_error("no purchase order to compare"),
        );
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));

        let outcome = executor.run("t-app", Some(invoice())).await.unwrap();

        assert_eq!(outcome.status, ThreadStatus::Paused);
        assert_eq!(outcome.state.match_score, Some(0.0));
        assert_eq!(
            outcome.state.match_notes.as_deref(),
            Some("no purchase order to compare")
        );
    }

    #[tokio::test]
    async fn test_scorer_transport_error_fails_thread() {
        let router = scripted(0.99);
        router.enqueue("compute_match_score", ToolOutcome::transport_error("worker exited"));
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));

        let outcome = executor.run("t-transport", Some(invoice())).await.unwrap();

        assert_eq!(outcome.status, ThreadStatus::Failed);
        assert_eq!(outcome.next_node, "match_two_way");
        assert!(outcome.error.unwrap().contains("worker exited"));
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_and_keeps_fields() {
        let router = scripted(0.95);
        router.enqueue("enrich_vendor", ToolOutcome::transport_error("connection refused"));
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));

        let outcome = executor.run("t-degrade", Some(invoice())).await.unwrap();

        assert_eq!(outcome.status, ThreadStatus::Completed);
        assert_eq!(outcome.state.raw_id.as_deref(), Some("RAW-1"));
        assert_eq!(outcome.state.po_number.as_deref(), Some("P-1"));
        assert_eq!(outcome.state.vendor_profile, Some(json!({"name": "ACME CORP"})));
    }

    #[tokio::test]
    async fn test_notification_failure_marks_not_notified() {
        let router = scripted(0.95);
        router.enqueue("send_notification", ToolOutcome::transport_error("smtp down"));
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));

        let outcome = executor.run("t-notify", Some(invoice())).await.unwrap();

        assert_eq!(outcome.status, ThreadStatus::Completed);
        assert_eq!(outcome.state.notified, Some(false));
    }

    #[tokio::test]
    async fn test_posting_carries_idempotency_key_and_matches_target_po() {
        let router = scripted(0.95);
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));
        executor.run("t-key", Some(invoice())).await.unwrap();

        let calls = router.calls();
        let score = calls
            .iter()
            .find(|c| c.operation == "compute_match_score")
            .unwrap();
        assert_eq!(score.pool, COMMON_POOL);
        assert_eq!(score.arguments["po_data"]["po_number"], "P-1");

        let post = calls.iter().find(|c| c.operation == "post_to_erp").unwrap();
        assert_eq!(post.pool, ATLAS_POOL);
        assert_eq!(post.arguments["erp_system"], "mock_erp");
        let key = post.arguments["idempotency_key"].as_str().unwrap();
        assert!(key.starts_with("t-key:"));
        assert!(key.ends_with(":posting"));

        let payment = calls
            .iter()
            .find(|c| c.operation == "schedule_payment")
            .unwrap();
        assert_eq!(payment.arguments["due_date"], "2026-11-30");
        assert_eq!(payment.arguments["idempotency_key"], key);
    }

    #[tokio::test]
    async fn test_posting_failure_records_failed_checkpoint() {
        let router = scripted(0.95);
        router.enqueue("post_to_erp", ToolOutcome::application_error("ledger closed"));
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));

        let outcome = executor.run("t-post", Some(invoice())).await.unwrap();
        assert_eq!(outcome.status, ThreadStatus::Failed);
        assert_eq!(outcome.next_node, "posting");
        assert!(outcome.state.erp_txn_id.is_none());

        let latest = executor.store().latest("t-post").await.unwrap().unwrap();
        assert_eq!(latest.status, ThreadStatus::Failed);
        assert!(latest.error.unwrap().contains("ledger closed"));
        assert_eq!(router.count("schedule_payment"), 0);
    }

    #[tokio::test]
    async fn test_completed_thread_rerun_invokes_nothing() {
        let router = scripted(0.95);
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));
        executor.run("t-done", Some(invoice())).await.unwrap();
        let before = router.calls().len();

        let again = executor.run("t-done", None).await.unwrap();

        assert_eq!(again.status, ThreadStatus::Completed);
        assert_eq!(router.calls().len(), before);
    }

    #[tokio::test]
    async fn test_missing_decision_fails_resumed_thread() {
        let router = scripted(0.10);
        let executor = Executor::new(graph(&router), Arc::new(MemoryCheckpointStore::new()));
        let paused = executor.run("t-nodecision", Some(invoice())).await.unwrap();
        assert_eq!(paused.status, ThreadStatus::Paused);

        let resumed = executor.run("t-nodecision", None).await.unwrap();
        assert_eq!(resumed.status, ThreadStatus::Failed);
        assert_eq!(resumed.next_node, "hitl_decision");
        assert!(resumed.error.unwrap().contains("human_decision"));
    }
}
