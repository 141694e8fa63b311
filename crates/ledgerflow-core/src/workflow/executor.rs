//! Durable graph executor.
//!
//! The `Executor` runs one thread's state machine until it completes, fails,
//! or reaches a pause-before node. After every node it merges the partial
//! update into the full state, resolves the next node, and appends a
//! checkpoint before moving on.
//!
//! # Execution flow
//!
//! 1. New thread: append the step-0 checkpoint pointing at the start node.
//!    Existing thread: load its latest checkpoint.
//! 2. Terminal threads are returned as-is without running anything.
//! 3. Loop: run `next_node` -> merge -> route -> append checkpoint (step + 1).
//! 4. Stop on END (COMPLETED), on a pause-before node (PAUSED), or on a node
//!    failure (FAILED, recorded as its own checkpoint).
//!
//! A crash between "node returned" and "checkpoint written" re-runs that one
//! node on the next `run`. Committed steps never re-run.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::FutureExt;
use ledgerflow_types::checkpoint::{Checkpoint, END, ThreadStatus};
use ledgerflow_types::error::CheckpointError;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::graph::{CompiledGraph, GraphState, NodeContext, RouteError};
use crate::repository::checkpoint::CheckpointStore;

// ---------------------------------------------------------------------------
// Errors and outcome
// ---------------------------------------------------------------------------

/// Failures that stop the executor itself.
///
/// Node failures are not errors here: they are recorded as a FAILED
/// checkpoint and reported through [`RunOutcome`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("thread '{0}' not found")]
    ThreadNotFound(String),

    #[error("thread '{0}' already exists")]
    ThreadExists(String),

    /// A checkpoint could not be read or written. Nothing past the last
    /// durable checkpoint is allowed to proceed.
    #[error("persistence error: {0}")]
    Persistence(#[from] CheckpointError),

    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error("state codec error: {0}")]
    StateCodec(String),

    #[error("checkpoint points at unknown node '{0}'")]
    UnknownNode(String),
}

/// Where a `run` call left the thread.
#[derive(Debug, Clone)]
pub struct RunOutcome<S> {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub step: u64,
    pub next_node: String,
    pub state: S,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Pause hook
// ---------------------------------------------------------------------------

/// Called once each time a thread becomes PAUSED.
pub trait PauseHandler<S>: Send + Sync {
    fn on_pause<'a>(
        &'a self,
        thread_id: &'a str,
        next_node: &'a str,
        state: &'a S,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs compiled graphs against a checkpoint store.
///
/// Calls for one thread are serialized through a per-thread async mutex;
/// different threads never wait on each other.
pub struct Executor<S: GraphState, C: CheckpointStore> {
    graph: CompiledGraph<S>,
    store: Arc<C>,
    pause_handler: Option<Arc<dyn PauseHandler<S>>>,
    thread_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: GraphState, C: CheckpointStore> Executor<S, C> {
    pub fn new(graph: CompiledGraph<S>, store: Arc<C>) -> Self {
        Self {
            graph,
            store,
            pause_handler: None,
            thread_locks: DashMap::new(),
        }
    }

    pub fn with_pause_handler(mut self, handler: Arc<dyn PauseHandler<S>>) -> Self {
        self.pause_handler = Some(handler);
        self
    }

    pub fn graph(&self) -> &CompiledGraph<S> {
        &self.graph
    }

    pub fn store(&self) -> &Arc<C> {
        &self.store
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.thread_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the thread's lock entry once no other caller holds or awaits it.
    /// The caller must have released its own guard and clone first.
    fn release_lock(&self, thread_id: &str) {
        self.thread_locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Run `f` with the thread's lock held, then release the lock entry.
    async fn with_thread_lock<T, F>(&self, thread_id: &str, f: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.thread_lock(thread_id);
        let result = {
            let _guard = lock.lock().await;
            f.await
        };
        drop(lock);
        self.release_lock(thread_id);
        result
    }

    /// Run a thread.
    ///
    /// With `initial`, `thread_id` must be new: the thread is seeded at step 0
    /// and executed. Without it, the thread continues from its latest
    /// checkpoint (resume after a pause, or recovery after a crash).
    pub async fn run(
        &self,
        thread_id: &str,
        initial: Option<S>,
    ) -> Result<RunOutcome<S>, ExecutorError> {
        self.with_thread_lock(thread_id, self.run_locked(thread_id, initial))
            .await
    }

    async fn run_locked(
        &self,
        thread_id: &str,
        initial: Option<S>,
    ) -> Result<RunOutcome<S>, ExecutorError> {
        let current = match initial {
            Some(state) => {
                let seed = self.seed(thread_id, &state).await?;
                if seed.status == ThreadStatus::Paused {
                    self.notify_pause(&seed, &state).await;
                    return outcome_of(&seed, state);
                }
                seed
            }
            None => self
                .store
                .latest(thread_id)
                .await?
                .ok_or_else(|| ExecutorError::ThreadNotFound(thread_id.to_string()))?,
        };

        let state = decode_state::<S>(&current.snapshot)?;
        if current.status.is_terminal() {
            tracing::debug!(
                thread_id,
                status = %current.status,
                "thread already terminal, nothing to run"
            );
            return outcome_of(&current, state);
        }
        if current.status == ThreadStatus::Paused {
            tracing::info!(thread_id, node = current.next_node.as_str(), "resuming paused thread");
        }

        self.drive(current, state).await
    }

    /// Seed a new thread without running it.
    ///
    /// Returns the step-0 outcome; the caller continues with `run(id, None)`
    /// unless the thread is already PAUSED.
    pub async fn start(&self, thread_id: &str, initial: S) -> Result<RunOutcome<S>, ExecutorError> {
        self.with_thread_lock(thread_id, async {
            let seed = self.seed(thread_id, &initial).await?;
            if seed.status == ThreadStatus::Paused {
                self.notify_pause(&seed, &initial).await;
            }
            outcome_of(&seed, initial)
        })
        .await
    }

    async fn seed(&self, thread_id: &str, state: &S) -> Result<Checkpoint, ExecutorError> {
        if self.store.latest(thread_id).await?.is_some() {
            return Err(ExecutorError::ThreadExists(thread_id.to_string()));
        }

        let start = self.graph.start_node();
        let status = if self.graph.pauses_before(start) {
            ThreadStatus::Paused
        } else {
            ThreadStatus::Running
        };
        let seed = Checkpoint::seed(thread_id, encode_state(state)?, start, status);
        self.store.append(&seed).await?;

        tracing::info!(thread_id, start, "thread created");
        Ok(seed)
    }

    /// Step loop. `current` is the latest durable checkpoint.
    async fn drive(
        &self,
        mut current: Checkpoint,
        mut state: S,
    ) -> Result<RunOutcome<S>, ExecutorError> {
        loop {
            let node_name = current.next_node.clone();
            let node = self
                .graph
                .node(&node_name)
                .ok_or_else(|| ExecutorError::UnknownNode(node_name.clone()))?;

            let ctx = NodeContext {
                thread_id: current.thread_id.clone(),
                step: current.step + 1,
                node: node_name.clone(),
            };

            tracing::debug!(
                thread_id = ctx.thread_id.as_str(),
                step = ctx.step,
                node = node_name.as_str(),
                "running node"
            );

            let result = AssertUnwindSafe(node.call(&ctx, &state)).catch_unwind().await;
            let update = match result {
                Ok(Ok(update)) => update,
                Ok(Err(err)) => {
                    return self.record_failure(&current, state, &node_name, err.to_string()).await;
                }
                Err(panic) => {
                    let message = format!("node panicked: {}", panic_message(panic.as_ref()));
                    return self.record_failure(&current, state, &node_name, message).await;
                }
            };

            let output = encode_state(&update)?;
            state.merge(update);
            let snapshot = encode_state(&state)?;

            let next = match self.graph.next_node(&node_name, &state) {
                Ok(next) => next,
                Err(route_err) => {
                    tracing::error!(
                        thread_id = ctx.thread_id.as_str(),
                        node = node_name.as_str(),
                        error = %route_err,
                        "illegal route"
                    );
                    let failed = Checkpoint {
                        thread_id: ctx.thread_id.clone(),
                        step: ctx.step,
                        node: Some(node_name.clone()),
                        output: Some(output),
                        snapshot,
                        next_node: node_name,
                        status: ThreadStatus::Failed,
                        error: Some(route_err.to_string()),
                        created_at: Utc::now(),
                    };
                    self.store.append(&failed).await?;
                    return Err(ExecutorError::Route(route_err));
                }
            };

            let status = if next == END {
                ThreadStatus::Completed
            } else if self.graph.pauses_before(&next) {
                ThreadStatus::Paused
            } else {
                ThreadStatus::Running
            };

            let checkpoint = Checkpoint {
                thread_id: ctx.thread_id.clone(),
                step: ctx.step,
                node: Some(node_name),
                output: Some(output),
                snapshot,
                next_node: next,
                status,
                error: None,
                created_at: Utc::now(),
            };
            if let Err(err) = self.store.append(&checkpoint).await {
                tracing::error!(
                    thread_id = ctx.thread_id.as_str(),
                    step = ctx.step,
                    error = %err,
                    "checkpoint write failed, stopping thread"
                );
                return Err(ExecutorError::Persistence(err));
            }

            tracing::debug!(
                thread_id = checkpoint.thread_id.as_str(),
                step = checkpoint.step,
                next = checkpoint.next_node.as_str(),
                status = %checkpoint.status,
                "checkpoint written"
            );

            match status {
                ThreadStatus::Running => current = checkpoint,
                ThreadStatus::Paused => {
                    tracing::info!(
                        thread_id = checkpoint.thread_id.as_str(),
                        node = checkpoint.next_node.as_str(),
                        "thread paused"
                    );
                    self.notify_pause(&checkpoint, &state).await;
                    return outcome_of(&checkpoint, state);
                }
                ThreadStatus::Completed | ThreadStatus::Failed => {
                    tracing::info!(
                        thread_id = checkpoint.thread_id.as_str(),
                        step = checkpoint.step,
                        "thread completed"
                    );
                    return outcome_of(&checkpoint, state);
                }
            }
        }
    }

    /// Append a FAILED checkpoint that keeps the last merged state and
    /// points at the failing node.
    async fn record_failure(
        &self,
        current: &Checkpoint,
        state: S,
        node_name: &str,
        message: String,
    ) -> Result<RunOutcome<S>, ExecutorError> {
        tracing::warn!(
            thread_id = current.thread_id.as_str(),
            step = current.step + 1,
            node = node_name,
            error = message.as_str(),
            "node failed"
        );

        let failed = Checkpoint {
            thread_id: current.thread_id.clone(),
            step: current.step + 1,
            node: Some(node_name.to_string()),
            output: None,
            snapshot: current.snapshot.clone(),
            next_node: node_name.to_string(),
            status: ThreadStatus::Failed,
            error: Some(message),
            created_at: Utc::now(),
        };
        self.store.append(&failed).await?;
        outcome_of(&failed, state)
    }

    async fn notify_pause(&self, checkpoint: &Checkpoint, state: &S) {
        let Some(handler) = &self.pause_handler else {
            return;
        };
        if let Err(err) = handler
            .on_pause(&checkpoint.thread_id, &checkpoint.next_node, state)
            .await
        {
            tracing::warn!(
                thread_id = checkpoint.thread_id.as_str(),
                error = err.as_str(),
                "pause handler failed; recovery will retry"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn outcome_of<S>(checkpoint: &Checkpoint, state: S) -> Result<RunOutcome<S>, ExecutorError> {
    Ok(RunOutcome {
        thread_id: checkpoint.thread_id.clone(),
        status: checkpoint.status,
        step: checkpoint.step,
        next_node: checkpoint.next_node.clone(),
        state,
        error: checkpoint.error.clone(),
    })
}

fn encode_state<S: GraphState>(state: &S) -> Result<Value, ExecutorError> {
    serde_json::to_value(state).map_err(|e| ExecutorError::StateCodec(e.to_string()))
}

fn decode_state<S: GraphState>(snapshot: &Value) -> Result<S, ExecutorError> {
    serde_json::from_value(snapshot.clone()).map_err(|e| ExecutorError::StateCodec(e.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
