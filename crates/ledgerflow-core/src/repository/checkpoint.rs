//! Checkpoint store trait definition.

use ledgerflow_types::checkpoint::{Checkpoint, ThreadStatus, ThreadSummary};
use ledgerflow_types::error::CheckpointError;
use serde_json::Value;

/// Durable, append-only per-thread checkpoint log.
///
/// Implementations must serialize writes per thread while letting writes
/// for different threads proceed independently.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint. Fails with `OutOfSequence` unless `checkpoint.step`
    /// is exactly one more than the thread's current maximum (or 0 for a new
    /// thread).
    fn append(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl std::future::Future<Output = Result<(), CheckpointError>> + Send;

    /// Highest-step checkpoint of a thread, or `None` if the thread is unknown.
    fn latest(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, CheckpointError>> + Send;

    /// Merge `patch` into the snapshot of a PAUSED thread's latest checkpoint
    /// without advancing its step. Returns the updated checkpoint.
    fn inject_pending_fields(
        &self,
        thread_id: &str,
        patch: &Value,
    ) -> impl std::future::Future<Output = Result<Checkpoint, CheckpointError>> + Send;

    /// All checkpoints of a thread in step order.
    fn history(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Checkpoint>, CheckpointError>> + Send;

    /// Latest state of every thread, optionally filtered by status.
    fn list_threads(
        &self,
        status: Option<ThreadStatus>,
    ) -> impl std::future::Future<Output = Result<Vec<ThreadSummary>, CheckpointError>> + Send;
}
