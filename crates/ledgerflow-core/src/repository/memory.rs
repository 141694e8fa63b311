//! In-memory checkpoint store and review queue.
//!
//! Used by tests and by embedders that do not need durability. Semantics
//! match the SQLite implementations in ledgerflow-infra: consecutive steps
//! per thread, inject only while PAUSED, one PENDING ticket per thread.

use chrono::Utc;
use dashmap::DashMap;
use ledgerflow_types::checkpoint::{
    Checkpoint, ThreadStatus, ThreadSummary, merge_snapshot_fields,
};
use ledgerflow_types::error::{CheckpointError, ReviewError};
use ledgerflow_types::review::{
    Decision, ReviewContext, ReviewTicket, TicketStatus, ticket_id_for,
};
use serde_json::Value;
use tokio::sync::Mutex;

use super::checkpoint::CheckpointStore;
use super::review::ReviewQueue;

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// Checkpoint log kept in a sharded map, one vector per thread.
///
/// The per-entry shard lock serializes writes to one thread without blocking
/// threads stored in other shards.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    threads: DashMap<String, Vec<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn append(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut log = self.threads.entry(checkpoint.thread_id.clone()).or_default();
        let expected = log.last().map(|cp| cp.step + 1).unwrap_or(0);
        if checkpoint.step != expected {
            return Err(CheckpointError::OutOfSequence {
                thread_id: checkpoint.thread_id.clone(),
                expected,
                actual: checkpoint.step,
            });
        }
        log.push(checkpoint.clone());
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .get(thread_id)
            .and_then(|log| log.last().cloned()))
    }

    async fn inject_pending_fields(
        &self,
        thread_id: &str,
        patch: &Value,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut log = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        let latest = log
            .last_mut()
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        if latest.status != ThreadStatus::Paused {
            return Err(CheckpointError::InvalidState(format!(
                "thread '{thread_id}' is {}, not PAUSED",
                latest.status
            )));
        }
        merge_snapshot_fields(&mut latest.snapshot, patch);
        Ok(latest.clone())
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .get(thread_id)
            .map(|log| log.value().clone())
            .unwrap_or_default())
    }

    async fn list_threads(
        &self,
        status: Option<ThreadStatus>,
    ) -> Result<Vec<ThreadSummary>, CheckpointError> {
        let mut summaries: Vec<ThreadSummary> = self
            .threads
            .iter()
            .filter_map(|entry| entry.value().last().map(ThreadSummary::from))
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

// ---------------------------------------------------------------------------
// MemoryReviewQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueInner {
    seq: i64,
    tickets: Vec<ReviewTicket>,
}

/// Review queue held behind one async mutex.
pub struct MemoryReviewQueue {
    base_url: String,
    inner: Mutex<QueueInner>,
}

impl MemoryReviewQueue {
    /// `base_url` prefixes ticket locators (`{base_url}/{ticket_id}`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            inner: Mutex::new(QueueInner::default()),
        }
    }
}

impl ReviewQueue for MemoryReviewQueue {
    async fn create(
        &self,
        thread_id: &str,
        context: &ReviewContext,
    ) -> Result<ReviewTicket, ReviewError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .tickets
            .iter()
            .find(|t| t.thread_id == thread_id && t.status == TicketStatus::Pending)
        {
            return Ok(existing.clone());
        }

        inner.seq += 1;
        let ticket_id = ticket_id_for(inner.seq);
        let ticket = ReviewTicket {
            context: ReviewContext {
                locator: format!("{}/{ticket_id}", self.base_url),
                ..context.clone()
            },
            ticket_id,
            thread_id: thread_id.to_string(),
            status: TicketStatus::Pending,
            decision: None,
            notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        inner.tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn resolve(
        &self,
        ticket_id: &str,
        decision: Decision,
        notes: Option<&str>,
    ) -> Result<ReviewTicket, ReviewError> {
        let mut inner = self.inner.lock().await;
        let ticket = inner
            .tickets
            .iter_mut()
            .find(|t| t.ticket_id == ticket_id)
            .ok_or_else(|| ReviewError::TicketNotFound(ticket_id.to_string()))?;
        if ticket.status == TicketStatus::Completed {
            return Err(ReviewError::AlreadyResolved(ticket_id.to_string()));
        }
        ticket.status = TicketStatus::Completed;
        ticket.decision = Some(decision);
        ticket.notes = notes.map(str::to_string);
        ticket.resolved_at = Some(Utc::now());
        Ok(ticket.clone())
    }

    async fn get(&self, ticket_id: &str) -> Result<Option<ReviewTicket>, ReviewError> {
        let inner = self.inner.lock().await;
        Ok(inner.tickets.iter().find(|t| t.ticket_id == ticket_id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<ReviewTicket>, ReviewError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Pending)
            .cloned()
            .collect())
    }

    async fn pending_for_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<ReviewTicket>, ReviewError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tickets
            .iter()
            .find(|t| t.thread_id == thread_id && t.status == TicketStatus::Pending)
            .cloned())
    }
}
