//! SQLite checkpoint store implementation.
//!
//! Implements `CheckpointStore` from `ledgerflow-core`. Every checkpoint is a
//! row in `checkpoints`; the `threads` table mirrors each thread's latest
//! step so status listings and sequence checks need no aggregate scan. Both
//! are written in one transaction on the single-connection writer pool.

use std::str::FromStr;

use chrono::Utc;
use ledgerflow_core::repository::checkpoint::CheckpointStore;
use ledgerflow_types::checkpoint::{
    Checkpoint, ThreadStatus, ThreadSummary, merge_snapshot_fields,
};
use ledgerflow_types::error::{CheckpointError, RepositoryError};
use serde_json::Value;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

const LATEST_SQL: &str = r#"SELECT c.* FROM checkpoints c
    JOIN threads t ON t.thread_id = c.thread_id AND t.step = c.step
    WHERE c.thread_id = ?"#;

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct CheckpointRow {
    thread_id: String,
    step: i64,
    node: Option<String>,
    output: Option<String>,
    snapshot: String,
    next_node: String,
    status: String,
    error: Option<String>,
    created_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            thread_id: row.try_get("thread_id")?,
            step: row.try_get("step")?,
            node: row.try_get("node")?,
            output: row.try_get("output")?,
            snapshot: row.try_get("snapshot")?,
            next_node: row.try_get("next_node")?,
            status: row.try_get("status")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, RepositoryError> {
        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid output JSON: {e}")))
            })
            .transpose()?;
        let snapshot: Value = serde_json::from_str(&self.snapshot)
            .map_err(|e| RepositoryError::Query(format!("invalid snapshot JSON: {e}")))?;

        Ok(Checkpoint {
            thread_id: self.thread_id,
            step: self.step as u64,
            node: self.node,
            output,
            snapshot,
            next_node: self.next_node,
            status: parse_status(&self.status)?,
            error: self.error,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct ThreadRow {
    thread_id: String,
    status: String,
    step: i64,
    next_node: String,
    updated_at: String,
}

impl ThreadRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            thread_id: row.try_get("thread_id")?,
            status: row.try_get("status")?,
            step: row.try_get("step")?,
            next_node: row.try_get("next_node")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_summary(self) -> Result<ThreadSummary, RepositoryError> {
        Ok(ThreadSummary {
            thread_id: self.thread_id,
            status: parse_status(&self.status)?,
            step: self.step as u64,
            next_node: self.next_node,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_status(s: &str) -> Result<ThreadStatus, RepositoryError> {
    ThreadStatus::from_str(s).map_err(RepositoryError::Query)
}

fn to_json(value: &Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn append(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let output = checkpoint.output.as_ref().map(to_json).transpose()?;
        let snapshot = to_json(&checkpoint.snapshot)?;
        let created_at = format_datetime(&checkpoint.created_at);

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT step FROM threads WHERE thread_id = ?")
                .bind(&checkpoint.thread_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let expected = current.map(|step| step as u64 + 1).unwrap_or(0);
        if checkpoint.step != expected {
            return Err(CheckpointError::OutOfSequence {
                thread_id: checkpoint.thread_id.clone(),
                expected,
                actual: checkpoint.step,
            });
        }

        sqlx::query(
            r#"INSERT INTO threads (thread_id, status, step, next_node, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(thread_id) DO UPDATE SET
                 status = excluded.status,
                 step = excluded.step,
                 next_node = excluded.next_node,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.step as i64)
        .bind(&checkpoint.next_node)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO checkpoints
               (thread_id, step, node, output, snapshot, next_node, status, error, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.step as i64)
        .bind(&checkpoint.node)
        .bind(&output)
        .bind(&snapshot)
        .bind(&checkpoint.next_node)
        .bind(checkpoint.status.as_str())
        .bind(&checkpoint.error)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::debug!(
            thread_id = checkpoint.thread_id.as_str(),
            step = checkpoint.step,
            status = %checkpoint.status,
            "checkpoint persisted"
        );
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query(LATEST_SQL)
            .bind(thread_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn inject_pending_fields(
        &self,
        thread_id: &str,
        patch: &Value,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let row = sqlx::query(LATEST_SQL)
            .bind(thread_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        let mut latest = CheckpointRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_checkpoint()?;

        if latest.status != ThreadStatus::Paused {
            return Err(CheckpointError::InvalidState(format!(
                "thread '{thread_id}' is {}, not PAUSED",
                latest.status
            )));
        }

        merge_snapshot_fields(&mut latest.snapshot, patch);

        sqlx::query("UPDATE checkpoints SET snapshot = ? WHERE thread_id = ? AND step = ?")
            .bind(to_json(&latest.snapshot)?)
            .bind(thread_id)
            .bind(latest.step as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("UPDATE threads SET updated_at = ? WHERE thread_id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(latest)
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE thread_id = ? ORDER BY step ASC")
            .bind(thread_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut checkpoints = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = CheckpointRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            checkpoints.push(r.into_checkpoint()?);
        }
        Ok(checkpoints)
    }

    async fn list_threads(
        &self,
        status: Option<ThreadStatus>,
    ) -> Result<Vec<ThreadSummary>, CheckpointError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM threads WHERE status = ? ORDER BY updated_at DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM threads ORDER BY updated_at DESC")
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ThreadRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            summaries.push(r.into_summary()?);
        }
        Ok(summaries)
    }
}
