//! SQLite review queue implementation.
//!
//! Ticket ids are `T-<seq>` where `seq` is the table's autoincrement column,
//! so numbering survives restarts. A partial unique index keeps at most one
//! PENDING ticket per thread.

use std::str::FromStr;

use chrono::Utc;
use ledgerflow_core::repository::review::ReviewQueue;
use ledgerflow_types::error::{RepositoryError, ReviewError};
use ledgerflow_types::review::{
    Decision, ReviewContext, ReviewTicket, TicketStatus, ticket_id_for,
};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of `ReviewQueue`.
pub struct SqliteReviewQueue {
    pool: DatabasePool,
    base_url: String,
}

impl SqliteReviewQueue {
    /// `base_url` prefixes ticket locators (`{base_url}/{ticket_id}`).
    pub fn new(pool: DatabasePool, base_url: impl Into<String>) -> Self {
        Self {
            pool,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

struct TicketRow {
    ticket_id: String,
    thread_id: String,
    business_id: String,
    counterparty: String,
    amount: f64,
    reason: String,
    locator: String,
    status: String,
    decision: Option<String>,
    notes: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl TicketRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            ticket_id: row.try_get("ticket_id")?,
            thread_id: row.try_get("thread_id")?,
            business_id: row.try_get("business_id")?,
            counterparty: row.try_get("counterparty")?,
            amount: row.try_get("amount")?,
            reason: row.try_get("reason")?,
            locator: row.try_get("locator")?,
            status: row.try_get("status")?,
            decision: row.try_get("decision")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }

    fn into_ticket(self) -> Result<ReviewTicket, RepositoryError> {
        let decision = self
            .decision
            .as_deref()
            .map(Decision::from_str)
            .transpose()
            .map_err(RepositoryError::Query)?;
        let resolved_at = self.resolved_at.as_deref().map(parse_datetime).transpose()?;

        Ok(ReviewTicket {
            ticket_id: self.ticket_id,
            thread_id: self.thread_id,
            context: ReviewContext {
                business_id: self.business_id,
                counterparty: self.counterparty,
                amount: self.amount,
                reason: self.reason,
                locator: self.locator,
            },
            status: TicketStatus::from_str(&self.status).map_err(RepositoryError::Query)?,
            decision,
            notes: self.notes,
            created_at: parse_datetime(&self.created_at)?,
            resolved_at,
        })
    }
}

fn map_ticket(row: Option<sqlx::sqlite::SqliteRow>) -> Result<Option<ReviewTicket>, ReviewError> {
    match row {
        Some(row) => {
            let r = TicketRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            Ok(Some(r.into_ticket()?))
        }
        None => Ok(None),
    }
}

impl ReviewQueue for SqliteReviewQueue {
    async fn create(
        &self,
        thread_id: &str,
        context: &ReviewContext,
    ) -> Result<ReviewTicket, ReviewError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let existing = sqlx::query(
            "SELECT * FROM review_tickets WHERE thread_id = ? AND status = 'PENDING'",
        )
        .bind(thread_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        if let Some(ticket) = map_ticket(existing)? {
            return Ok(ticket);
        }

        let seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM review_tickets")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let ticket_id = ticket_id_for(seq);
        let locator = format!("{}/{ticket_id}", self.base_url);
        let created_at = Utc::now();

        sqlx::query(
            r#"INSERT INTO review_tickets
               (seq, ticket_id, thread_id, business_id, counterparty, amount, reason, locator,
                status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)"#,
        )
        .bind(seq)
        .bind(&ticket_id)
        .bind(thread_id)
        .bind(&context.business_id)
        .bind(&context.counterparty)
        .bind(context.amount)
        .bind(&context.reason)
        .bind(&locator)
        .bind(format_datetime(&created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::info!(ticket_id = %ticket_id, thread_id, "review ticket created");

        Ok(ReviewTicket {
            ticket_id,
            thread_id: thread_id.to_string(),
            context: ReviewContext {
                locator,
                ..context.clone()
            },
            status: TicketStatus::Pending,
            decision: None,
            notes: None,
            created_at,
            resolved_at: None,
        })
    }

    async fn resolve(
        &self,
        ticket_id: &str,
        decision: Decision,
        notes: Option<&str>,
    ) -> Result<ReviewTicket, ReviewError> {
        let resolved_at = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"UPDATE review_tickets
               SET status = 'COMPLETED', decision = ?, notes = ?, resolved_at = ?
               WHERE ticket_id = ? AND status = 'PENDING'"#,
        )
        .bind(decision.as_str())
        .bind(notes)
        .bind(&resolved_at)
        .bind(ticket_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return match self.get(ticket_id).await? {
                Some(_) => Err(ReviewError::AlreadyResolved(ticket_id.to_string())),
                None => Err(ReviewError::TicketNotFound(ticket_id.to_string())),
            };
        }

        let row = sqlx::query("SELECT * FROM review_tickets WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        map_ticket(row)?.ok_or_else(|| ReviewError::TicketNotFound(ticket_id.to_string()))
    }

    async fn get(&self, ticket_id: &str) -> Result<Option<ReviewTicket>, ReviewError> {
        let row = sqlx::query("SELECT * FROM review_tickets WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        map_ticket(row)
    }

    async fn list_pending(&self) -> Result<Vec<ReviewTicket>, ReviewError> {
        let rows =
            sqlx::query("SELECT * FROM review_tickets WHERE status = 'PENDING' ORDER BY seq ASC")
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = TicketRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            tickets.push(r.into_ticket()?);
        }
        Ok(tickets)
    }

    async fn pending_for_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<ReviewTicket>, ReviewError> {
        let row = sqlx::query(
            "SELECT * FROM review_tickets WHERE thread_id = ? AND status = 'PENDING'",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        map_ticket(row)
    }
}
