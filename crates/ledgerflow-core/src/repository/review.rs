//! Review ticket queue trait definition.

use ledgerflow_types::error::ReviewError;
use ledgerflow_types::review::{Decision, ReviewContext, ReviewTicket};

/// Correlates business-facing review tickets with paused threads.
pub trait ReviewQueue: Send + Sync {
    /// Register a ticket for a paused thread.
    ///
    /// Idempotent per thread: if a PENDING ticket already exists for
    /// `thread_id` it is returned unchanged. The queue fills in
    /// `context.locator`.
    fn create(
        &self,
        thread_id: &str,
        context: &ReviewContext,
    ) -> impl std::future::Future<Output = Result<ReviewTicket, ReviewError>> + Send;

    /// Mark a ticket COMPLETED with the reviewer's decision.
    ///
    /// Fails with `TicketNotFound` or `AlreadyResolved`; a ticket resolves at
    /// most once.
    fn resolve(
        &self,
        ticket_id: &str,
        decision: Decision,
        notes: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ReviewTicket, ReviewError>> + Send;

    fn get(
        &self,
        ticket_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ReviewTicket>, ReviewError>> + Send;

    /// PENDING tickets, oldest first.
    fn list_pending(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ReviewTicket>, ReviewError>> + Send;

    fn pending_for_thread(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ReviewTicket>, ReviewError>> + Send;
}
