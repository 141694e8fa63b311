//! Thread inspection handlers.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use ledgerflow_types::checkpoint::{AuditTrail, Checkpoint, ThreadStatus, ThreadSummary};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Query parameters for listing threads.
#[derive(Debug, Deserialize, Default)]
pub struct ThreadListQuery {
    /// Filter by status (running, paused, completed, failed).
    pub status: Option<String>,
}

/// GET /api/v1/threads - Latest state of every thread, newest first.
pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ThreadListQuery>,
) -> Result<Json<ApiResponse<Vec<ThreadSummary>>>, AppError> {
    let timer = RequestTimer::start();
    let status = query
        .status
        .as_deref()
        .map(ThreadStatus::from_str)
        .transpose()
        .map_err(AppError::Validation)?;

    let threads = state.workflow_service.list_threads(status).await?;
    Ok(Json(timer.finish(threads).with_link("self", "/api/v1/threads")))
}

/// GET /api/v1/threads/{thread_id} - Latest checkpoint of a thread.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ApiResponse<Checkpoint>>, AppError> {
    let timer = RequestTimer::start();
    let latest = state.workflow_service.thread(&thread_id).await?;

    let resp = timer
        .finish(latest)
        .with_link("self", &format!("/api/v1/threads/{thread_id}"))
        .with_link("audit", &format!("/api/v1/threads/{thread_id}/audit"));
    Ok(Json(resp))
}

/// GET /api/v1/threads/{thread_id}/audit - Every committed step, in order.
pub async fn get_audit(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ApiResponse<AuditTrail>>, AppError> {
    let timer = RequestTimer::start();
    let trail = state.workflow_service.audit_trail(&thread_id).await?;

    let resp = timer
        .finish(trail)
        .with_link("thread", &format!("/api/v1/threads/{thread_id}"));
    Ok(Json(resp))
}
