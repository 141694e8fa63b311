//! Review queue handlers: list pending tickets and accept decisions.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use ledgerflow_core::service::DecisionAck;
use ledgerflow_types::review::{Decision, ReviewTicket};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Body of `POST /reviews/{ticket_id}/decision`.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// `ACCEPT` or `REJECT`, case-insensitive.
    pub decision: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// GET /api/v1/reviews/pending - Pending review tickets, oldest first.
pub async fn list_pending(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ReviewTicket>>>, AppError> {
    let timer = RequestTimer::start();
    let tickets = state.workflow_service.list_pending_reviews().await?;

    Ok(Json(timer.finish(tickets).with_link("self", "/api/v1/reviews/pending")))
}

/// POST /api/v1/reviews/{ticket_id}/decision - Record a reviewer decision and
/// resume the paused thread in the background.
pub async fn submit_decision(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DecisionAck>>), AppError> {
    let timer = RequestTimer::start();
    let decision = Decision::from_str(&body.decision).map_err(AppError::Validation)?;

    let ack = state
        .workflow_service
        .submit_decision(&ticket_id, decision, body.notes.as_deref())
        .await?;

    let thread_link = format!("/api/v1/threads/{}", ack.thread_id);
    let resp = timer.finish(ack).with_link("thread", &thread_link);

    Ok((StatusCode::ACCEPTED, Json(resp)))
}
