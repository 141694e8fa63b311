//! Invoice submission handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use ledgerflow_types::invoice::{InvoiceState, InvoiceSubmission};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Acknowledgement for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmissionAck {
    pub thread_id: String,
    pub invoice_id: String,
    pub status: &'static str,
}

/// POST /api/v1/invoices - Validate an invoice and start a workflow thread.
///
/// Returns 202 once the seed checkpoint is durable; the thread runs in the
/// background.
pub async fn submit_invoice(
    State(state): State<AppState>,
    Json(body): Json<InvoiceSubmission>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionAck>>), AppError> {
    let timer = RequestTimer::start();
    body.validate()?;

    let invoice_id = body.invoice_id.clone();
    let thread_id = state
        .workflow_service
        .submit(InvoiceState::from_submission(body))
        .await?;

    tracing::info!(thread_id = thread_id.as_str(), invoice_id = invoice_id.as_str(), "invoice accepted");

    let resp = timer
        .finish(SubmissionAck {
            thread_id: thread_id.clone(),
            invoice_id,
            status: "ACCEPTED",
        })
        .with_link("thread", &format!("/api/v1/threads/{thread_id}"))
        .with_link("audit", &format!("/api/v1/threads/{thread_id}/audit"));

    Ok((StatusCode::ACCEPTED, Json(resp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_core::repository::checkpoint::CheckpointStore;

    fn submission(amount: f64) -> InvoiceSubmission {
        InvoiceSubmission {
            invoice_id: "INV-7".to_string(),
            vendor_name: "Acme Corp".to_string(),
            amount,
            currency: "USD".to_string(),
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_payload() {
        let state = AppState::for_tests().await;
        let result = submit_invoice(State(state.clone()), Json(submission(-5.0))).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let threads = state.workflow_service.list_threads(None).await.unwrap();
        assert!(threads.is_empty());
    }

    #[tokio::test]
    async fn test_submit_returns_accepted_with_durable_thread() {
        let state = AppState::for_tests().await;
        let (status, Json(resp)) = submit_invoice(State(state.clone()), Json(submission(250.0)))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        let ack = resp.data.unwrap();
        assert_eq!(ack.invoice_id, "INV-7");

        let seed = state
            .workflow_service
            .executor()
            .store()
            .history(&ack.thread_id)
            .await
            .unwrap();
        assert_eq!(seed[0].step, 0);
        assert_eq!(seed[0].snapshot["invoice"]["invoice_id"], "INV-7");
    }
}
