//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use ledgerflow_core::service::ServiceError;
use ledgerflow_core::workflow::ExecutorError;
use ledgerflow_types::error::{CheckpointError, ReviewError, ValidationError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Service(ServiceError),
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        AppError::Service(e)
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Service(e) => {
                let (status, code) = match e {
                    ServiceError::ThreadNotFound(_)
                    | ServiceError::Executor(ExecutorError::ThreadNotFound(_))
                    | ServiceError::Checkpoint(CheckpointError::NotFound(_)) => {
                        (StatusCode::NOT_FOUND, "THREAD_NOT_FOUND")
                    }
                    ServiceError::Review(ReviewError::TicketNotFound(_)) => {
                        (StatusCode::NOT_FOUND, "TICKET_NOT_FOUND")
                    }
                    ServiceError::Review(ReviewError::AlreadyResolved(_)) => {
                        (StatusCode::CONFLICT, "TICKET_ALREADY_RESOLVED")
                    }
                    ServiceError::NotPaused { .. }
                    | ServiceError::Checkpoint(CheckpointError::InvalidState(_)) => {
                        (StatusCode::CONFLICT, "THREAD_NOT_PAUSED")
                    }
                    ServiceError::Executor(ExecutorError::ThreadExists(_)) => {
                        (StatusCode::CONFLICT, "THREAD_EXISTS")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "WORKFLOW_ERROR"),
                };
                (status, code, e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, "{message}");
        }

        let body = ApiResponse::error(code, &message, Uuid::now_v7().to_string(), 0);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_types::checkpoint::ThreadStatus;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_not_found_variants() {
        assert_eq!(
            status_of(ServiceError::ThreadNotFound("t1".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Review(ReviewError::TicketNotFound("T-1".into())).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_variants() {
        assert_eq!(
            status_of(ServiceError::Review(ReviewError::AlreadyResolved("T-1".into())).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                ServiceError::NotPaused {
                    thread_id: "t1".into(),
                    status: ThreadStatus::Completed,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_and_storage() {
        assert_eq!(
            status_of(ValidationError::new("amount", "must be non-negative").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::Checkpoint(CheckpointError::Storage("disk".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
