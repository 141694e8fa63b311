use thiserror::Error;

/// Errors from checkpoint store operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("thread '{0}' not found")]
    NotFound(String),

    #[error("out-of-sequence step for thread '{thread_id}': expected {expected}, got {actual}")]
    OutOfSequence {
        thread_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid thread state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from review queue operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("ticket '{0}' not found")]
    TicketNotFound(String),

    #[error("ticket '{0}' already resolved")]
    AlreadyResolved(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from repository operations shared by the storage adapters.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for CheckpointError {
    fn from(err: RepositoryError) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}

impl From<RepositoryError> for ReviewError {
    fn from(err: RepositoryError) -> Self {
        ReviewError::Storage(err.to_string())
    }
}

/// A submitted payload failed validation before a thread was created.
#[derive(Debug, Error)]
#[error("validation failed: {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
