use thiserror::Error;

/// Common error types used across the workspace.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error is caused by bad input data rather than the environment.
    ///
    /// The monitor uses this to decide between skipping a record and retrying a read.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            AppError::Json(_) | AppError::Validation(_) | AppError::NotFound(_)
        )
    }
}
