//! Error types for the crosscheck core library.

/// Top-level error enum for the crosscheck core library.
#[derive(Debug, thiserror::Error)]
pub enum ConsistencyError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validator {validator} failed: {message}")]
    Validator { validator: String, message: String },

    #[error("Fix error: {0}")]
    Fix(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConsistencyError {
    /// Shorthand for a validator failure.
    pub fn validator(validator: &str, message: impl Into<String>) -> Self {
        ConsistencyError::Validator {
            validator: validator.to_string(),
            message: message.into(),
        }
    }
}

pub type ConsistencyResult<T> = Result<T, ConsistencyError>;
