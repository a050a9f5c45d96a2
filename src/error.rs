//! Error taxonomy shared across the tutoring core
//!
//! Failures in optional enrichment paths (the model call, call logging) are
//! absorbed before they reach this type; failures in a primary requested
//! resource (user lookup, due-item fetch) surface directly.

use thiserror::Error;

/// Core error type for the tutoring and scheduling pipeline
#[derive(Debug, Error)]
pub enum CoachError {
    /// Malformed request: missing required field, empty text, bad quality value
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown user or review item
    #[error("not found: {0}")]
    NotFound(String),

    /// Log/mastery/schedule write or read failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Remote model failure (timeout, quota, transport). Recovered into stub
    /// behavior by the model client; kept for classification and logging.
    #[error("upstream model error: {0}")]
    UpstreamModel(String),
}

/// Convenience alias used throughout the core
pub type CoachResult<T> = Result<T, CoachError>;

impl From<rusqlite::Error> for CoachError {
    fn from(err: rusqlite::Error) -> Self {
        CoachError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for CoachError {
    fn from(err: serde_json::Error) -> Self {
        CoachError::Persistence(err.to_string())
    }
}

impl CoachError {
    /// Whether this failure may be retried against the remote model
    pub fn is_retryable(&self) -> bool {
        match self {
            CoachError::UpstreamModel(msg) => {
                let msg = msg.to_lowercase();
                // Auth and quota-exceeded failures do not recover by retrying
                !(msg.contains("401") || msg.contains("403") || msg.contains("invalid api key"))
            }
            _ => false,
        }
    }
}
