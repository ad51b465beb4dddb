//! Error types shared across the broker core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid tool id: {0}")]
    ToolId(#[from] broker_common::ToolIdParseError),

    #[error("Tool '{0}' not in allowlist. Add '{0}' to allowedTools array.")]
    NotAllowlisted(String),

    #[error("upstream server '{0}' is not configured")]
    UnknownServer(String),

    #[error("Circuit breaker is open for server '{server}'. Retry after {retry_after_secs}s")]
    CircuitOpen {
        server: String,
        retry_after_secs: u64,
    },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("content filter violation: {0} secrets detected")]
    ContentFilterViolation(usize),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
