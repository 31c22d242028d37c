use std::time::Duration;

use diag_core::types::JobKind;

/// Errors surfaced by the debug console.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The server reported the job as failed.
    #[error("{job} failed: {message}")]
    JobFailed { job: JobKind, message: String },

    #[error("{job} did not finish within {waited:?}")]
    Timeout { job: JobKind, waited: Duration },

    #[error("Report checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Live log is already {0}")]
    AlreadyActive(&'static str),
}
