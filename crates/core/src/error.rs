/// Domain-level error taxonomy shared by the diagnostics crates.
///
/// `NotReadyYet` is not a failure: it marks the transient "job still
/// running" poll state so callers can map it to a re-poll.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Result not ready yet")]
    NotReadyYet,

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Port {port} is already in use: {reason}")]
    PortInUse { port: u16, reason: String },

    #[error("Unknown logging category: {0}")]
    UnknownCategory(String),

    #[error("Invalid logging level: {0}")]
    InvalidLevel(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}
