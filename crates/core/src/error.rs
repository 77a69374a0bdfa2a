/// Errors raised by local, pre-network checks.
///
/// These never involve I/O; a `CoreError` always means the caller's
/// input was rejected before anything left the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
