//! Error types used across bindwatch.

use thiserror::Error;

/// Result type for bindwatch operations.
pub type ForwarderResult<T> = Result<T, ForwarderError>;

#[derive(Debug, Error)]
pub enum ForwarderError {
    /// The container runtime refused access. Terminates the service.
    #[error("access to container runtime denied: {0}")]
    Unauthorized(String),

    /// The container runtime could not be reached or the connection dropped.
    #[error("container runtime connection error: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("filesystem watch error: {0}")]
    Watch(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ForwarderError {
    /// Authorization failures stop the reconnect loop.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ForwarderError::Unauthorized(_))
    }
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for ForwarderError {
    fn from(err: std::io::Error) -> Self {
        ForwarderError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for ForwarderError {
    fn from(err: serde_json::Error) -> Self {
        ForwarderError::Config(format!("JSON error: {}", err))
    }
}

impl From<String> for ForwarderError {
    fn from(err: String) -> Self {
        ForwarderError::Internal(err)
    }
}

impl From<&str> for ForwarderError {
    fn from(err: &str) -> Self {
        ForwarderError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_is_classified() {
        let err = ForwarderError::Unauthorized("permission denied".into());
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_connection_is_not_unauthorized() {
        let err = ForwarderError::Connection("connection refused".into());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_io_error_converts_to_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: ForwarderError = io.into();
        assert!(matches!(err, ForwarderError::Internal(_)));
        assert!(err.to_string().contains("boom"));
    }
}
