//! Error types for relief-sync

use thiserror::Error;

/// Broad failure classes, used to decide how a failure is surfaced.
///
/// Background sync treats everything as a silent no-op; foreground actions
/// show a message and, for routing, fall back to a direct path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any network call
    Validation,
    /// Timeout, connection refused, 5xx; retried by the next tick or answered with a fallback
    TransientNetwork,
    /// OTP mismatch or expired code; the session stays re-triable
    Authorization,
    /// Id-based mutation against a record the directory does not know
    NotFound,
    /// Local storage or decoding faults
    Internal,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Location is not available yet")]
    MissingLocation,

    #[error("Offline: {0}")]
    Offline(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::MissingLocation
            | CoreError::Offline(_)
            | CoreError::Rejected(_) => ErrorKind::Validation,
            CoreError::TransientNetwork(_) | CoreError::Timeout(_) => ErrorKind::TransientNetwork,
            CoreError::Authorization(_) => ErrorKind::Authorization,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::InvalidResponse(_)
            | CoreError::Storage(_)
            | CoreError::Json(_)
            | CoreError::Io(_) => ErrorKind::Internal,
        }
    }

    /// True when the next scheduled attempt may succeed without user action.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }

    /// Map a reqwest transport failure onto the taxonomy.
    pub fn from_transport(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            CoreError::Timeout(timeout_ms)
        } else if err.is_decode() {
            CoreError::InvalidResponse(err.to_string())
        } else {
            CoreError::TransientNetwork(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(CoreError::MissingLocation.kind(), ErrorKind::Validation);
        assert_eq!(CoreError::Timeout(5000).kind(), ErrorKind::TransientNetwork);
        assert_eq!(
            CoreError::Authorization("mismatch".into()).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(CoreError::NotFound("req 9".into()).kind(), ErrorKind::NotFound);
        assert!(CoreError::TransientNetwork("refused".into()).is_transient());
        assert!(!CoreError::Validation("qty".into()).is_transient());
    }
}
