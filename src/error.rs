//! Error types for the rate window limiter.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum RateWindowError {
    /// The limiter or its configuration could not be assembled
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A call was made with an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The shared store rejected or failed the transaction
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateWindowError {
    /// Whether this error came from the shared store rather than from the caller.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, RateWindowError::Store(_))
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, RateWindowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_store_error_is_transparent() {
        let err: RateWindowError = StoreError::Command("WRONGTYPE bad key".to_string()).into();

        assert!(err.is_store_failure());
        assert_eq!(err.to_string(), "Store command failed: WRONGTYPE bad key");
    }

    #[test]
    fn test_caller_errors_are_not_store_failures() {
        let err = RateWindowError::InvalidArgument("identifier is required".to_string());
        assert!(!err.is_store_failure());
        assert!(err.source().is_none());
    }
}
