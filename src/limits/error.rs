//! Error types for limit operations

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while reading or changing channel limits
#[derive(Debug, Error)]
pub enum LimitError {
    /// The durable settings store failed
    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for limit operations
pub type LimitResult<T> = Result<T, LimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error = LimitError::from(StoreError::from(io));
        assert_eq!(
            error.to_string(),
            "Settings store error: Settings file I/O failed: read-only"
        );
    }
}
