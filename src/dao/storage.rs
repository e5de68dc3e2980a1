use std::error::Error;
use thiserror::Error;

/// Result alias for room store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by room store backends regardless of the underlying engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request at all.
    #[error("room store unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
