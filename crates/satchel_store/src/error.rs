//! Error types for local state.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while persisting or loading local state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be encoded.
    #[error("state encoding failed: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// Persisted state could not be decoded.
    #[error("state decoding failed: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// Another process holds the namespace lock.
    #[error("namespace locked: another process has exclusive access")]
    NamespaceLocked,

    /// Persisted state was written by a newer schema.
    #[error("state schema version {found} is newer than supported version {supported}")]
    VersionAhead {
        /// Version found on disk.
        found: u32,
        /// Newest version this build supports.
        supported: u32,
    },
}
