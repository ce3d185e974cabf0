//! Error types for the sync engine.

use satchel_gateway::GatewayError;
use satchel_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors the engine surfaces to callers.
///
/// Sync failures inside the drain are deliberately *not* errors of the
/// write path: writes succeed locally and immediately, and delivery
/// failures show up in the drain report and [`crate::SyncStatus`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The remote store cannot be reached. Transient; queued intents
    /// are retried on the next trigger with no data loss.
    #[error("network unavailable: {message}")]
    NetworkUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The remote store rejected the request. Retrying verbatim will
    /// not help.
    #[error("remote rejected: {message}")]
    RemoteRejected {
        /// Description of the rejection.
        message: String,
    },

    /// A draft addressed a record that no longer exists locally.
    #[error("record {identity} not found in collection '{collection}'")]
    RecordNotFound {
        /// Collection that was addressed.
        collection: String,
        /// Identity that was addressed.
        identity: String,
    },

    /// Local state could not be persisted or loaded.
    #[error("local state error: {0}")]
    State(#[from] StoreError),
}

impl From<GatewayError> for EngineError {
    fn from(error: GatewayError) -> Self {
        if error.is_transient() {
            EngineError::NetworkUnavailable {
                message: error.to_string(),
            }
        } else {
            EngineError::RemoteRejected {
                message: error.to_string(),
            }
        }
    }
}
