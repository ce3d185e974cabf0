//! Error types for gateway operations.

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors a gateway operation can fail with.
///
/// The taxonomy distinguishes transient failures (retry later, no data
/// loss) from rejections (retrying verbatim will not help), which is
/// what the sync processor's failure policy keys on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The remote store cannot be reached. Transient.
    #[error("remote unreachable: {message}")]
    Unreachable {
        /// Description of the failure.
        message: String,
    },

    /// The addressed document does not exist remotely.
    #[error("document not found: {id} in collection '{collection}'")]
    NotFound {
        /// Collection that was addressed.
        collection: String,
        /// Document id that was addressed.
        id: String,
    },

    /// The remote store rejected the request (validation, conflict).
    /// Not transient.
    #[error("remote rejected request: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },

    /// A request or response body could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Creates an `Unreachable` error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Creates a `Rejected` error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns true if retrying later can succeed without changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GatewayError::unreachable("offline").is_transient());
        assert!(!GatewayError::rejected("invalid payload").is_transient());
        assert!(!GatewayError::NotFound {
            collection: "groceries".into(),
            id: "abc".into(),
        }
        .is_transient());
        assert!(!GatewayError::Protocol("bad json".into()).is_transient());
    }
}
