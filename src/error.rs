//! Error types for the grid-duel engine.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur at the transport and serving layer.
#[derive(Debug, Error)]
pub enum GridDuelError {
    /// Failed to send an event to a connection.
    #[error("delivery send error: {0}")]
    DeliverySend(String),

    /// Failed to receive a message from a connection.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection handshake did not carry a usable identity.
    #[error("handshake missing identity: {0}")]
    HandshakeRejected(String),

    /// Failed to serialize or deserialize a protocol event.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for grid-duel operations.
pub type Result<T> = std::result::Result<T, GridDuelError>;

/// A rejected client operation.
///
/// Rejections are protocol-level outcomes, not transport failures: the router
/// turns them into an `error` event sent back to the offending connection and
/// leaves all room state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Machine-readable code, serialized on the wire.
    pub code: ErrorCode,
    /// Human-readable reason, taken from the code's description.
    pub reason: &'static str,
}

impl Rejection {
    /// Build a rejection from an error code, using its canonical description.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            reason: code.description(),
        }
    }
}

impl From<ErrorCode> for Rejection {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.reason)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn rejection_carries_canonical_description() {
        let rejection = Rejection::new(ErrorCode::RoomFull);
        assert_eq!(rejection.code, ErrorCode::RoomFull);
        assert_eq!(rejection.reason, ErrorCode::RoomFull.description());
    }

    #[test]
    fn rejection_from_code() {
        let rejection: Rejection = ErrorCode::NotYourTurn.into();
        assert_eq!(rejection.code, ErrorCode::NotYourTurn);
    }

    #[test]
    fn serialization_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: GridDuelError = bad.unwrap_err().into();
        assert!(matches!(err, GridDuelError::Serialization(_)));
    }
}
