use thiserror::Error;

use crate::connection::DisconnectReason;

/// Why a wait for connection readiness did not succeed
///
/// Cheap to clone so a single outcome can be handed to every caller awaiting
/// the same handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The connection did not reach `Ready` within the configured timeout
    #[error("connection timed out")]
    Timeout,

    /// The connection was destroyed while waiting
    #[error("connection destroyed")]
    Destroyed,

    /// The connection was disconnected for a reason that is not retried
    #[error("{0}")]
    Disconnected(DisconnectReason),

    /// The networking layer reported an error
    #[error("networking error: {0}")]
    Networking(String),
}

/// Errors that can occur while resolving, playing or transporting audio
#[derive(Debug, Error)]
pub enum CastError {
    // ===== Resolution Errors =====
    /// Transport, DNS or timeout failure while fetching stream data
    #[error("network error: {message}")]
    Network {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A collaborator violated its contract
    #[error("internal error: {message}")]
    Internal {
        /// Description of the error
        message: String,
    },

    /// A response could not be parsed
    #[error("invalid response: {message}")]
    Parse {
        /// Description of the error
        message: String,
    },

    /// The requested resource does not exist
    #[error("not found: {message}")]
    NotFound {
        /// Description of the error
        message: String,
    },

    /// No usable stream exists for the track
    #[error("track is unplayable: {message}")]
    Unplayable {
        /// Description of the error
        message: String,
    },

    // ===== Player Errors =====
    /// Operation not valid in the current configuration
    #[error("unsupported: {message}")]
    Unsupported {
        /// Description of the error
        message: String,
    },

    /// A control call was made with no decode engine attached
    #[error("not playing")]
    NotPlaying,

    /// The player task has shut down
    #[error("player closed")]
    PlayerClosed,

    /// Error reported by the decode engine
    #[error("decode error ({code}): {message}")]
    Decode {
        /// Engine-specific error code
        code: i32,
        /// Description of the error
        message: String,
        /// Whether the engine considers the error retryable
        retryable: bool,
    },

    // ===== Connection Errors =====
    /// Waiting for the connection failed
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectError),

    /// The target channel is at capacity
    #[error("channel is full")]
    ChannelFull,

    /// Missing permission to join the target channel
    #[error("no permissions")]
    NoPermissions,

    /// Rejoin target belongs to another group
    #[error("cannot move connection to another group")]
    DifferentGroup,

    // ===== Transport Errors =====
    /// Encryption or decryption failed
    #[error("crypto error: {0}")]
    Crypto(#[from] crate::protocol::crypto::CryptoError),

    /// Frame does not fit in a datagram
    #[error("frame of {size} bytes exceeds datagram capacity ({max} bytes)")]
    FrameTooLarge {
        /// Frame size in bytes
        size: usize,
        /// Maximum payload for the current mode
        max: usize,
    },

    /// Received datagram is malformed
    #[error("malformed datagram: {0}")]
    Packet(#[from] crate::protocol::rtp::RtpDecodeError),
}

impl CastError {
    /// Build a network error from any source error
    pub fn network(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an unplayable error
    pub fn unplayable(message: impl Into<String>) -> Self {
        Self::Unplayable {
            message: message.into(),
        }
    }

    /// Build an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Numeric code matching the resolution error taxonomy, if any
    #[must_use]
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::Network { .. } => Some(1),
            Self::Parse { .. } => Some(2),
            Self::Internal { .. } => Some(3),
            Self::NotFound { .. } => Some(4),
            Self::Unplayable { .. } => Some(5),
            _ => None,
        }
    }

    /// Check if this error is recoverable by retrying
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Connection(ConnectError::Timeout) => true,
            Self::Decode { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Check if this error indicates connection loss
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Connection(ConnectError::Destroyed | ConnectError::Disconnected(_))
        )
    }
}

/// Result type alias for trackcast operations
pub type Result<T> = std::result::Result<T, CastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CastError::unplayable("no audio streams");
        assert_eq!(err.to_string(), "track is unplayable: no audio streams");
        assert_eq!(CastError::NotPlaying.to_string(), "not playing");
    }

    #[test]
    fn test_error_codes() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert_eq!(CastError::network("fetch failed", io).code(), Some(1));
        assert_eq!(CastError::internal("x").code(), Some(3));
        assert_eq!(CastError::unplayable("x").code(), Some(5));
        assert_eq!(CastError::NotPlaying.code(), None);
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(CastError::Connection(ConnectError::Timeout).is_retryable());
        assert!(
            CastError::Decode {
                code: 7,
                message: "read error".to_string(),
                retryable: true,
            }
            .is_retryable()
        );
        assert!(!CastError::NotPlaying.is_retryable());
    }

    #[test]
    fn test_error_is_connection_lost() {
        let err = CastError::Connection(ConnectError::Disconnected(DisconnectReason::EndpointRemoved));
        assert!(err.is_connection_lost());
        assert!(!CastError::Connection(ConnectError::Timeout).is_connection_lost());
    }

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::Disconnected(DisconnectReason::AdapterUnavailable);
        assert_eq!(err.to_string(), "Adapter unavailable");
        assert_eq!(ConnectError::Timeout.to_string(), "connection timed out");
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CastError>();
    }
}
