//! Connection state management

use std::fmt;
use std::time::Instant;

/// Voice connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Asking the group gateway for a voice server
    Signalling,
    /// Voice server known, transport handshake in progress
    Connecting,
    /// Transport established, packets can be sent
    Ready,
    /// Transport lost
    Disconnected(DisconnectReason),
    /// Terminal; the connection cannot be reused
    Destroyed,
}

impl ConnectionState {
    /// Check if packets can be sent
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if the connection is terminal
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Short name of the state
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Signalling => "signalling",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Disconnected(_) => "disconnected",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The group gateway adapter went away
    AdapterUnavailable,
    /// The voice endpoint was removed
    EndpointRemoved,
    /// The voice websocket closed
    WebSocketClose {
        /// Close code reported by the socket
        code: u16,
    },
    /// Disconnect requested locally
    Manual,
}

impl DisconnectReason {
    /// Close codes after which rejoining is pointless (kicked or auth failure)
    const FATAL_CLOSE_CODES: [u16; 2] = [4004, 4014];

    /// Whether the connection should wait for the transport to come back
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::WebSocketClose { code } => !Self::FATAL_CLOSE_CODES.contains(code),
            _ => false,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdapterUnavailable => f.write_str("Adapter unavailable"),
            Self::EndpointRemoved => f.write_str("Endpoint removed"),
            Self::WebSocketClose { .. } => f.write_str("WebSocket closed"),
            Self::Manual => f.write_str("Manual disconnect"),
        }
    }
}

/// Connection events
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// State changed
    StateChanged {
        /// The previous state
        old: ConnectionState,
        /// The new state
        new: ConnectionState,
    },
    /// A failure occurred with nobody waiting on the connection
    Error {
        /// The failure
        error: crate::error::ConnectError,
    },
}

/// Connection statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Time the connection last became ready
    pub connected_at: Option<Instant>,
    /// Number of datagrams sent
    pub packets_sent: u64,
    /// Number of bytes sent
    pub bytes_sent: u64,
    /// Number of times the transport came back after a disconnect
    pub reconnects: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    /// Get connection uptime
    #[must_use]
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.connected_at.map(|t| t.elapsed())
    }

    /// Record a sent datagram
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }
}
