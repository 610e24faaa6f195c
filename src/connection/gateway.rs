//! Boundary to the group gateway and voice transport
//!
//! The crate does not speak the voice websocket or UDP protocols itself. A
//! [`GatewayConnector`] opens one [`VoiceGateway`] per group and hands back the
//! stream of [`GatewayEvent`]s that drives the connection state machine.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::session::SessionDescription;
use super::state::DisconnectReason;
use crate::error::{CastError, Result};
use crate::types::ConnectionConfig;

/// Identifier of a group (guild)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

/// Identifier of a voice channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voice channel to join, with the caller's view of whether joining is allowed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    /// Group owning the channel
    pub group_id: GroupId,
    /// Channel to join
    pub channel_id: ChannelId,
    /// Whether we may join
    pub joinable: bool,
    /// Whether the channel is at its user limit
    pub full: bool,
}

impl ChannelTarget {
    /// Joinable target
    #[must_use]
    pub fn new(group_id: GroupId, channel_id: ChannelId) -> Self {
        Self {
            group_id,
            channel_id,
            joinable: true,
            full: false,
        }
    }

    /// Builder method to set joinability
    #[must_use]
    pub fn with_access(mut self, joinable: bool, full: bool) -> Self {
        self.joinable = joinable;
        self.full = full;
        self
    }

    /// Fail unless the channel can be joined
    ///
    /// # Errors
    ///
    /// `ChannelFull` if not joinable because of the user limit, otherwise
    /// `NoPermissions`.
    pub fn check_joinable(&self) -> Result<()> {
        if self.joinable {
            Ok(())
        } else if self.full {
            Err(CastError::ChannelFull)
        } else {
            Err(CastError::NoPermissions)
        }
    }
}

/// Events reported by the gateway for one group
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Waiting for voice server details
    Signalling,
    /// Handshaking with the voice server
    Connecting,
    /// Transport established
    Ready(SessionDescription),
    /// Transport lost
    Disconnected(DisconnectReason),
    /// Our voice state changed; `None` means we were removed from the channel
    ChannelUpdate {
        /// Channel we are now in
        channel_id: Option<ChannelId>,
    },
    /// The networking layer failed
    NetworkingError(String),
}

/// Outbound side of a voice connection
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Request to join (or move to) `target`
    async fn join(&self, target: &ChannelTarget, config: &ConnectionConfig) -> Result<()>;

    /// Leave the channel in an orderly way
    async fn leave(&self) -> Result<()>;

    /// Announce whether we want to receive audio
    async fn set_receive(&self, receive: bool) -> Result<()>;

    /// Update the speaking indicator
    async fn set_speaking(&self, speaking: bool) -> Result<()>;

    /// Send one encrypted datagram
    async fn send(&self, datagram: &[u8]) -> Result<()>;
}

/// A gateway together with its event stream
pub struct GatewayLink {
    /// Outbound operations
    pub gateway: Arc<dyn VoiceGateway>,
    /// Inbound events, in order
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
}

/// Opens gateways for groups
pub trait GatewayConnector: Send + Sync {
    /// Open the gateway for `group`
    fn open(&self, group: GroupId) -> GatewayLink;
}
