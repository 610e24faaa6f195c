//! # trackcast
//!
//! Playback of platform tracks into voice channels.
//!
//! ## Features
//!
//! - Deterministic stream selection (Opus first, then highest bitrate)
//! - Decode engine control with stale-result protection and bounded retries
//! - RTP voice packets encrypted with XSalsa20-Poly1305 in all three modes
//! - Keepalive silence bursts after audio stops
//! - Voice connection state machine with a single readiness wait
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use trackcast::connection::{ChannelId, ChannelTarget, ConnectionRegistry, GatewayConnector, GroupId};
//! use trackcast::playback::{EngineFactory, TrackPlayer};
//! use trackcast::{ConnectionConfig, PlayerConfig, Track};
//!
//! # async fn example(
//! #     connector: Arc<dyn GatewayConnector>,
//! #     engines: Arc<dyn EngineFactory>,
//! # ) -> Result<(), trackcast::CastError> {
//! let registry = ConnectionRegistry::new(connector, ConnectionConfig::default());
//! let connection = registry
//!     .connect(ChannelTarget::new(GroupId(1), ChannelId(2)))
//!     .await?;
//!
//! let player = TrackPlayer::new(engines, PlayerConfig::default());
//! player.subscribe(&connection).await?;
//! player.play(Arc::new(Track::file("/music/song.ogg")))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Playback**: `TrackPlayer` owns the decode engine and fans frames out
//!   to its subscriptions
//! - **Transport**: `PacketTransport` turns a frame into one encrypted datagram
//! - **Connection**: `VoiceConnection` tracks readiness and owns the session
//!   counters; `ConnectionRegistry` keeps one per group
//! - **Boundaries**: the gateway, decode engine and platform resolvers are
//!   traits supplied by the caller

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Event distribution
pub mod events;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod connection;
pub mod playback;
pub mod protocol;
pub mod source;
pub mod transport;

// Re-exports
pub use connection::{
    ConnectionEvent, ConnectionRegistry, ConnectionState, DisconnectReason, VoiceConnection,
};
pub use error::{CastError, ConnectError, Result};
pub use playback::{PlayerEvent, PlayerState, SubscriptionHandle, TrackPlayer, get_best_stream};
pub use transport::PacketTransport;
pub use types::{
    ConnectionConfig, Platform, PlayerConfig, Stream, StreamSet, StreamUrl, Track, TrackImage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        CastError, ConnectionConfig, ConnectionRegistry, Platform, PlayerConfig, PlayerEvent,
        PlayerState, Stream, StreamSet, Track, TrackPlayer, VoiceConnection,
    };
}
