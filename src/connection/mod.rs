//! Voice connection management

mod gateway;
mod manager;
mod registry;
mod session;
mod state;

pub use gateway::{
    ChannelId, ChannelTarget, GatewayConnector, GatewayEvent, GatewayLink, GroupId, VoiceGateway,
};
pub use manager::VoiceConnection;
pub use registry::ConnectionRegistry;
pub use session::{ConnectionSession, EncryptionMode, SessionDescription};
pub use state::{ConnectionEvent, ConnectionState, ConnectionStats, DisconnectReason};
