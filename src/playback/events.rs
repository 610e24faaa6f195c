use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::CastError;

/// Player lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    /// No engine running
    Idle,
    /// Fetching and selecting streams
    Loading,
    /// Engine decoding
    Playing,
    /// Engine paused
    Paused,
    /// Terminal
    Destroyed,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Events emitted by a track player
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The engine opened the media
    Ready,
    /// A frame was sent to every ready subscription
    Packet {
        /// Encoded frame
        data: Bytes,
        /// Samples represented by the frame
        frame_size: u32,
    },
    /// The media ended
    Finish,
    /// Playback failed
    Error(Arc<CastError>),
    /// Engine diagnostics
    Debug(String),
    /// Lifecycle state changed
    StateChanged(PlayerState),
    /// The player was destroyed
    Destroyed,
}
