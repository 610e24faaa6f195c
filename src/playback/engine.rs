//! Decode engine boundary
//!
//! The engine fetches, decodes and re-encodes media on its own threads. It
//! reports back through [`EngineEvents`], which tags every event with the
//! generation of the engine that produced it so the player can drop events
//! from engines it already destroyed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Event pushed by a decode engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Media opened and decoding started
    Ready,
    /// One encoded frame
    Packet {
        /// Encoded frame bytes
        data: Bytes,
        /// Samples represented by the frame
        frame_size: u32,
    },
    /// End of media
    Finish,
    /// Decoding failed
    Error {
        /// Description of the failure
        message: String,
        /// Engine-specific error code
        code: i32,
        /// Whether reopening the media may succeed
        retryable: bool,
    },
    /// Diagnostic output
    Debug(String),
}

/// Engine event tagged with its engine's generation
#[derive(Debug, Clone)]
pub struct EngineMessage {
    /// Generation of the emitting engine
    pub generation: u64,
    /// The event
    pub event: EngineEvent,
}

/// Sending side handed to an engine on creation
#[derive(Debug, Clone)]
pub struct EngineEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the engine owning this sender
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push an event to the player
    ///
    /// Returns false once the player has shut down.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(EngineMessage {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One equalizer band setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerBand {
    /// Band index
    pub band: u8,
    /// Gain multiplier
    pub gain: f32,
}

/// Decode engine operations
///
/// Calls are cheap and non-blocking; results arrive as [`EngineEvent`]s.
pub trait DecodeEngine: Send {
    /// Set output channels, sample rate and encoder bitrate
    fn set_output(&mut self, channels: u8, sample_rate: u32, bitrate: u32) -> Result<()>;
    /// Set media location
    fn set_url(&mut self, url: &str, is_file: bool) -> Result<()>;
    /// Seek to `time` seconds
    fn seek(&mut self, time: f64) -> Result<()>;
    /// Start decoding
    fn start(&mut self) -> Result<()>;
    /// Stop decoding
    fn stop(&mut self) -> Result<()>;
    /// Release all resources; the engine emits nothing afterwards
    fn destroy(&mut self);

    /// Pause or resume
    fn set_paused(&mut self, paused: bool) -> Result<()>;
    /// Set output volume
    fn set_volume(&mut self, volume: f32) -> Result<()>;
    /// Set encoder bitrate
    fn set_bitrate(&mut self, bitrate: u32) -> Result<()>;
    /// Set playback rate (pitch and tempo)
    fn set_rate(&mut self, rate: f32) -> Result<()>;
    /// Set tempo without changing pitch
    fn set_tempo(&mut self, tempo: f32) -> Result<()>;
    /// Set tremolo effect
    fn set_tremolo(&mut self, depth: f32, rate: f32) -> Result<()>;
    /// Set equalizer bands
    fn set_equalizer(&mut self, bands: &[EqualizerBand]) -> Result<()>;

    /// Current position in seconds
    fn time(&self) -> f64;
    /// Media duration in seconds
    fn duration(&self) -> f64;
    /// Frames dropped so far
    fn frames_dropped(&self) -> u64;
    /// Frames produced so far
    fn total_frames(&self) -> u64;
    /// Whether frames are passed through without re-encoding
    fn is_codec_copy(&self) -> bool;
}

/// Creates decode engines
pub trait EngineFactory: Send + Sync {
    /// Create an engine reporting through `events`
    fn create(&self, events: EngineEvents) -> Box<dyn DecodeEngine>;
}

/// Point-in-time engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineSnapshot {
    /// Position in seconds
    pub time: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Frames dropped
    pub frames_dropped: u64,
    /// Frames produced
    pub total_frames: u64,
    /// Pass-through without re-encoding
    pub codec_copy: bool,
}

impl EngineSnapshot {
    pub(crate) fn of(engine: &dyn DecodeEngine) -> Self {
        Self {
            time: engine.time(),
            duration: engine.duration(),
            frames_dropped: engine.frames_dropped(),
            total_frames: engine.total_frames(),
            codec_copy: engine.is_codec_copy(),
        }
    }
}
