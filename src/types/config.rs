use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::rtp::constants;

/// Configuration for a track player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output channel count requested from the decode engine (default: 2)
    pub channels: u8,

    /// Output sample rate requested from the decode engine (default: 48000)
    pub sample_rate: u32,

    /// Encoder bitrate requested from the decode engine (default: `256_000`)
    pub bitrate: u32,

    /// Minimum spacing between accepted retries of decode errors (default: 5 minutes)
    pub error_cooldown: Duration,

    /// Keepalive frame cadence (default: 20ms)
    pub silence_interval: Duration,

    /// Keepalive frames sent per burst (default: 5)
    pub silence_frames: u32,

    /// Samples represented by one keepalive frame (default: 960)
    pub silence_frame_size: u32,

    /// Allow at most one subscription, for engines that encrypt and send themselves
    pub exclusive_subscription: bool,

    /// Capacity of the player event channel (default: 256)
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            channels: constants::CHANNELS,
            sample_rate: constants::SAMPLE_RATE,
            bitrate: 256_000,
            error_cooldown: Duration::from_secs(5 * 60),
            silence_interval: Duration::from_millis(20),
            silence_frames: 5,
            silence_frame_size: constants::FRAME_SIZE,
            exclusive_subscription: false,
            event_capacity: 256,
        }
    }
}

impl PlayerConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }
}

/// Builder for `PlayerConfig`
#[derive(Debug, Clone, Default)]
pub struct PlayerConfigBuilder {
    config: PlayerConfig,
}

impl PlayerConfigBuilder {
    /// Set decode engine output format
    #[must_use]
    pub fn output(mut self, channels: u8, sample_rate: u32, bitrate: u32) -> Self {
        self.config.channels = channels;
        self.config.sample_rate = sample_rate;
        self.config.bitrate = bitrate;
        self
    }

    /// Set decode error retry cool-down
    #[must_use]
    pub fn error_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.error_cooldown = cooldown;
        self
    }

    /// Set keepalive cadence and burst length
    #[must_use]
    pub fn silence(mut self, interval: Duration, frames: u32) -> Self {
        self.config.silence_interval = interval;
        self.config.silence_frames = frames;
        self
    }

    /// Restrict the player to a single subscription
    #[must_use]
    pub fn exclusive_subscription(mut self, exclusive: bool) -> Self {
        self.config.exclusive_subscription = exclusive;
        self
    }

    /// Set event channel capacity
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> PlayerConfig {
        self.config
    }
}

/// Configuration for voice connections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Time allowed to reach `Ready` before the wait fails (default: 15 seconds)
    pub ready_timeout: Duration,

    /// Announce that we want to receive audio once ready (default: false)
    pub receive_audio: bool,

    /// Join deafened (default: true)
    pub self_deaf: bool,

    /// Join muted (default: false)
    pub self_mute: bool,

    /// Capacity of the connection event channel (default: 64)
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(15),
            receive_audio: false,
            self_deaf: true,
            self_mute: false,
            event_capacity: 64,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }
}

/// Builder for `ConnectionConfig`
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set readiness timeout
    #[must_use]
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = timeout;
        self
    }

    /// Request audio reception
    #[must_use]
    pub fn receive_audio(mut self, receive: bool) -> Self {
        self.config.receive_audio = receive;
        self
    }

    /// Set deaf/mute flags sent when joining
    #[must_use]
    pub fn voice_flags(mut self, self_deaf: bool, self_mute: bool) -> Self {
        self.config.self_deaf = self_deaf;
        self.config.self_mute = self_mute;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
