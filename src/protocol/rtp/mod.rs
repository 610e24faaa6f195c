//! RTP framing for voice packets

mod packet;

#[cfg(test)]
mod packet_tests;

pub use packet::{RtpDecodeError, RtpHeader};

/// RTP constants for voice transport
pub mod constants {
    /// First header byte: version 2, no padding, no extension, no CSRC
    pub const VERSION_FLAGS: u8 = 0x80;

    /// Second header byte: dynamic payload type used for Opus voice
    pub const PAYLOAD_TYPE: u8 = 0x78;

    /// Output sample rate
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Output channels (stereo)
    pub const CHANNELS: u8 = 2;

    /// Samples per 20 ms frame at 48 kHz
    pub const FRAME_SIZE: u32 = 960;
}
