use thiserror::Error;

use super::constants::{PAYLOAD_TYPE, VERSION_FLAGS};

/// RTP header carried by every voice datagram
///
/// The first two bytes are constant for the session; only sequence,
/// timestamp and SSRC vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Sequence number (16 bits)
    pub sequence: u16,
    /// Timestamp in samples (32 bits)
    pub timestamp: u32,
    /// Synchronization source ID (32 bits)
    pub ssrc: u32,
}

impl RtpHeader {
    /// Standard RTP header size
    pub const SIZE: usize = 12;

    /// Create a new voice header
    #[must_use]
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        self.write_to(&mut buf);
        buf
    }

    /// Write header into the first twelve bytes of `buf`
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`RtpHeader::SIZE`].
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0] = VERSION_FLAGS;
        buf[1] = PAYLOAD_TYPE;

        // Bytes 2-3: Sequence number
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());

        // Bytes 4-7: Timestamp
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());

        // Bytes 8-11: SSRC
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
    }

    /// Decode header from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if buffer is too small or the marker bytes are wrong.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }

        if buf[0] != VERSION_FLAGS {
            return Err(RtpDecodeError::InvalidVersion(buf[0]));
        }

        if buf[1] != PAYLOAD_TYPE {
            return Err(RtpDecodeError::UnknownPayloadType(buf[1]));
        }

        Ok(Self {
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// RTP decode errors
#[derive(Debug, Error)]
pub enum RtpDecodeError {
    /// Datagram shorter than the fixed layout requires
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        have: usize,
    },

    /// First header byte is not the expected version/flags byte
    #[error("invalid RTP version byte: 0x{0:02x}")]
    InvalidVersion(u8),

    /// Second header byte is not the voice payload type
    #[error("unknown payload type: 0x{0:02x}")]
    UnknownPayloadType(u8),
}
