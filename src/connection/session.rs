//! Per-connection cryptographic session

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use zeroize::Zeroizing;

use crate::error::CastError;
use crate::protocol::crypto::lengths;
use crate::protocol::rtp::RtpHeader;

/// Packet encryption mode negotiated with the voice server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Nonce is the RTP header, no trailer
    Normal,
    /// Random 24-byte nonce appended to the packet
    Suffix,
    /// Incrementing 4-byte nonce appended to the packet
    Lite,
}

impl EncryptionMode {
    /// Protocol name of the mode
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "xsalsa20_poly1305",
            Self::Suffix => "xsalsa20_poly1305_suffix",
            Self::Lite => "xsalsa20_poly1305_lite",
        }
    }

    /// Bytes appended after the ciphertext
    #[must_use]
    pub fn trailer_len(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Suffix => lengths::SECRETBOX_NONCE,
            Self::Lite => 4,
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = CastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xsalsa20_poly1305" => Ok(Self::Normal),
            "xsalsa20_poly1305_suffix" => Ok(Self::Suffix),
            "xsalsa20_poly1305_lite" => Ok(Self::Lite),
            other => Err(CastError::Unsupported {
                message: format!("encryption mode {other}"),
            }),
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session parameters reported by the gateway when the transport is ready
#[derive(Clone)]
pub struct SessionDescription {
    /// Secret-box key
    pub secret_key: [u8; 32],
    /// Negotiated mode name
    pub mode: String,
    /// Our synchronization source
    pub ssrc: u32,
}

impl fmt::Debug for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescription")
            .field("mode", &self.mode)
            .field("ssrc", &self.ssrc)
            .finish_non_exhaustive()
    }
}

/// Mutable transport state of one ready connection
///
/// Sequence, timestamp and nonce counter wrap at their type widths. Only the
/// send path advances them, under the connection's session lock.
pub struct ConnectionSession {
    id: u64,
    secret_key: Zeroizing<[u8; 32]>,
    mode: EncryptionMode,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    nonce: u32,
}

impl ConnectionSession {
    /// Create a session from the gateway's description
    ///
    /// Sequence and timestamp start at random values, the nonce counter at 0.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the mode name is unknown.
    pub fn new(description: &SessionDescription) -> Result<Self, CastError> {
        let mode = description.mode.parse()?;
        Ok(Self::with_counters(
            description.secret_key,
            mode,
            description.ssrc,
            rand::random(),
            rand::random(),
            0,
        ))
    }

    /// Create a session with explicit starting counters
    #[must_use]
    pub fn with_counters(
        secret_key: [u8; 32],
        mode: EncryptionMode,
        ssrc: u32,
        sequence: u16,
        timestamp: u32,
        nonce: u32,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            secret_key: Zeroizing::new(secret_key),
            mode,
            ssrc,
            sequence,
            timestamp,
            nonce,
        }
    }

    /// Process-unique identifier of this session
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Secret-box key
    #[must_use]
    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }

    /// Negotiated encryption mode
    #[must_use]
    pub fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Synchronization source
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number of the last packet sent
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp of the last packet sent
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Last lite-mode nonce used
    #[must_use]
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// Step sequence and timestamp for a frame of `frame_size` samples
    ///
    /// Returns the header for the packet carrying that frame.
    pub fn advance(&mut self, frame_size: u32) -> RtpHeader {
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(frame_size);
        RtpHeader::new(self.sequence, self.timestamp, self.ssrc)
    }

    /// Step the lite-mode nonce counter and return the new value
    pub fn next_nonce(&mut self) -> u32 {
        self.nonce = self.nonce.wrapping_add(1);
        self.nonce
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("ssrc", &self.ssrc)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}
