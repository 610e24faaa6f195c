use bytes::{BufMut, BytesMut};

use crate::connection::{ConnectionSession, EncryptionMode, VoiceConnection};
use crate::error::{CastError, Result};
use crate::protocol::crypto::{SecretBox, SecretNonce, lengths};
use crate::protocol::rtp::{RtpDecodeError, RtpHeader};

/// Largest datagram the transport will produce
pub const MAX_DATAGRAM: usize = 7678;

/// Opus frame carrying silence
pub const SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Encrypts frames into voice datagrams for one connection
pub struct PacketTransport {
    /// Reused datagram buffer
    buffer: BytesMut,
    /// Cipher for the session it was built from
    cipher: Option<(u64, SecretBox)>,
}

impl PacketTransport {
    /// Create a transport with an empty buffer of datagram capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_DATAGRAM),
            cipher: None,
        }
    }

    /// Largest frame that fits in a datagram under `mode`
    #[must_use]
    pub fn max_frame_len(mode: EncryptionMode) -> usize {
        MAX_DATAGRAM - RtpHeader::SIZE - lengths::SECRETBOX_TAG - mode.trailer_len()
    }

    /// Build the datagram for `frame`, advancing the session's counters
    ///
    /// The returned slice borrows the transport's buffer and is overwritten by
    /// the next call.
    ///
    /// # Errors
    ///
    /// `FrameTooLarge` if the frame does not fit (counters are left
    /// untouched), or a crypto error if the session key is unusable.
    pub fn encode_frame(
        &mut self,
        session: &mut ConnectionSession,
        frame: &[u8],
        frame_size: u32,
    ) -> Result<&[u8]> {
        let mode = session.mode();
        let max = Self::max_frame_len(mode);
        if frame.len() > max {
            return Err(CastError::FrameTooLarge {
                size: frame.len(),
                max,
            });
        }

        if self.cipher.as_ref().map(|(id, _)| *id) != Some(session.id()) {
            self.cipher = Some((session.id(), SecretBox::new(session.secret_key())?));
        }
        let Some((_, cipher)) = self.cipher.as_ref() else {
            return Err(CastError::internal("cipher not initialized"));
        };

        let header = session.advance(frame_size).encode();

        self.buffer.clear();
        self.buffer.put_slice(&header);
        self.buffer.put_bytes(0, lengths::SECRETBOX_TAG);
        self.buffer.put_slice(frame);

        let sealed = RtpHeader::SIZE..self.buffer.len();
        match mode {
            EncryptionMode::Lite => {
                let counter = session.next_nonce();
                cipher.seal_in_place(&SecretNonce::from_counter(counter), &mut self.buffer[sealed])?;
                self.buffer.put_u32(counter);
            }
            EncryptionMode::Suffix => {
                let random: [u8; 24] = rand::random();
                cipher.seal_in_place(&SecretNonce::padded(&random), &mut self.buffer[sealed])?;
                self.buffer.put_slice(&random);
            }
            EncryptionMode::Normal => {
                cipher.seal_in_place(&SecretNonce::padded(&header), &mut self.buffer[sealed])?;
            }
        }

        Ok(&self.buffer[..])
    }

    /// Encrypt and send `frame` on `connection`
    ///
    /// Returns false without sending if the connection is not ready. Marks
    /// the connection as speaking before sending.
    ///
    /// # Errors
    ///
    /// Encoding errors from [`PacketTransport::encode_frame`] or the
    /// connection's send error.
    pub async fn send_frame(
        &mut self,
        connection: &VoiceConnection,
        frame: &[u8],
        frame_size: u32,
    ) -> Result<bool> {
        if !connection.ready() {
            return Ok(false);
        }
        connection.set_speaking(true).await;

        let mut session = connection.session().await;
        let Some(session) = session.as_mut() else {
            return Ok(false);
        };

        let datagram = self.encode_frame(session, frame, frame_size)?;
        connection.send(datagram).await?;
        Ok(true)
    }
}

impl Default for PacketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketTransport")
            .field("buffered", &self.buffer.len())
            .field("session", &self.cipher.as_ref().map(|(id, _)| *id))
            .finish()
    }
}

/// Authenticate and decrypt a datagram built by [`PacketTransport`]
///
/// # Errors
///
/// `Packet` if the datagram is malformed, `Crypto` if the key is invalid or
/// authentication fails.
pub fn open_datagram(
    secret_key: &[u8],
    mode: EncryptionMode,
    datagram: &[u8],
) -> Result<(RtpHeader, Vec<u8>)> {
    let header = RtpHeader::decode(datagram)?;

    let trailer = mode.trailer_len();
    let needed = RtpHeader::SIZE + lengths::SECRETBOX_TAG + trailer;
    if datagram.len() < needed {
        return Err(RtpDecodeError::BufferTooSmall {
            needed,
            have: datagram.len(),
        }
        .into());
    }

    let body_end = datagram.len() - trailer;
    let nonce = match mode {
        EncryptionMode::Lite | EncryptionMode::Suffix => SecretNonce::padded(&datagram[body_end..]),
        EncryptionMode::Normal => SecretNonce::padded(&datagram[..RtpHeader::SIZE]),
    };

    let plaintext = SecretBox::new(secret_key)?.open(&nonce, &datagram[RtpHeader::SIZE..body_end])?;
    Ok((header, plaintext))
}
