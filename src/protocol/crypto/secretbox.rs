use super::{CryptoError, lengths};
use crypto_secretbox::{
    XSalsa20Poly1305,
    aead::{AeadInPlace, KeyInit, generic_array::GenericArray},
};

/// 24-byte nonce for XSalsa20-Poly1305
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretNonce([u8; 24]);

impl SecretNonce {
    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != lengths::SECRETBOX_NONCE {
            return Err(CryptoError::InvalidNonceLength {
                expected: lengths::SECRETBOX_NONCE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 24];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Zero-padded nonce whose leading bytes are `prefix`
    ///
    /// Prefixes longer than the nonce are truncated.
    pub fn padded(prefix: &[u8]) -> Self {
        let mut arr = [0u8; 24];
        let len = prefix.len().min(arr.len());
        arr[..len].copy_from_slice(&prefix[..len]);
        Self(arr)
    }

    /// Nonce carrying a big-endian counter in its first four bytes
    pub fn from_counter(counter: u32) -> Self {
        Self::padded(&counter.to_be_bytes())
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }
}

impl std::fmt::Debug for SecretNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretNonce(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// XSalsa20-Poly1305 secret box
///
/// Output layout matches NaCl `crypto_secretbox_easy`: the 16-byte tag
/// precedes the ciphertext.
pub struct SecretBox {
    cipher: XSalsa20Poly1305,
}

impl SecretBox {
    /// Create cipher with 32-byte key
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != lengths::SECRETBOX_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::SECRETBOX_KEY,
                actual: key.len(),
            });
        }

        let cipher =
            XSalsa20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: lengths::SECRETBOX_KEY,
                actual: key.len(),
            })?;

        Ok(Self { cipher })
    }

    /// Seal `buffer` in place
    ///
    /// `buffer` must start with `SECRETBOX_TAG` reserved bytes followed by the
    /// plaintext. On return it holds tag followed by ciphertext.
    pub fn seal_in_place(&self, nonce: &SecretNonce, buffer: &mut [u8]) -> Result<(), CryptoError> {
        if buffer.len() < lengths::SECRETBOX_TAG {
            return Err(CryptoError::EncryptionFailed);
        }

        let (tag_slot, body) = buffer.split_at_mut(lengths::SECRETBOX_TAG);
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce.0), b"", body)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        tag_slot.copy_from_slice(tag.as_slice());
        Ok(())
    }

    /// Encrypt with authentication
    ///
    /// Returns tag followed by ciphertext
    pub fn seal(&self, nonce: &SecretNonce, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; lengths::SECRETBOX_TAG + plaintext.len()];
        out[lengths::SECRETBOX_TAG..].copy_from_slice(plaintext);
        self.seal_in_place(nonce, &mut out)?;
        Ok(out)
    }

    /// Decrypt and verify authentication
    ///
    /// Input should be tag followed by ciphertext
    pub fn open(&self, nonce: &SecretNonce, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < lengths::SECRETBOX_TAG {
            return Err(CryptoError::DecryptionFailed);
        }

        let (tag, body) = sealed.split_at(lengths::SECRETBOX_TAG);
        let mut plaintext = body.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&nonce.0),
                b"",
                &mut plaintext,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = [0x42u8; 32];
        let cipher = SecretBox::new(&key).unwrap();

        let nonce = SecretNonce::from_counter(1);
        let plaintext = b"Hello, voice!";

        let sealed = cipher.seal(&nonce, plaintext).unwrap();
        let opened = cipher.open(&nonce, &sealed).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_sealed_is_larger() {
        let cipher = SecretBox::new(&[0x42u8; 32]).unwrap();
        let sealed = cipher.seal(&SecretNonce::default(), b"test").unwrap();

        // tag + ciphertext
        assert_eq!(sealed.len(), 4 + 16);
    }

    #[test]
    fn test_open_wrong_nonce_fails() {
        let cipher = SecretBox::new(&[0x42u8; 32]).unwrap();

        let sealed = cipher.seal(&SecretNonce::from_counter(1), b"secret").unwrap();
        let result = cipher.open(&SecretNonce::from_counter(2), &sealed);

        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let nonce = SecretNonce::from_counter(9);
        let sealed = SecretBox::new(&[1u8; 32]).unwrap().seal(&nonce, b"data").unwrap();

        let result = SecretBox::new(&[2u8; 32]).unwrap().open(&nonce, &sealed);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        let result = SecretBox::new(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_nonce_padding() {
        let nonce = SecretNonce::from_counter(0x0102_0304);
        assert_eq!(&nonce.as_bytes()[..4], &[1, 2, 3, 4]);
        assert!(nonce.as_bytes()[4..].iter().all(|&b| b == 0));

        let header = [0x80u8; 12];
        let nonce = SecretNonce::padded(&header);
        assert_eq!(&nonce.as_bytes()[..12], &header);
        assert!(nonce.as_bytes()[12..].iter().all(|&b| b == 0));
    }
}
