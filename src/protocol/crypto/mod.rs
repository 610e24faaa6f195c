//! Cryptographic primitives for voice packet encryption

#![allow(missing_docs)]

mod error;
mod secretbox;

pub use self::error::CryptoError;
pub use self::secretbox::{SecretBox, SecretNonce};

/// Length of various cryptographic values
pub mod lengths {
    /// Secret-box key length
    pub const SECRETBOX_KEY: usize = 32;
    /// Secret-box (XSalsa20) nonce length
    pub const SECRETBOX_NONCE: usize = 24;
    /// Poly1305 tag length
    pub const SECRETBOX_TAG: usize = 16;
}
