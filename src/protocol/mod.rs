//! Wire-level protocol pieces for voice transport

pub mod crypto;
pub mod rtp;
