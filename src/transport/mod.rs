//! Voice packet send path
//!
//! Each [`PacketTransport`] owns its scratch buffer, so transports serving
//! different connections never share memory.

mod packet_transport;

pub use packet_transport::{MAX_DATAGRAM, PacketTransport, SILENCE_FRAME, open_datagram};

#[cfg(test)]
mod tests;
