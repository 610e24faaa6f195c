//! Test doubles for the gateway, decode engine and track resolver

mod mock_engine;
mod mock_gateway;
mod mock_resolver;

#[cfg(test)]
mod tests;

pub use mock_engine::{EngineCall, MockEngineFactory, MockEngineHandle};
pub use mock_gateway::{GatewayCall, MockConnector, MockGateway, test_session};
pub use mock_resolver::GatedResolver;

use crate::types::{Stream, StreamSet};

/// Stream set with one default-audio Opus stream at `url`
#[must_use]
pub fn opus_streams(url: &str) -> StreamSet {
    StreamSet::new(vec![
        Stream::new(url)
            .with_tracks(false, true)
            .with_metadata("webm", "opus")
            .with_bitrate(128_000)
            .with_default_audio(true),
    ])
}
