//! Core types

mod config;
mod stream;
mod track;


pub use config::{ConnectionConfig, ConnectionConfigBuilder, PlayerConfig, PlayerConfigBuilder};
pub use stream::{Stream, StreamSet, StreamUrl};
pub use track::{Platform, Track, TrackImage};
