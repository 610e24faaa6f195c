//! Boundary to the platform resolution layer
//!
//! Platform search, playlist paging and URL scraping live outside this crate.
//! They plug in through [`TrackResolver`] (refresh a track and its streams)
//! and [`UrlResolver`] (turn a deferred stream location into a URL).

mod file;

pub use file::FileSource;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{StreamSet, Track};

/// Platform capability attached to a [`Track`]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Fetch a fresh stream set for `track`
    async fn get_streams(&self, track: &Track) -> Result<StreamSet>;

    /// Re-fetch the track's metadata
    async fn fetch(&self, track: &Track) -> Result<Track>;
}

/// Deferred stream location
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Produce the playable URL
    async fn resolve(&self) -> Result<String>;
}
