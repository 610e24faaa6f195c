use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::stream::{Stream, StreamSet};
use crate::error::{CastError, Result};
use crate::source::TrackResolver;

/// Platform a track was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// YouTube
    Youtube,
    /// SoundCloud
    Soundcloud,
    /// Spotify (metadata only, audio comes from a matched track)
    Spotify,
    /// Apple Music (metadata only, audio comes from a matched track)
    AppleMusic,
    /// Local file or direct URL
    File,
}

impl Platform {
    /// Display name of the platform
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "Youtube",
            Self::Soundcloud => "Soundcloud",
            Self::Spotify => "Spotify",
            Self::AppleMusic => "AppleMusic",
            Self::File => "File",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image attached to a track or its owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackImage {
    /// Image URL
    pub url: Option<String>,
    /// Width in pixels (0 if unknown)
    pub width: u32,
    /// Height in pixels (0 if unknown)
    pub height: u32,
}

impl TrackImage {
    /// Create a new image
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: Some(url.into()),
            width,
            height,
        }
    }
}

/// A playable track from one of the supported platforms
///
/// The stream cache is filled lazily by the player and invalidated when the
/// decode engine reports a retryable error.
pub struct Track {
    /// Platform-specific identifier
    pub id: String,

    /// Source platform
    pub platform: Platform,

    /// Track title
    pub title: Option<String>,

    /// Uploader or artist name
    pub owner_name: Option<String>,

    /// Uploader or artist icons
    pub owner_icons: Vec<TrackImage>,

    /// Duration in seconds
    pub duration: Option<f64>,

    /// Thumbnails, smallest first when known
    pub thumbnails: Vec<TrackImage>,

    /// Whether the platform reports the track as playable
    pub playable: bool,

    streams: Mutex<Option<StreamSet>>,
    resolver: Option<Arc<dyn TrackResolver>>,
}

impl Track {
    /// Create a track with only identity set
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform,
            title: None,
            owner_name: None,
            owner_icons: Vec::new(),
            duration: None,
            thumbnails: Vec::new(),
            playable: true,
            streams: Mutex::new(None),
            resolver: None,
        }
    }

    /// Create a track for a local file or direct media URL
    ///
    /// Its single stream never expires and cannot be refreshed.
    pub fn file(url: impl Into<String>) -> Self {
        let url = url.into();
        let stream = Stream::new(url.clone()).with_tracks(true, true);
        Self::new(Platform::File, url).with_streams(StreamSet::new(vec![stream]))
    }

    /// Builder method to set descriptive metadata
    #[must_use]
    pub fn with_metadata(
        mut self,
        title: impl Into<String>,
        duration: Option<f64>,
        thumbnails: Vec<TrackImage>,
    ) -> Self {
        self.title = Some(title.into());
        self.duration = duration;
        self.thumbnails = thumbnails;
        self
    }

    /// Builder method to set the owner
    #[must_use]
    pub fn with_owner(mut self, name: impl Into<String>, icons: Vec<TrackImage>) -> Self {
        self.owner_name = Some(name.into());
        self.owner_icons = icons;
        self
    }

    /// Builder method to prefill the stream cache
    #[must_use]
    pub fn with_streams(self, streams: StreamSet) -> Self {
        self.set_streams(Some(streams));
        self
    }

    /// Builder method to attach the platform resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TrackResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Builder method to set playability
    #[must_use]
    pub fn with_playable(mut self, playable: bool) -> Self {
        self.playable = playable;
        self
    }

    /// Whether the track points at a local file
    #[must_use]
    pub fn is_local_file(&self) -> bool {
        self.platform == Platform::File
    }

    /// Cached stream set, expired or not
    #[must_use]
    pub fn streams(&self) -> Option<StreamSet> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached stream set if it has not expired
    #[must_use]
    pub fn fresh_streams(&self) -> Option<StreamSet> {
        self.streams().filter(|s| !s.expired())
    }

    /// Replace the stream cache
    pub fn set_streams(&self, streams: Option<StreamSet>) {
        *self.streams.lock().unwrap_or_else(PoisonError::into_inner) = streams;
    }

    /// Drop the stream cache so the next load fetches fresh streams
    pub fn invalidate_streams(&self) {
        self.set_streams(None);
    }

    /// Fetch a fresh stream set from the platform
    ///
    /// Does not touch the cache; the caller decides whether the result is
    /// still wanted.
    ///
    /// # Errors
    ///
    /// Returns `Unplayable` when the track has no resolver, otherwise whatever
    /// the platform resolver reports.
    pub async fn get_streams(&self) -> Result<StreamSet> {
        match &self.resolver {
            Some(resolver) => resolver.get_streams(self).await,
            None => Err(CastError::unplayable("Stream expired or not available")),
        }
    }

    /// Re-fetch the full track from its platform
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the track has no resolver.
    pub async fn fetch(&self) -> Result<Track> {
        match &self.resolver {
            Some(resolver) => resolver.fetch(self).await,
            None => Err(CastError::internal(format!(
                "Cannot fetch on a {} track",
                self.platform
            ))),
        }
    }

    /// Same platform and identifier
    #[must_use]
    pub fn equals(&self, other: &Track) -> bool {
        self.id == other.id && self.platform == other.platform
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("title", &self.title)
            .field("duration", &self.duration)
            .field("playable", &self.playable)
            .field("has_resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}
