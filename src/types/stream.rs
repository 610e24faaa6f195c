use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::source::UrlResolver;

/// Location of a stream's media
#[derive(Clone)]
pub enum StreamUrl {
    /// URL known up front
    Resolved(String),
    /// URL that must be resolved (e.g. signature deciphering) before use
    Deferred(Arc<dyn UrlResolver>),
}

impl StreamUrl {
    /// Resolve to a playable URL
    ///
    /// # Errors
    ///
    /// Propagates the resolver's failure for deferred URLs.
    pub async fn resolve(&self) -> Result<String> {
        match self {
            Self::Resolved(url) => Ok(url.clone()),
            Self::Deferred(resolver) => resolver.resolve().await,
        }
    }
}

impl fmt::Debug for StreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(url) => f.debug_tuple("Resolved").field(url).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

impl From<String> for StreamUrl {
    fn from(url: String) -> Self {
        Self::Resolved(url)
    }
}

impl From<&str> for StreamUrl {
    fn from(url: &str) -> Self {
        Self::Resolved(url.to_string())
    }
}

/// One deliverable variant of a track
#[derive(Debug, Clone)]
pub struct Stream {
    /// Media location
    pub url: StreamUrl,
    /// Container name (`webm`, `mp4`, ...)
    pub container: Option<String>,
    /// Codec string (`opus`, `mp4a.40.2`, ...)
    pub codecs: Option<String>,
    /// Bitrate in bits per second
    pub bitrate: u64,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Carries audio
    pub audio: bool,
    /// Carries video
    pub video: bool,
    /// Flagged by the platform as the canonical audio rendition
    pub default_audio: bool,
    /// Loudness normalization factor (copied from the owning set on selection)
    pub volume: f32,
}

impl Stream {
    /// Create a stream with unknown media flags
    pub fn new(url: impl Into<StreamUrl>) -> Self {
        Self {
            url: url.into(),
            container: None,
            codecs: None,
            bitrate: 0,
            duration: None,
            audio: false,
            video: false,
            default_audio: false,
            volume: 1.0,
        }
    }

    /// Builder method to set media tracks
    #[must_use]
    pub fn with_tracks(mut self, video: bool, audio: bool) -> Self {
        self.video = video;
        self.audio = audio;
        self
    }

    /// Builder method to set bitrate
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Builder method to set duration
    #[must_use]
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder method to set container and codecs
    #[must_use]
    pub fn with_metadata(mut self, container: impl Into<String>, codecs: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self.codecs = Some(codecs.into());
        self
    }

    /// Builder method to flag the default audio rendition
    #[must_use]
    pub fn with_default_audio(mut self, default_audio: bool) -> Self {
        self.default_audio = default_audio;
        self
    }

    /// Whether the stream is Opus coded
    #[must_use]
    pub fn is_opus(&self) -> bool {
        self.codecs
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("opus"))
    }
}

/// Resolved, possibly time-limited collection of streams
///
/// Once `expired()` returns true it never returns false again; refreshing
/// means replacing the set.
#[derive(Debug, Clone)]
pub struct StreamSet {
    streams: Vec<Stream>,
    /// Loudness normalization factor for the whole set
    pub volume: f32,
    /// Live broadcast
    pub live: bool,
    expires_at: Option<Instant>,
}

impl StreamSet {
    /// Create a never-expiring, non-live set
    #[must_use]
    pub fn new(streams: Vec<Stream>) -> Self {
        Self {
            streams,
            volume: 1.0,
            live: false,
            expires_at: None,
        }
    }

    /// Builder method to set the normalization volume
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Builder method to mark the set as live
    #[must_use]
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Builder method to expire the set at `at`
    #[must_use]
    pub fn expires_at(mut self, at: Instant) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Builder method to expire the set after `ttl`
    #[must_use]
    pub fn expires_in(self, ttl: Duration) -> Self {
        self.expires_at(Instant::now() + ttl)
    }

    /// Whether the stream URLs are no longer valid
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Streams in platform order
    #[must_use]
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Number of streams
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the set has no streams
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
