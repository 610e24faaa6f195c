//! Track resolver whose responses are released by the test

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{CastError, Result};
use crate::source::TrackResolver;
use crate::types::{StreamSet, Track};

/// Resolver returning a fixed stream set once its gate lets a call through
pub struct GatedResolver {
    streams: StreamSet,
    gate: Semaphore,
    calls: AtomicUsize,
    failures: Mutex<VecDeque<CastError>>,
}

impl GatedResolver {
    /// Resolver whose calls block until [`GatedResolver::release`]
    #[must_use]
    pub fn closed(streams: StreamSet) -> Arc<Self> {
        Self::with_permits(streams, 0)
    }

    /// Resolver whose calls complete immediately
    #[must_use]
    pub fn open(streams: StreamSet) -> Arc<Self> {
        Self::with_permits(streams, Semaphore::MAX_PERMITS)
    }

    fn with_permits(streams: StreamSet, permits: usize) -> Arc<Self> {
        Arc::new(Self {
            streams,
            gate: Semaphore::new(permits),
            calls: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Let `count` pending or future calls complete
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Make the next completed call fail with `error`
    pub fn push_error(&self, error: CastError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of `get_streams` calls started
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackResolver for GatedResolver {
    async fn get_streams(&self, _track: &Track) -> Result<StreamSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| CastError::internal("resolver gate closed"))?;
        permit.forget();

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.streams.clone()),
        }
    }

    async fn fetch(&self, track: &Track) -> Result<Track> {
        let mut fetched = Track::new(track.platform, track.id.clone());
        fetched.title.clone_from(&track.title);
        fetched.duration = track.duration;
        Ok(fetched)
    }
}
