//! Mock decode engine
//!
//! Engines record the calls made on them. Tests drive playback by pushing
//! [`EngineEvent`]s through the engine's [`MockEngineHandle`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;

use crate::error::Result;
use crate::playback::{DecodeEngine, EngineEvent, EngineEvents, EngineFactory, EqualizerBand};
use crate::protocol::rtp::constants::FRAME_SIZE;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call recorded by a mock engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// `set_output`
    SetOutput {
        /// Channels
        channels: u8,
        /// Sample rate
        sample_rate: u32,
        /// Bitrate
        bitrate: u32,
    },
    /// `set_url`
    SetUrl {
        /// Media location
        url: String,
        /// Local file
        is_file: bool,
    },
    /// `seek`
    Seek(f64),
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `destroy`
    Destroy,
    /// `set_paused`
    SetPaused(bool),
    /// `set_volume`
    SetVolume(f32),
    /// `set_bitrate`
    SetBitrate(u32),
    /// `set_rate`
    SetRate(f32),
    /// `set_tempo`
    SetTempo(f32),
    /// `set_tremolo`
    SetTremolo {
        /// Depth
        depth: f32,
        /// Rate
        rate: f32,
    },
    /// `set_equalizer`
    SetEqualizer(Vec<EqualizerBand>),
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    time: f64,
    duration: f64,
    total_frames: u64,
    frames_dropped: u64,
    codec_copy: bool,
}

struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    fn record(&self, call: EngineCall) -> Result<()> {
        lock(&self.state).calls.push(call);
        Ok(())
    }
}

impl DecodeEngine for MockEngine {
    fn set_output(&mut self, channels: u8, sample_rate: u32, bitrate: u32) -> Result<()> {
        self.record(EngineCall::SetOutput {
            channels,
            sample_rate,
            bitrate,
        })
    }

    fn set_url(&mut self, url: &str, is_file: bool) -> Result<()> {
        self.record(EngineCall::SetUrl {
            url: url.to_string(),
            is_file,
        })
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        lock(&self.state).time = time;
        self.record(EngineCall::Seek(time))
    }

    fn start(&mut self) -> Result<()> {
        self.record(EngineCall::Start)
    }

    fn stop(&mut self) -> Result<()> {
        self.record(EngineCall::Stop)
    }

    fn destroy(&mut self) {
        let _ = self.record(EngineCall::Destroy);
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.record(EngineCall::SetPaused(paused))
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.record(EngineCall::SetVolume(volume))
    }

    fn set_bitrate(&mut self, bitrate: u32) -> Result<()> {
        self.record(EngineCall::SetBitrate(bitrate))
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.record(EngineCall::SetRate(rate))
    }

    fn set_tempo(&mut self, tempo: f32) -> Result<()> {
        self.record(EngineCall::SetTempo(tempo))
    }

    fn set_tremolo(&mut self, depth: f32, rate: f32) -> Result<()> {
        self.record(EngineCall::SetTremolo { depth, rate })
    }

    fn set_equalizer(&mut self, bands: &[EqualizerBand]) -> Result<()> {
        self.record(EngineCall::SetEqualizer(bands.to_vec()))
    }

    fn time(&self) -> f64 {
        lock(&self.state).time
    }

    fn duration(&self) -> f64 {
        lock(&self.state).duration
    }

    fn frames_dropped(&self) -> u64 {
        lock(&self.state).frames_dropped
    }

    fn total_frames(&self) -> u64 {
        lock(&self.state).total_frames
    }

    fn is_codec_copy(&self) -> bool {
        lock(&self.state).codec_copy
    }
}

/// Test-side view of one mock engine
#[derive(Clone)]
pub struct MockEngineHandle {
    state: Arc<Mutex<EngineState>>,
    events: EngineEvents,
}

impl MockEngineHandle {
    /// Calls made on the engine, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.state).calls.clone()
    }

    /// Whether the engine received `call`
    #[must_use]
    pub fn received(&self, call: &EngineCall) -> bool {
        lock(&self.state).calls.contains(call)
    }

    /// Last URL set on the engine
    #[must_use]
    pub fn url(&self) -> Option<(String, bool)> {
        lock(&self.state).calls.iter().rev().find_map(|c| match c {
            EngineCall::SetUrl { url, is_file } => Some((url.clone(), *is_file)),
            _ => None,
        })
    }

    /// Whether the engine was destroyed
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.received(&EngineCall::Destroy)
    }

    /// Number of times the engine was destroyed
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Destroy))
            .count()
    }

    /// Set the position and duration the engine reports
    pub fn set_position(&self, time: f64, duration: f64) {
        let mut state = lock(&self.state);
        state.time = time;
        state.duration = duration;
    }

    /// Set the frame counters the engine reports
    pub fn set_frames(&self, total: u64, dropped: u64) {
        let mut state = lock(&self.state);
        state.total_frames = total;
        state.frames_dropped = dropped;
    }

    /// Generation tag of the engine's events
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// Push an event as the engine
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.events.emit(event)
    }

    /// Push one 20 ms packet
    pub fn packet(&self, data: &[u8]) -> bool {
        self.emit(EngineEvent::Packet {
            data: Bytes::copy_from_slice(data),
            frame_size: FRAME_SIZE,
        })
    }

    /// Push end of media
    pub fn finish(&self) -> bool {
        self.emit(EngineEvent::Finish)
    }

    /// Push a decode error
    pub fn error(&self, code: i32, retryable: bool) -> bool {
        self.emit(EngineEvent::Error {
            message: format!("mock decode error {code}"),
            code,
            retryable,
        })
    }
}

impl std::fmt::Debug for MockEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngineHandle")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Factory producing mock engines
pub struct MockEngineFactory {
    engines: Mutex<Vec<MockEngineHandle>>,
    created: watch::Sender<usize>,
}

impl MockEngineFactory {
    /// Create a factory
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(Vec::new()),
            created: watch::channel(0).0,
        })
    }

    /// Number of engines created
    #[must_use]
    pub fn created(&self) -> usize {
        *self.created.borrow()
    }

    /// Engine number `index` in creation order
    #[must_use]
    pub fn engine(&self, index: usize) -> Option<MockEngineHandle> {
        lock(&self.engines).get(index).cloned()
    }

    /// Most recently created engine
    #[must_use]
    pub fn latest(&self) -> Option<MockEngineHandle> {
        lock(&self.engines).last().cloned()
    }

    /// Wait until `count` engines exist and return the last of them
    pub async fn wait_for_engine(&self, count: usize) -> Option<MockEngineHandle> {
        let mut rx = self.created.subscribe();
        rx.wait_for(|created| *created >= count).await.ok()?;
        self.engine(count.checked_sub(1)?)
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, events: EngineEvents) -> Box<dyn DecodeEngine> {
        let state = Arc::new(Mutex::new(EngineState::default()));
        lock(&self.engines).push(MockEngineHandle {
            state: state.clone(),
            events,
        });
        self.created.send_modify(|created| *created += 1);
        Box::new(MockEngine { state })
    }
}
