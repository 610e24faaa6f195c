//! Track player
//!
//! A [`TrackPlayer`] is a handle to a task that owns all playback state. Caller
//! commands, engine events, finished stream loads and keepalive ticks are
//! handled one at a time on that task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use super::engine::{
    DecodeEngine, EngineEvent, EngineEvents, EngineFactory, EngineMessage, EngineSnapshot,
    EqualizerBand,
};
use super::epoch::PlayEpoch;
use super::events::{PlayerEvent, PlayerState};
use super::selector::get_best_stream;
use super::silence::SilenceScheduler;
use super::subscription::{Subscription, SubscriptionHandle};
use crate::connection::VoiceConnection;
use crate::error::{CastError, Result};
use crate::events::EventBus;
use crate::transport::SILENCE_FRAME;
use crate::types::{PlayerConfig, Stream, StreamSet, Track};

/// Engine pass-through operations
#[derive(Debug, Clone)]
pub(crate) enum Control {
    SetPaused(bool),
    SetVolume(f32),
    SetBitrate(u32),
    SetRate(f32),
    SetTempo(f32),
    SetTremolo { depth: f32, rate: f32 },
    SetEqualizer(Vec<EqualizerBand>),
    Seek(f64),
    Stop,
}

pub(crate) enum Command {
    Play(Arc<Track>),
    Start,
    Cleanup,
    Destroy,
    Control {
        op: Control,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<EngineSnapshot>>,
    },
    Subscribe {
        connection: Arc<VoiceConnection>,
        reply: oneshot::Sender<Result<u64>>,
    },
    Unsubscribe {
        id: u64,
    },
    SubscriptionCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Stream chosen by a load
struct Loaded {
    streams: StreamSet,
    fetched: bool,
    stream: Stream,
    url: String,
}

/// Completion of a background load
struct LoadResult {
    epoch: PlayEpoch,
    track: Arc<Track>,
    resume_at: Option<f64>,
    result: Result<Loaded>,
}

/// Handle to a track player
///
/// Cloning yields another handle to the same player. The player is destroyed
/// when `destroy` is called, when its last subscription is removed, or when
/// every handle and subscription is dropped.
#[derive(Clone)]
pub struct TrackPlayer {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus<PlayerEvent>,
    state: watch::Receiver<PlayerState>,
}

impl TrackPlayer {
    /// Spawn a player task
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>, config: PlayerConfig) -> Self {
        static NEXT_PLAYER: AtomicU64 = AtomicU64::new(1);

        let id = NEXT_PLAYER.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(PlayerState::Idle);

        let task = PlayerTask::new(id, config, factory, rx, events.clone(), state_tx);
        tokio::spawn(task.run());

        Self {
            id,
            commands: tx,
            events,
            state: state_rx,
        }
    }

    /// Process-unique player id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| CastError::PlayerClosed)
    }

    /// Start playing `track`, abandoning whatever was loading or playing
    ///
    /// Returns immediately; progress is reported through events.
    ///
    /// # Errors
    ///
    /// `PlayerClosed` if the player was destroyed.
    pub fn play(&self, track: Arc<Track>) -> Result<()> {
        self.send(Command::Play(track))
    }

    /// Load the current track again and start a fresh engine
    ///
    /// # Errors
    ///
    /// `PlayerClosed` if the player was destroyed.
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// Tear down the engine, keeping subscriptions
    ///
    /// # Errors
    ///
    /// `PlayerClosed` if the player was destroyed.
    pub fn cleanup(&self) -> Result<()> {
        self.send(Command::Cleanup)
    }

    /// Destroy the player; later calls do nothing
    pub fn destroy(&self) {
        let _ = self.send(Command::Destroy);
    }

    async fn control(&self, op: Control) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Control { op, reply })?;
        rx.await.map_err(|_| CastError::PlayerClosed)?
    }

    /// Halt playback and send the keepalive burst
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn stop(&self) -> Result<()> {
        self.control(Control::Stop).await
    }

    /// Pause or resume
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_paused(&self, paused: bool) -> Result<()> {
        self.control(Control::SetPaused(paused)).await
    }

    /// Set volume; the stream's normalization factor is applied on top
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.control(Control::SetVolume(volume)).await
    }

    /// Set encoder bitrate
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_bitrate(&self, bitrate: u32) -> Result<()> {
        self.control(Control::SetBitrate(bitrate)).await
    }

    /// Set playback rate
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        self.control(Control::SetRate(rate)).await
    }

    /// Set tempo
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_tempo(&self, tempo: f32) -> Result<()> {
        self.control(Control::SetTempo(tempo)).await
    }

    /// Set tremolo
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_tremolo(&self, depth: f32, rate: f32) -> Result<()> {
        self.control(Control::SetTremolo { depth, rate }).await
    }

    /// Set equalizer bands
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn set_equalizer(&self, bands: Vec<EqualizerBand>) -> Result<()> {
        self.control(Control::SetEqualizer(bands)).await
    }

    /// Seek to `time` seconds
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine, or the engine's error.
    pub async fn seek(&self, time: f64) -> Result<()> {
        self.control(Control::Seek(time)).await
    }

    /// Engine counters
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine.
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.map_err(|_| CastError::PlayerClosed)?
    }

    /// Position in seconds
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine.
    pub async fn get_time(&self) -> Result<f64> {
        Ok(self.snapshot().await?.time)
    }

    /// Duration in seconds
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine.
    pub async fn get_duration(&self) -> Result<f64> {
        Ok(self.snapshot().await?.duration)
    }

    /// Frames dropped by the engine
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine.
    pub async fn get_frames_dropped(&self) -> Result<u64> {
        Ok(self.snapshot().await?.frames_dropped)
    }

    /// Frames produced by the engine
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine.
    pub async fn get_total_frames(&self) -> Result<u64> {
        Ok(self.snapshot().await?.total_frames)
    }

    /// Whether the engine passes frames through without re-encoding
    ///
    /// # Errors
    ///
    /// `NotPlaying` without an engine.
    pub async fn is_codec_copy(&self) -> Result<bool> {
        Ok(self.snapshot().await?.codec_copy)
    }

    /// Send this player's frames to `connection`
    ///
    /// Subscribing an already subscribed connection returns the existing
    /// subscription. The connection drops any subscription it had to another
    /// player.
    ///
    /// # Errors
    ///
    /// `Unsupported` if the player is limited to one subscription and already
    /// has one, `PlayerClosed` if the player was destroyed.
    pub async fn subscribe(&self, connection: &Arc<VoiceConnection>) -> Result<SubscriptionHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            connection: connection.clone(),
            reply,
        })?;
        let id = rx.await.map_err(|_| CastError::PlayerClosed)??;

        let handle = SubscriptionHandle::new(id, self.id, self.commands.clone());
        connection.attach_subscription(handle.clone()).await;
        Ok(handle)
    }

    /// Remove a subscription
    pub fn unsubscribe(&self, subscription: &SubscriptionHandle) {
        subscription.unsubscribe();
    }

    /// Number of subscriptions
    ///
    /// # Errors
    ///
    /// `PlayerClosed` if the player was destroyed.
    pub async fn subscription_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SubscriptionCount { reply })?;
        rx.await.map_err(|_| CastError::PlayerClosed)
    }

    /// Subscribe to player events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PlayerState {
        *self.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<PlayerState> {
        self.state.clone()
    }

    /// Whether playback is paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == PlayerState::Paused
    }

    /// Whether the player was destroyed
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state() == PlayerState::Destroyed || self.commands.is_closed()
    }
}

impl std::fmt::Debug for TrackPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackPlayer")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// What woke the player task
enum Wake {
    Command(Option<Command>),
    Engine(EngineMessage),
    Load(LoadResult),
    Silence(u32),
}

struct PlayerTask {
    id: u64,
    config: PlayerConfig,
    factory: Arc<dyn EngineFactory>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: EventBus<PlayerEvent>,
    state: watch::Sender<PlayerState>,

    epoch: PlayEpoch,
    track: Option<Arc<Track>>,
    stream: Option<Stream>,
    engine: Option<Box<dyn DecodeEngine>>,
    generation: u64,
    engine_tx: mpsc::UnboundedSender<EngineMessage>,
    engine_rx: mpsc::UnboundedReceiver<EngineMessage>,
    load_tx: mpsc::UnboundedSender<LoadResult>,
    load_rx: mpsc::UnboundedReceiver<LoadResult>,

    subscriptions: Vec<Subscription>,
    silence: SilenceScheduler,
    last_error: Option<Instant>,
    volume: f32,
    destroyed: bool,
}

impl PlayerTask {
    fn new(
        id: u64,
        config: PlayerConfig,
        factory: Arc<dyn EngineFactory>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: EventBus<PlayerEvent>,
        state: watch::Sender<PlayerState>,
    ) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (load_tx, load_rx) = mpsc::unbounded_channel();
        let silence = SilenceScheduler::new(config.silence_interval, config.silence_frames);

        Self {
            id,
            config,
            factory,
            commands,
            events,
            state,
            epoch: PlayEpoch::default(),
            track: None,
            stream: None,
            engine: None,
            generation: 0,
            engine_tx,
            engine_rx,
            load_tx,
            load_rx,
            subscriptions: Vec::new(),
            silence,
            last_error: None,
            volume: 1.0,
            destroyed: false,
        }
    }

    async fn run(mut self) {
        tracing::debug!(player = self.id, "Player started");

        while !self.destroyed {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                Some(message) = self.engine_rx.recv() => Wake::Engine(message),
                Some(load) = self.load_rx.recv() => Wake::Load(load),
                remaining = self.silence.tick() => Wake::Silence(remaining),
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => self.destroy().await,
                Wake::Engine(message) => self.handle_engine(message).await,
                Wake::Load(load) => self.handle_load(load),
                Wake::Silence(remaining) => self.send_silence(remaining).await,
            }
        }

        tracing::debug!(player = self.id, "Player stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play(track) => self.play(track),
            Command::Start => self.start(None),
            Command::Cleanup => {
                self.abandon_load();
                self.destroy_engine();
                self.set_state(PlayerState::Idle);
            }
            Command::Destroy => self.destroy().await,
            Command::Control { op, reply } => {
                let _ = reply.send(self.control(op));
            }
            Command::Snapshot { reply } => {
                let snapshot = self
                    .engine
                    .as_deref()
                    .map(|engine| EngineSnapshot::of(engine))
                    .ok_or(CastError::NotPlaying);
                let _ = reply.send(snapshot);
            }
            Command::Subscribe { connection, reply } => {
                let _ = reply.send(self.subscribe(connection));
            }
            Command::Unsubscribe { id } => self.unsubscribe(id).await,
            Command::SubscriptionCount { reply } => {
                let _ = reply.send(self.subscriptions.len());
            }
        }
    }

    fn play(&mut self, track: Arc<Track>) {
        let epoch = self.epoch.advance();
        self.last_error = None;
        self.stream = None;
        self.destroy_engine();

        tracing::debug!(player = self.id, %epoch, track = %track.id, platform = %track.platform, "Playing track");
        self.track = Some(track);
        self.start(None);
    }

    /// Load streams for the current track in the background
    fn start(&mut self, resume_at: Option<f64>) {
        let Some(track) = self.track.clone() else {
            return;
        };

        let epoch = self.epoch;
        let tx = self.load_tx.clone();
        self.set_state(PlayerState::Loading);

        tokio::spawn(async move {
            let result = load(&track).await;
            let _ = tx.send(LoadResult {
                epoch,
                track,
                resume_at,
                result,
            });
        });
    }

    /// Retire any stream load still in flight without starting a new one
    fn abandon_load(&mut self) {
        let epoch = self.epoch.advance();
        tracing::trace!(player = self.id, %epoch, "Abandoning pending stream load");
    }

    fn handle_load(&mut self, load: LoadResult) {
        if !self.epoch.is_current(load.epoch) {
            tracing::trace!(player = self.id, stale = %load.epoch, current = %self.epoch, "Dropping stale stream load");
            return;
        }

        let loaded = match load.result {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(player = self.id, track = %load.track.id, error = %e, "Failed to load streams");
                self.set_state(PlayerState::Idle);
                self.emit(PlayerEvent::Error(Arc::new(e)));
                return;
            }
        };

        if loaded.fetched {
            load.track.set_streams(Some(loaded.streams));
        }
        self.stream = Some(loaded.stream);

        if let Err(e) = self.create_engine(&loaded.url, load.track.is_local_file(), load.resume_at) {
            tracing::warn!(player = self.id, error = %e, "Failed to start decode engine");
            self.set_state(PlayerState::Idle);
            self.emit(PlayerEvent::Error(Arc::new(e)));
        }
    }

    fn create_engine(&mut self, url: &str, is_file: bool, resume_at: Option<f64>) -> Result<()> {
        self.destroy_engine();

        self.generation += 1;
        let events = EngineEvents::new(self.generation, self.engine_tx.clone());
        let mut engine = self.factory.create(events);

        let volume = self.effective_volume(self.volume);
        if let Err(e) = configure(engine.as_mut(), &self.config, url, is_file, volume, resume_at) {
            engine.destroy();
            return Err(e);
        }

        tracing::debug!(player = self.id, generation = self.generation, resume_at, "Decode engine started");
        self.engine = Some(engine);
        self.set_state(PlayerState::Playing);
        Ok(())
    }

    /// Destroy the engine, sending the keepalive burst if one was running
    fn destroy_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            self.silence.arm();
            engine.destroy();
        }
    }

    fn effective_volume(&self, volume: f32) -> f32 {
        volume * self.stream.as_ref().map_or(1.0, |s| s.volume)
    }

    fn control(&mut self, op: Control) -> Result<()> {
        if matches!(op, Control::Stop) {
            self.abandon_load();
            if self.engine.is_none() {
                self.set_state(PlayerState::Idle);
            }
        }

        let stream_volume = self.effective_volume(1.0);
        let Some(engine) = self.engine.as_mut() else {
            return Err(CastError::NotPlaying);
        };

        let next_state = match op {
            Control::SetPaused(paused) => {
                if paused {
                    self.silence.arm();
                }
                engine.set_paused(paused)?;
                Some(if paused {
                    PlayerState::Paused
                } else {
                    PlayerState::Playing
                })
            }
            Control::SetVolume(volume) => {
                engine.set_volume(volume * stream_volume)?;
                self.volume = volume;
                None
            }
            Control::SetBitrate(bitrate) => {
                engine.set_bitrate(bitrate)?;
                None
            }
            Control::SetRate(rate) => {
                engine.set_rate(rate)?;
                None
            }
            Control::SetTempo(tempo) => {
                engine.set_tempo(tempo)?;
                None
            }
            Control::SetTremolo { depth, rate } => {
                engine.set_tremolo(depth, rate)?;
                None
            }
            Control::SetEqualizer(bands) => {
                engine.set_equalizer(&bands)?;
                None
            }
            Control::Seek(time) => {
                self.silence.arm();
                engine.seek(time)?;
                None
            }
            Control::Stop => {
                self.silence.arm();
                engine.stop()?;
                Some(PlayerState::Idle)
            }
        };

        if let Some(state) = next_state {
            self.set_state(state);
        }
        Ok(())
    }

    async fn handle_engine(&mut self, message: EngineMessage) {
        if self.engine.is_none() || message.generation != self.generation {
            tracing::trace!(player = self.id, generation = message.generation, "Dropping event from retired engine");
            return;
        }

        match message.event {
            EngineEvent::Ready => self.emit(PlayerEvent::Ready),
            EngineEvent::Packet { data, frame_size } => {
                self.silence.cancel();
                self.broadcast(&data, frame_size).await;
                self.emit(PlayerEvent::Packet { data, frame_size });
            }
            EngineEvent::Finish => {
                tracing::debug!(player = self.id, "Track finished");
                self.set_state(PlayerState::Idle);
                self.emit(PlayerEvent::Finish);
                self.silence.arm();
            }
            EngineEvent::Error {
                message,
                code,
                retryable,
            } => self.handle_engine_error(message, code, retryable),
            EngineEvent::Debug(message) => {
                tracing::debug!(player = self.id, "{message}");
                self.emit(PlayerEvent::Debug(message));
            }
        }
    }

    fn handle_engine_error(&mut self, message: String, code: i32, retryable: bool) {
        let now = Instant::now();
        let cooling_down = self
            .last_error
            .is_some_and(|at| now.duration_since(at) < self.config.error_cooldown);

        if !retryable || cooling_down {
            tracing::warn!(player = self.id, code, retryable, "{message}");
            self.abandon_load();
            self.destroy_engine();
            self.set_state(PlayerState::Idle);
            self.emit(PlayerEvent::Error(Arc::new(CastError::Decode {
                code,
                message,
                retryable,
            })));
            return;
        }

        self.last_error = Some(now);
        let position = self.engine.as_ref().map(|e| e.time());
        tracing::info!(player = self.id, code, ?position, "Retrying after decode error: {message}");

        if let Some(track) = &self.track {
            track.invalidate_streams();
        }
        self.stream = None;
        self.destroy_engine();
        self.start(position);
    }

    async fn broadcast(&mut self, frame: &[u8], frame_size: u32) {
        for subscription in &mut self.subscriptions {
            subscription.send(frame, frame_size).await;
        }
    }

    async fn send_silence(&mut self, remaining: u32) {
        self.broadcast(&SILENCE_FRAME, self.config.silence_frame_size)
            .await;

        if remaining == 0 {
            for subscription in &self.subscriptions {
                subscription.connection().set_speaking(false).await;
            }
        }
    }

    fn subscribe(&mut self, connection: Arc<VoiceConnection>) -> Result<u64> {
        if let Some(existing) = self
            .subscriptions
            .iter()
            .find(|s| Arc::ptr_eq(s.connection(), &connection))
        {
            return Ok(existing.id());
        }

        if self.config.exclusive_subscription && !self.subscriptions.is_empty() {
            return Err(CastError::Unsupported {
                message: "player sends through its engine and accepts a single subscription"
                    .to_string(),
            });
        }

        let subscription = Subscription::new(connection);
        let id = subscription.id();
        tracing::debug!(player = self.id, subscription = id, group = %subscription.connection().group_id(), "Subscribed connection");
        self.subscriptions.push(subscription);
        Ok(id)
    }

    async fn unsubscribe(&mut self, id: u64) {
        let Some(index) = self.subscriptions.iter().position(|s| s.id() == id) else {
            return;
        };

        let subscription = self.subscriptions.remove(index);
        subscription.connection().detach_subscription(id).await;
        tracing::debug!(player = self.id, subscription = id, "Unsubscribed connection");

        if self.subscriptions.is_empty() {
            self.destroy().await;
        }
    }

    async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        for subscription in std::mem::take(&mut self.subscriptions) {
            subscription
                .connection()
                .detach_subscription(subscription.id())
                .await;
        }

        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        self.silence.halt();
        self.track = None;
        self.stream = None;

        tracing::info!(player = self.id, "Player destroyed");
        self.set_state(PlayerState::Destroyed);
        self.emit(PlayerEvent::Destroyed);
    }

    fn set_state(&self, state: PlayerState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        if changed {
            tracing::trace!(player = self.id, %state, "Player state changed");
            self.emit(PlayerEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: PlayerEvent) {
        self.events.emit(event);
    }
}

/// Fetch (or reuse) streams, select one and resolve its URL
async fn load(track: &Track) -> Result<Loaded> {
    let (streams, fetched) = match track.fresh_streams() {
        Some(streams) => (streams, false),
        None => (track.get_streams().await?, true),
    };

    let stream = get_best_stream(&streams)
        .ok_or_else(|| CastError::unplayable("No streams found"))?;
    let url = stream.url.resolve().await?;

    Ok(Loaded {
        streams,
        fetched,
        stream,
        url,
    })
}

fn configure(
    engine: &mut dyn DecodeEngine,
    config: &PlayerConfig,
    url: &str,
    is_file: bool,
    volume: f32,
    resume_at: Option<f64>,
) -> Result<()> {
    engine.set_output(config.channels, config.sample_rate, config.bitrate)?;
    engine.set_url(url, is_file)?;
    engine.set_volume(volume)?;
    if let Some(time) = resume_at.filter(|t| *t > 0.0) {
        engine.seek(time)?;
    }
    engine.start()
}
