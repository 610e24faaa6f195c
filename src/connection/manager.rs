//! Voice connection state machine

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, MutexGuard, RwLock, broadcast, mpsc, watch};

use super::gateway::{ChannelTarget, GatewayEvent, GatewayLink, GroupId, VoiceGateway};
use super::registry::ConnectionRegistry;
use super::session::ConnectionSession;
use super::state::{ConnectionEvent, ConnectionState, ConnectionStats, DisconnectReason};
use crate::error::{CastError, ConnectError, Result};
use crate::events::EventBus;
use crate::playback::SubscriptionHandle;
use crate::types::ConnectionConfig;

/// Outcome of a readiness wait; `None` while still pending
type WaitOutcome = Option<std::result::Result<(), ConnectError>>;

/// The single outstanding readiness wait
struct PendingWait {
    id: u64,
    tx: watch::Sender<WaitOutcome>,
}

/// Voice connection to one channel of a group
///
/// Driven by the gateway's event stream. At most one readiness wait is
/// outstanding; every caller awaiting readiness shares it.
pub struct VoiceConnection {
    /// Group this connection belongs to (never changes)
    group_id: GroupId,
    /// Configuration
    config: ConnectionConfig,
    /// Outbound gateway operations
    gateway: Arc<dyn VoiceGateway>,
    /// Desired channel
    target: RwLock<ChannelTarget>,
    /// Current state
    state: watch::Sender<ConnectionState>,
    /// Transport session, present while ready
    session: Mutex<Option<ConnectionSession>>,
    /// Outstanding readiness wait
    wait: Mutex<Option<PendingWait>>,
    next_wait_id: AtomicU64,
    /// Last speaking flag sent to the gateway
    speaking: AtomicBool,
    /// Subscription of this connection to a player
    subscription: Mutex<Option<SubscriptionHandle>>,
    /// Connection statistics
    stats: RwLock<ConnectionStats>,
    /// Event bus
    events: EventBus<ConnectionEvent>,
    /// Registry to detach from on destroy
    registry: Weak<ConnectionRegistry>,
}

impl VoiceConnection {
    /// Create a connection in `Signalling` and start consuming gateway events
    ///
    /// Must be called within a tokio runtime. Joining is requested separately
    /// with [`VoiceConnection::begin`].
    #[must_use]
    pub fn new(
        target: ChannelTarget,
        link: GatewayLink,
        config: ConnectionConfig,
        registry: Weak<ConnectionRegistry>,
    ) -> Arc<Self> {
        let GatewayLink { gateway, events } = link;
        let (state, _) = watch::channel(ConnectionState::Signalling);
        let bus = EventBus::new(config.event_capacity);

        let conn = Arc::new(Self {
            group_id: target.group_id,
            config,
            gateway,
            target: RwLock::new(target),
            state,
            session: Mutex::new(None),
            wait: Mutex::new(None),
            next_wait_id: AtomicU64::new(1),
            speaking: AtomicBool::new(false),
            subscription: Mutex::new(None),
            stats: RwLock::new(ConnectionStats::default()),
            events: bus,
            registry,
        });

        Self::spawn_event_pump(&conn, events);
        conn
    }

    fn spawn_event_pump(conn: &Arc<Self>, mut events: mpsc::UnboundedReceiver<GatewayEvent>) {
        let weak = Arc::downgrade(conn);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(conn) = weak.upgrade() else {
                    return;
                };
                conn.handle_event(event).await;
                if conn.is_destroyed() {
                    return;
                }
            }

            // The adapter dropped its end
            if let Some(conn) = weak.upgrade() {
                if !conn.is_destroyed() {
                    conn.handle_event(GatewayEvent::Disconnected(
                        DisconnectReason::AdapterUnavailable,
                    ))
                    .await;
                }
            }
        });
    }

    /// Group this connection belongs to
    #[must_use]
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Desired channel
    pub async fn target(&self) -> ChannelTarget {
        self.target.read().await.clone()
    }

    /// Get current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch state transitions
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether packets can be sent
    #[must_use]
    pub fn ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Whether the connection reached its terminal state
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().is_destroyed()
    }

    /// Last speaking flag sent
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Get connection statistics
    pub async fn stats(&self) -> ConnectionStats {
        self.stats.read().await.clone()
    }

    /// Subscribe to connection events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Lock the transport session
    ///
    /// `None` unless the connection is ready. Holding the guard serializes
    /// counter updates with other senders.
    pub async fn session(&self) -> MutexGuard<'_, Option<ConnectionSession>> {
        self.session.lock().await
    }

    /// Ask the gateway to join the current target
    ///
    /// # Errors
    ///
    /// Returns the gateway's error; the connection is destroyed in that case.
    pub async fn begin(self: &Arc<Self>) -> Result<()> {
        let target = self.target().await;
        tracing::debug!(group = %self.group_id, channel = %target.channel_id, "Joining voice channel");

        if let Err(e) = self.gateway.join(&target, &self.config).await {
            tracing::warn!(group = %self.group_id, error = %e, "Join request failed");
            self.destroy(false).await;
            return Err(e);
        }
        Ok(())
    }

    /// Move to another channel of the same group without tearing down
    ///
    /// # Errors
    ///
    /// `DifferentGroup` if `target` belongs to another group, `ChannelFull` or
    /// `NoPermissions` if it cannot be joined, `Connection(Destroyed)` if the
    /// connection is gone, or the gateway's error.
    pub async fn rejoin(&self, target: ChannelTarget) -> Result<()> {
        if target.group_id != self.group_id {
            return Err(CastError::DifferentGroup);
        }
        target.check_joinable()?;
        if self.is_destroyed() {
            return Err(ConnectError::Destroyed.into());
        }

        tracing::debug!(group = %self.group_id, channel = %target.channel_id, "Moving voice connection");
        *self.target.write().await = target.clone();
        self.gateway.join(&target, &self.config).await
    }

    /// Wait until the connection is ready
    ///
    /// # Errors
    ///
    /// `Connection(Timeout)` if not ready within the configured timeout,
    /// otherwise the failure that ended the wait.
    pub async fn wait_ready(self: &Arc<Self>) -> Result<()> {
        let mut rx = self.await_connection().await;
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ConnectError::Destroyed.into()),
        }
    }

    /// Start (or join) the readiness wait
    ///
    /// The returned receiver holds `Some` once the wait settles.
    pub(crate) async fn await_connection(self: &Arc<Self>) -> watch::Receiver<WaitOutcome> {
        let mut wait = self.wait.lock().await;

        match &*self.state.borrow() {
            ConnectionState::Ready => return watch::channel(Some(Ok(()))).1,
            ConnectionState::Destroyed => return watch::channel(Some(Err(ConnectError::Destroyed))).1,
            _ => {}
        }

        if let Some(pending) = wait.as_ref() {
            return pending.tx.subscribe();
        }

        let id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        *wait = Some(PendingWait { id, tx });

        let weak = Arc::downgrade(self);
        let timeout = self.config.ready_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(conn) = weak.upgrade() {
                conn.expire_wait(id).await;
            }
        });

        tracing::trace!(group = %self.group_id, wait = id, "Waiting for connection");
        rx
    }

    async fn expire_wait(self: &Arc<Self>, id: u64) {
        let current = self.wait.lock().await.as_ref().map(|w| w.id);
        if current == Some(id) {
            tracing::debug!(group = %self.group_id, "Timed out waiting for connection");
            self.fail(ConnectError::Timeout).await;
        }
    }

    /// Settle the pending wait
    ///
    /// Returns `None` if nothing was pending, otherwise whether any caller was
    /// listening.
    async fn settle(&self, outcome: std::result::Result<(), ConnectError>) -> Option<bool> {
        let pending = self.wait.lock().await.take()?;
        let observed = pending.tx.receiver_count() > 0;
        pending.tx.send_replace(Some(outcome));
        Some(observed)
    }

    /// Deliver a failure to the waiter, or emit it, then tear down
    async fn fail(self: &Arc<Self>, error: ConnectError) {
        if self.settle(Err(error.clone())).await != Some(true) {
            tracing::warn!(group = %self.group_id, error = %error, "Voice connection failed");
            self.events.emit(ConnectionEvent::Error {
                error: error.clone(),
            });
        }
        self.stats.write().await.last_error = Some(error.to_string());

        let adapter_available = !matches!(
            error,
            ConnectError::Disconnected(DisconnectReason::AdapterUnavailable)
        );
        self.destroy(adapter_available).await;
    }

    /// Apply one gateway event
    pub(crate) async fn handle_event(self: &Arc<Self>, event: GatewayEvent) {
        if self.is_destroyed() {
            return;
        }

        match event {
            GatewayEvent::Signalling => self.set_state(ConnectionState::Signalling).await,
            GatewayEvent::Connecting => self.set_state(ConnectionState::Connecting).await,
            GatewayEvent::Ready(description) => match ConnectionSession::new(&description) {
                Ok(session) => {
                    tracing::debug!(group = %self.group_id, ?session, "Voice session established");
                    *self.session.lock().await = Some(session);
                    self.set_state(ConnectionState::Ready).await;
                }
                Err(e) => self.fail(ConnectError::Networking(e.to_string())).await,
            },
            GatewayEvent::Disconnected(reason) => {
                *self.session.lock().await = None;
                self.speaking.store(false, Ordering::Release);
                self.set_state(ConnectionState::Disconnected(reason)).await;
            }
            GatewayEvent::ChannelUpdate { channel_id: None } => {
                tracing::debug!(group = %self.group_id, "Removed from voice channel");
                self.destroy(true).await;
            }
            GatewayEvent::ChannelUpdate {
                channel_id: Some(channel_id),
            } => {
                self.target.write().await.channel_id = channel_id;
            }
            GatewayEvent::NetworkingError(message) => {
                self.fail(ConnectError::Networking(message)).await;
            }
        }
    }

    /// Set connection state and react to it
    async fn set_state(self: &Arc<Self>, new_state: ConnectionState) {
        let old_state = self.state.send_replace(new_state.clone());
        if old_state == new_state {
            return;
        }

        tracing::debug!(group = %self.group_id, from = %old_state, to = %new_state, "Voice connection state changed");
        self.events.emit(ConnectionEvent::StateChanged {
            old: old_state.clone(),
            new: new_state.clone(),
        });

        match new_state {
            ConnectionState::Ready => {
                {
                    let mut stats = self.stats.write().await;
                    if stats.connected_at.is_some() {
                        stats.reconnects += 1;
                    }
                    stats.connected_at = Some(std::time::Instant::now());
                }
                if let Err(e) = self.gateway.set_receive(self.config.receive_audio).await {
                    tracing::warn!(group = %self.group_id, error = %e, "Failed to announce receive mode");
                }
                self.settle(Ok(())).await;
            }
            ConnectionState::Disconnected(reason) if reason.is_recoverable() => {
                tracing::info!(group = %self.group_id, %reason, "Voice transport closed, rejoining");
                drop(self.await_connection().await);
                let target = self.target().await;
                if let Err(e) = self.gateway.join(&target, &self.config).await {
                    self.fail(ConnectError::Networking(e.to_string())).await;
                }
            }
            ConnectionState::Disconnected(reason) => {
                self.fail(ConnectError::Disconnected(reason)).await;
            }
            _ => {}
        }
    }

    /// Tear the connection down; later calls do nothing
    ///
    /// With `adapter_available`, an orderly leave is sent to the gateway
    /// first.
    pub async fn destroy(&self, adapter_available: bool) {
        if self.is_destroyed() {
            return;
        }

        if adapter_available {
            if let Err(e) = self.gateway.leave().await {
                tracing::debug!(group = %self.group_id, error = %e, "Leave request failed");
            }
        }

        // A concurrent destroy may have finished during the leave
        let old_state = self.state.send_replace(ConnectionState::Destroyed);
        if old_state.is_destroyed() {
            return;
        }

        tracing::info!(group = %self.group_id, "Voice connection destroyed");
        *self.session.lock().await = None;
        self.speaking.store(false, Ordering::Release);
        self.events.emit(ConnectionEvent::StateChanged {
            old: old_state,
            new: ConnectionState::Destroyed,
        });
        self.settle(Err(ConnectError::Destroyed)).await;

        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self).await;
        }
    }

    /// Update the speaking flag, telling the gateway only on change
    pub async fn set_speaking(&self, speaking: bool) {
        if self.speaking.swap(speaking, Ordering::AcqRel) == speaking {
            return;
        }
        if let Err(e) = self.gateway.set_speaking(speaking).await {
            tracing::debug!(group = %self.group_id, error = %e, "Failed to update speaking state");
        }
    }

    /// Send one datagram through the voice transport
    ///
    /// # Errors
    ///
    /// Returns the gateway's send error.
    pub async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.gateway.send(datagram).await?;
        self.stats.write().await.record_sent(datagram.len());
        Ok(())
    }

    /// Record the player subscription of this connection
    ///
    /// A subscription to a different player replaces the current one, which
    /// is unsubscribed.
    pub(crate) async fn attach_subscription(&self, handle: SubscriptionHandle) {
        if self.is_destroyed() {
            handle.unsubscribe();
            return;
        }

        let previous = self.subscription.lock().await.replace(handle.clone());
        if let Some(previous) = previous {
            if previous.id() != handle.id() {
                tracing::debug!(group = %self.group_id, "Replacing player subscription");
                previous.unsubscribe();
            }
        }
    }

    /// Forget the subscription `id` if it is the current one
    pub(crate) async fn detach_subscription(&self, id: u64) {
        let mut slot = self.subscription.lock().await;
        if slot.as_ref().is_some_and(|s| s.id() == id) {
            *slot = None;
        }
    }

    /// Current player subscription
    pub async fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription.lock().await.clone()
    }
}

impl std::fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConnection")
            .field("group_id", &self.group_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
