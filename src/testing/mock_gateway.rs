//! Mock voice gateway for testing connections and the send path
//!
//! Records every outbound call and lets tests inject gateway events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connection::{
    ChannelTarget, EncryptionMode, GatewayConnector, GatewayEvent, GatewayLink, GroupId,
    SessionDescription, VoiceGateway,
};
use crate::error::{CastError, Result};
use crate::types::ConnectionConfig;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session description for tests
#[must_use]
pub fn test_session(secret_key: [u8; 32], mode: EncryptionMode, ssrc: u32) -> SessionDescription {
    SessionDescription {
        secret_key,
        mode: mode.as_str().to_string(),
        ssrc,
    }
}

/// Outbound call recorded by [`MockGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// Join or move request
    Join(ChannelTarget),
    /// Orderly leave
    Leave,
    /// Receive-mode announcement
    SetReceive(bool),
    /// Speaking indicator update
    SetSpeaking(bool),
    /// Datagram sent
    Send(Vec<u8>),
}

/// Mock gateway
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    events: mpsc::UnboundedSender<GatewayEvent>,
    auto_ready: Mutex<Option<SessionDescription>>,
    fail_join: AtomicBool,
}

impl MockGateway {
    /// Create a gateway and the link a connection consumes
    #[must_use]
    pub fn new() -> (Arc<Self>, GatewayLink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            events: tx,
            auto_ready: Mutex::new(None),
            fail_join: AtomicBool::new(false),
        });
        let link = GatewayLink {
            gateway: gateway.clone(),
            events: rx,
        };
        (gateway, link)
    }

    /// Report `Connecting` then `Ready` whenever a join is requested
    pub fn set_auto_ready(&self, description: Option<SessionDescription>) {
        *lock(&self.auto_ready) = description;
    }

    /// Make join requests fail
    pub fn set_fail_join(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }

    /// Inject a gateway event
    ///
    /// Returns false if the connection stopped listening.
    pub fn emit(&self, event: GatewayEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Inject `Connecting` followed by `Ready`
    pub fn make_ready(&self, description: SessionDescription) -> bool {
        self.emit(GatewayEvent::Connecting) && self.emit(GatewayEvent::Ready(description))
    }

    /// All recorded calls, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Datagrams sent, oldest first
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Send(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Join requests, oldest first
    #[must_use]
    pub fn joins(&self) -> Vec<ChannelTarget> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Join(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of leave requests
    #[must_use]
    pub fn leave_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, GatewayCall::Leave))
            .count()
    }

    /// Speaking updates, oldest first
    #[must_use]
    pub fn speaking_updates(&self) -> Vec<bool> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                GatewayCall::SetSpeaking(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl VoiceGateway for MockGateway {
    async fn join(&self, target: &ChannelTarget, _config: &ConnectionConfig) -> Result<()> {
        self.record(GatewayCall::Join(target.clone()));
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(CastError::Network {
                message: "gateway unavailable".to_string(),
                source: None,
            });
        }

        let ready = lock(&self.auto_ready).clone();
        if let Some(description) = ready {
            self.make_ready(description);
        }
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.record(GatewayCall::Leave);
        Ok(())
    }

    async fn set_receive(&self, receive: bool) -> Result<()> {
        self.record(GatewayCall::SetReceive(receive));
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) -> Result<()> {
        self.record(GatewayCall::SetSpeaking(speaking));
        Ok(())
    }

    async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.record(GatewayCall::Send(datagram.to_vec()));
        Ok(())
    }
}

/// Connector handing out [`MockGateway`]s
#[derive(Default)]
pub struct MockConnector {
    gateways: Mutex<HashMap<GroupId, Arc<MockGateway>>>,
    auto_ready: Option<SessionDescription>,
    opened: AtomicUsize,
}

impl MockConnector {
    /// Connector whose gateways never become ready on their own
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connector whose gateways become ready as soon as a join is requested
    #[must_use]
    pub fn auto_ready(description: SessionDescription) -> Arc<Self> {
        Arc::new(Self {
            auto_ready: Some(description),
            ..Self::default()
        })
    }

    /// Most recent gateway opened for `group`
    #[must_use]
    pub fn gateway(&self, group: GroupId) -> Option<Arc<MockGateway>> {
        lock(&self.gateways).get(&group).cloned()
    }

    /// Number of gateways opened
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl GatewayConnector for MockConnector {
    fn open(&self, group: GroupId) -> GatewayLink {
        let (gateway, link) = MockGateway::new();
        gateway.set_auto_ready(self.auto_ready.clone());
        lock(&self.gateways).insert(group, gateway);
        self.opened.fetch_add(1, Ordering::SeqCst);
        link
    }
}
