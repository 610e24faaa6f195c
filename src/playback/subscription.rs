use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::player::Command;
use crate::connection::VoiceConnection;
use crate::transport::PacketTransport;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// A connection receiving a player's frames, with its own send path
pub(crate) struct Subscription {
    id: u64,
    connection: Arc<VoiceConnection>,
    transport: PacketTransport,
}

impl Subscription {
    pub(crate) fn new(connection: Arc<VoiceConnection>) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed),
            connection,
            transport: PacketTransport::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn connection(&self) -> &Arc<VoiceConnection> {
        &self.connection
    }

    /// Send one frame; not-ready connections are skipped
    pub(crate) async fn send(&mut self, frame: &[u8], frame_size: u32) -> bool {
        match self
            .transport
            .send_frame(&self.connection, frame, frame_size)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(
                    group = %self.connection.group_id(),
                    error = %e,
                    "Failed to send frame"
                );
                false
            }
        }
    }
}

/// Handle to a player subscription
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    player_id: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, player_id: u64, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            id,
            player_id,
            commands,
        }
    }

    /// Process-unique subscription id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the owning player
    #[must_use]
    pub fn player_id(&self) -> u64 {
        self.player_id
    }

    /// Remove the subscription; the player is destroyed if it was the last
    pub fn unsubscribe(&self) {
        let _ = self.commands.send(Command::Unsubscribe { id: self.id });
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("player_id", &self.player_id)
            .finish()
    }
}
