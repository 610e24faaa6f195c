//! Per-group registry of voice connections

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;

use super::gateway::{ChannelTarget, GatewayConnector, GroupId};
use super::manager::VoiceConnection;
use crate::error::Result;
use crate::types::ConnectionConfig;

/// Holds at most one voice connection per group
pub struct ConnectionRegistry {
    connector: Arc<dyn GatewayConnector>,
    config: ConnectionConfig,
    connections: Mutex<HashMap<GroupId, Arc<VoiceConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(connector: Arc<dyn GatewayConnector>, config: ConnectionConfig) -> Arc<Self> {
        Arc::new(Self {
            connector,
            config,
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Connect to `target` and wait until the connection is ready
    ///
    /// Reuses the group's existing connection, moving it if the channel
    /// differs.
    ///
    /// # Errors
    ///
    /// `ChannelFull` or `NoPermissions` if the target cannot be joined, or
    /// the failure that ended the readiness wait.
    pub async fn connect(self: &Arc<Self>, target: ChannelTarget) -> Result<Arc<VoiceConnection>> {
        target.check_joinable()?;

        let (conn, created) = {
            let mut connections = self.connections.lock().await;
            match connections.get(&target.group_id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let link = self.connector.open(target.group_id);
                    let conn = VoiceConnection::new(
                        target.clone(),
                        link,
                        self.config.clone(),
                        Arc::downgrade(self),
                    );
                    connections.insert(target.group_id, conn.clone());
                    (conn, true)
                }
            }
        };

        if created {
            conn.begin().await?;
        } else if conn.target().await.channel_id != target.channel_id {
            conn.rejoin(target).await?;
        }

        conn.wait_ready().await?;
        Ok(conn)
    }

    /// Connection of `group`, if any
    pub async fn get(&self, group: GroupId) -> Option<Arc<VoiceConnection>> {
        self.connections.lock().await.get(&group).cloned()
    }

    /// Destroy the connection of `group`
    ///
    /// Returns whether one existed.
    pub async fn disconnect(&self, group: GroupId) -> bool {
        let conn = self.get(group).await;
        match conn {
            Some(conn) => {
                conn.destroy(true).await;
                true
            }
            None => false,
        }
    }

    /// Destroy every registered connection
    pub async fn disconnect_all(&self) {
        let connections: Vec<_> = self.connections.lock().await.values().cloned().collect();
        if connections.is_empty() {
            return;
        }

        tracing::info!(count = connections.len(), "Disconnecting all voice connections");
        join_all(connections.iter().map(|conn| conn.destroy(true))).await;
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Whether no connection is registered
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Remove `conn` if it is still the group's registered connection
    pub(crate) async fn detach(&self, conn: &VoiceConnection) {
        let mut connections = self.connections.lock().await;
        if connections
            .get(&conn.group_id())
            .is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), conn))
        {
            connections.remove(&conn.group_id());
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
