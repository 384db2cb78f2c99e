//! Relay shared state: the connection registry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use draw_together_core::config::RelayConfig;

use crate::rate_limit::ConnectionLimiter;

pub type ConnId = u64;

/// One registered participant as seen by the relay.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnId,
    pub peer: SocketAddr,
    /// Outbound queue drained by the connection's writer task.
    pub tx: mpsc::Sender<String>,
    /// Cancelled to force this connection closed, e.g. when its queue is full.
    pub kick: CancellationToken,
}

/// Shared relay state accessible from the accept loop and every connection.
pub struct RelayState {
    pub config: RelayConfig,
    pub connections: RwLock<HashMap<ConnId, ConnectionHandle>>,
    pub limiter: Option<ConnectionLimiter>,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        let limiter = config.max_connections_per_ip.map(ConnectionLimiter::new);
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            limiter,
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a connection and return its handle.
    pub async fn register(&self, peer: SocketAddr, tx: mpsc::Sender<String>) -> ConnectionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = ConnectionHandle {
            id,
            peer,
            tx,
            kick: CancellationToken::new(),
        };
        self.connections.write().await.insert(id, handle.clone());
        handle
    }

    /// Remove a connection. Dropping the handle closes its outbound queue.
    pub async fn unregister(&self, id: ConnId) -> Option<ConnectionHandle> {
        self.connections.write().await.remove(&id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Clone of the current registry, safe to iterate without holding the lock.
    pub async fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().await.values().cloned().collect()
    }
}
