//! Line broadcasting to all registered connections.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::metrics;
use crate::state::RelayState;

/// Queue `line` for every registered connection, the sender included.
///
/// Works on a snapshot of the registry, so connections joining or leaving
/// meanwhile never disturb delivery to the rest. A closed queue means that
/// connection is already tearing down; it is skipped. A full queue means the
/// peer stopped reading; that connection is kicked and the line is dropped
/// for it alone. Returns how many connections the line was queued for.
pub async fn broadcast(state: &RelayState, line: &str) -> usize {
    let targets = state.snapshot().await;

    let mut sent = 0;
    for conn in &targets {
        match conn.tx.try_send(line.to_string()) {
            Ok(()) => sent += 1,
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = conn.id, peer = %conn.peer, "Outbound queue full, dropping slow connection");
                conn.kick.cancel();
                metrics::record_dropped_delivery();
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = conn.id, peer = %conn.peer, "Skipping closed connection");
                metrics::record_dropped_delivery();
            }
        }
    }
    metrics::record_line_relayed(sent);
    debug!(sent, total = targets.len(), "Broadcast line");
    sent
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use draw_together_core::config::RelayConfig;
    use tokio::sync::mpsc;

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let state = RelayState::new(RelayConfig::default());
        let mut receivers = Vec::new();
        for port in 1..=3 {
            let (tx, rx) = mpsc::channel(32);
            state.register(addr(port), tx).await;
            receivers.push(rx);
        }

        assert_eq!(broadcast(&state, "CLEAR").await, 3);
        for rx in &mut receivers {
            assert_eq!(rx.recv().await.as_deref(), Some("CLEAR"));
        }
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_receiver() {
        let state = RelayState::new(RelayConfig::default());
        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, rx_b) = mpsc::channel(32);
        let (tx_c, mut rx_c) = mpsc::channel(32);
        state.register(addr(1), tx_a).await;
        state.register(addr(2), tx_b).await;
        state.register(addr(3), tx_c).await;

        // B's writer is gone but B is still registered.
        drop(rx_b);

        assert_eq!(broadcast(&state, "START 1.00 1.00 ERASER 2.00").await, 2);
        assert_eq!(broadcast(&state, "CLEAR").await, 2);
        assert_eq!(rx_a.recv().await.as_deref(), Some("START 1.00 1.00 ERASER 2.00"));
        assert_eq!(rx_a.recv().await.as_deref(), Some("CLEAR"));
        assert_eq!(rx_c.recv().await.as_deref(), Some("START 1.00 1.00 ERASER 2.00"));
        assert_eq!(rx_c.recv().await.as_deref(), Some("CLEAR"));
    }

    #[tokio::test]
    async fn test_full_queue_kicks_only_that_connection() {
        let state = RelayState::new(RelayConfig::default());
        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        state.register(addr(1), tx_a).await;
        let slow = state.register(addr(2), tx_slow).await;

        assert_eq!(broadcast(&state, "CLEAR").await, 2);
        assert!(!slow.kick.is_cancelled());

        assert_eq!(broadcast(&state, "DRAW 1.00 1.00 ERASER 2.00").await, 1);
        assert!(slow.kick.is_cancelled());
        assert_eq!(rx_a.recv().await.as_deref(), Some("CLEAR"));
        assert_eq!(rx_a.recv().await.as_deref(), Some("DRAW 1.00 1.00 ERASER 2.00"));
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let state = RelayState::new(RelayConfig::default());
        assert_eq!(broadcast(&state, "CLEAR").await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_preserves_sender_order() {
        let state = RelayState::new(RelayConfig::default());
        let (tx, mut rx) = mpsc::channel(32);
        state.register(addr(1), tx).await;

        for i in 0..20 {
            broadcast(&state, &format!("DRAW {i}.00 0.00 ERASER 1.00")).await;
        }
        for i in 0..20 {
            assert_eq!(
                rx.recv().await.unwrap(),
                format!("DRAW {i}.00 0.00 ERASER 1.00")
            );
        }
    }
}
