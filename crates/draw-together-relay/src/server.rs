//! TCP accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::connection::handle_connection;
use crate::error::RelayError;
use crate::health;
use crate::metrics;
use crate::state::RelayState;

/// Bind `addr` and run the relay until Ctrl-C.
///
/// Also starts the health endpoint when `health_port` is configured.
pub async fn start_relay(state: Arc<RelayState>, addr: &str) -> Result<(), RelayError> {
    let listener = bind(addr).await?;
    info!("Relay listening on {}", listener.local_addr()?);

    if let Some(port) = state.config.health_port {
        let host = state.config.bind.as_deref().unwrap_or("0.0.0.0");
        let health_addr = spawn_health_server(state.clone(), &format!("{host}:{port}")).await?;
        info!("Health endpoint at http://{health_addr}/health");
    }

    serve_with_shutdown(state, listener, shutdown_signal()).await
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Each connection runs in its own task. A failed accept is logged and the
/// loop carries on.
pub async fn serve_with_shutdown<F>(
    state: Arc<RelayState>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), RelayError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Some(limiter) = &state.limiter {
                        if !limiter.try_acquire(peer.ip()) {
                            metrics::record_rejected();
                            drop(stream);
                            continue;
                        }
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, %e, "Could not set TCP_NODELAY");
                    }
                    tokio::spawn(handle_connection(state.clone(), stream, peer));
                }
                Err(e) => {
                    warn!(%e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    Ok(())
}

/// Bind and serve the health router in the background; returns the bound address.
pub async fn spawn_health_server(
    state: Arc<RelayState>,
    addr: &str,
) -> Result<SocketAddr, RelayError> {
    let listener = bind(addr).await?;
    let local = listener.local_addr()?;
    let app = health::router(state);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(%e, "Health endpoint stopped");
        }
    });

    Ok(local)
}

async fn bind(addr: &str) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to install Ctrl-C handler; relay will run until killed");
        std::future::pending::<()>().await;
    }
}
