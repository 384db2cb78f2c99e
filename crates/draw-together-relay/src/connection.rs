//! Connection lifecycle: register, read/write loops, teardown.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use draw_together_core::protocol::Notice;

use crate::events::broadcast;
use crate::metrics;
use crate::state::{ConnId, RelayState};

/// Why a connection was torn down.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its end.
    Eof,
    ReadFailed(std::io::Error),
    WriteFailed(std::io::Error),
    LineTooLong,
    IdleTimeout,
    /// The peer fell too far behind and its outbound queue filled up.
    QueueFull,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Eof => f.write_str("end of stream"),
            CloseReason::ReadFailed(e) => write!(f, "read failed: {e}"),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            CloseReason::LineTooLong => f.write_str("line exceeds maximum length"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::QueueFull => f.write_str("outbound queue full"),
        }
    }
}

type LineReader = FramedRead<OwnedReadHalf, AnyDelimiterCodec>;

/// Run one accepted connection until it closes.
///
/// The caller has already reserved the peer's slot in the limiter, if any;
/// it is released here on teardown.
pub async fn handle_connection(state: Arc<RelayState>, stream: TcpStream, peer: SocketAddr) {
    let (read_half, write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<String>(state.config.max_queue.max(1));

    let (conn_id, kick) = {
        let handle = state.register(peer, tx).await;
        (handle.id, handle.kick)
    };
    metrics::record_connect();
    info!(conn_id, %peer, "Client connected");

    if state.config.presence_notices {
        broadcast(&state, &Notice::Joined(peer.to_string()).to_string()).await;
    }

    // Writer task: drains this connection's queue onto the socket.
    let mut send_task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(write_half, LinesCodec::new());
        while let Some(line) = rx.recv().await {
            sink.send(line).await?;
        }
        Ok::<(), tokio_util::codec::LinesCodecError>(())
    });

    let mut lines = FramedRead::new(
        read_half,
        AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            state.config.max_line_length,
        ),
    );

    let reason = tokio::select! {
        reason = read_loop(&state, conn_id, &mut lines) => reason,
        _ = kick.cancelled() => CloseReason::QueueFull,
        joined = &mut send_task => match joined {
            Ok(Ok(())) => CloseReason::Eof,
            Ok(Err(e)) => CloseReason::WriteFailed(std::io::Error::other(e)),
            Err(e) => CloseReason::WriteFailed(std::io::Error::other(e)),
        },
    };

    send_task.abort();
    teardown(&state, conn_id, peer, reason).await;
}

/// Forward every line read from the peer to the whole registry, in order.
async fn read_loop(state: &RelayState, conn_id: ConnId, lines: &mut LineReader) -> CloseReason {
    let idle = state.config.idle_timeout_secs.map(Duration::from_secs);

    loop {
        let next = match idle {
            Some(limit) => match tokio::time::timeout(limit, lines.next()).await {
                Ok(next) => next,
                Err(_) => return CloseReason::IdleTimeout,
            },
            None => lines.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                let raw = String::from_utf8_lossy(&chunk);
                let line = raw.strip_suffix('\r').unwrap_or(&*raw);
                debug!(conn_id, len = line.len(), "Relaying line");
                broadcast(state, line).await;
            }
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                return CloseReason::LineTooLong;
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => return CloseReason::ReadFailed(e),
            None => return CloseReason::Eof,
        }
    }
}

async fn teardown(state: &RelayState, conn_id: ConnId, peer: SocketAddr, reason: CloseReason) {
    if let Some(limiter) = &state.limiter {
        limiter.release(peer.ip());
    }
    state.unregister(conn_id).await;
    metrics::record_disconnect();

    match &reason {
        CloseReason::Eof => info!(conn_id, %peer, "Client disconnected"),
        other => warn!(conn_id, %peer, reason = %other, "Connection closed"),
    }

    if state.config.presence_notices {
        broadcast(state, &Notice::Left(peer.to_string()).to_string()).await;
    }
}
