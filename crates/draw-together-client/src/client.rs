//! Relay connection driving a local [`Session`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use draw_together_core::protocol::{ColorSpec, Event};
use draw_together_core::render::Renderer;
use draw_together_core::session::Session;

use crate::error::{ClientError, Result};

/// Longest line accepted from the relay; longer lines are skipped.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A participant connected to a relay.
///
/// Local pointer actions paint immediately and are sent to the relay. Once
/// the connection is lost they still paint locally but return
/// [`ClientError::Disconnected`]; there is no reconnection.
pub struct Client<R: Renderer + 'static> {
    session: Arc<Mutex<Session<R>>>,
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl<R: Renderer + 'static> Client<R> {
    /// Dial the relay with a fresh session around `renderer`.
    pub async fn connect(addr: &str, renderer: R) -> Result<Self> {
        Self::connect_with_session(addr, Session::new(renderer)).await
    }

    pub async fn connect_with_session(addr: &str, session: Session<R>) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%e, "Could not set TCP_NODELAY");
        }
        let local_addr = stream.local_addr()?;
        info!(server = addr, local = %local_addr, "Connected to relay");

        let (read_half, write_half) = stream.into_split();
        let session = Arc::new(Mutex::new(session));
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(read_half, session.clone(), connected.clone()));

        Ok(Self {
            session,
            sink: FramedWrite::new(write_half, LinesCodec::new()),
            connected,
            reader,
            local_addr,
        })
    }

    /// Our address as the relay sees it.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Shared session, for inspecting the surface or its renderer.
    pub fn session(&self) -> Arc<Mutex<Session<R>>> {
        self.session.clone()
    }

    pub async fn pointer_down(&mut self, x: f64, y: f64) -> Result<()> {
        let event = self.session.lock().await.pointer_down(x, y);
        self.send_opt(event).await
    }

    pub async fn pointer_move(&mut self, x: f64, y: f64) -> Result<()> {
        let event = self.session.lock().await.pointer_move(x, y);
        self.send_opt(event).await
    }

    pub async fn pointer_up(&mut self) {
        self.session.lock().await.pointer_up();
    }

    pub async fn clear(&mut self) -> Result<()> {
        let event = self.session.lock().await.clear();
        self.send(&event).await
    }

    pub async fn set_ink(&mut self, ink: ColorSpec) {
        self.session.lock().await.set_ink(ink);
    }

    pub async fn set_eraser(&mut self, on: bool) {
        self.session.lock().await.set_eraser(on);
    }

    pub async fn set_width(&mut self, width: f64) {
        self.session.lock().await.set_width(width);
    }

    async fn send_opt(&mut self, event: Option<Event>) -> Result<()> {
        match event {
            Some(event) => self.send(&event).await,
            None => Ok(()),
        }
    }

    /// Write one event to the relay.
    pub async fn send(&mut self, event: &Event) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }
        let line = event.to_string();
        debug!(%line, "Sending");
        if let Err(e) = self.sink.send(line).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(match e {
                LinesCodecError::Io(e) => ClientError::Io(e),
                other => ClientError::Io(std::io::Error::other(other)),
            });
        }
        Ok(())
    }

    /// Close the connection and hand back the session.
    pub async fn close(mut self) -> Arc<Mutex<Session<R>>> {
        if let Err(e) = SinkExt::<String>::close(&mut self.sink).await {
            debug!(%e, "Closing relay connection failed");
        }
        self.connected.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.session.clone()
    }
}

impl<R: Renderer + 'static> Drop for Client<R> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Apply every line from the relay until the stream ends.
async fn read_loop<R: Renderer>(
    read_half: OwnedReadHalf,
    session: Arc<Mutex<Session<R>>>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    let reason = loop {
        match lines.next().await {
            Some(Ok(line)) => {
                session.lock().await.apply_line(&line);
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(limit = MAX_LINE_LENGTH, "Skipping over-long line from relay");
            }
            Some(Err(LinesCodecError::Io(e))) => break format!("Disconnected from server: {e}"),
            None => break "Disconnected from server.".to_string(),
        }
    };

    connected.store(false, Ordering::SeqCst);
    warn!(%reason, "Relay connection lost");
    session.lock().await.renderer_mut().connection_lost(&reason);
}
