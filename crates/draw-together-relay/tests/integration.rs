//! Relay integration tests: a real relay on a loopback port, raw TCP clients.
//!
//! Run with: `cargo test -p draw-together-relay --test integration`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use draw_together_core::config::RelayConfig;
use draw_together_core::render::{RecordingRenderer, RenderOp};
use draw_together_core::session::{Applied, Session};
use draw_together_core::{ColorSpec, Notice, Pen};
use draw_together_relay::RelayState;

const WAIT: Duration = Duration::from_secs(5);

fn quiet_config() -> RelayConfig {
    RelayConfig {
        presence_notices: false,
        ..RelayConfig::default()
    }
}

/// Start a relay on an ephemeral loopback port.
async fn start_test_relay(config: RelayConfig) -> (Arc<RelayState>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(RelayState::new(config));

    let state_clone = state.clone();
    tokio::spawn(async move {
        let _ = draw_together_relay::serve_with_shutdown(
            state_clone,
            listener,
            std::future::pending(),
        )
        .await;
    });

    (state, addr)
}

/// Wait until the relay has registered exactly `n` connections.
async fn wait_for_connections(state: &RelayState, n: usize) {
    for _ in 0..100 {
        if state.connection_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "expected {n} connections, relay has {}",
        state.connection_count().await
    );
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    local: SocketAddr,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let local = stream.local_addr().unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
            local,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> String {
        tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read failed")
            .expect("stream closed")
    }

    /// True once the relay has closed this connection.
    async fn closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(WAIT, self.lines.next_line()).await,
            Ok(Ok(None)) | Ok(Err(_))
        )
    }
}

#[tokio::test]
async fn test_fan_out_reaches_everyone_including_sender() {
    let (state, addr) = start_test_relay(quiet_config()).await;

    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(TestClient::connect(addr).await);
    }
    wait_for_connections(&state, 4).await;

    let mut expected = Vec::new();
    for (i, client) in clients.iter_mut().enumerate() {
        let line = format!("START {i}.00 {i}.00 #000000 2.00");
        client.send(&line).await;
        expected.push(line);
    }
    expected.sort();

    for client in &mut clients {
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(client.recv().await);
        }
        seen.sort();
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn test_per_sender_order_is_preserved() {
    let (state, addr) = start_test_relay(quiet_config()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_connections(&state, 2).await;

    let lines: Vec<String> = (0..100)
        .map(|i| format!("DRAW {i}.00 {i}.50 ERASER 4.00"))
        .collect();
    for line in &lines {
        a.send(line).await;
    }

    for line in &lines {
        assert_eq!(&b.recv().await, line);
    }
    for line in &lines {
        assert_eq!(&a.recv().await, line);
    }
}

#[tokio::test]
async fn test_malformed_lines_are_forwarded_opaquely() {
    let (state, addr) = start_test_relay(quiet_config()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_connections(&state, 2).await;

    a.send("DRAW 10.00 notanumber ERASER 2.00").await;
    a.send("hello there").await;
    a.writer.write_all(b"CLEAR\r\n").await.unwrap();
    a.writer.write_all(b"DRAW \xff\n").await.unwrap();

    assert_eq!(b.recv().await, "DRAW 10.00 notanumber ERASER 2.00");
    assert_eq!(b.recv().await, "hello there");
    assert_eq!(b.recv().await, "CLEAR");
    assert_eq!(b.recv().await, "DRAW \u{fffd}");
}

#[tokio::test]
async fn test_severed_connection_does_not_block_others() {
    let (state, addr) = start_test_relay(quiet_config()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    let c = TestClient::connect(addr).await;
    wait_for_connections(&state, 3).await;

    drop(c);
    wait_for_connections(&state, 2).await;

    a.send("CLEAR").await;
    assert_eq!(a.recv().await, "CLEAR");
    assert_eq!(b.recv().await, "CLEAR");

    assert_eq!(draw_together_relay::broadcast(&state, "CLEAR").await, 2);
    assert_eq!(a.recv().await, "CLEAR");
    assert_eq!(b.recv().await, "CLEAR");
}

#[tokio::test]
async fn test_broadcast_while_dead_peer_is_still_registered() {
    let (state, addr) = start_test_relay(quiet_config()).await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    let c = TestClient::connect(addr).await;
    wait_for_connections(&state, 3).await;

    // No wait for C's teardown: these land while the relay may still list C
    // and its writer runs into the closed socket.
    drop(c);
    let lines: Vec<String> = (0..50)
        .map(|i| format!("DRAW {i}.00 0.00 ERASER 2.00"))
        .collect();
    for line in &lines {
        let reached = draw_together_relay::broadcast(&state, line).await;
        assert!(reached >= 2, "only {reached} connections reached");
    }

    for line in &lines {
        assert_eq!(&a.recv().await, line);
        assert_eq!(&b.recv().await, line);
    }
    wait_for_connections(&state, 2).await;

    a.send("CLEAR").await;
    assert_eq!(a.recv().await, "CLEAR");
    assert_eq!(b.recv().await, "CLEAR");
}

#[tokio::test]
async fn test_peer_that_stops_reading_is_dropped() {
    let (state, addr) = start_test_relay(RelayConfig {
        max_queue: 64,
        ..quiet_config()
    })
    .await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    let _stalled = TestClient::connect(addr).await;
    wait_for_connections(&state, 3).await;

    // Large lines fill the stalled peer's socket buffers, then its queue.
    let filler = "x".repeat(3900);
    let mut batches = 0;
    while state.connection_count().await == 3 {
        assert!(batches < 2000, "stalled peer was never dropped");
        let batch: Vec<String> = (0..16).map(|i| format!("DRAW {i}.00 0.00 ERASER 2.00 {filler}")).collect();
        for line in &batch {
            a.send(line).await;
        }
        for line in &batch {
            assert_eq!(&a.recv().await, line);
            assert_eq!(&b.recv().await, line);
        }
        batches += 1;
    }

    wait_for_connections(&state, 2).await;
    a.send("CLEAR").await;
    assert_eq!(a.recv().await, "CLEAR");
    assert_eq!(b.recv().await, "CLEAR");
}

#[tokio::test]
async fn test_two_participants_end_to_end() {
    let (state, addr) = start_test_relay(RelayConfig::default()).await;

    let mut b = TestClient::connect(addr).await;
    wait_for_connections(&state, 1).await;
    let mut a = TestClient::connect(addr).await;
    wait_for_connections(&state, 2).await;
    let a_addr = a.local.to_string();

    a.send("START 5.00 5.00 #000000 2.00").await;
    a.send("DRAW 10.00 10.00 #000000 2.00").await;
    drop(a);

    let mut session = Session::new(RecordingRenderer::new());
    let mut drawing = Vec::new();
    loop {
        let line = b.recv().await;
        let outcome = session.apply_line(&line);
        match outcome {
            Applied::Notice(Notice::Left(who)) => {
                assert_eq!(who, a_addr);
                break;
            }
            Applied::Notice(_) => {}
            _ => drawing.push(line),
        }
    }

    assert_eq!(
        drawing,
        vec![
            "START 5.00 5.00 #000000 2.00".to_string(),
            "DRAW 10.00 10.00 #000000 2.00".to_string(),
        ]
    );
    let black = Pen::Ink(ColorSpec::black());
    assert_eq!(
        session.renderer().strokes(),
        vec![
            RenderOp::Begin { x: 5.0, y: 5.0, pen: black.clone(), width: 2.0 },
            RenderOp::Line {
                from: (5.0, 5.0),
                to: (10.0, 10.0),
                pen: black,
                width: 2.0
            },
        ]
    );
    // The departure notice leaves the pen where the stroke ended.
    assert_eq!(session.cursor().position, Some((10.0, 10.0)));
    assert!(session
        .renderer()
        .ops
        .contains(&RenderOp::Notice(Notice::Joined(a_addr.clone()))));
    wait_for_connections(&state, 1).await;
}

#[tokio::test]
async fn test_over_long_line_closes_only_that_connection() {
    let (state, addr) = start_test_relay(RelayConfig {
        max_line_length: 16,
        ..quiet_config()
    })
    .await;
    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_connections(&state, 2).await;

    b.send(&format!("START {}", "9".repeat(100))).await;
    assert!(b.closed().await);
    wait_for_connections(&state, 1).await;

    a.send("CLEAR").await;
    assert_eq!(a.recv().await, "CLEAR");
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let (state, addr) = start_test_relay(RelayConfig {
        idle_timeout_secs: Some(1),
        ..quiet_config()
    })
    .await;
    let mut idle = TestClient::connect(addr).await;
    wait_for_connections(&state, 1).await;

    assert!(idle.closed().await);
    wait_for_connections(&state, 0).await;
}

#[tokio::test]
async fn test_per_ip_limit_rejects_extra_connections() {
    let (state, addr) = start_test_relay(RelayConfig {
        max_connections_per_ip: Some(1),
        ..quiet_config()
    })
    .await;
    let first = TestClient::connect(addr).await;
    wait_for_connections(&state, 1).await;

    let mut second = TestClient::connect(addr).await;
    assert!(second.closed().await);
    assert_eq!(state.connection_count().await, 1);

    drop(first);
    wait_for_connections(&state, 0).await;

    let mut third = TestClient::connect(addr).await;
    wait_for_connections(&state, 1).await;
    third.send("CLEAR").await;
    assert_eq!(third.recv().await, "CLEAR");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (state, addr) = start_test_relay(quiet_config()).await;
    let health = draw_together_relay::spawn_health_server(state.clone(), "127.0.0.1:0")
        .await
        .unwrap();

    let _a = TestClient::connect(addr).await;
    let _b = TestClient::connect(addr).await;
    wait_for_connections(&state, 2).await;

    let resp = reqwest::get(format!("http://{health}/health"))
        .await
        .expect("Health request failed");
    assert!(resp.status().is_success());

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["connections"], 2);
}
