//! In-process backend for tests.
//!
//! [`MockServer`] binds a loopback WebSocket server that accepts any path
//! and hands each accepted socket to the test as a [`MockPeer`].

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing_subscriber::EnvFilter;

use crate::protocol::Request;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single wait in a test.
const TEST_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

/// Installs a test-friendly subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds. Panics after `limit`.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {limit:?}");
        sleep(Duration::from_millis(5)).await;
    }
}

/// Returns a URL on a loopback port nobody listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
        .await
        .expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("ws://127.0.0.1:{port}")
}

// ============================================================================
// MockServer
// ============================================================================

/// Handler that answers one request, or stays silent with `None`.
pub type Responder = Arc<dyn Fn(Request) -> Option<Value> + Send + Sync>;

/// Loopback WebSocket server.
pub struct MockServer {
    port: u16,
    accepted: Arc<AtomicUsize>,
    peers: Arc<AsyncMutex<mpsc::UnboundedReceiver<MockPeer>>>,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    /// Binds to a random loopback port.
    pub async fn bind() -> Self {
        Self::bind_port(0).await
    }

    /// Binds to a specific loopback port.
    pub async fn bind_port(port: u16) -> Self {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let accept_loop = tokio::spawn(Self::accept_loop(listener, tx, Arc::clone(&accepted)));

        Self {
            port,
            accepted,
            peers: Arc::new(AsyncMutex::new(rx)),
            accept_loop: Mutex::new(Some(accept_loop)),
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        tx: mpsc::UnboundedSender<MockPeer>,
        accepted: Arc<AtomicUsize>,
    ) {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = accept_async(stream).await else {
                continue;
            };
            accepted.fetch_add(1, Ordering::SeqCst);
            if tx.send(MockPeer { ws }).is_err() {
                return;
            }
        }
    }

    /// Returns the bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL without the socket path.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Full socket URL.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("{}/ws", self.base_url())
    }

    /// Number of completed WebSocket handshakes.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Waits for the next accepted socket.
    pub async fn accept(&self) -> MockPeer {
        let mut peers = self.peers.lock().await;
        timeout(TEST_WAIT, peers.recv())
            .await
            .expect("client did not connect in time")
            .expect("accept loop stopped")
    }

    /// Answers every request on every current and future socket.
    pub fn serve_all(&self, responder: Responder) -> JoinHandle<()> {
        let peers = Arc::clone(&self.peers);
        tokio::spawn(async move {
            loop {
                let Some(peer) = peers.lock().await.recv().await else {
                    return;
                };
                let responder = Arc::clone(&responder);
                peer.serve(move |request| responder(request));
            }
        })
    }

    /// Stops accepting and releases the port.
    pub async fn stop(&self) {
        let task = self.accept_loop.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_loop.lock().take() {
            task.abort();
        }
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// Server side of one accepted socket.
pub struct MockPeer {
    ws: WebSocketStream<TcpStream>,
}

impl MockPeer {
    /// Receives the next JSON text frame, or `None` once the socket ends.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let message = timeout(TEST_WAIT, self.ws.next()).await.ok()??.ok()?;
            match message {
                Message::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("client sent JSON"));
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// Sends a JSON frame.
    pub async fn send(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Sends a raw text frame.
    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .expect("send frame");
    }

    /// Closes with `code` and waits for the client to answer.
    pub async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let _ = self.ws.send(Message::Close(Some(frame))).await;
        let _ = timeout(TEST_WAIT, async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
    }

    /// Drops the socket without a close frame.
    pub fn abort(self) {
        drop(self.ws);
    }

    /// Answers requests in the background until the socket ends.
    pub fn serve<F>(mut self, responder: F) -> JoinHandle<()>
    where
        F: Fn(Request) -> Option<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(Ok(message)) = self.ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(request) = serde_json::from_str::<Request>(text.as_str()) else {
                    continue;
                };
                if let Some(reply) = responder(request)
                    && self
                        .ws
                        .send(Message::Text(reply.to_string().into()))
                        .await
                        .is_err()
                {
                    return;
                }
            }
        })
    }
}
