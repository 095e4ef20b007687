//! WebSocket connection and event loop.
//!
//! One [`Connection`] wraps one socket. It spawns a tokio task that owns
//! the stream and handles:
//!
//! - Outgoing request frames
//! - Incoming frames, routed through the [`Correlator`] by `request_id`
//! - Unsolicited frames, handed to the optional message handler
//! - Close and error reporting to whoever supervises the socket
//!
//! Only the connection manager may close a connection; consumers hold
//! clones and send requests.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::client::ClientOptions;
use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, ListenerId, RequestId};
use crate::protocol::{Inbound, Request, Response};

use super::correlator::{Correlator, Delivery, Dispatch};

// ============================================================================
// Constants
// ============================================================================

/// Close code for an intentional close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when no close frame was received.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code for a close frame that carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

// ============================================================================
// Types
// ============================================================================

/// Socket type produced by `connect_async`.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
type WsSink = SplitSink<WsStream, Message>;

/// Handler for frames no listener claimed.
///
/// Receives the parsed JSON of frames that carry no `request_id`, or one
/// nobody is waiting on. Runs on the event loop after the handler lock is
/// released, so it may replace or clear itself.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

// ============================================================================
// CloseInfo / TransportEvent
// ============================================================================

/// How a socket ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Creates close info.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close without a close frame.
    #[inline]
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    /// Returns `true` for an intentional close (1000).
    #[inline]
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// Lifecycle notifications from the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket reported an error. A [`TransportEvent::Closed`] follows.
    Error(String),
    /// The socket is gone. Always the last event.
    Closed(CloseInfo),
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a serialized request. The listener is already attached.
    Send {
        text: String,
        request_id: RequestId,
        listener: ListenerId,
    },
    /// Close the socket with this code.
    Shutdown(u16),
}

// ============================================================================
// Connection
// ============================================================================

/// Shared state behind every clone of a [`Connection`].
struct ConnectionInner {
    id: ConnectionId,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    correlator: Arc<Correlator>,
    message_handler: Arc<Mutex<Option<MessageHandler>>>,
    open: Arc<AtomicBool>,
    request_timeout: Duration,
    max_pending: usize,
}

/// WebSocket connection to the backend.
///
/// Handles request/response correlation. Clones share the same socket.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a socket to the configured endpoint.
    ///
    /// Returns the connection and the receiver for its lifecycle events.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::Connection`] if the socket cannot be opened
    pub async fn open(
        options: &ClientOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let url = options.url.as_str();
        debug!(url, "Opening WebSocket");

        let (ws_stream, _) = timeout(options.connect_timeout, connect_async(url))
            .await
            .map_err(|_| Error::connection_timeout(options.connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("{url}: {e}")))?;

        Ok(Self::new(
            ws_stream,
            options.request_timeout,
            options.max_pending_requests,
        ))
    }

    /// Wraps an established socket and spawns its event loop.
    pub(crate) fn new(
        ws_stream: WsStream,
        request_timeout: Duration,
        max_pending: usize,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new());
        let message_handler: Arc<Mutex<Option<MessageHandler>>> = Arc::new(Mutex::new(None));
        let open = Arc::new(AtomicBool::new(true));
        let id = ConnectionId::generate();

        tokio::spawn(Self::run_event_loop(
            id,
            ws_stream,
            command_rx,
            event_tx,
            Arc::clone(&correlator),
            Arc::clone(&message_handler),
            Arc::clone(&open),
        ));

        info!(connection = %id, "WebSocket connection established");

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id,
                command_tx,
                correlator,
                message_handler,
                open,
                request_timeout,
                max_pending,
            }),
        };
        (connection, event_rx)
    }

    /// Returns this transport's ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns `true` while the socket is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Returns the number of attached listeners.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Returns the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Sets the handler for frames no listener claims.
    pub fn set_message_handler(&self, handler: impl Fn(Value) + Send + Sync + 'static) {
        *self.inner.message_handler.lock() = Some(Arc::new(handler));
    }

    /// Clears the message handler.
    pub fn clear_message_handler(&self) {
        *self.inner.message_handler.lock() = None;
    }

    /// Attaches a listener and writes the request.
    ///
    /// The listener exists before the frame leaves, so an immediate answer
    /// cannot be missed. Dropping the returned [`PendingRequest`] detaches it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the socket is not open
    /// - [`Error::TooManyPending`] if the listener cap is reached
    /// - [`Error::Json`] if the request cannot be serialized
    pub fn dispatch(&self, request: Request) -> Result<PendingRequest> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        let request_id = request.request_id;
        let text = to_string(&request)?;

        let (listener, rx) = self
            .inner
            .correlator
            .try_attach(request_id, self.inner.max_pending)
            .inspect_err(|e| warn!(error = %e, "Rejecting request"))?;

        let pending = PendingRequest {
            request_id,
            listener,
            rx: Some(rx),
            correlator: Arc::clone(&self.inner.correlator),
        };

        self.inner
            .command_tx
            .send(ConnectionCommand::Send {
                text,
                request_id,
                listener,
            })
            .map_err(|_| Error::NotConnected)?;

        Ok(pending)
    }

    /// Sends a request and waits for its response with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the socket is not open
    /// - [`Error::RequestTimeout`] if no matching response arrives in time
    /// - [`Error::ConnectionClosed`] if the socket closes first
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_with_timeout(request, self.inner.request_timeout)
            .await
    }

    /// Sends a request and waits for its response with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Response> {
        self.dispatch(request)?.wait(request_timeout).await
    }

    /// Sends a request and returns its `data`, failing on `success: false`.
    ///
    /// # Errors
    ///
    /// Everything [`Connection::send`] returns, plus [`Error::Server`].
    pub async fn call(&self, request: Request) -> Result<Value> {
        self.send(request).await?.into_result()
    }

    /// Asks the event loop to close the socket.
    pub(crate) fn shutdown(&self, code: u16) {
        let _ = self.inner.command_tx.send(ConnectionCommand::Shutdown(code));
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        id: ConnectionId,
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
        correlator: Arc<Correlator>,
        message_handler: Arc<Mutex<Option<MessageHandler>>>,
        open: Arc<AtomicBool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let close = loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlator, &message_handler);
                        }

                        Some(Ok(Message::Close(frame))) => {
                            let info = frame.map_or_else(
                                || CloseInfo::new(CLOSE_NO_STATUS, ""),
                                |f| CloseInfo::new(u16::from(f.code), f.reason.as_str()),
                            );
                            debug!(connection = %id, code = info.code, "WebSocket closed by remote");
                            break info;
                        }

                        Some(Err(e)) => {
                            error!(connection = %id, error = %e, "WebSocket error");
                            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                            break CloseInfo::abnormal(e.to_string());
                        }

                        None => {
                            debug!(connection = %id, "WebSocket stream ended");
                            break CloseInfo::abnormal("stream ended");
                        }

                        // Ignore Binary, Ping, Pong
                        Some(Ok(_)) => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { text, request_id, listener }) => {
                            if let Err(e) = Self::handle_send_command(&text, &mut ws_write).await {
                                correlator.fail(request_id, listener, Error::connection(e.to_string()));
                                let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                                break CloseInfo::abnormal(e.to_string());
                            }
                            trace!(connection = %id, %request_id, "Request sent");
                        }

                        Some(ConnectionCommand::Shutdown(code)) => {
                            debug!(connection = %id, code, "Shutdown command received");
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: "".into(),
                            };
                            let _ = ws_write.send(Message::Close(Some(frame))).await;
                            let _ = ws_write.close().await;
                            break CloseInfo::new(code, "closed by client");
                        }

                        None => {
                            debug!(connection = %id, "All handles dropped");
                            let _ = ws_write.close().await;
                            break CloseInfo::new(CLOSE_NORMAL, "all handles dropped");
                        }
                    }
                }
            }
        };

        open.store(false, Ordering::Release);

        // Anyone still waiting gets an answer now instead of a timeout.
        correlator.fail_all();

        let _ = event_tx.send(TransportEvent::Closed(close));
        debug!(connection = %id, "Event loop terminated");
    }

    /// Routes an incoming text frame.
    fn handle_incoming_message(
        text: &str,
        correlator: &Correlator,
        message_handler: &Mutex<Option<MessageHandler>>,
    ) {
        match correlator.dispatch(Inbound::parse(text)) {
            Dispatch::Delivered(_) => {}

            Dispatch::Unclaimed(Inbound::Unsolicited(value)) => {
                Self::forward_unclaimed(value, message_handler);
            }

            Dispatch::Unclaimed(Inbound::Response(response)) => {
                debug!(request_id = %response.request_id, "Response for unknown or abandoned request");
                if let Ok(value) = serde_json::to_value(&response) {
                    Self::forward_unclaimed(value, message_handler);
                }
            }

            Dispatch::Unclaimed(Inbound::Malformed(e)) => {
                warn!(error = %e, "Failed to parse incoming message");
            }

            Dispatch::Unclaimed(Inbound::Invalid { request_id, message }) => {
                debug!(%request_id, error = %message, "Invalid envelope for unknown request");
            }
        }
    }

    fn forward_unclaimed(value: Value, message_handler: &Mutex<Option<MessageHandler>>) {
        let handler = message_handler.lock().clone();
        if let Some(handler) = handler {
            handler(value);
        } else {
            trace!("Unclaimed message dropped");
        }
    }

    /// Writes one request frame.
    async fn handle_send_command(text: &str, ws_write: &mut WsSink) -> Result<()> {
        ws_write.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

// ============================================================================
// PendingRequest
// ============================================================================

/// A request awaiting its response.
///
/// Owns one attached listener. The listener is detached exactly once: by
/// the matching response, by the timeout in [`PendingRequest::wait`], or
/// when this value is dropped or cancelled.
pub struct PendingRequest {
    request_id: RequestId,
    listener: ListenerId,
    rx: Option<oneshot::Receiver<Delivery>>,
    correlator: Arc<Correlator>,
}

impl PendingRequest {
    /// Returns the request ID this listener waits on.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Waits for the matching response.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if nothing matching arrives in time
    /// - [`Error::ConnectionClosed`] if the socket closes first
    /// - [`Error::Protocol`] if the matching frame was not a valid envelope
    pub async fn wait(mut self, request_timeout: Duration) -> Result<Response> {
        let Some(rx) = self.rx.take() else {
            return Err(Error::ConnectionClosed);
        };

        match timeout(request_timeout, rx).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.correlator.detach(self.request_id, self.listener);
                debug!(request_id = %self.request_id, "Request timed out");
                Err(Error::request_timeout(
                    self.request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Abandons the request. A later response is ignored.
    pub fn cancel(self) {}
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.correlator.detach(self.request_id, self.listener);
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("request_id", &self.request_id)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::RequestKind;
    use crate::testing::{MockServer, init_tracing};

    const SHORT: Duration = Duration::from_millis(150);

    async fn connect(server: &MockServer) -> (Connection, mpsc::UnboundedReceiver<TransportEvent>) {
        let (ws_stream, _) = connect_async(server.ws_url()).await.expect("connect");
        Connection::new(ws_stream, Duration::from_secs(5), 100)
    }

    #[test]
    fn test_close_info() {
        assert!(CloseInfo::new(1000, "").is_normal());
        assert!(!CloseInfo::abnormal("gone").is_normal());
        assert_eq!(CloseInfo::abnormal("gone").code, 1006);
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        init_tracing();
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let request = Request::new(RequestKind::Login)
            .data(json!({"username": "alice", "password": "x"}));
        let call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.send(request).await }
        });

        let received = peer.recv().await.expect("request");
        assert_eq!(received["request_id"], 10);
        assert_eq!(received["data"]["username"], "alice");

        peer.send(json!({
            "request_id": 10,
            "success": true,
            "data": {"user_exists": true, "is_manager": false}
        }))
        .await;

        let response = call.await.expect("join").expect("response");
        assert!(response.get_bool("user_exists"));
        assert!(!response.get_bool("is_manager"));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let first = connection
            .dispatch(Request::with_id(RequestId::new(220)).data(json!({"week": 1})))
            .expect("dispatch");
        let second = connection
            .dispatch(Request::with_id(RequestId::new(221)).data(json!({"week": 2})))
            .expect("dispatch");
        assert_eq!(connection.pending_count(), 2);

        peer.recv().await.expect("first");
        peer.recv().await.expect("second");
        peer.send(json!({"request_id": 221, "success": true, "data": {"week": 2}}))
            .await;
        peer.send(json!({"request_id": 220, "success": true, "data": {"week": 1}}))
            .await;

        let a = first.wait(SHORT * 10).await.expect("220");
        let b = second.wait(SHORT * 10).await.expect("221");
        assert_eq!(a.get_u64("week"), 1);
        assert_eq!(b.get_u64("week"), 2);
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_restores_listener_baseline() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let _peer = server.accept().await;

        let baseline = connection.pending_count();
        let err = connection
            .send_with_timeout(Request::new(RequestKind::ListJobs), SHORT)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(err, Error::RequestTimeout { request_id, .. } if request_id == RequestKind::ListJobs.id()));
        assert_eq!(connection.pending_count(), baseline);
    }

    #[tokio::test]
    async fn test_business_error_is_not_timeout() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call(Request::new(RequestKind::CreateJob)).await }
        });

        peer.recv().await.expect("request");
        peer.send(json!({"request_id": 201, "success": false, "error": "Job name taken"}))
            .await;

        let err = call.await.expect("join").unwrap_err();
        assert!(err.is_business_error());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Request 201 failed: Job name taken");
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_break_correlation() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let pending = connection
            .dispatch(Request::new(RequestKind::GetWorkers))
            .expect("dispatch");
        peer.recv().await.expect("request");

        peer.send_text("{{{ not json").await;
        peer.send(json!({"notice": "server restarting soon"})).await;
        peer.send(json!({"request_id": 999, "success": true})).await;
        peer.send(json!({"request_id": 50, "success": true, "data": {"count": 3}}))
            .await;

        let response = pending.wait(SHORT * 10).await.expect("response");
        assert_eq!(response.get_u64("count"), 3);
        assert!(connection.is_open());
    }

    #[tokio::test]
    async fn test_unsolicited_messages_reach_handler() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.set_message_handler(move |value| {
            let _ = tx.send(value);
        });

        peer.send(json!({"notice": "schedule published"})).await;

        let value = timeout(SHORT * 10, rx.recv())
            .await
            .expect("in time")
            .expect("value");
        assert_eq!(value["notice"], "schedule published");

        peer.send(json!({"request_id": 4242, "success": true})).await;
        let value = timeout(SHORT * 10, rx.recv())
            .await
            .expect("in time")
            .expect("value");
        assert_eq!(value["request_id"], 4242);
    }

    #[tokio::test]
    async fn test_handler_may_clear_itself() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = connection.clone();
        connection.set_message_handler(move |value| {
            handle.clear_message_handler();
            let _ = tx.send(value);
        });

        peer.send(json!({"notice": "once"})).await;
        let value = timeout(SHORT * 10, rx.recv())
            .await
            .expect("in time")
            .expect("value");
        assert_eq!(value["notice"], "once");

        // The event loop is still serving requests.
        let pending = connection
            .dispatch(Request::with_id(RequestId::new(200)))
            .expect("dispatch");
        let received = peer.recv().await.expect("request");
        assert_eq!(received["request_id"], 200);
        peer.send(json!({"request_id": 200, "success": true})).await;
        pending.wait(SHORT * 10).await.expect("response");

        // The cleared handler was dropped along with its sender.
        peer.send(json!({"notice": "twice"})).await;
        let second = timeout(SHORT * 10, rx.recv()).await.expect("in time");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_cancel_detaches_and_late_response_is_ignored() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let mut peer = server.accept().await;

        let pending = connection
            .dispatch(Request::new(RequestKind::ListShifts))
            .expect("dispatch");
        assert_eq!(connection.pending_count(), 1);
        pending.cancel();
        assert_eq!(connection.pending_count(), 0);

        peer.recv().await.expect("request");
        peer.send(json!({"request_id": 210, "success": true})).await;

        // The socket keeps working for others.
        let next = tokio::spawn({
            let connection = connection.clone();
            async move { connection.send(Request::new(RequestKind::ListJobs)).await }
        });
        peer.recv().await.expect("second request");
        peer.send(json!({"request_id": 200, "success": true})).await;
        assert!(next.await.expect("join").is_ok());
    }

    #[tokio::test]
    async fn test_remote_close_fails_pending_and_reports_code() {
        let server = MockServer::bind().await;
        let (connection, mut events) = connect(&server).await;
        let mut peer = server.accept().await;

        let pending = connection
            .dispatch(Request::new(RequestKind::GetTimesheets))
            .expect("dispatch");
        peer.recv().await.expect("request");
        peer.close(4001).await;

        let err = pending.wait(SHORT * 10).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        let event = timeout(SHORT * 10, events.recv())
            .await
            .expect("in time")
            .expect("event");
        assert_eq!(event, TransportEvent::Closed(CloseInfo::new(4001, "")));
        assert!(!connection.is_open());
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_on_closed_connection_fails_fast() {
        let server = MockServer::bind().await;
        let (connection, mut events) = connect(&server).await;
        let _peer = server.accept().await;

        connection.shutdown(CLOSE_NORMAL);
        let event = timeout(SHORT * 10, events.recv())
            .await
            .expect("in time")
            .expect("event");
        assert!(matches!(event, TransportEvent::Closed(ref info) if info.is_normal()));

        let err = connection
            .dispatch(Request::new(RequestKind::ListJobs))
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_sequential_cycles_do_not_leak() {
        let server = MockServer::bind().await;
        let (connection, _events) = connect(&server).await;
        let peer = server.accept().await;
        let _echo = peer.serve(|request| {
            Some(json!({"request_id": request.request_id, "success": true}))
        });

        for _ in 0..1_000 {
            connection
                .send(Request::new(RequestKind::GetShiftRequests))
                .await
                .expect("response");
        }
        assert_eq!(connection.pending_count(), 0);
    }
}
