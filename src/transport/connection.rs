//! WebSocket connection, state machine and socket task.
//!
//! A [`Connection`] owns at most one socket at a time. While connected it
//! runs a tokio task that handles:
//!
//! - Incoming envelopes (replies, pings, application messages)
//! - Outgoing envelopes from [`Connection::send`] and [`Connection::request`]
//! - Heartbeat pings
//!
//! When the socket closes unexpectedly the connection schedules a reconnect
//! per its [`ReconnectPolicy`]. Each socket is tagged with an epoch; events
//! from a superseded socket are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Envelope, MessageType};

use super::backoff::ReconnectPolicy;
use super::config::ConnectionConfig;
use super::handlers::{HandlerSet, MessageHandlers, StatusHandlers, Subscription};
use super::heartbeat::Heartbeat;
use super::pending::PendingRequests;
use super::queue::OutboundQueue;
use super::status::ConnectionStatus;

// ============================================================================
// Types
// ============================================================================

/// Client socket.
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the client socket.
type SocketWriter = SplitSink<Socket, Message>;

/// Commands for the socket task.
enum SocketCommand {
    /// Transmit an envelope.
    Send(Envelope),
    /// Close with the normal-closure code and exit.
    Close,
}

/// Who started a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectOrigin {
    /// An explicit `connect()` call.
    Caller,
    /// The reconnect scheduler.
    Reconnect,
}

/// Mutable connection state, guarded by one lock.
struct ConnectionState {
    /// Current status.
    status: ConnectionStatus,
    /// Envelopes waiting for an open socket.
    queue: OutboundQueue,
    /// Sender into the socket task; present only while connected.
    outbound: Option<mpsc::UnboundedSender<SocketCommand>>,
    /// The running socket task.
    socket_task: Option<JoinHandle<()>>,
    /// The scheduled reconnect, if any.
    reconnect_task: Option<JoinHandle<()>>,
    /// Consecutive reconnect attempts since the last successful open.
    reconnect_attempts: u32,
    /// Identifies the current socket; bumped by every attempt and by disconnect.
    epoch: u64,
}

/// Shared inner state of a connection.
struct ConnectionInner {
    /// Immutable configuration.
    config: ConnectionConfig,
    /// Backoff and attempt ceiling.
    policy: ReconnectPolicy,
    /// Mutable state.
    state: Mutex<ConnectionState>,
    /// Held while an incoming envelope is dispatched. Reentrant so handlers
    /// may call `disconnect()`.
    dispatch: ReentrantMutex<()>,
    /// Outstanding requests.
    pending: Arc<PendingRequests>,
    /// Latest status for watchers.
    status_tx: watch::Sender<ConnectionStatus>,
    /// Application message handlers.
    message_handlers: Arc<MessageHandlers>,
    /// Status change handlers.
    status_handlers: Arc<StatusHandlers>,
}

// ============================================================================
// Connection
// ============================================================================

/// Resilient WebSocket connection.
///
/// Cloning is cheap; all clones share the same socket and state. Background
/// tasks hold only weak references, so dropping the last clone stops them.
///
/// # Example
///
/// ```ignore
/// use realtime_socket::{Connection, ConnectionConfig, Envelope};
/// use serde_json::json;
///
/// let connection = Connection::new(ConnectionConfig::new("ws://127.0.0.1:9000"))?;
/// connection.connect().await?;
///
/// let reply = connection
///     .request(Envelope::request(json!({"op": "echo", "value": 42})))
///     .await?;
///
/// connection.disconnect();
/// ```
#[derive(Clone)]
pub struct Connection {
    /// Shared inner state.
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.config.url)
            .field("status", &self.status())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Creates a disconnected connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] if the configuration is invalid.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                policy: ReconnectPolicy::from_config(&config),
                state: Mutex::new(ConnectionState {
                    status: ConnectionStatus::Disconnected,
                    queue: OutboundQueue::new(config.queue_max_size),
                    outbound: None,
                    socket_task: None,
                    reconnect_task: None,
                    reconnect_attempts: 0,
                    epoch: 0,
                }),
                dispatch: ReentrantMutex::new(()),
                pending: PendingRequests::new(config.max_pending_requests),
                status_tx,
                message_handlers: HandlerSet::new(),
                status_handlers: HandlerSet::new(),
                config,
            }),
        })
    }

    /// Rebuilds a handle from a background task's weak reference.
    fn upgrade(inner: &Weak<ConnectionInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Returns the number of outstanding requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns the number of envelopes waiting in the outbound queue.
    #[inline]
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns consecutive reconnect attempts since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect_attempts
    }
}

// ============================================================================
// Connection - Subscriptions
// ============================================================================

impl Connection {
    /// Returns a receiver that always holds the latest status.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Registers a callback for every status transition.
    ///
    /// The callback runs on the task that caused the transition and must not
    /// block.
    pub fn on_status_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.status_handlers.insert(Arc::new(handler))
    }

    /// Registers a callback for application-level envelopes.
    ///
    /// Replies that settle a pending request and pings are not delivered.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.message_handlers.insert(Arc::new(handler))
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Opens the socket.
    ///
    /// Returns immediately if already connecting or connected. On success the
    /// `auth` envelope (if configured) and every queued envelope are sent
    /// before anything else. A failed call does not schedule a retry.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the socket could not be opened
    /// - [`Error::ConnectionTimeout`] if opening exceeded `connect_timeout`
    /// - [`Error::ConnectionClosed`] if [`disconnect`](Self::disconnect) was called meanwhile
    pub async fn connect(&self) -> Result<()> {
        self.open(ConnectOrigin::Caller).await
    }

    /// Closes the socket with the normal-closure code.
    ///
    /// Cancels any scheduled reconnect and fails every pending request with
    /// [`Error::ConnectionClosed`]. Always ends in
    /// [`ConnectionStatus::Disconnected`]. Queued envelopes are kept for the
    /// next `connect()`.
    pub fn disconnect(&self) {
        let changed = {
            let mut state = self.inner.state.lock();

            if let Some(task) = state.reconnect_task.take() {
                task.abort();
            }
            state.epoch += 1;

            if let Some(outbound) = state.outbound.take() {
                let _ = outbound.send(SocketCommand::Close);
            }
            // Detached: the task exits after writing the close frame.
            state.socket_task = None;

            self.inner.pending.fail_all();
            self.inner.set_status(&mut state, ConnectionStatus::Disconnected)
        };

        // Wait out any dispatch that started before the epoch moved on.
        drop(self.inner.dispatch.lock());

        debug!(url = %self.inner.config.url, "Disconnected");

        if changed {
            self.inner.emit_status(ConnectionStatus::Disconnected);
        }
    }

    /// Runs one connection attempt.
    async fn open(&self, origin: ConnectOrigin) -> Result<()> {
        let epoch = {
            let mut state = self.inner.state.lock();

            if state.status.is_active() {
                trace!(status = %state.status, "connect() ignored, already active");
                return Ok(());
            }

            match origin {
                ConnectOrigin::Caller => {
                    if let Some(task) = state.reconnect_task.take() {
                        task.abort();
                    }
                }
                ConnectOrigin::Reconnect => {
                    if state.status != ConnectionStatus::Reconnecting {
                        return Ok(());
                    }
                    // The handle belongs to the task running this attempt.
                    state.reconnect_task = None;
                }
            }

            state.epoch += 1;
            self.inner
                .set_status(&mut state, ConnectionStatus::Connecting);
            state.epoch
        };
        self.inner.emit_status(ConnectionStatus::Connecting);

        let mut guard = AttemptGuard {
            connection: self,
            epoch,
            armed: true,
        };
        let established = self.establish().await;
        guard.armed = false;

        match established {
            Ok(socket) => self.on_open(epoch, socket),
            Err(err) => {
                self.on_open_failed(epoch, origin, &err);
                Err(err)
            }
        }
    }

    /// Performs the WebSocket handshake.
    async fn establish(&self) -> Result<Socket> {
        let config = &self.inner.config;

        let mut request = config.url.as_str().into_client_request()?;
        if !config.protocols.is_empty() {
            let protocols = HeaderValue::from_str(&config.protocols.join(", "))
                .map_err(|e| Error::config(format!("Invalid sub-protocol list: {e}")))?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", protocols);
        }

        debug!(url = %config.url, "Opening WebSocket");

        let (socket, response) = timeout(config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| Error::connection_timeout(config.connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(e.to_string()))?;

        debug!(url = %config.url, status = %response.status(), "WebSocket handshake completed");

        Ok(socket)
    }

    /// Completes a successful attempt: flush, start the socket task, go live.
    fn on_open(&self, epoch: u64, socket: Socket) -> Result<()> {
        let mut state = self.inner.state.lock();

        if state.epoch != epoch || state.status != ConnectionStatus::Connecting {
            drop(state);
            debug!(url = %self.inner.config.url, "Attempt superseded, closing fresh socket");
            tokio::spawn(async move {
                let mut socket = socket;
                let _ = socket.close(None).await;
            });
            return Err(Error::ConnectionClosed);
        }

        state.reconnect_attempts = 0;

        let (outbound, commands) = mpsc::unbounded_channel();

        if let Some(token) = self.inner.config.auth_token.as_deref() {
            let _ = outbound.send(SocketCommand::Send(Envelope::auth(token)));
        }

        let flushed = state.queue.len();
        for envelope in state.queue.drain() {
            let _ = outbound.send(SocketCommand::Send(envelope));
        }

        state.outbound = Some(outbound);
        state.socket_task = Some(tokio::spawn(run_socket(
            Arc::downgrade(&self.inner),
            epoch,
            socket,
            commands,
            self.inner.config.heartbeat_interval,
        )));
        self.inner
            .set_status(&mut state, ConnectionStatus::Connected);
        drop(state);

        debug!(url = %self.inner.config.url, flushed, "Connected");
        self.inner.emit_status(ConnectionStatus::Connected);

        Ok(())
    }

    /// Handles an attempt that never opened.
    fn on_open_failed(&self, epoch: u64, origin: ConnectOrigin, err: &Error) {
        let status = {
            let mut state = self.inner.state.lock();

            if state.epoch != epoch || state.status != ConnectionStatus::Connecting {
                return;
            }

            match origin {
                ConnectOrigin::Caller => {
                    self.inner
                        .set_status(&mut state, ConnectionStatus::Disconnected);
                    ConnectionStatus::Disconnected
                }
                ConnectOrigin::Reconnect => self.schedule_reconnect(&mut state),
            }
        };

        warn!(url = %self.inner.config.url, error = %err, ?origin, "Failed to open WebSocket");
        self.inner.emit_status(status);
    }

    /// Handles the end of a live socket.
    fn on_closed(&self, epoch: u64, close_code: Option<CloseCode>) {
        let status = {
            let mut state = self.inner.state.lock();

            if state.epoch != epoch || state.status != ConnectionStatus::Connected {
                return;
            }

            state.outbound = None;
            state.socket_task = None;
            self.inner.pending.fail_all();

            if close_code == Some(CloseCode::Normal) && state.reconnect_task.is_none() {
                self.inner
                    .set_status(&mut state, ConnectionStatus::Disconnected);
                ConnectionStatus::Disconnected
            } else {
                self.schedule_reconnect(&mut state)
            }
        };

        debug!(url = %self.inner.config.url, code = ?close_code, %status, "Socket closed");
        self.inner.emit_status(status);
    }

    /// Schedules the next attempt, or gives up once the ceiling is reached.
    ///
    /// Returns the resulting status. Caller holds the state lock.
    fn schedule_reconnect(&self, state: &mut ConnectionState) -> ConnectionStatus {
        if !self.inner.policy.allows(state.reconnect_attempts) {
            warn!(
                url = %self.inner.config.url,
                attempts = state.reconnect_attempts,
                "Reconnect attempts exhausted"
            );
            self.inner.set_status(state, ConnectionStatus::Failed);
            return ConnectionStatus::Failed;
        }

        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;
        let delay = self.inner.policy.delay(attempt);

        debug!(
            url = %self.inner.config.url,
            attempt,
            max = self.inner.policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        let inner = Arc::downgrade(&self.inner);
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(connection) = Connection::upgrade(&inner) else {
                return;
            };
            if let Err(e) = connection.open(ConnectOrigin::Reconnect).await {
                debug!(attempt, error = %e, "Reconnect attempt failed");
            }
        }));

        self.inner
            .set_status(state, ConnectionStatus::Reconnecting);
        ConnectionStatus::Reconnecting
    }
}

// ============================================================================
// Connection - Messaging
// ============================================================================

impl Connection {
    /// Sends an envelope without waiting for a reply.
    ///
    /// Transmitted immediately when connected, queued otherwise.
    pub fn send(&self, envelope: Envelope) {
        let mut state = self.inner.state.lock();

        let envelope = match state.outbound.as_ref() {
            Some(outbound) if state.status == ConnectionStatus::Connected => {
                match outbound.send(SocketCommand::Send(envelope)) {
                    Ok(()) => return,
                    Err(SendError(SocketCommand::Send(envelope))) => envelope,
                    Err(SendError(SocketCommand::Close)) => return,
                }
            }
            _ => envelope,
        };

        trace!(id = %envelope.id, status = %state.status, "Queueing envelope");
        state.queue.push(envelope);
    }

    /// Sends a request and waits for the matching reply, using the
    /// configured `request_timeout`.
    ///
    /// # Errors
    ///
    /// See [`request_with_timeout`](Self::request_with_timeout).
    pub async fn request(&self, envelope: Envelope) -> Result<Value> {
        self.request_with_timeout(envelope, self.inner.config.request_timeout)
            .await
    }

    /// Sends a request and waits for the matching reply.
    ///
    /// The envelope's id is the correlation id. The request is queued like
    /// any other envelope when not connected; its timer runs regardless.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no reply arrives within `request_timeout`
    /// - [`Error::Remote`] if the reply is an `error` envelope
    /// - [`Error::ConnectionClosed`] if the socket closes first
    /// - [`Error::Protocol`] if the id is already outstanding or too many requests are pending
    pub async fn request_with_timeout(
        &self,
        envelope: Envelope,
        request_timeout: Duration,
    ) -> Result<Value> {
        let request_id = envelope.id.clone();
        let reply = self
            .inner
            .pending
            .register(request_id.clone(), request_timeout)?;

        trace!(id = %request_id, timeout_ms = request_timeout.as_millis() as u64, "Request registered");
        self.send(envelope);

        match reply.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

// ============================================================================
// ConnectionInner
// ============================================================================

impl ConnectionInner {
    /// Records a status change. Caller holds the state lock.
    ///
    /// Returns `true` if the status changed.
    fn set_status(&self, state: &mut ConnectionState, status: ConnectionStatus) -> bool {
        if state.status == status {
            return false;
        }

        trace!(url = %self.config.url, from = %state.status, to = %status, "Status transition");
        state.status = status;
        self.status_tx.send_replace(status);
        true
    }

    /// Invokes status handlers. Must be called without the state lock.
    fn emit_status(&self, status: ConnectionStatus) {
        for handler in self.status_handlers.snapshot() {
            handler(status);
        }
    }

    /// Classifies an envelope read by the socket tagged `epoch`.
    ///
    /// Returns a reply to write back, if any. Envelopes from a superseded
    /// socket are dropped without side effects.
    fn route_incoming(&self, epoch: u64, envelope: Envelope) -> Option<Envelope> {
        let _dispatch = self.dispatch.lock();

        if self.state.lock().epoch != epoch {
            trace!(id = %envelope.id, epoch, "Dropping envelope from superseded socket");
            return None;
        }

        trace!(id = %envelope.id, kind = %envelope.message_type, "Envelope received");

        let envelope = match self.pending.settle(envelope) {
            Ok(()) => return None,
            Err(envelope) => envelope,
        };

        if envelope.message_type == MessageType::Ping {
            return Some(Envelope::pong());
        }

        if envelope.message_type.is_reply() {
            warn!(id = %envelope.id, "Reply for unknown request, forwarding to handlers");
        }

        for handler in self.message_handlers.snapshot() {
            handler(&envelope);
        }

        None
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        if let Some(task) = state.socket_task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// AttemptGuard
// ============================================================================

/// Returns the connection to `Disconnected` if a `connect()` future is
/// dropped mid-handshake.
struct AttemptGuard<'a> {
    connection: &'a Connection,
    epoch: u64,
    armed: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let inner = &self.connection.inner;
        let changed = {
            let mut state = inner.state.lock();
            state.epoch == self.epoch
                && state.status == ConnectionStatus::Connecting
                && inner.set_status(&mut state, ConnectionStatus::Disconnected)
        };

        if changed {
            debug!(url = %inner.config.url, "Connect cancelled");
            inner.emit_status(ConnectionStatus::Disconnected);
        }
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Socket task: pumps reads, writes and heartbeats until the socket ends.
async fn run_socket(
    inner: Weak<ConnectionInner>,
    epoch: u64,
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    heartbeat_interval: Duration,
) {
    let (mut writer, mut reader) = socket.split();
    let mut heartbeat = Heartbeat::start(heartbeat_interval);

    let close_code = loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    Some(SocketCommand::Send(envelope)) => {
                        if let Err(e) = write_envelope(&mut writer, &envelope).await {
                            warn!(id = %envelope.id, error = %e, "Failed to send envelope");
                            if e.is_connection_error() {
                                break None;
                            }
                        }
                    }

                    Some(SocketCommand::Close) => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client disconnect".to_string().into(),
                        };
                        let _ = writer.send(Message::Close(Some(frame))).await;
                        debug!("Close frame sent");
                        return;
                    }

                    // Connection dropped or moved on to another socket.
                    None => return,
                }
            }

            message = reader.next() => {
                let parsed = match message {
                    Some(Ok(Message::Text(text))) => Envelope::from_text(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => Envelope::from_slice(&bytes),
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|frame| frame.code);
                    }
                    // Ping/Pong frames are answered by tungstenite.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket read error");
                        break None;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break None;
                    }
                };

                let envelope = match parsed {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed incoming message");
                        continue;
                    }
                };

                let Some(shared) = inner.upgrade() else {
                    return;
                };

                if let Some(reply) = shared.route_incoming(epoch, envelope)
                    && let Err(e) = write_envelope(&mut writer, &reply).await
                    && e.is_connection_error()
                {
                    warn!(error = %e, "Failed to send pong");
                    break None;
                }
            }

            ping = heartbeat.tick() => {
                trace!(id = %ping.id, "Heartbeat ping");
                if let Err(e) = write_envelope(&mut writer, &ping).await
                    && e.is_connection_error()
                {
                    warn!(error = %e, "Failed to send heartbeat");
                    break None;
                }
            }
        }
    };

    if let Some(connection) = Connection::upgrade(&inner) {
        connection.on_closed(epoch, close_code);
    }
}

/// Serializes and writes one envelope.
async fn write_envelope(writer: &mut SocketWriter, envelope: &Envelope) -> Result<()> {
    let text = envelope.to_text()?;
    writer.send(Message::Text(text.into())).await?;
    trace!(id = %envelope.id, kind = %envelope.message_type, "Envelope sent");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
