//! Transport connection: lifecycle state machine, socket task and
//! reconnect scheduling.
//!
//! # Socket Task
//!
//! Each open socket is owned by one spawned tokio task that handles:
//!
//! - Incoming text frames (passed to the [`FrameHandler`])
//! - Outgoing frames from [`Connection::send`]
//! - Heartbeat pings
//! - Deliberate close from [`Connection::disconnect`]
//!
//! # Lifecycle
//!
//! All state transitions happen under one lock. Every attempt gets a new
//! generation number; events from older generations are discarded, so a
//! socket or attempt superseded by `disconnect()` or a fresh `connect()`
//! can never change the state or schedule a retry.
//!
//! Only unexpected closes (and failed retries) go through the reconnect
//! scheduler. A failed manual `connect()` is reported to its caller and
//! nothing else.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::protocol::Frame;

use super::connector::{Connector, Socket};
use super::heartbeat::Heartbeat;
use super::reconnect::ReconnectState;
use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Close reason sent with the normal-closure code on deliberate disconnect.
pub const DELIBERATE_CLOSE_REASON: &str = "Deliberate disconnect";

// ============================================================================
// Types
// ============================================================================

/// Inbound text handler.
///
/// Called on the socket task for every text message received.
pub type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Result shared by every caller waiting on one attempt.
type AttemptOutcome = std::result::Result<(), AttemptError>;

/// Who started a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOrigin {
    /// `connect()` called by the owner.
    Caller,
    /// Fired by the reconnect scheduler.
    Reconnect,
}

/// Cloneable failure of one attempt, fanned out to all waiters.
#[derive(Debug, Clone)]
enum AttemptError {
    /// Connector reported an error.
    Failed(String),
    /// Connector did not finish in time.
    TimedOut(u64),
    /// Superseded by `disconnect()`.
    Aborted,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(message) => f.write_str(message),
            Self::TimedOut(ms) => write!(f, "timed out after {ms}ms"),
            Self::Aborted => f.write_str("aborted by disconnect"),
        }
    }
}

impl From<AttemptError> for Error {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Failed(message) => Error::connection(message),
            AttemptError::TimedOut(ms) => Error::connection_timeout(ms),
            AttemptError::Aborted => Error::ConnectionClosed,
        }
    }
}

/// Commands for the socket task.
enum SocketCommand {
    /// Write one serialized frame.
    Send(String),
    /// Send a normal-closure close frame and stop.
    Close,
}

/// How a socket task ended.
enum SocketExit {
    /// Owner closed it; no reconnect.
    Deliberate,
    /// Anything else; reconnect policy applies.
    Unexpected(String),
}

// ============================================================================
// ActiveSocket
// ============================================================================

/// Handle to the one live socket task.
struct ActiveSocket {
    /// Channel into the socket task.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Raised before the task is told to stop; silences the heartbeat.
    closing: Arc<AtomicBool>,
}

impl ActiveSocket {
    /// Stops the socket task with a normal-closure frame.
    fn close(self) {
        self.closing.store(true, Ordering::Release);
        let _ = self.command_tx.send(SocketCommand::Close);
    }
}

// ============================================================================
// Shared
// ============================================================================

/// Mutable lifecycle state, guarded by one lock.
struct Shared {
    /// Current lifecycle state.
    status: ConnectionState,
    /// Identifies the current attempt/socket.
    generation: u64,
    /// Origin of the current attempt.
    origin: AttemptOrigin,
    /// Live socket, present only while Open or Closing.
    socket: Option<ActiveSocket>,
    /// Callers waiting on the in-flight attempt.
    waiters: Vec<oneshot::Sender<AttemptOutcome>>,
    /// Retry counter and backoff policy.
    reconnect: ReconnectState,
    /// Pending reconnect timer.
    reconnect_timer: Option<AbortHandle>,
}

// ============================================================================
// ConnectionInner
// ============================================================================

/// State shared by all clones of a [`Connection`].
struct ConnectionInner {
    /// Parsed endpoint.
    url: Url,
    /// Tunables.
    config: FeedConfig,
    /// Socket factory.
    connector: Arc<dyn Connector>,
    /// Inbound text handler.
    on_frame: FrameHandler,
    /// Lifecycle state.
    shared: Mutex<Shared>,
    /// Broadcasts every state transition.
    status_tx: watch::Sender<ConnectionState>,
}

// ============================================================================
// Connection
// ============================================================================

/// One logical duplex connection with automatic reconnect.
///
/// Cloning yields another handle to the same connection. When the last
/// handle is dropped the socket is closed and pending retries are
/// cancelled.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::new(config, Arc::new(TungsteniteConnector), handler)?;
/// connection.connect().await?;
/// assert!(connection.send(&Frame::new("ping", json!({}))));
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
            .field("url", &self.inner.url.as_str())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Creates a closed connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(
        config: FeedConfig,
        connector: Arc<dyn Connector>,
        on_frame: FrameHandler,
    ) -> Result<Self> {
        let url = config.validate()?;
        let (status_tx, _) = watch::channel(ConnectionState::Closed);

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                url,
                shared: Mutex::new(Shared {
                    status: ConnectionState::Closed,
                    generation: 0,
                    origin: AttemptOrigin::Caller,
                    socket: None,
                    waiters: Vec::new(),
                    reconnect: ReconnectState::from_config(&config),
                    reconnect_timer: None,
                }),
                config,
                connector,
                on_frame,
                status_tx,
            }),
        })
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Opens the connection.
    ///
    /// Resolves immediately if already open. While an attempt is in
    /// flight, joins it instead of dialing again. A manual call cancels
    /// any pending reconnect timer.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the attempt fails
    /// - [`Error::ConnectionTimeout`] if the attempt exceeds `connect_timeout`
    /// - [`Error::ConnectionClosed`] if `disconnect()` aborts the attempt
    pub async fn connect(&self) -> Result<()> {
        let rx = {
            let mut shared = self.inner.shared.lock();

            match shared.status {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Connecting => {
                    debug!(generation = shared.generation, "Joining in-flight connect attempt");
                }
                ConnectionState::Closed | ConnectionState::Closing => {
                    if let Some(timer) = shared.reconnect_timer.take() {
                        timer.abort();
                        debug!("Manual connect cancelled pending reconnect");
                    }
                    self.inner.begin_attempt(&mut shared, AttemptOrigin::Caller);
                }
            }

            let (tx, rx) = oneshot::channel();
            shared.waiters.push(tx);
            rx
        };

        rx.await?.map_err(Error::from)
    }

    /// Closes the connection deliberately.
    ///
    /// Sends a normal-closure frame, stops the heartbeat, cancels any
    /// pending reconnect and fails in-flight `connect()` calls. Status is
    /// [`ConnectionState::Closed`] when this returns.
    pub fn disconnect(&self) {
        let waiters = {
            let mut shared = self.inner.shared.lock();

            if let Some(timer) = shared.reconnect_timer.take() {
                timer.abort();
                debug!("Cancelled pending reconnect");
            }

            shared.generation += 1;

            if let Some(socket) = shared.socket.take() {
                socket.close();
            }

            self.inner.set_status(&mut shared, ConnectionState::Closed);
            mem::take(&mut shared.waiters)
        };

        notify(waiters, &Err(AttemptError::Aborted));
        info!(url = %self.inner.url, "Disconnected");
    }

    /// Sends a frame if the connection is open.
    ///
    /// Returns `false` without sending when not open or when the frame
    /// cannot be serialized.
    pub fn send(&self, frame: &Frame) -> bool {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(frame_type = %frame.frame_type, error = %e, "Failed to serialize frame");
                return false;
            }
        };

        let shared = self.inner.shared.lock();
        match (&shared.status, &shared.socket) {
            (ConnectionState::Open, Some(socket)) => {
                let sent = socket.command_tx.send(SocketCommand::Send(text)).is_ok();
                if sent {
                    trace!(frame_type = %frame.frame_type, "Frame queued");
                }
                sent
            }
            _ => {
                warn!(frame_type = %frame.frame_type, status = %shared.status, "WebSocket is not connected");
                false
            }
        }
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.shared.lock().status
    }

    /// Returns a receiver that observes every state transition.
    #[inline]
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status_tx.subscribe()
    }

    /// Retries scheduled since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect.attempt_count()
    }

    /// Returns `true` while a reconnect timer is pending.
    #[inline]
    #[must_use]
    pub fn is_reconnect_pending(&self) -> bool {
        self.inner.shared.lock().reconnect_timer.is_some()
    }

    /// Returns the endpoint.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }
}

// ============================================================================
// ConnectionInner - State Machine
// ============================================================================

impl ConnectionInner {
    /// Records a transition and broadcasts it.
    fn set_status(&self, shared: &mut Shared, status: ConnectionState) {
        if shared.status != status {
            debug!(from = %shared.status, to = %status, "Connection state changed");
            shared.status = status;
            self.status_tx.send_replace(status);
        }
    }

    /// Moves to Connecting and spawns a dial under a new generation.
    fn begin_attempt(self: &Arc<Self>, shared: &mut Shared, origin: AttemptOrigin) {
        shared.generation += 1;
        shared.origin = origin;

        if let Some(old) = shared.socket.take() {
            old.close();
        }

        self.set_status(shared, ConnectionState::Connecting);

        let generation = shared.generation;
        let weak = Arc::downgrade(self);
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let connect_timeout = self.config.connect_timeout;

        debug!(generation, ?origin, %url, "Opening connection");

        tokio::spawn(async move {
            let result = match timeout(connect_timeout, connector.connect(&url)).await {
                Ok(Ok(socket)) => Ok(socket),
                Ok(Err(e)) => Err(AttemptError::Failed(e.to_string())),
                Err(_) => Err(AttemptError::TimedOut(connect_timeout.as_millis() as u64)),
            };

            match weak.upgrade() {
                Some(inner) => inner.finish_attempt(generation, result),
                None => discard_socket(result.ok()),
            }
        });
    }

    /// Applies the outcome of a dial.
    fn finish_attempt(
        self: &Arc<Self>,
        generation: u64,
        result: std::result::Result<Socket, AttemptError>,
    ) {
        let mut shared = self.shared.lock();

        if shared.generation != generation || shared.status != ConnectionState::Connecting {
            debug!(generation, "Discarding superseded connect attempt");
            drop(shared);
            discard_socket(result.ok());
            return;
        }

        let waiters = mem::take(&mut shared.waiters);

        let outcome = match result {
            Ok(socket) => {
                let (command_tx, command_rx) = mpsc::unbounded_channel();
                let closing = Arc::new(AtomicBool::new(false));

                shared.socket = Some(ActiveSocket {
                    command_tx,
                    closing: Arc::clone(&closing),
                });
                shared.reconnect.reset();
                self.set_status(&mut shared, ConnectionState::Open);

                info!(generation, url = %self.url, "WebSocket connected");

                tokio::spawn(run_socket(
                    Arc::downgrade(self),
                    generation,
                    socket,
                    command_rx,
                    closing,
                    Arc::clone(&self.on_frame),
                    self.config.heartbeat_interval,
                ));

                Ok(())
            }
            Err(err) => {
                warn!(generation, error = %err, "Connect attempt failed");
                self.set_status(&mut shared, ConnectionState::Closed);

                if shared.origin == AttemptOrigin::Reconnect {
                    self.schedule_reconnect(&mut shared);
                }

                Err(err)
            }
        };

        drop(shared);
        notify(waiters, &outcome);
    }

    /// Marks a remote close handshake in progress.
    fn remote_closing(&self, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation == generation && shared.status == ConnectionState::Open {
            self.set_status(&mut shared, ConnectionState::Closing);
        }
    }

    /// Handles the end of a socket the owner did not close.
    fn socket_closed(self: &Arc<Self>, generation: u64, reason: &str) {
        let mut shared = self.shared.lock();

        if shared.generation != generation {
            debug!(generation, "Ignoring close of superseded socket");
            return;
        }

        shared.socket = None;
        self.set_status(&mut shared, ConnectionState::Closed);

        info!(generation, reason, "WebSocket connection closed unexpectedly");

        self.schedule_reconnect(&mut shared);
    }

    /// Arms the next backoff timer, unless the budget is spent.
    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) {
        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }

        let Some(delay) = shared.reconnect.next_delay() else {
            error!(
                attempts = shared.reconnect.attempt_count(),
                "Max reconnection attempts reached"
            );
            return;
        };

        let attempt = shared.reconnect.attempt_count();
        let max_attempts = shared.reconnect.max_attempts();
        let expected_generation = shared.generation;
        let weak = Arc::downgrade(self);

        info!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection attempt"
        );

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_reconnect(expected_generation, attempt, max_attempts);
            }
        });

        shared.reconnect_timer = Some(handle.abort_handle());
    }

    /// Starts a scheduled retry if nothing changed meanwhile.
    fn fire_reconnect(self: &Arc<Self>, expected_generation: u64, attempt: u32, max_attempts: u32) {
        let mut shared = self.shared.lock();

        if shared.generation != expected_generation || shared.status != ConnectionState::Closed {
            debug!(attempt, "Skipping stale reconnect timer");
            return;
        }

        shared.reconnect_timer = None;
        info!(attempt, max_attempts, "Attempting to reconnect");
        self.begin_attempt(&mut shared, AttemptOrigin::Reconnect);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut();

        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }

        if let Some(socket) = shared.socket.take() {
            socket.close();
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Sends one outcome to every waiter.
fn notify(waiters: Vec<oneshot::Sender<AttemptOutcome>>, outcome: &AttemptOutcome) {
    for tx in waiters {
        let _ = tx.send(outcome.clone());
    }
}

/// Politely closes a socket nobody wants any more.
fn discard_socket(socket: Option<Socket>) {
    if let Some(mut socket) = socket {
        tokio::spawn(async move {
            let _ = socket.sink.close().await;
        });
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Owns one open socket until it closes.
async fn run_socket(
    connection: Weak<ConnectionInner>,
    generation: u64,
    socket: Socket,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    closing: Arc<AtomicBool>,
    on_frame: FrameHandler,
    heartbeat_interval: Duration,
) {
    let Socket {
        mut sink,
        mut stream,
    } = socket;
    let mut heartbeat = Heartbeat::start(heartbeat_interval);

    let exit = loop {
        tokio::select! {
            biased;

            // Commands from the owner
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!(generation, error = %e, "Failed to send WebSocket message");
                            break SocketExit::Unexpected(e.to_string());
                        }
                    }

                    Some(SocketCommand::Close) => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: DELIBERATE_CLOSE_REASON.into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        let _ = sink.close().await;
                        break SocketExit::Deliberate;
                    }

                    None => {
                        debug!(generation, "Command channel closed");
                        let _ = sink.close().await;
                        break SocketExit::Deliberate;
                    }
                }
            }

            // Incoming messages from the server
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => on_frame(text.as_str()),

                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        debug!(generation, ?code, "WebSocket closed by remote");
                        if let Some(inner) = connection.upgrade() {
                            inner.remote_closing(generation);
                        }
                        let _ = sink.close().await;
                        break SocketExit::Unexpected(format!("closed by remote (code {code:?})"));
                    }

                    Some(Err(e)) => {
                        error!(generation, error = %e, "WebSocket error");
                        break SocketExit::Unexpected(e.to_string());
                    }

                    None => {
                        debug!(generation, "WebSocket stream ended");
                        break SocketExit::Unexpected("stream ended".to_string());
                    }

                    // Ignore Binary, Ping, Pong, Frame
                    Some(Ok(_)) => {}
                }
            }

            // Liveness ping
            ping = heartbeat.tick() => {
                if closing.load(Ordering::Acquire) {
                    continue;
                }

                match ping.to_text() {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!(generation, error = %e, "Failed to send heartbeat");
                            break SocketExit::Unexpected(e.to_string());
                        }
                        trace!(generation, "Heartbeat sent");
                    }
                    Err(e) => warn!(generation, error = %e, "Failed to serialize heartbeat"),
                }
            }
        }
    };

    match exit {
        SocketExit::Deliberate => debug!(generation, "Socket task terminated"),
        SocketExit::Unexpected(reason) => {
            if let Some(inner) = connection.upgrade() {
                inner.socket_closed(generation, &reason);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
