//! In-memory connector for exercising the connection state machine.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::pending;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{sink, stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Frame;

use super::connector::{Connector, Socket};

// ============================================================================
// Step
// ============================================================================

/// What the mock does for one `connect` call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    /// Open immediately.
    Accept,
    /// Open after a delay.
    AcceptAfter(Duration),
    /// Fail immediately.
    Refuse,
    /// Never complete.
    Hang,
}

// ============================================================================
// MockServer
// ============================================================================

/// Server side of one accepted mock socket.
pub(crate) struct MockServer {
    /// Messages delivered to the client's read half.
    pub inbound: mpsc::UnboundedSender<StdResult<Message, WsError>>,
    /// Messages the client wrote.
    pub outbound: mpsc::UnboundedReceiver<Message>,
}

impl MockServer {
    /// Delivers a raw text message to the client.
    pub fn push_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Message::Text(text.into())));
    }

    /// Delivers a frame to the client.
    pub fn push_frame(&self, frame: &Frame) {
        self.push_text(&frame.to_text().unwrap());
    }

    /// Returns the next text frame the client wrote, skipping other messages.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        while let Some(message) = self.outbound.recv().await {
            if let Message::Text(text) = message {
                return Some(Frame::parse(&text).unwrap());
            }
        }
        None
    }

    /// Drains everything the client wrote until its write half closes.
    pub async fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = self.outbound.recv().await {
            messages.push(message);
        }
        messages
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Scripted connector that records every call.
pub(crate) struct MockConnector {
    /// Per-call behavior, consumed front to back.
    steps: Mutex<VecDeque<Step>>,
    /// Behavior once the script runs out.
    fallback: Step,
    /// Number of `connect` calls.
    calls: AtomicUsize,
    /// Clock reading at every `connect` call.
    call_times: Mutex<Vec<Instant>>,
    /// Hands accepted server sides to the test.
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    /// Creates a connector with a script and a fallback step.
    pub fn new(
        steps: impl IntoIterator<Item = Step>,
        fallback: Step,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, servers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            servers,
        });
        (connector, servers_rx)
    }

    /// Number of underlying connection attempts.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Clock readings of every attempt.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    fn accept(&self) -> Result<Socket> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();

        let stream = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });

        let sink = sink::unfold(outbound_tx, |tx, message: Message| async move {
            tx.send(message).map_err(|_| WsError::ConnectionClosed)?;
            Ok::<_, WsError>(tx)
        });

        let _ = self.servers.send(MockServer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });

        Ok(Socket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &Url) -> Result<Socket> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());

        let step = self.steps.lock().pop_front().unwrap_or(self.fallback);
        match step {
            Step::Accept => self.accept(),
            Step::AcceptAfter(delay) => {
                sleep(delay).await;
                self.accept()
            }
            Step::Refuse => Err(Error::connection("connection refused")),
            Step::Hang => pending().await,
        }
    }
}
