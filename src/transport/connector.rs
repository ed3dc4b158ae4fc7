//! Socket factory seam.
//!
//! [`Connection`](super::Connection) never opens sockets itself; it asks a
//! [`Connector`] for a split duplex [`Socket`]. The default
//! [`TungsteniteConnector`] dials with tokio-tungstenite. Tests plug in
//! in-memory connectors.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::result::Result as StdResult;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Write half of a socket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of a socket.
pub type WsStream = Pin<Box<dyn Stream<Item = StdResult<Message, WsError>> + Send>>;

/// An open duplex socket, already split.
pub struct Socket {
    /// Outbound messages.
    pub sink: WsSink,
    /// Inbound messages.
    pub stream: WsStream,
}

// ============================================================================
// Connector
// ============================================================================

/// Opens sockets for a [`Connection`](super::Connection).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a socket to `url`, completing the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the endpoint cannot be reached.
    async fn connect(&self, url: &Url) -> Result<Socket>;
}

// ============================================================================
// TungsteniteConnector
// ============================================================================

/// Dials plain WebSocket endpoints with tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Socket> {
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(%url, status = %response.status(), "WebSocket handshake completed");

        let (sink, stream) = ws_stream.split();

        Ok(Socket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
