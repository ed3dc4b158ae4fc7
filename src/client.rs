//! Feed client: the handle consumers hold.
//!
//! [`FeedClient`] composes the transport [`Connection`], the
//! [`SubscriptionRegistry`] and the [`MessageRouter`] into one cheaply
//! cloneable service. Every clone talks to the same socket and the same
//! subscriber lists.
//!
//! # Example
//!
//! ```no_run
//! use market_feed::{FeedClient, PriceUpdate};
//!
//! # async fn example() -> market_feed::Result<()> {
//! let client = FeedClient::builder()
//!     .url("ws://localhost:8080/ws")
//!     .build()?;
//!
//! client.connect().await?;
//!
//! let subscription = client.subscribe_to_price_updates(["AAPL", "MSFT"], |update: PriceUpdate| {
//!     println!("{} {}", update.symbol, update.price);
//! });
//!
//! // ...
//! subscription.unsubscribe();
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::protocol::{Frame, PriceUpdate, SubscribePrices, message_type};
use crate::router::MessageRouter;
use crate::subscription::{Handler, Subscription, SubscriptionRegistry};
use crate::transport::{Connection, ConnectionState, Connector, TungsteniteConnector};

// ============================================================================
// FeedClient
// ============================================================================

/// Real-time market feed client.
///
/// Create with [`FeedClient::builder()`] or [`FeedClient::new()`].
/// Dropping the last clone closes the socket.
///
/// Subscriber callbacks are owned by the client's registry. A callback
/// that captures a `FeedClient` clone keeps the client alive from inside
/// itself, so the socket stays open after every outside clone is gone.
/// Capture a [`WeakFeedClient`] from [`downgrade`](Self::downgrade)
/// instead and upgrade it per call.
#[derive(Clone)]
pub struct FeedClient {
    /// Shared inner state.
    inner: Arc<ClientInner>,
}

/// Shared state behind every clone.
struct ClientInner {
    /// Log identity.
    id: ClientId,
    /// Transport.
    connection: Connection,
    /// Inbound fan-out.
    router: MessageRouter,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("id", &self.inner.id)
            .field("connection", &self.inner.connection)
            .field("subscriptions", &self.registry().len())
            .finish()
    }
}

// ============================================================================
// FeedClient - Constructors
// ============================================================================

impl FeedClient {
    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> FeedClientBuilder {
        FeedClientBuilder::new()
    }

    /// Creates a client over the default tokio-tungstenite connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: FeedConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Creates a client over a custom connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let router = MessageRouter::new(SubscriptionRegistry::new());
        let connection = Connection::new(config, connector, router.frame_handler())?;
        let id = ClientId::generate();

        debug!(client = %id, url = %connection.url(), "Feed client created");

        Ok(Self {
            inner: Arc::new(ClientInner {
                id,
                connection,
                router,
            }),
        })
    }
}

// ============================================================================
// FeedClient - Connection
// ============================================================================

impl FeedClient {
    /// Opens the connection. See [`Connection::connect`].
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the attempt fails
    /// - [`Error::ConnectionTimeout`] if the attempt times out
    /// - [`Error::ConnectionClosed`] if `disconnect()` aborts the attempt
    pub async fn connect(&self) -> Result<()> {
        self.inner.connection.connect().await
    }

    /// Closes the connection deliberately. See [`Connection::disconnect`].
    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    /// Sends a typed frame.
    ///
    /// Returns `false` when not open or when `payload` does not serialize.
    pub fn send<T: Serialize>(&self, frame_type: &str, payload: &T) -> bool {
        match Frame::with_payload(frame_type, payload) {
            Ok(frame) => self.inner.connection.send(&frame),
            Err(e) => {
                warn!(frame_type, error = %e, "Failed to serialize payload");
                false
            }
        }
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.connection.status()
    }

    /// Returns a receiver observing every state transition.
    #[inline]
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_status()
    }

    /// Retries scheduled since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.connection.reconnect_attempts()
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Returns this client's ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.inner.id
    }
}

// ============================================================================
// FeedClient - Subscriptions
// ============================================================================

impl FeedClient {
    /// Registers a raw payload callback for `message_type`.
    pub fn subscribe<F>(&self, message_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry().subscribe(message_type, callback)
    }

    /// Registers a shared handler; the same `Arc` twice is one entry.
    pub fn subscribe_handler(&self, message_type: &str, handler: Arc<Handler>) -> Subscription {
        self.registry().subscribe_handler(message_type, handler)
    }

    /// Requests price updates for `symbols` and registers `callback`.
    ///
    /// The `subscribe_prices` request is best-effort: it is only sent
    /// when the connection is open and is never acknowledged. The
    /// callback receives every `price_update`, whichever client asked for
    /// the symbol. Unsubscribing only removes the local callback.
    pub fn subscribe_to_price_updates<I, S, F>(&self, symbols: I, callback: F) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(PriceUpdate) + Send + Sync + 'static,
    {
        let request = SubscribePrices::new(symbols);
        if !self.send(message_type::SUBSCRIBE_PRICES, &request) {
            debug!(symbols = ?request.symbols, "Price subscription request not sent");
        }

        self.registry()
            .subscribe_typed(message_type::PRICE_UPDATE, callback)
    }

    /// Registers a passthrough callback for `trade_update` frames.
    pub fn subscribe_to_trade_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(message_type::TRADE_UPDATE, callback)
    }

    /// Registers a passthrough callback for `portfolio_update` frames.
    pub fn subscribe_to_portfolio_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(message_type::PORTFOLIO_UPDATE, callback)
    }

    /// Returns the subscription registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        self.inner.router.registry()
    }

    /// Returns the router inbound frames go through.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }

    /// Returns a handle that does not keep the client alive.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakFeedClient {
        WeakFeedClient {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// WeakFeedClient
// ============================================================================

/// Non-owning [`FeedClient`] handle for use inside subscriber callbacks.
#[derive(Clone)]
pub struct WeakFeedClient {
    /// Client state, if still alive.
    inner: Weak<ClientInner>,
}

impl WeakFeedClient {
    /// Returns the client if any strong handle still exists.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<FeedClient> {
        self.inner.upgrade().map(|inner| FeedClient { inner })
    }
}

impl fmt::Debug for WeakFeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakFeedClient")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// FeedClientBuilder
// ============================================================================

/// Builder for configuring a [`FeedClient`].
///
/// Use [`FeedClient::builder()`] to create one.
#[derive(Default, Clone)]
pub struct FeedClientBuilder {
    /// Base configuration.
    config: Option<FeedConfig>,
    /// Endpoint override.
    url: Option<String>,
    /// Socket factory.
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for FeedClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClientBuilder")
            .field("config", &self.config)
            .field("url", &self.url)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

impl FeedClientBuilder {
    /// Creates a builder with no overrides.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint, overriding the URL in any supplied config.
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket URL (e.g., "ws://localhost:8080/ws")
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the base configuration.
    ///
    /// Without one, [`FeedConfig::from_env`] is used.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: FeedConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the socket factory. Defaults to [`TungsteniteConnector`].
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is empty
    /// - [`Error::Config`] if the resulting configuration is invalid
    pub fn build(self) -> Result<FeedClient> {
        let config = self.resolve_config()?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector));

        FeedClient::with_connector(config, connector)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl FeedClientBuilder {
    /// Merges the URL override into the base configuration.
    fn resolve_config(&self) -> Result<FeedConfig> {
        let config = self.config.clone().unwrap_or_else(FeedConfig::from_env);

        let Some(url) = &self.url else {
            return Ok(config);
        };

        if url.trim().is_empty() {
            return Err(Error::config(
                "Feed URL must not be empty.\n\
                 Example: FeedClient::builder().url(\"ws://localhost:8080/ws\")",
            ));
        }

        Ok(config.with_url(url.trim()))
    }
}

// ============================================================================
// Tests
// ============================================================================
