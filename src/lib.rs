//! Market Feed - Reconnecting WebSocket client for real-time market data.
//!
//! This library keeps one WebSocket connection to a market data server
//! alive and fans typed updates out to any number of subscribers.
//!
//! # Architecture
//!
//! The client follows a layered model:
//!
//! - **Transport**: Owns the socket, heartbeat and reconnect backoff
//! - **Router**: Parses inbound frames, dispatches by message type
//! - **Registry**: Tracks callbacks per message type
//!
//! Key design principles:
//!
//! - Each [`FeedClient`] owns: one connection + one registry + one router
//! - Frames are JSON `{ "type", "payload", "timestamp" }` text messages
//! - Only deliberate disconnects suppress reconnection
//! - A panicking subscriber never takes down its siblings
//!
//! # Quick Start
//!
//! ```no_run
//! use market_feed::{FeedClient, PriceUpdate, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = FeedClient::builder()
//!         .url("ws://localhost:8080/ws")
//!         .build()?;
//!
//!     client.connect().await?;
//!
//!     let subscription = client.subscribe_to_price_updates(["AAPL"], |update: PriceUpdate| {
//!         println!("{}: {:.2} ({:+.2}%)", update.symbol, update.price, update.change_percent);
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     subscription.unsubscribe();
//!     client.disconnect();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`FeedClient`] and its builder |
//! | [`config`] | [`FeedConfig`] and defaults |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Frame envelope and payload types |
//! | [`quotes`] | [`QuoteBoard`] watchlist state |
//! | [`router`] | [`MessageRouter`] fan-out |
//! | [`simulate`] | [`PriceSimulator`] development feed |
//! | [`subscription`] | [`SubscriptionRegistry`] and handles |
//! | [`transport`] | Connection, heartbeat and reconnect |

// ============================================================================
// Modules
// ============================================================================

/// Feed client and builder.
///
/// Use [`FeedClient::builder()`] to create a configured client.
pub mod client;

/// Connection configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire format.
///
/// Defines the frame envelope and the payloads of known message types.
pub mod protocol;

/// Watchlist state fed by price updates.
pub mod quotes;

/// Inbound frame dispatch.
pub mod router;

/// Random price generator for development without a server.
pub mod simulate;

/// Callback bookkeeping.
pub mod subscription;

/// WebSocket transport layer.
///
/// Handles the socket lifecycle, heartbeat and reconnect backoff.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{FeedClient, FeedClientBuilder, WeakFeedClient};

// Configuration
pub use config::FeedConfig;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, SubscriptionId};

// Protocol types
pub use protocol::{Frame, PriceUpdate, message_type};

// Consumer state
pub use quotes::{Quote, QuoteBoard};

// Dispatch
pub use router::MessageRouter;
pub use subscription::{Handler, Subscription, SubscriptionRegistry};

// Development feed
pub use simulate::{PriceSimulator, SimulatorHandle};

// Transport types
pub use transport::{Connection, ConnectionState, Connector, TungsteniteConnector};
