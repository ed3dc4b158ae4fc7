//! Typed payloads for the recognized message types.

// ============================================================================
// Imports
// ============================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// Message Type Names
// ============================================================================

/// Routing keys used in [`Frame::frame_type`](super::Frame::frame_type).
pub mod message_type {
    /// Client → server: request price updates for a symbol set.
    pub const SUBSCRIBE_PRICES: &str = "subscribe_prices";

    /// Client → server: heartbeat.
    pub const PING: &str = "ping";

    /// Server → client: one symbol's latest price.
    pub const PRICE_UPDATE: &str = "price_update";

    /// Server → client: trade execution (passthrough).
    pub const TRADE_UPDATE: &str = "trade_update";

    /// Server → client: portfolio change (passthrough).
    pub const PORTFOLIO_UPDATE: &str = "portfolio_update";
}

// ============================================================================
// PriceUpdate
// ============================================================================

/// Payload of a `price_update` frame.
///
/// # Format
///
/// ```json
/// {
///   "symbol": "AAPL",
///   "price": 178.45,
///   "change": 2.34,
///   "changePercent": 1.33,
///   "volume": 45234567,
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Ticker symbol.
    pub symbol: String,
    /// Last price.
    pub price: f64,
    /// Absolute change since previous close.
    pub change: f64,
    /// Relative change in percent.
    pub change_percent: f64,
    /// Traded volume.
    pub volume: u64,
    /// Server-side timestamp, passed through verbatim.
    pub timestamp: String,
}

// ============================================================================
// SubscribePrices
// ============================================================================

/// Payload of a `subscribe_prices` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePrices {
    /// Symbols to stream.
    pub symbols: Vec<String>,
}

impl SubscribePrices {
    /// Creates a request for the given symbols.
    #[must_use]
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Ping
// ============================================================================

/// Payload of a heartbeat `ping` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Send time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Ping {
    /// Creates a ping marked with the current time.
    #[inline]
    #[must_use]
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
