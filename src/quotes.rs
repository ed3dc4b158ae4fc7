//! Per-symbol quote state fed by price updates.
//!
//! [`QuoteBoard`] is the consumer side of the price stream: a watchlist
//! whose rows tick as `price_update` frames arrive.
//!
//! # Example
//!
//! ```
//! use market_feed::{PriceUpdate, QuoteBoard};
//!
//! let board = QuoteBoard::new();
//! board.track("aapl", "Apple Inc.", 178.45);
//!
//! let applied = board.apply(&PriceUpdate {
//!     symbol: "AAPL".into(),
//!     price: 180.0,
//!     change: 1.55,
//!     change_percent: 0.87,
//!     volume: 1_000,
//!     timestamp: "2025-01-01T00:00:00Z".into(),
//! });
//!
//! assert!(applied);
//! assert_eq!(board.get("AAPL").map(|q| q.price), Some(180.0));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::client::FeedClient;
use crate::protocol::PriceUpdate;
use crate::subscription::Subscription;

// ============================================================================
// Quote
// ============================================================================

/// One watchlist row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Ticker symbol, uppercase.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Last price.
    pub price: f64,
    /// Absolute change.
    pub change: f64,
    /// Relative change in percent.
    pub change_percent: f64,
    /// Traded volume.
    pub volume: u64,
    /// Timestamp of the last applied update, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Quote {
    /// Creates a quote with no change and no volume.
    #[must_use]
    pub fn new(symbol: impl AsRef<str>, name: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            name: name.into(),
            price,
            change: 0.0,
            change_percent: 0.0,
            volume: 0,
            updated_at: None,
        }
    }

    /// Sets change figures and volume.
    #[inline]
    #[must_use]
    pub fn with_stats(mut self, change: f64, change_percent: f64, volume: u64) -> Self {
        self.change = change;
        self.change_percent = change_percent;
        self.volume = volume;
        self
    }

    /// Merges a price update into this quote.
    pub fn merge(&mut self, update: &PriceUpdate) {
        self.price = update.price;
        self.change = update.change;
        self.change_percent = update.change_percent;
        self.volume = update.volume;
        self.updated_at = Some(update.timestamp.clone());
    }
}

/// Trims and uppercases a ticker.
fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

// ============================================================================
// QuoteBoard
// ============================================================================

/// Thread-safe set of tracked quotes.
///
/// Cloning yields another handle to the same board.
#[derive(Clone, Default)]
pub struct QuoteBoard {
    /// Quotes by symbol.
    quotes: Arc<RwLock<FxHashMap<String, Quote>>>,
}

impl fmt::Debug for QuoteBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteBoard")
            .field("symbols", &self.symbols())
            .finish()
    }
}

impl QuoteBoard {
    /// Creates an empty board.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a board pre-filled with `quotes`.
    #[must_use]
    pub fn with_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let map = quotes
            .into_iter()
            .map(|quote| (quote.symbol.clone(), quote))
            .collect();
        Self {
            quotes: Arc::new(RwLock::new(map)),
        }
    }

    /// Board holding the default eight-symbol watchlist.
    #[must_use]
    pub fn demo_watchlist() -> Self {
        Self::with_quotes([
            Quote::new("AAPL", "Apple Inc.", 178.45).with_stats(2.34, 1.33, 45_234_567),
            Quote::new("GOOGL", "Alphabet Inc.", 2720.30).with_stats(-15.67, -0.57, 1_234_567),
            Quote::new("MSFT", "Microsoft Corporation", 325.80).with_stats(4.23, 1.32, 23_456_789),
            Quote::new("TSLA", "Tesla, Inc.", 251.20).with_stats(8.90, 3.67, 34_567_890),
            Quote::new("AMZN", "Amazon.com, Inc.", 3542.67).with_stats(-23.45, -0.66, 2_345_678),
            Quote::new("NVDA", "NVIDIA Corporation", 589.34).with_stats(12.56, 2.18, 12_345_678),
            Quote::new("META", "Meta Platforms, Inc.", 312.45).with_stats(-5.67, -1.78, 8_765_432),
            Quote::new("NFLX", "Netflix, Inc.", 456.78).with_stats(6.78, 1.51, 3_456_789),
        ])
    }

    /// Starts tracking a symbol. Returns `false` if it is already tracked
    /// or the symbol is blank.
    pub fn track(&self, symbol: impl AsRef<str>, name: impl Into<String>, price: f64) -> bool {
        let quote = Quote::new(symbol, name, price);
        if quote.symbol.is_empty() {
            return false;
        }

        let mut quotes = self.quotes.write();
        if quotes.contains_key(&quote.symbol) {
            return false;
        }

        debug!(symbol = %quote.symbol, "Tracking symbol");
        quotes.insert(quote.symbol.clone(), quote);
        true
    }

    /// Stops tracking a symbol and returns its last quote.
    pub fn untrack(&self, symbol: &str) -> Option<Quote> {
        self.quotes.write().remove(&normalize_symbol(symbol))
    }

    /// Merges an update into the matching quote.
    ///
    /// Returns `false` if the symbol is not tracked.
    pub fn apply(&self, update: &PriceUpdate) -> bool {
        let mut quotes = self.quotes.write();
        let Some(quote) = quotes.get_mut(&normalize_symbol(&update.symbol)) else {
            trace!(symbol = %update.symbol, "Update for untracked symbol");
            return false;
        };

        quote.merge(update);
        true
    }

    /// Subscribes to price updates for every tracked symbol and merges
    /// them into this board.
    pub fn attach(&self, client: &FeedClient) -> Subscription {
        let board = self.clone();
        client.subscribe_to_price_updates(self.symbols(), move |update: PriceUpdate| {
            board.apply(&update);
        })
    }

    /// Returns a copy of one quote.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.quotes.read().get(&normalize_symbol(symbol)).cloned()
    }

    /// Returns every quote, sorted by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self.quotes.read().values().cloned().collect();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        quotes
    }

    /// Tracked symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.quotes.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Number of tracked symbols.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    /// Returns `true` if nothing is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
