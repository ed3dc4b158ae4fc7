//! Feed client configuration.
//!
//! Every tunable of the connection layer lives in [`FeedConfig`]: the
//! endpoint URL, the reconnect budget and base delay, the heartbeat
//! interval and the connect timeout.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use market_feed::FeedConfig;
//!
//! let config = FeedConfig::new("wss://feed.example.com/ws")
//!     .with_max_reconnect_attempts(3)
//!     .with_heartbeat_interval(Duration::from_secs(15));
//!
//! assert!(config.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Endpoint used when nothing else is configured.
pub const DEFAULT_URL: &str = "ws://localhost:8080/ws";

/// Environment variable read by [`FeedConfig::from_env`].
pub const URL_ENV_VAR: &str = "MARKET_FEED_URL";

/// Default automatic reconnect budget.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default backoff base (first retry delay).
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// FeedConfig
// ============================================================================

/// Connection layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,

    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect; doubles per attempt.
    pub reconnect_base_delay: Duration,

    /// Period between heartbeat pings while open.
    pub heartbeat_interval: Duration,

    /// Maximum time one connect attempt may take.
    pub connect_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl FeedConfig {
    /// Creates a configuration for `url` with default tunables.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Creates a configuration whose URL comes from `MARKET_FEED_URL`,
    /// falling back to [`DEFAULT_URL`].
    #[must_use]
    pub fn from_env() -> Self {
        let url = env::var(URL_ENV_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        Self::new(url)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl FeedConfig {
    /// Sets the endpoint URL.
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the automatic reconnect budget. Zero disables reconnects.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the backoff base delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Sets the heartbeat interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl FeedConfig {
    /// Checks the configuration and returns the parsed endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL does not parse or is not `ws`/`wss`
    /// - [`Error::Config`] if any duration is zero
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("Invalid feed URL '{}': {e}", self.url)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Feed URL scheme must be ws or wss, got '{}'",
                url.scheme()
            )));
        }

        if self.reconnect_base_delay.is_zero() {
            return Err(Error::config("reconnect_base_delay must be > 0"));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must be > 0"));
        }

        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be > 0"));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
