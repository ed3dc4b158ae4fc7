//! Bounded exponential backoff for automatic reconnects.
//!
//! The delay before retry `n` (1-based) is `base_delay * 2^(n - 1)`.
//! With the defaults (1000 ms, 5 attempts) the schedule is
//! 1s, 2s, 4s, 8s, 16s, after which retries stop until the owner
//! reconnects by hand.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::config::FeedConfig;

// ============================================================================
// ReconnectState
// ============================================================================

/// Retry counter and backoff policy for one connection.
///
/// The counter is reset on every successful open and incremented on
/// every scheduled retry. It never exceeds `max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    /// Retries scheduled since the last successful open.
    attempt_count: u32,
    /// Delay before the first retry.
    base_delay: Duration,
    /// Retry budget.
    max_attempts: u32,
}

impl ReconnectState {
    /// Creates a fresh policy.
    #[inline]
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            base_delay,
            max_attempts,
        }
    }

    /// Creates a policy from the feed configuration.
    #[inline]
    #[must_use]
    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.reconnect_base_delay, config.max_reconnect_attempts)
    }

    /// Retries scheduled since the last successful open.
    #[inline]
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Retry budget.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` once no further retry may be scheduled.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Delay before 1-based retry `attempt`. Saturates instead of overflowing.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Claims the next retry and returns its delay, or `None` when the
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempt_count += 1;
        Some(self.delay_for_attempt(self.attempt_count))
    }

    /// Clears the counter after a successful open.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Full delay schedule for a fresh policy.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
