//! Periodic liveness pings while a socket is open.
//!
//! The heartbeat lives inside the socket task, so it starts when the
//! socket opens and stops when the task ends. There is no pong tracking.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::json;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::protocol::{Frame, Ping, message_type};

// ============================================================================
// Heartbeat
// ============================================================================

/// Fixed-interval ping source.
///
/// The first tick fires one full period after [`Heartbeat::start`].
#[derive(Debug)]
pub struct Heartbeat {
    /// Underlying timer.
    interval: Interval,
}

impl Heartbeat {
    /// Starts a heartbeat with the given period.
    #[must_use]
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Returns the configured period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Waits for the next tick and returns a fresh ping frame.
    pub async fn tick(&mut self) -> Frame {
        self.interval.tick().await;
        Self::ping_frame()
    }

    /// Builds a `ping` frame carrying the current epoch millis.
    #[must_use]
    pub fn ping_frame() -> Frame {
        let ping = Ping::now();
        Frame::new(message_type::PING, json!({ "timestamp": ping.timestamp }))
    }
}

// ============================================================================
// Tests
// ============================================================================
