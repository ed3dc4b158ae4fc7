//! Development price feed.
//!
//! Generates `price_update` frames and dispatches them through a local
//! [`MessageRouter`], so subscribers tick without a server. Nothing
//! generated here goes over the wire.
//!
//! Two modes are available:
//!
//! - [`PriceSimulator::spawn`] emits unrelated random quotes for a fixed
//!   symbol list.
//! - [`PriceSimulator::spawn_drift`] walks every quote on a [`QuoteBoard`]
//!   by a small step each round, so prices move plausibly.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Frame, PriceUpdate, message_type};
use crate::quotes::{Quote, QuoteBoard};
use crate::router::MessageRouter;

// ============================================================================
// Constants
// ============================================================================

/// Default period between simulated update rounds.
pub const DEFAULT_SIMULATION_INTERVAL: Duration = Duration::from_secs(2);

/// Largest relative move of one drift step, in percent.
const MAX_DRIFT_PERCENT: f64 = 2.5;

/// Largest volume added by one drift step.
const MAX_DRIFT_VOLUME: u64 = 1_000;

// ============================================================================
// PriceSimulator
// ============================================================================

/// Random price update generator.
#[derive(Debug)]
pub struct PriceSimulator {
    /// Randomness source.
    rng: StdRng,
}

impl Default for PriceSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceSimulator {
    /// Creates a simulator seeded from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a reproducible simulator.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates an unrelated random quote for `symbol`.
    ///
    /// Price is in [50, 1050), change in [-10, 10), volume in
    /// [0, 1 000 000). Price, change and percent are rounded to cents.
    pub fn random_update(&mut self, symbol: &str) -> PriceUpdate {
        let price: f64 = self.rng.gen_range(50.0..1050.0);
        let change: f64 = self.rng.gen_range(-10.0..10.0);

        PriceUpdate {
            symbol: symbol.to_string(),
            price: round_cents(price),
            change: round_cents(change),
            change_percent: round_cents(change / price * 100.0),
            volume: self.rng.gen_range(0..1_000_000),
            timestamp: now_rfc3339(),
        }
    }

    /// Moves `quote` by up to ±2.5 % of its price.
    pub fn drift(&mut self, quote: &Quote) -> PriceUpdate {
        let percent = self.rng.gen_range(-MAX_DRIFT_PERCENT..MAX_DRIFT_PERCENT);
        let price = quote.price * (1.0 + percent / 100.0);
        let change = price - quote.price;
        let change_percent = if quote.price == 0.0 {
            0.0
        } else {
            change / quote.price * 100.0
        };

        PriceUpdate {
            symbol: quote.symbol.clone(),
            price,
            change,
            change_percent,
            volume: quote
                .volume
                .saturating_add(self.rng.gen_range(0..MAX_DRIFT_VOLUME)),
            timestamp: now_rfc3339(),
        }
    }

    /// Dispatches one random update per symbol through `router`.
    ///
    /// Returns the number of callbacks that completed.
    pub fn tick(&mut self, router: &MessageRouter, symbols: &[String]) -> usize {
        let mut delivered = 0;

        for symbol in symbols {
            let update = self.random_update(symbol);
            delivered += publish(router, &update);
        }

        trace!(symbols = symbols.len(), delivered, "Simulated update round");
        delivered
    }

    /// Dispatches one [`drift`](Self::drift) step for every quote on `board`.
    ///
    /// The board is read once up front. Whether the new prices land on it
    /// depends on a subscriber, usually [`QuoteBoard::attach`].
    pub fn tick_drift(&mut self, board: &QuoteBoard, router: &MessageRouter) -> usize {
        let quotes = board.snapshot();
        let mut delivered = 0;

        for quote in &quotes {
            let update = self.drift(quote);
            delivered += publish(router, &update);
        }

        trace!(symbols = quotes.len(), delivered, "Simulated drift round");
        delivered
    }

    /// Runs [`tick`](Self::tick) every `interval` on a background task.
    ///
    /// The first round fires one full interval after the call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `interval` is zero.
    pub fn spawn(
        mut self,
        router: MessageRouter,
        symbols: Vec<String>,
        interval: Duration,
    ) -> Result<SimulatorHandle> {
        validate_interval(interval)?;
        debug!(symbols = ?symbols, interval_ms = interval.as_millis() as u64, "Price simulator started");

        Ok(run_every(interval, move || {
            self.tick(&router, &symbols);
        }))
    }

    /// Runs [`tick_drift`](Self::tick_drift) every `interval` on a
    /// background task.
    ///
    /// Each round re-reads `board`, so symbols tracked or untracked while
    /// running are picked up on the next round.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `interval` is zero.
    pub fn spawn_drift(
        mut self,
        board: QuoteBoard,
        router: MessageRouter,
        interval: Duration,
    ) -> Result<SimulatorHandle> {
        validate_interval(interval)?;
        debug!(symbols = board.len(), interval_ms = interval.as_millis() as u64, "Drift simulator started");

        Ok(run_every(interval, move || {
            self.tick_drift(&board, &router);
        }))
    }
}

/// Rejects a period the ticker cannot run with.
fn validate_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::config("Simulation interval must be greater than zero"));
    }
    Ok(())
}

/// Calls `round` every `interval`, first after one full interval.
fn run_every<F>(interval: Duration, mut round: F) -> SimulatorHandle
where
    F: FnMut() + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            round();
        }
    });

    SimulatorHandle { task }
}

/// Encodes `update` and dispatches it locally.
fn publish(router: &MessageRouter, update: &PriceUpdate) -> usize {
    match Frame::with_payload(message_type::PRICE_UPDATE, update) {
        Ok(frame) => router.dispatch(&frame),
        Err(e) => {
            warn!(symbol = %update.symbol, error = %e, "Failed to encode simulated update");
            0
        }
    }
}

/// Rounds to two decimal places.
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current time as an RFC 3339 UTC string.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// SimulatorHandle
// ============================================================================

/// Stops the background simulator on [`stop`](Self::stop) or drop.
#[derive(Debug)]
pub struct SimulatorHandle {
    /// The running task.
    task: JoinHandle<()>,
}

impl SimulatorHandle {
    /// Stops the simulator.
    pub fn stop(self) {
        drop(self);
    }

    /// Returns `true` once the task has ended.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Price simulator stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use crate::subscription::SubscriptionRegistry;

    fn counting_router() -> (MessageRouter, Arc<AtomicUsize>) {
        let router = MessageRouter::new(SubscriptionRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _sub = router
            .registry()
            .subscribe_typed(message_type::PRICE_UPDATE, move |_: PriceUpdate| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        (router, count)
    }

    fn is_cents(value: f64) -> bool {
        ((value * 100.0).round() - value * 100.0).abs() < 1e-6
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(1.234), 1.23);
        assert_eq!(round_cents(-9.999), -10.0);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = PriceSimulator::with_seed(7).random_update("AAPL");
        let b = PriceSimulator::with_seed(7).random_update("AAPL");
        assert_eq!((a.price, a.change, a.volume), (b.price, b.change, b.volume));
    }

    proptest! {
        #[test]
        fn prop_random_update_in_range(seed in any::<u64>()) {
            let update = PriceSimulator::with_seed(seed).random_update("TSLA");

            prop_assert_eq!(update.symbol.as_str(), "TSLA");
            prop_assert!((50.0..=1050.0).contains(&update.price));
            prop_assert!((-10.0..=10.0).contains(&update.change));
            prop_assert!(update.volume < 1_000_000);
            prop_assert!(is_cents(update.price));
            prop_assert!(is_cents(update.change));
            prop_assert!(is_cents(update.change_percent));
        }

        #[test]
        fn prop_drift_bounded(seed in any::<u64>(), price in 1.0f64..5000.0, volume in 0u64..1_000_000) {
            let quote = Quote::new("NVDA", "NVIDIA Corporation", price).with_stats(0.0, 0.0, volume);
            let update = PriceSimulator::with_seed(seed).drift(&quote);

            prop_assert!(update.change_percent.abs() <= MAX_DRIFT_PERCENT + 1e-9);
            prop_assert!((update.price - quote.price - update.change).abs() < 1e-9);
            prop_assert!(update.volume >= volume && update.volume < volume + MAX_DRIFT_VOLUME);
        }
    }

    #[test]
    fn test_tick_dispatches_per_symbol() {
        let (router, count) = counting_router();
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string(), "TSLA".to_string()];

        let delivered = PriceSimulator::with_seed(1).tick(&router, &symbols);
        assert_eq!(delivered, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_ticks_until_stopped() {
        let (router, count) = counting_router();
        let handle = PriceSimulator::with_seed(3)
            .spawn(
                router,
                vec!["AAPL".into(), "GOOGL".into()],
                DEFAULT_SIMULATION_INTERVAL,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(DEFAULT_SIMULATION_INTERVAL).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        handle.stop();
        tokio::time::sleep(DEFAULT_SIMULATION_INTERVAL * 5).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let (router, count) = counting_router();
        {
            let _handle = PriceSimulator::new()
                .spawn(router, vec!["META".into()], Duration::from_millis(100))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
        }

        let seen = count.load(Ordering::SeqCst);
        assert_eq!(seen, 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_spawn_rejects_zero_interval() {
        let (router, _) = counting_router();
        let board = QuoteBoard::demo_watchlist();

        let plain =
            PriceSimulator::with_seed(1).spawn(router.clone(), vec!["AAPL".into()], Duration::ZERO);
        let drift = PriceSimulator::with_seed(1).spawn_drift(board, router, Duration::ZERO);

        assert!(matches!(plain, Err(Error::Config { .. })));
        assert!(matches!(drift, Err(Error::Config { .. })));
    }

    #[test]
    fn test_tick_drift_covers_board() {
        let (router, count) = counting_router();
        let board = QuoteBoard::demo_watchlist();

        let delivered = PriceSimulator::with_seed(5).tick_drift(&board, &router);
        assert_eq!(delivered, board.len());
        assert_eq!(count.load(Ordering::SeqCst), board.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_drift_walks_board_prices() {
        let router = MessageRouter::new(SubscriptionRegistry::new());
        let board = QuoteBoard::with_quotes([
            Quote::new("AAPL", "Apple Inc.", 200.0).with_stats(0.0, 0.0, 5_000),
            Quote::new("MSFT", "Microsoft Corporation", 400.0).with_stats(0.0, 0.0, 7_000),
        ]);
        let sink = board.clone();
        let _sub = router
            .registry()
            .subscribe_typed(message_type::PRICE_UPDATE, move |update: PriceUpdate| {
                sink.apply(&update);
            });

        let before = board.snapshot();
        let handle = PriceSimulator::with_seed(11)
            .spawn_drift(board.clone(), router, Duration::from_millis(500))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(board.snapshot(), before);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let after = board.snapshot();
        assert_eq!(after.len(), before.len());

        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.symbol, new.symbol);
            assert_ne!(new.price, old.price);
            assert!((new.price - old.price).abs() <= old.price * MAX_DRIFT_PERCENT / 100.0 + 1e-9);
            assert!(new.volume >= old.volume && new.volume < old.volume + MAX_DRIFT_VOLUME);
            assert!(new.updated_at.is_some());
        }

        handle.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(board.snapshot(), after);
    }
}
