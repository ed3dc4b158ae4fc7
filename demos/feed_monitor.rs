//! Live watchlist monitor.
//!
//! Demonstrates:
//! - Building a FeedClient from the environment or a URL argument
//! - Attaching a QuoteBoard to price updates
//! - Watching connection state transitions
//! - Running without a server through the price simulator
//!
//! Usage:
//!   cargo run --example feed_monitor -- --mock
//!   cargo run --example feed_monitor -- ws://localhost:8080/ws
//!   cargo run --example feed_monitor -- --mock --no-wait --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use market_feed::simulate::DEFAULT_SIMULATION_INTERVAL;
use market_feed::{FeedClient, FeedConfig, PriceSimulator, QuoteBoard, Result};
use tokio::time::{MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const PRINT_INTERVAL: Duration = Duration::from_secs(5);

/// Rounds printed before exiting with `--no-wait`.
const NO_WAIT_ROUNDS: usize = 2;

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    mock: bool,
    no_wait: bool,
    url: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            mock: args.iter().any(|a| a == "--mock"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            url: args.iter().find(|a| !a.starts_with("--")).cloned(),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "market_feed=debug"
    } else {
        "market_feed=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Feed Monitor ===\n");

    // ========================================================================
    // Create Client
    // ========================================================================

    let mut builder = FeedClient::builder().config(FeedConfig::from_env());
    if let Some(url) = &args.url {
        builder = builder.url(url);
    }
    let client = builder.build()?;

    println!("[1] Client ready");
    println!("    URL: {}", client.connection().url());

    // ========================================================================
    // Attach Watchlist
    // ========================================================================

    let board = QuoteBoard::demo_watchlist();
    let _simulator = if args.mock {
        println!("[2] Mock mode: simulating {} symbols\n", board.len());
        Some(PriceSimulator::new().spawn_drift(
            board.clone(),
            client.router().clone(),
            DEFAULT_SIMULATION_INTERVAL,
        )?)
    } else {
        println!("[2] Connecting...");
        client.connect().await?;
        println!("    ✓ {}\n", client.status());
        None
    };

    let subscription = board.attach(&client);

    let mut status = client.watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = *status.borrow_and_update();
            println!("    [status] {state}");
        }
    });

    // ========================================================================
    // Print Loop
    // ========================================================================

    let mut ticker = interval(PRINT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rounds = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print_board(&board);
                rounds += 1;
                if args.no_wait && rounds >= NO_WAIT_ROUNDS {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    subscription.unsubscribe();
    client.disconnect();
    println!("\n[3] Disconnected ({})", client.status());

    Ok(())
}

fn print_board(board: &QuoteBoard) {
    println!("{:<6} {:>10} {:>9} {:>8} {:>12}", "SYMBOL", "PRICE", "CHANGE", "%", "VOLUME");
    for quote in board.snapshot() {
        println!(
            "{:<6} {:>10.2} {:>+9.2} {:>+7.2}% {:>12}",
            quote.symbol, quote.price, quote.change, quote.change_percent, quote.volume
        );
    }
    println!();
}
