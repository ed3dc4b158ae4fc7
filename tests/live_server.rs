//! End-to-end tests against a local tokio-tungstenite server.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use market_feed::{ConnectionState, FeedClient, FeedConfig, Frame, PriceUpdate};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ============================================================================
// Test Server
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

/// Accepts every connection and hands the upgraded socket to the test.
async fn start_server() -> Result<(String, mpsc::UnboundedReceiver<ServerSocket>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await
                && tx.send(ws).is_err()
            {
                break;
            }
        }
    });

    Ok((format!("ws://127.0.0.1:{port}/ws"), rx))
}

async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<ServerSocket>) -> Result<ServerSocket> {
    timeout(WAIT, sockets.recv())
        .await
        .context("no connection accepted")?
        .context("server stopped")
}

/// Next text frame from the client, skipping pings and control messages.
async fn next_frame_of(ws: &mut ServerSocket, frame_type: &str) -> Result<Frame> {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .context("timed out waiting for frame")?
            .context("client went away")??;

        if let Message::Text(text) = message {
            let frame = Frame::parse(text.as_str())?;
            if frame.frame_type == frame_type {
                return Ok(frame);
            }
        }
    }
}

fn client_for(url: &str) -> Result<FeedClient> {
    let config = FeedConfig::new(url)
        .with_reconnect_base_delay(Duration::from_millis(50))
        .with_heartbeat_interval(Duration::from_secs(60));

    Ok(FeedClient::builder().config(config).build()?)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn price_subscription_round_trip() -> Result<()> {
    let (url, mut sockets) = start_server().await?;
    let client = client_for(&url)?;

    client.connect().await?;
    assert_eq!(client.status(), ConnectionState::Open);
    let mut server = next_socket(&mut sockets).await?;

    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let _subscription = client.subscribe_to_price_updates(["AAPL"], move |update: PriceUpdate| {
        let _ = updates_tx.send(update);
    });

    let request = next_frame_of(&mut server, "subscribe_prices").await?;
    assert_eq!(request.payload, json!({ "symbols": ["AAPL"] }));
    assert!(request.timestamp.is_some());

    let push = Frame::new(
        "price_update",
        json!({
            "symbol": "AAPL",
            "price": 178.45,
            "change": 2.34,
            "changePercent": 1.33,
            "volume": 45234567,
            "timestamp": "2025-01-01T00:00:00Z"
        }),
    );
    server.send(Message::Text(push.to_text()?.into())).await?;

    let update = timeout(WAIT, updates.recv())
        .await?
        .context("update channel closed")?;
    assert_eq!(update.symbol, "AAPL");
    assert_eq!(update.price, 178.45);
    assert_eq!(update.volume, 45_234_567);

    client.disconnect();
    Ok(())
}

#[tokio::test]
async fn server_close_triggers_reconnect() -> Result<()> {
    let (url, mut sockets) = start_server().await?;
    let client = client_for(&url)?;

    client.connect().await?;
    let mut first = next_socket(&mut sockets).await?;
    first.close(None).await?;

    let _second = next_socket(&mut sockets).await?;

    let mut status = client.watch_status();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionState::Open)).await??;
    assert_eq!(client.reconnect_attempts(), 0);

    client.disconnect();
    Ok(())
}

#[tokio::test]
async fn deliberate_disconnect_sends_normal_close() -> Result<()> {
    let (url, mut sockets) = start_server().await?;
    let client = client_for(&url)?;

    client.connect().await?;
    let mut server = next_socket(&mut sockets).await?;

    client.disconnect();
    assert_eq!(client.status(), ConnectionState::Closed);

    loop {
        let message = timeout(WAIT, server.next())
            .await?
            .context("client went away without a close frame")??;

        match message {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason.as_str(), "Deliberate disconnect");
                break;
            }
            Message::Close(None) => bail!("close frame carried no code"),
            _ => {}
        }
    }

    // No reconnect follows a deliberate close
    assert!(
        timeout(Duration::from_millis(300), sockets.recv())
            .await
            .is_err()
    );
    Ok(())
}

#[tokio::test]
async fn connect_to_closed_port_fails_without_retry() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let client = client_for(&format!("ws://127.0.0.1:{port}/ws"))?;
    let error = client.connect().await.expect_err("nothing is listening");

    assert!(error.is_connection_error());
    assert_eq!(client.status(), ConnectionState::Closed);
    assert!(!client.connection().is_reconnect_pending());
    Ok(())
}
