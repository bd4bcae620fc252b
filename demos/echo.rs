//! Demonstrates a self-healing connection to a WebSocket echo server.
//!
//! This example shows how to:
//! 1. Resolve the endpoint lazily, once per connect attempt
//! 2. Wait for the connection and exchange a message
//! 3. Watch lifecycle events while the manager reconnects in the background
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,keepalive_ws=debug cargo run --example echo --features tracing
//! ```
//!
//! Point it at another server with `ECHO_URL`:
//! ```sh
//! ECHO_URL=ws://127.0.0.1:9001 RUST_LOG=info cargo run --example echo --features tracing
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=echo.log RUST_LOG=info cargo run --example echo --features tracing
//! ```

use std::fs::File;
use std::time::Duration;

use futures::StreamExt as _;
use keepalive_ws::ws::config::Config;
use keepalive_ws::ws::{Event, EventKind, KeepAliveWebSocket, url_fn};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_URL: &str = "wss://ws.postman-echo.com/raw";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    // Re-read on every attempt, so a changed variable takes effect on reconnect
    let endpoint = url_fn(|| async {
        Ok::<_, std::env::VarError>(
            std::env::var("ECHO_URL").unwrap_or_else(|_| DEFAULT_URL.to_owned()),
        )
    });

    let config = Config::builder()
        .autoconnect(true)
        .min_time_between_reconnects(Duration::from_secs(2))
        .build();
    let ws = KeepAliveWebSocket::new(endpoint, config)?;

    let mut events = Box::pin(ws.events());
    let watcher = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Event::Message(payload) => info!(event = "message", len = payload.len()),
                Event::Error(cause) => warn!(event = "error", ?cause),
                other => info!(event = %other.kind()),
            }
        }
    });

    ws.ready().await?;
    info!(phase = ?ws.phase(), "connected");

    for text in ["Hello", "world!"] {
        let reply = ws.next_message();
        ws.send(text)?;
        let payload = reply.await?;
        info!(sent = text, received = ?payload.as_text());
    }

    let closed = ws.wait_once(EventKind::Close);
    ws.close();
    closed.await?;
    watcher.await?;

    Ok(())
}
