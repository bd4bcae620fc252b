#![cfg(feature = "tungstenite")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use keepalive_ws::error::Kind;
use keepalive_ws::ws::config::Config;
use keepalive_ws::ws::{Event, EventKind, KeepAliveWebSocket, Payload, Phase, WsError};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Mock echo server.
struct EchoServer {
    addr: SocketAddr,
    /// Tells ALL connected clients' handlers to close their connection
    kick_tx: broadcast::Sender<()>,
    /// Number of accepted WebSocket handshakes
    accepted: Arc<AtomicUsize>,
}

impl EchoServer {
    /// Start an echo server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (kick_tx, _) = broadcast::channel::<()>(16);
        let accepted = Arc::new(AtomicUsize::new(0));

        let server_kick = kick_tx.clone();
        let server_accepted = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                server_accepted.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let mut kick_rx = server_kick.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                                        if write.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    // Keep polling so the close reply gets flushed
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            _ = kick_rx.recv() => {
                                drop(write.send(Message::Close(None)).await);
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            kick_tx,
            accepted,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/echo", self.addr)
    }

    /// Drop every live connection from the server side.
    fn kick_all(&self) {
        drop(self.kick_tx.send(()));
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Address that refuses connections.
async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/")
}

fn fast_reconnects() -> Config {
    Config::builder()
        .autoconnect(true)
        .min_time_between_reconnects(Duration::from_millis(100))
        .build()
}

#[tokio::test]
async fn echo_survives_server_side_drop() {
    common::init_tracing();
    let server = EchoServer::start().await;

    let ws = KeepAliveWebSocket::new(server.ws_url(), fast_reconnects()).unwrap();
    timeout(WAIT, ws.ready()).await.unwrap().unwrap();

    let reply = ws.next_message();
    ws.send("Hello").unwrap();
    assert_eq!(timeout(WAIT, reply).await.unwrap().unwrap(), Payload::from("Hello"));

    let disconnected = ws.wait_once(EventKind::Disconnect);
    server.kick_all();
    assert!(matches!(
        timeout(WAIT, disconnected).await.unwrap().unwrap(),
        Event::Disconnect
    ));
    assert!(!ws.is_open());

    timeout(WAIT, ws.ready()).await.unwrap().unwrap();

    let reply = ws.next_message();
    ws.send("world!").unwrap();
    assert_eq!(timeout(WAIT, reply).await.unwrap().unwrap(), Payload::from("world!"));
    assert_eq!(server.accepted(), 2);

    let closed = ws.wait_once(EventKind::Close);
    ws.close();
    assert!(matches!(timeout(WAIT, closed).await.unwrap().unwrap(), Event::Close));
    assert_eq!(ws.phase(), Phase::ClosedByUser);
}

#[tokio::test]
async fn binary_payloads_are_echoed() {
    let server = EchoServer::start().await;

    let ws = KeepAliveWebSocket::new(server.ws_url(), fast_reconnects()).unwrap();
    timeout(WAIT, ws.ready()).await.unwrap().unwrap();

    let reply = ws.next_message();
    ws.send(vec![0_u8, 159, 146, 150]).unwrap();
    assert_eq!(
        timeout(WAIT, reply).await.unwrap().unwrap(),
        Payload::Binary(vec![0, 159, 146, 150])
    );

    ws.close();
}

#[tokio::test]
async fn close_with_code_reaches_close_event() {
    let server = EchoServer::start().await;

    let ws = KeepAliveWebSocket::new(server.ws_url(), fast_reconnects()).unwrap();
    timeout(WAIT, ws.ready()).await.unwrap().unwrap();

    let events = ws.events();
    ws.close_with(4000, "done");

    let kinds: Vec<EventKind> = timeout(WAIT, events.map(|event| event.kind()).collect())
        .await
        .unwrap();

    assert_eq!(kinds, [EventKind::Close]);
    assert!(matches!(
        ws.send("late").unwrap_err().downcast_ref::<WsError>(),
        Some(WsError::NotReady)
    ));
}

#[tokio::test]
async fn refused_connection_keeps_retrying() {
    let url = closed_port_url().await;

    let ws = KeepAliveWebSocket::new(url, fast_reconnects()).unwrap();
    let mut events = ws.subscribe();

    // Every refused handshake reports error then disconnect, and is retried
    for _ in 0..2 {
        assert!(matches!(common::next_event(&mut events).await, Event::Error(Some(_))));
        assert!(matches!(common::next_event(&mut events).await, Event::Disconnect));
    }

    ws.close();
    assert!(matches!(common::next_event(&mut events).await, Event::Close));
}

#[tokio::test]
async fn ready_fails_for_refused_connection() {
    let url = closed_port_url().await;

    let ws = KeepAliveWebSocket::new(url, fast_reconnects()).unwrap();
    let error = timeout(WAIT, ws.ready()).await.unwrap().unwrap_err();

    assert_eq!(error.kind(), Kind::WebSocket);
    assert!(matches!(
        error.downcast_ref::<WsError>(),
        Some(WsError::Interrupted {
            event: EventKind::Error,
            ..
        })
    ));

    ws.close();
}

#[tokio::test]
async fn unsupported_scheme_is_reported_as_error_event() {
    let ws = KeepAliveWebSocket::new("http://127.0.0.1:1/", fast_reconnects()).unwrap();
    let mut events = ws.subscribe();

    let Event::Error(Some(cause)) = common::next_event(&mut events).await else {
        panic!("expected an error event");
    };
    assert_eq!(cause.kind(), Kind::Validation);
    assert!(matches!(ws.phase(), Phase::Reconnecting { .. }));

    ws.close();
    assert!(matches!(common::next_event(&mut events).await, Event::Close));
}
