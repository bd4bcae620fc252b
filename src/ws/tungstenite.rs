//! Default [`SocketFactory`] backed by `tokio-tungstenite`.
//!
//! Each socket runs in its own task. Like a browser WebSocket, a handshake
//! failure is reported as `error` followed by `close`, and a URL that cannot
//! be connected to at all fails construction.

use futures::{SinkExt as _, StreamExt as _};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WireCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::error::WsError;
use super::socket::{CloseFrame, Payload, SocketCommand, SocketHandle, SocketPeer, socket_pair};
use super::traits::SocketFactory;
use crate::Result;

/// Builds sockets on top of `tokio_tungstenite::connect_async`.
///
/// Must be used within a tokio runtime.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteFactory;

impl SocketFactory for TungsteniteFactory {
    fn create(&self, url: &str) -> Result<SocketHandle> {
        let parsed = url::Url::parse(url)?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(WsError::UnsupportedScheme(other.to_owned()).into()),
        }

        let runtime = tokio::runtime::Handle::try_current()?;
        let (handle, peer) = socket_pair();
        runtime.spawn(drive(parsed.into(), peer));

        Ok(handle)
    }
}

async fn drive(url: String, mut peer: SocketPeer) {
    let connect = connect_async(url.as_str());
    tokio::pin!(connect);

    let connected = loop {
        tokio::select! {
            connected = &mut connect => break connected,
            command = peer.next_command() => match command {
                Some(SocketCommand::Close(frame)) => {
                    // Closed before the handshake finished
                    peer.closed(frame);
                    return;
                }
                Some(SocketCommand::Send(_)) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(%url, "Ignoring send before the socket opened");
                }
                None => return,
            },
        }
    };

    let (mut write, mut read) = match connected {
        Ok((stream, _response)) => stream.split(),
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%url, "WebSocket handshake failed: {e:?}");
            peer.error(Some(e.into()));
            peer.closed(None);
            return;
        }
    };

    peer.open();

    let mut close_frame = None;
    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    peer.message(Payload::Text(text.to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    peer.message(Payload::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    // tungstenite answers the close itself; the stream ends next
                    close_frame = frame.map(from_wire);
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                }
                Some(Err(e)) => {
                    peer.error(Some(e.into()));
                    break;
                }
                None => break,
            },
            command = peer.next_command() => match command {
                Some(SocketCommand::Send(payload)) => {
                    if let Err(e) = write.send(to_wire(payload)).await {
                        peer.error(Some(e.into()));
                        break;
                    }
                }
                Some(SocketCommand::Close(frame)) => {
                    // Keep reading until the server confirms
                    _ = write.send(Message::Close(frame.map(into_wire))).await;
                }
                None => {
                    // Nobody is listening any more
                    _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
        }
    }

    peer.closed(close_frame);
}

fn to_wire(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.into()),
        Payload::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

fn into_wire(frame: CloseFrame) -> WireCloseFrame {
    WireCloseFrame {
        code: CloseCode::from(frame.code),
        reason: frame.reason.into(),
    }
}

fn from_wire(frame: WireCloseFrame) -> CloseFrame {
    CloseFrame::new(u16::from(frame.code), frame.reason.as_str())
}
