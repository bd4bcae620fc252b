//! The socket primitive the connection manager drives.
//!
//! A socket is a pair of channels. The manager owns the [`SocketHandle`]
//! end: it issues [`SocketCommand`]s and consumes [`SocketEvent`]s. The
//! socket implementation owns the [`SocketPeer`] end: it reports what the
//! transport does and carries out the commands.
//!
//! A well-behaved implementation reports `Open` at most once, never reports
//! `Message` before `Open`, and reports `Close` exactly once as its last
//! event. Dropping the peer without reporting `Close` is treated as a close
//! without a frame.

use std::fmt;

use tokio::sync::mpsc;

use super::error::WsError;
use crate::Result;

/// An opaque transport unit: one WebSocket text or binary message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// Status code and reason sent or received with a close.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    /// Normal closure (1000).
    pub const NORMAL: u16 = 1000;

    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// A notification from the socket implementation.
#[non_exhaustive]
#[derive(Debug)]
pub enum SocketEvent {
    Open,
    Message(Payload),
    Error(Option<crate::error::Error>),
    Close(Option<CloseFrame>),
}

/// A request from the manager to the socket implementation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    Send(Payload),
    Close(Option<CloseFrame>),
}

/// The manager's end of a socket.
///
/// Dropping the handle drops the command sender, which tells the socket
/// implementation that nobody is listening any more.
#[derive(Debug)]
pub struct SocketHandle {
    commands: mpsc::UnboundedSender<SocketCommand>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketHandle {
    /// Forwards a payload to the socket.
    pub fn send(&self, payload: Payload) -> Result<()> {
        self.commands
            .send(SocketCommand::Send(payload))
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Asks the socket to close. The socket answers with a `Close` event.
    pub fn close(&self, frame: Option<CloseFrame>) {
        _ = self.commands.send(SocketCommand::Close(frame));
    }

    /// Waits for the next notification. `None` once the peer is gone.
    ///
    /// Cancel safe: an event is never lost if this future is dropped.
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }
}

/// The socket implementation's end of a socket.
#[derive(Debug)]
pub struct SocketPeer {
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketPeer {
    /// Reports a notification to the manager. Returns `false` once the
    /// handle has been dropped.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn open(&self) -> bool {
        self.emit(SocketEvent::Open)
    }

    pub fn message<P: Into<Payload>>(&self, payload: P) -> bool {
        self.emit(SocketEvent::Message(payload.into()))
    }

    pub fn error(&self, cause: Option<crate::error::Error>) -> bool {
        self.emit(SocketEvent::Error(cause))
    }

    pub fn closed(&self, frame: Option<CloseFrame>) -> bool {
        self.emit(SocketEvent::Close(frame))
    }

    /// Waits for the next command. `None` once the handle is dropped.
    pub async fn next_command(&mut self) -> Option<SocketCommand> {
        self.commands.recv().await
    }

    /// Returns a command if one is already queued.
    pub fn try_next_command(&mut self) -> Option<SocketCommand> {
        self.commands.try_recv().ok()
    }

    /// Whether the manager has dropped its handle.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }
}

/// Creates a connected handle/peer pair.
#[must_use]
pub fn socket_pair() -> (SocketHandle, SocketPeer) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    (
        SocketHandle {
            commands: commands_tx,
            events: events_rx,
        },
        SocketPeer {
            commands: commands_rx,
            events: events_tx,
        },
    )
}
