//! Lifecycle events published by [`KeepAliveWebSocket`](super::KeepAliveWebSocket).

use std::fmt;
use std::sync::Arc;

use super::socket::Payload;
use crate::error::Error;

/// An observable lifecycle event.
///
/// Events are broadcast to every subscriber in the order the session
/// processed the underlying socket notifications.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    /// The socket opened; `send` is now accepted
    Open,
    /// A message arrived, passed through unchanged
    Message(Payload),
    /// A connect attempt or the transport failed
    Error(Option<Arc<Error>>),
    /// The connection was lost without the user asking for it; a reconnect follows
    Disconnect,
    /// Terminal event after a user-initiated close; no reconnect follows
    Close,
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Disconnect => EventKind::Disconnect,
            Self::Close => EventKind::Close,
        }
    }
}

/// Names an [`Event`] variant without its arguments, for [`wait_once`].
///
/// [`wait_once`]: super::KeepAliveWebSocket::wait_once
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Error,
    Disconnect,
    Close,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Message => "message",
            Self::Error => "error",
            Self::Disconnect => "disconnect",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}
