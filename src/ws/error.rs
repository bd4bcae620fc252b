#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use super::event::EventKind;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// `send` was called while the connection was not open
    NotReady,
    /// The session was closed by the user and will not reconnect
    Closed,
    /// A readiness wait ended because the connection failed before opening
    Interrupted {
        /// Event that ended the wait
        event: EventKind,
        /// Cause carried by an `error` event, if any
        cause: Option<Arc<crate::error::Error>>,
    },
    /// The socket behind the current handle is gone
    ConnectionClosed,
    /// The URL scheme is not one a WebSocket can connect to
    UnsupportedScheme(String),
    /// Error connecting to or communicating with the WebSocket server
    #[cfg(feature = "tungstenite")]
    Connection(tokio_tungstenite::tungstenite::Error),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "WebSocket not ready"),
            Self::Closed => write!(f, "WebSocket session closed"),
            Self::Interrupted { event, .. } => {
                write!(f, "WebSocket failed to open: received {event} before open")
            }
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "unsupported WebSocket URL scheme: {scheme}")
            }
            #[cfg(feature = "tungstenite")]
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Interrupted {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            #[cfg(feature = "tungstenite")]
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::UnsupportedScheme(_) => crate::error::Kind::Validation,
            _ => crate::error::Kind::WebSocket,
        };
        crate::error::Error::with_source(kind, e)
    }
}

#[cfg(feature = "tungstenite")]
impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
