//! Keep-alive WebSocket infrastructure.
//!
//! # Architecture
//!
//! - [`KeepAliveWebSocket`]: the public handle; send, await readiness, wait for events
//! - `session`: the background task running the connection state machine
//! - [`SocketFactory`] / [`UrlProvider`]: injected collaborators that build sockets and
//!   produce the address for each attempt
//! - [`SocketHandle`] / [`SocketPeer`]: the channel pair a socket implementation drives
//!
//! # Example
//!
//! ```ignore
//! let ws = KeepAliveWebSocket::with_factory(url_fn(fetch_signed_url), MyFactory, config)?;
//! ws.connect().await;
//! ws.ready().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
mod session;
pub mod socket;
pub mod traits;
#[cfg(feature = "tungstenite")]
pub mod tungstenite;

pub use connection::KeepAliveWebSocket;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use event::{Event, EventKind};
pub use session::Phase;
pub use socket::{
    CloseFrame, Payload, SocketCommand, SocketEvent, SocketHandle, SocketPeer, socket_pair,
};
pub use traits::*;
#[cfg(feature = "tungstenite")]
pub use tungstenite::TungsteniteFactory;
