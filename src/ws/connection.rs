#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::future::Future;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::config::Config;
use super::error::WsError;
use super::event::{Event, EventKind};
use super::session::{Command, Phase, Session};
use super::socket::{CloseFrame, Payload};
use super::traits::{SocketFactory, UrlProvider};
use crate::Result;

/// A WebSocket connection that looks permanently available.
///
/// The manager reconnects after every drop it did not ask for, throttled so
/// that two connect attempts never start closer together than
/// [`Config::min_time_between_reconnects`]. Lifecycle changes are published
/// as [`Event`]s and can be awaited with [`ready`](Self::ready) and
/// [`wait_once`](Self::wait_once).
///
/// The handle is cheap to clone; all clones drive the same session. The
/// session runs in a background task and shuts down, closing its socket,
/// once every handle is dropped.
///
/// # Example
///
/// ```rust, no_run
/// use keepalive_ws::ws::{Event, EventKind, KeepAliveWebSocket};
/// use keepalive_ws::ws::config::Config;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let ws = KeepAliveWebSocket::new(
///         "wss://echo.example.com",
///         Config::builder().autoconnect(true).build(),
///     )?;
///
///     ws.ready().await?;
///     let reply = ws.next_message();
///     ws.send("Hello")?;
///     println!("echoed: {:?}", reply.await?);
///
///     let closed = ws.wait_once(EventKind::Close);
///     ws.close();
///     assert!(matches!(closed.await?, Event::Close));
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct KeepAliveWebSocket {
    /// Sender channel for commands to the session task
    commands: mpsc::UnboundedSender<Command>,
    /// Watch channel sender for the current phase, shared with the session
    /// so a user close is visible before this handle returns
    phase_tx: watch::Sender<Phase>,
    /// Broadcast sender for lifecycle events, kept to create subscriptions
    events_tx: broadcast::Sender<Event>,
}

impl KeepAliveWebSocket {
    /// Create a manager backed by the default [`TungsteniteFactory`].
    ///
    /// Must be called within a tokio runtime. Starts connecting right away
    /// when [`Config::autoconnect`] is set.
    ///
    /// [`TungsteniteFactory`]: super::tungstenite::TungsteniteFactory
    #[cfg(feature = "tungstenite")]
    pub fn new<U: UrlProvider>(url: U, config: Config) -> Result<Self> {
        Self::with_factory(url, super::tungstenite::TungsteniteFactory, config)
    }

    /// Create a manager that builds its sockets with `factory`.
    pub fn with_factory<U: UrlProvider, F: SocketFactory>(
        url: U,
        factory: F,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()?;

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let (phase_tx, _) = watch::channel(Phase::Idle);

        let session = Session::new(
            config,
            Arc::new(url),
            Arc::new(factory),
            phase_tx.clone(),
            events_tx.clone(),
        );
        runtime.spawn(session.run(commands_rx));

        Ok(Self {
            commands,
            phase_tx,
            events_tx,
        })
    }

    /// Get the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase_tx.borrow()
    }

    /// Whether `send` would currently be accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase().is_open()
    }

    /// Start connecting unless already open or connecting.
    ///
    /// Completes once the current attempt concludes: the socket opened, the
    /// attempt failed, or the session was closed. A failure is reported as
    /// an [`Event::Error`] and handed to the reconnect flow, never returned
    /// here, so check [`phase`](Self::phase) or combine with
    /// [`ready`](Self::ready) to know whether the connection is open.
    ///
    /// Calls made while an attempt is in flight, or while a reconnect is
    /// scheduled, join that attempt instead of starting another one.
    pub async fn connect(&self) -> &Self {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Connect(done_tx)).is_ok() {
            _ = done_rx.await;
        }
        self
    }

    /// Send a payload over the open connection.
    ///
    /// Fails with [`WsError::NotReady`] unless the connection is open. The
    /// payload is not queued or retried: a transport failure after this call
    /// returns surfaces through the normal `error`/`disconnect` events.
    pub fn send<P: Into<Payload>>(&self, payload: P) -> Result<&Self> {
        if !self.is_open() {
            return Err(WsError::NotReady.into());
        }

        self.commands
            .send(Command::Send(payload.into()))
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(self)
    }

    /// Wait until the connection is open.
    ///
    /// Completes immediately when already open, otherwise on the next
    /// [`Event::Open`]. Fails with [`WsError::Interrupted`] if an `error`,
    /// `disconnect` or `close` event arrives first, and with
    /// [`WsError::Closed`] once the session has been closed.
    ///
    /// The subscription is taken when this method is called, not when the
    /// future is first polled. If the waiter falls more than
    /// [`Config::event_capacity`] events behind, the missed events cannot be
    /// inspected; the current phase decides instead, so an `error` that was
    /// followed by a successful reopen is not reported.
    pub fn ready(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let mut events = self.events_tx.subscribe();
        let phase_rx = self.phase_tx.subscribe();
        let phase = self.phase();

        async move {
            if let Some(settled) = settled_readiness(phase) {
                return settled;
            }

            loop {
                match events.recv().await {
                    Ok(Event::Open) => return Ok(()),
                    Ok(Event::Error(cause)) => {
                        return Err(WsError::Interrupted {
                            event: EventKind::Error,
                            cause,
                        }
                        .into());
                    }
                    Ok(event @ (Event::Disconnect | Event::Close)) => {
                        return Err(WsError::Interrupted {
                            event: event.kind(),
                            cause: None,
                        }
                        .into());
                    }
                    Ok(Event::Message(_)) => {}
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(count, "Readiness wait lagged, checking phase");
                        #[cfg(not(feature = "tracing"))]
                        let _ = count;

                        let phase = *phase_rx.borrow();
                        if let Some(settled) = settled_readiness(phase) {
                            return settled;
                        }
                    }
                    Err(RecvError::Closed) => return Err(WsError::Closed.into()),
                }
            }
        }
    }

    /// Wait for the next occurrence of `kind` and return it.
    ///
    /// Fires at most once, and only for an occurrence after this call.
    /// Fails with [`WsError::Closed`] if the session reaches its terminal
    /// `close` first (unless `kind` is [`EventKind::Close`]), or is already
    /// closed when called.
    ///
    /// A waiter that falls more than [`Config::event_capacity`] events behind
    /// skips the oldest ones and may miss its occurrence; it then keeps
    /// waiting for the next one.
    pub fn wait_once(&self, kind: EventKind) -> impl Future<Output = Result<Event>> + Send + 'static {
        let mut events = self.events_tx.subscribe();
        let terminated = self.phase() == Phase::ClosedByUser;

        async move {
            if terminated {
                return Err(WsError::Closed.into());
            }

            loop {
                match events.recv().await {
                    Ok(event) if event.kind() == kind => return Ok(event),
                    Ok(Event::Close) | Err(RecvError::Closed) => {
                        return Err(WsError::Closed.into());
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(count, %kind, "Event wait lagged, missed events");
                        #[cfg(not(feature = "tracing"))]
                        let _ = count;
                    }
                }
            }
        }
    }

    /// Wait for the next message payload.
    pub fn next_message(&self) -> impl Future<Output = Result<Payload>> + Send + 'static {
        let next = self.wait_once(EventKind::Message);

        async move {
            match next.await? {
                Event::Message(payload) => Ok(payload),
                _ => Err(WsError::Closed.into()),
            }
        }
    }

    /// Close the connection for good.
    ///
    /// Suppresses every future reconnect. The phase moves to
    /// [`Phase::Closing`] before this returns, so `send` and `ready` fail from
    /// here on. If a socket is live it is asked to close and [`Event::Close`]
    /// follows its confirmation; otherwise `close` is emitted right away.
    /// Calling this again has no effect.
    pub fn close(&self) {
        self.request_close(None);
    }

    /// Like [`close`](Self::close), sending `code` and `reason` to the peer.
    pub fn close_with<S: Into<String>>(&self, code: u16, reason: S) {
        self.request_close(Some(CloseFrame::new(code, reason)));
    }

    fn request_close(&self, frame: Option<CloseFrame>) {
        let first = self.phase_tx.send_if_modified(|phase| {
            if phase.is_closed() {
                return false;
            }
            *phase = Phase::Closing;
            true
        });

        if first {
            _ = self.commands.send(Command::Close(frame));
        }
    }

    /// Subscribe to every lifecycle event.
    ///
    /// Each call returns a new independent receiver that sees events from
    /// this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Stream every lifecycle event, ending after [`Event::Close`].
    ///
    /// Events missed because the consumer fell behind are skipped.
    pub fn events(&self) -> impl Stream<Item = Event> + Send + 'static {
        let mut events = self.events_tx.subscribe();

        async_stream::stream! {
            loop {
                match events.recv().await {
                    Ok(Event::Close) => {
                        yield Event::Close;
                        break;
                    }
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(count, "Event stream lagged, missed events");
                        #[cfg(not(feature = "tracing"))]
                        let _ = count;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Subscribe to phase changes.
    ///
    /// Useful for detecting reconnections and re-establishing application
    /// state after each `open`.
    #[must_use]
    pub fn phase_receiver(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }
}

/// Outcome of a readiness wait that the phase alone decides.
fn settled_readiness(phase: Phase) -> Option<Result<()>> {
    match phase {
        Phase::Open => Some(Ok(())),
        Phase::Closing | Phase::ClosedByUser => Some(Err(WsError::Closed.into())),
        Phase::Idle | Phase::Connecting | Phase::Reconnecting { .. } => None,
    }
}

impl std::fmt::Debug for KeepAliveWebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAliveWebSocket")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
