//! The session task: the only place the connection state machine runs.
//!
//! Every transition happens inside [`Session::run`], which handles one input
//! at a time (a command from a handle, a socket notification, a finished URL
//! resolution or an expired timer). Nothing else touches the session state,
//! so it needs no locking.

use std::future::pending;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};

use super::config::Config;
use super::event::Event;
use super::socket::{CloseFrame, Payload, SocketEvent, SocketHandle};
use super::traits::{SocketFactory, UrlProvider};
use crate::Result;
use crate::error::Error;

/// Lifecycle phase of a connection session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No attempt has been made yet, and none is scheduled
    Idle,
    /// Resolving the URL or waiting for the socket to open
    Connecting,
    /// The socket is open and accepts `send`
    Open,
    /// Waiting for the next attempt after a lost connection or failed attempt
    Reconnecting {
        /// Attempts made since the last successful open
        attempt: u32,
    },
    /// The user closed the session; waiting for the socket to confirm.
    ///
    /// Published by the handle itself, so it is visible as soon as `close`
    /// returns. Only [`Phase::ClosedByUser`] follows it.
    Closing,
    /// Terminal: closed by the user, never reconnects
    ClosedByUser,
}

impl Phase {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the user has closed the session.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closing | Self::ClosedByUser)
    }
}

pub(crate) enum Command {
    Connect(oneshot::Sender<()>),
    Send(Payload),
    Close(Option<CloseFrame>),
}

pub(crate) struct Session {
    config: Config,
    url: Arc<dyn UrlProvider>,
    factory: Arc<dyn SocketFactory>,
    phase_tx: watch::Sender<Phase>,
    events_tx: broadcast::Sender<Event>,
    /// URL resolution of the current attempt
    resolving: Option<BoxFuture<'static, Result<String>>>,
    socket: Option<SocketHandle>,
    reconnect_at: Option<Instant>,
    close_deadline: Option<Instant>,
    close_frame: Option<CloseFrame>,
    last_attempt_at: Option<Instant>,
    attempts: u32,
    ever_opened: bool,
    closed_by_user: bool,
    /// `connect()` callers waiting for the current attempt to conclude
    connect_waiters: Vec<oneshot::Sender<()>>,
}

impl Session {
    pub(crate) fn new(
        config: Config,
        url: Arc<dyn UrlProvider>,
        factory: Arc<dyn SocketFactory>,
        phase_tx: watch::Sender<Phase>,
        events_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            url,
            factory,
            phase_tx,
            events_tx,
            resolving: None,
            socket: None,
            reconnect_at: None,
            close_deadline: None,
            close_frame: None,
            last_attempt_at: None,
            attempts: 0,
            ever_opened: false,
            closed_by_user: false,
            connect_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if self.config.autoconnect {
            self.start_attempt();
        }

        while self.phase() != Phase::ClosedByUser {
            if self.phase() == Phase::Closing && !self.closed_by_user {
                // A handle published its close ahead of the command
                while let Ok(command) = commands.try_recv() {
                    self.handle_command(command);
                    if self.closed_by_user {
                        break;
                    }
                }
                if self.phase() == Phase::ClosedByUser {
                    break;
                }
            }

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                resolved = resolve(&mut self.resolving) => {
                    self.resolving = None;
                    self.on_resolved(resolved);
                }
                event = next_socket_event(&mut self.socket) => self.on_socket_event(event),
                () = sleep_until_deadline(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_attempt();
                }
                () = sleep_until_deadline(self.close_deadline) => self.on_close_timeout(),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("WebSocket session finished");
    }

    fn phase(&self) -> Phase {
        *self.phase_tx.borrow()
    }

    fn set_phase(&self, phase: Phase) {
        self.phase_tx.send_if_modified(|current| {
            let locked = match *current {
                Phase::ClosedByUser => true,
                Phase::Closing => phase != Phase::ClosedByUser,
                Phase::Idle | Phase::Connecting | Phase::Open | Phase::Reconnecting { .. } => false,
            };
            if locked || *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        _ = self.events_tx.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(done) => match self.phase() {
                Phase::Idle => {
                    self.connect_waiters.push(done);
                    self.start_attempt();
                }
                Phase::Connecting | Phase::Reconnecting { .. } => self.connect_waiters.push(done),
                Phase::Open | Phase::Closing | Phase::ClosedByUser => {
                    _ = done.send(());
                }
            },
            Command::Send(payload) => self.forward(payload),
            Command::Close(frame) => self.close(frame),
        }
    }

    fn start_attempt(&mut self) {
        let now = Instant::now();
        self.last_attempt_at = Some(now);
        self.reconnect_at = None;
        self.attempts = self.attempts.saturating_add(1);
        self.set_phase(Phase::Connecting);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = self.attempts, "Starting WebSocket connect attempt");

        let url = Arc::clone(&self.url);
        self.resolving = Some(Box::pin(async move { url.url().await }));
    }

    fn on_resolved(&mut self, resolved: Result<String>) {
        let created = match resolved {
            Ok(url) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%url, "Resolved WebSocket URL");
                self.factory.create(&url)
            }
            Err(e) => Err(e),
        };

        match created {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => self.fail_attempt(e),
        }
    }

    fn fail_attempt(&mut self, error: Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(attempt = self.attempts, "Unable to connect: {error:?}");

        self.set_phase(Phase::Reconnecting {
            attempt: self.attempts,
        });
        self.emit(Event::Error(Some(Arc::new(error))));
        self.release_connect_waiters();
        self.schedule_reconnect();
    }

    fn on_socket_event(&mut self, event: Option<SocketEvent>) {
        match event {
            Some(SocketEvent::Open) => self.on_open(),
            Some(SocketEvent::Message(payload)) => {
                if self.phase() == Phase::Open {
                    self.emit(Event::Message(payload));
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(phase = ?self.phase(), "Dropping message received outside the open phase");
                }
            }
            Some(SocketEvent::Error(cause)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(?cause, "WebSocket transport error");
                self.emit(Event::Error(cause.map(Arc::new)));
            }
            Some(SocketEvent::Close(frame)) => self.on_socket_closed(frame),
            None => self.on_socket_closed(None),
        }
    }

    fn on_open(&mut self) {
        match self.phase() {
            Phase::Connecting => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt = self.attempts, "WebSocket connection open");

                self.attempts = 0;
                self.ever_opened = true;
                self.set_phase(Phase::Open);
                self.emit(Event::Open);
                self.release_connect_waiters();
            }
            Phase::Closing => {
                // Opened after the user closed: never adopt it
                if let Some(socket) = &self.socket {
                    socket.close(self.close_frame.clone());
                }
            }
            Phase::Idle | Phase::Open | Phase::Reconnecting { .. } | Phase::ClosedByUser => {
                #[cfg(feature = "tracing")]
                tracing::trace!(phase = ?self.phase(), "Ignoring duplicate open notification");
            }
        }
    }

    fn on_socket_closed(&mut self, frame: Option<CloseFrame>) {
        self.socket = None;

        if self.closed_by_user {
            self.finish_close();
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            was_open = self.phase() == Phase::Open,
            frame = ?frame,
            "WebSocket connection lost"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = &frame;

        self.set_phase(Phase::Reconnecting {
            attempt: self.attempts,
        });
        self.emit(Event::Disconnect);
        self.release_connect_waiters();
        self.schedule_reconnect();
    }

    /// Throttled, idempotent: at most one attempt is ever pending.
    fn schedule_reconnect(&mut self) {
        if self.closed_by_user
            || self.reconnect_at.is_some()
            || self.resolving.is_some()
            || self.socket.is_some()
        {
            return;
        }

        self.set_phase(Phase::Reconnecting {
            attempt: self.attempts,
        });

        let first_failure = !self.ever_opened && self.attempts <= 1;
        let floor = if first_failure && !self.config.throttle_first_failure {
            std::time::Duration::ZERO
        } else {
            self.config.min_time_between_reconnects
        };

        let now = Instant::now();
        let earliest = self.last_attempt_at.map_or(now, |at| at + floor);

        if earliest <= now {
            self.start_attempt();
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                delay = ?earliest.saturating_duration_since(now),
                attempt = self.attempts,
                "Scheduling WebSocket reconnect"
            );
            self.reconnect_at = Some(earliest);
        }
    }

    fn forward(&self, payload: Payload) {
        match &self.socket {
            Some(socket) if self.phase() == Phase::Open => {
                if let Err(e) = socket.send(payload) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Unable to forward payload: {e:?}");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    len = payload.len(),
                    phase = ?self.phase(),
                    "Dropping payload accepted while open, connection has since changed"
                );
            }
        }
    }

    fn close(&mut self, frame: Option<CloseFrame>) {
        if self.closed_by_user {
            return;
        }

        self.closed_by_user = true;
        self.reconnect_at = None;
        // Cancels an in-flight URL resolution, so no socket is built for it
        self.resolving = None;
        self.close_frame = frame;

        match &self.socket {
            Some(socket) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(frame = ?self.close_frame, "Closing WebSocket");

                self.set_phase(Phase::Closing);
                socket.close(self.close_frame.clone());
                self.close_deadline = Some(Instant::now() + self.config.close_timeout);
            }
            None => self.finish_close(),
        }
    }

    fn on_close_timeout(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            timeout = ?self.config.close_timeout,
            "Socket did not confirm close in time, dropping it"
        );

        self.finish_close();
    }

    fn finish_close(&mut self) {
        self.socket = None;
        self.close_deadline = None;
        self.set_phase(Phase::ClosedByUser);
        self.emit(Event::Close);
        self.release_connect_waiters();
    }

    /// Every handle is gone: nobody can observe events any more.
    fn shutdown(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close(None);
        }
        self.resolving = None;
        self.reconnect_at = None;
    }

    fn release_connect_waiters(&mut self) {
        for waiter in self.connect_waiters.drain(..) {
            _ = waiter.send(());
        }
    }
}

async fn resolve(resolving: &mut Option<BoxFuture<'static, Result<String>>>) -> Result<String> {
    match resolving {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_socket_event(socket: &mut Option<SocketHandle>) -> Option<SocketEvent> {
    match socket {
        Some(socket) => socket.next_event().await,
        None => pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
