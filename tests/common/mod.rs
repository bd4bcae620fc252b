#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keepalive_ws::Result;
use keepalive_ws::error::Error;
use keepalive_ws::ws::{Event, SocketFactory, SocketHandle, SocketPeer, socket_pair};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, timeout};

pub const URL: &str = "ws://mock.local/feed";

/// A socket created by [`MockFactory`], driven by the test through its peer.
#[derive(Debug)]
pub struct MockSocket {
    pub url: String,
    pub created_at: Instant,
    pub peer: SocketPeer,
}

/// Socket factory that hands every created socket to the test.
pub struct MockFactory {
    sockets: mpsc::UnboundedSender<MockSocket>,
    created: Arc<AtomicUsize>,
    refusals: Arc<AtomicUsize>,
}

impl SocketFactory for MockFactory {
    fn create(&self, url: &str) -> Result<SocketHandle> {
        self.created.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::validation("mock factory refused to build a socket"));
        }

        let (handle, peer) = socket_pair();
        drop(self.sockets.send(MockSocket {
            url: url.to_owned(),
            created_at: Instant::now(),
            peer,
        }));
        Ok(handle)
    }
}

/// The test's side of a [`MockFactory`].
pub struct MockSockets {
    sockets: mpsc::UnboundedReceiver<MockSocket>,
    created: Arc<AtomicUsize>,
    refusals: Arc<AtomicUsize>,
}

impl MockSockets {
    /// Wait for the manager to build its next socket.
    pub async fn next(&mut self) -> MockSocket {
        timeout(Duration::from_secs(30), self.sockets.recv())
            .await
            .expect("timed out waiting for a socket")
            .expect("factory dropped")
    }

    /// A socket built since the last call, if any.
    pub fn try_next(&mut self) -> Option<MockSocket> {
        self.sockets.try_recv().ok()
    }

    /// Number of `create` calls so far, refused ones included.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Make the next `count` `create` calls fail.
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }
}

pub fn mock_factory() -> (MockFactory, MockSockets) {
    let (tx, rx) = mpsc::unbounded_channel();
    let created = Arc::new(AtomicUsize::new(0));
    let refusals = Arc::new(AtomicUsize::new(0));

    (
        MockFactory {
            sockets: tx,
            created: Arc::clone(&created),
            refusals: Arc::clone(&refusals),
        },
        MockSockets {
            sockets: rx,
            created,
            refusals,
        },
    )
}

/// Receive the next event, failing the test if none arrives.
pub async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for an event")
        .unwrap()
}

/// Let the session task process everything queued so far.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}
