//! Collaborators injected into a [`KeepAliveWebSocket`](super::KeepAliveWebSocket).

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use super::socket::SocketHandle;
use crate::Result;
use crate::error::{BoxError, Error};

/// Produces the address to connect to.
///
/// Invoked once per connection attempt and never cached, so an implementation
/// may rotate endpoints or mint a fresh token every time.
///
/// # Example
///
/// ```
/// use keepalive_ws::ws::{UrlProvider, url_fn};
///
/// let provider = url_fn(|| async {
///     let token = "fresh-token"; // fetched from an auth service
///     Ok::<_, std::io::Error>(format!("wss://example.com/feed?token={token}"))
/// });
/// # fn assert_provider<U: UrlProvider>(_: &U) {}
/// # assert_provider(&provider);
/// ```
#[async_trait]
pub trait UrlProvider: Send + Sync + 'static {
    async fn url(&self) -> Result<String>;
}

#[async_trait]
impl UrlProvider for String {
    async fn url(&self) -> Result<String> {
        Ok(self.clone())
    }
}

#[async_trait]
impl UrlProvider for &'static str {
    async fn url(&self) -> Result<String> {
        Ok((*self).to_owned())
    }
}

#[async_trait]
impl UrlProvider for url::Url {
    async fn url(&self) -> Result<String> {
        Ok(self.as_str().to_owned())
    }
}

/// [`UrlProvider`] backed by an async closure. Created with [`url_fn`].
#[derive(Clone)]
pub struct FnUrlProvider<F> {
    f: F,
}

impl<F> fmt::Debug for FnUrlProvider<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUrlProvider").finish_non_exhaustive()
    }
}

/// Wraps a closure returning a future of the URL.
///
/// Errors returned by the closure are reported as
/// [`Kind::UrlResolution`](crate::error::Kind::UrlResolution).
pub fn url_fn<F, Fut, E>(f: F) -> FnUrlProvider<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<String, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    FnUrlProvider { f }
}

#[async_trait]
impl<F, Fut, E> UrlProvider for FnUrlProvider<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<String, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn url(&self) -> Result<String> {
        (self.f)().await.map_err(Error::url_resolution)
    }
}

/// Constructs sockets.
///
/// `create` starts connecting and returns immediately; the outcome of the
/// connection is reported through the handle's events. An `Err` means the
/// socket could not even be constructed (for example a malformed URL) and is
/// treated as a failed attempt.
pub trait SocketFactory: Send + Sync + 'static {
    fn create(&self, url: &str) -> Result<SocketHandle>;
}
