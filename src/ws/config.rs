#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

use crate::Result;
use crate::error::Error;

const DEFAULT_MIN_TIME_BETWEEN_RECONNECTS: Duration = Duration::from_secs(1);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Broadcast channel capacity for lifecycle events.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for [`KeepAliveWebSocket`](super::KeepAliveWebSocket) behavior.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use keepalive_ws::ws::config::Config;
///
/// let config = Config::builder()
///     .min_time_between_reconnects(Duration::from_millis(250))
///     .autoconnect(true)
///     .build();
/// assert!(config.autoconnect);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Floor between the start of one connect attempt and the start of the next
    #[builder(default = DEFAULT_MIN_TIME_BETWEEN_RECONNECTS)]
    pub min_time_between_reconnects: Duration,
    /// Start connecting as soon as the manager is constructed
    #[builder(default)]
    pub autoconnect: bool,
    /// Apply the reconnect floor when the very first attempt fails.
    ///
    /// When `false`, the retry after a failed first attempt (before any
    /// successful open) starts immediately; later retries are throttled.
    #[builder(default = true)]
    pub throttle_first_failure: bool,
    /// How long a user-initiated close waits for the socket to confirm
    /// before the session gives up on it and reports `close` anyway
    #[builder(default = DEFAULT_CLOSE_TIMEOUT)]
    pub close_timeout: Duration,
    /// Number of events buffered per subscriber before it starts lagging
    #[builder(default = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::validation("event capacity must be positive"));
        }
        Ok(())
    }
}
