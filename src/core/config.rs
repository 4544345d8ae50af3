//! # Host runtime configuration.
//!
//! [`Config`] (re-exported as `HostConfig`) holds the runtime knobs that are
//! not broker settings: shutdown grace, event bus size, and the retry and
//! restart policies of receive endpoints. Broker-facing values (namespace,
//! credential, connection retry bounds) live in
//! [`HostSettings`](crate::HostSettings).

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy, RetryPolicy};

/// Runtime configuration of a [`Host`](crate::Host).
///
/// ## Field semantics
/// - `grace`: how long `stop` waits for endpoints before aborting them (`0s` = abort immediately)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `receive_retry`: retries around binding an endpoint (connection, processor, start)
/// - `restart`: delay before an endpoint rebinds after its connection was recycled
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for endpoints to stop before aborting them.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Subscribers lagging more than `bus_capacity` events skip older ones.
    pub bus_capacity: usize,

    /// Retry policy used while binding an endpoint.
    pub receive_retry: RetryPolicy,

    /// Backoff between rebinds after connection recycles.
    ///
    /// The retry counter resets once the endpoint is ready again.
    pub restart: BackoffPolicy,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 60s`
    /// - `bus_capacity = 1024`
    /// - `receive_retry = 5 retries, 10s apart`
    /// - `restart = 100ms doubling to 30s, equal jitter`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            bus_capacity: 1024,
            receive_retry: RetryPolicy::default(),
            restart: BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
                .with_jitter(JitterPolicy::Equal),
        }
    }
}
