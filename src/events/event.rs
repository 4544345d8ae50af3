//! # Runtime events emitted by the host.
//!
//! [`EventKind`] groups events into:
//! - **Connection events**: build, establish, fault, close of the shared connection
//! - **Endpoint events**: start/ready/stop/fault of receive endpoints
//! - **Dispatch events**: errors routed from broker processors
//! - **Retry events**: scheduled backoff and ignored failures
//! - **Shutdown events**: host stop sequencing
//! - **Subscriber events**: fan-out overflow and panics
//!
//! ## Ordering guarantees
//! Each event carries a process-wide, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use brokervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_operation("connect")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(200));
//!
//! assert_eq!(ev.operation.as_deref(), Some("connect"));
//! assert_eq!(ev.delay_ms, Some(200));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked while handling an event.
    ///
    /// Sets: `endpoint` (subscriber name), `reason`.
    SubscriberPanicked,

    /// Subscriber queue was full or closed; the event was dropped for it.
    ///
    /// Sets: `endpoint` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Shutdown events ===
    /// Host stop was requested.
    ShutdownRequested,

    /// Every endpoint stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; `reason` lists stuck endpoints.
    GraceExceeded,

    // === Connection events ===
    /// A new connection build started.
    ///
    /// Sets: `generation`.
    ConnectionBuilding,

    /// The connection is live and handed out to callers.
    ///
    /// Sets: `generation`, `reason` (service address).
    ConnectionEstablished,

    /// The connection was invalidated; bound endpoints will stop.
    ///
    /// Sets: `generation`, `reason`.
    ConnectionFaulted,

    /// The connection was closed (after a fault or on supervisor stop).
    ///
    /// Sets: `generation`.
    ConnectionClosed,

    // === Retry events ===
    /// A retry of an operation was scheduled.
    ///
    /// Sets: `operation`, `attempt` (failed attempt), `delay_ms`, `reason`,
    /// and `endpoint` when endpoint-scoped.
    BackoffScheduled,

    /// A failure classified as ignorable was dropped.
    ///
    /// Sets: `reason`, and `operation` / `endpoint` when known.
    ErrorIgnored,

    // === Endpoint events ===
    /// Endpoint was registered with the host.
    EndpointAdded,

    /// Endpoint is binding to the connection.
    ///
    /// Sets: `endpoint`, `attempt` (bind cycle, 1-based).
    EndpointStarting,

    /// Endpoint processor is started and receiving.
    ///
    /// Sets: `endpoint`, `generation`.
    EndpointReady,

    /// Endpoint processor was stopped and closed.
    ///
    /// Sets: `endpoint`, `reason` (why it stopped).
    EndpointStopped,

    /// Endpoint stopped on an unrecoverable fault and will not restart.
    ///
    /// Sets: `endpoint`, `reason`.
    EndpointFaulted,

    // === Dispatch events ===
    /// The broker processor reported an error that reached the handler's `on_error`.
    ///
    /// Sets: `endpoint`, `reason`.
    DeliveryFaulted,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Endpoint (entity path) or subscriber name.
    pub endpoint: Option<Arc<str>>,
    /// Retried operation name.
    pub operation: Option<Arc<str>>,
    /// Connection generation.
    pub generation: Option<u64>,
    /// Human-readable reason (errors, stop causes, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates an event with the current timestamp and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            endpoint: None,
            operation: None,
            generation: None,
            reason: None,
            attempt: None,
            delay_ms: None,
        }
    }

    /// Attaches an endpoint name.
    #[inline]
    pub fn with_endpoint(mut self, endpoint: impl Into<Arc<str>>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attaches an operation name.
    #[inline]
    pub fn with_operation(mut self, operation: impl Into<Arc<str>>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attaches a connection generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_endpoint(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_endpoint(subscriber)
            .with_reason(info)
    }

    /// True for events produced by the subscriber fan-out itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }

    /// True for events about the shared connection.
    #[inline]
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ConnectionBuilding
                | EventKind::ConnectionEstablished
                | EventKind::ConnectionFaulted
                | EventKind::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::EndpointStarting);
        let b = Event::new(EventKind::EndpointReady);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates_at_u32() {
        let ev = Event::new(EventKind::BackoffScheduled).with_delay(Duration::from_secs(u64::MAX / 1000));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
