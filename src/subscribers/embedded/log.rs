//! # LogWriter: renders host events through `tracing`
//!
//! ```text
//! INFO  connection established generation=1 address=sb://demo.servicebus.windows.net
//! WARN  backoff scheduled operation=connect attempt=1 delay_ms=100 reason=...
//! INFO  endpoint ready endpoint=orders generation=1
//! ERROR endpoint faulted endpoint=orders reason=Unrecoverable exception on orders
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let endpoint = e.endpoint.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all endpoints stopped within grace"),
            EventKind::GraceExceeded => error!(stuck = reason, "grace exceeded"),
            EventKind::ConnectionBuilding => {
                debug!(generation = ?e.generation, "connection building")
            }
            EventKind::ConnectionEstablished => {
                info!(generation = ?e.generation, address = reason, "connection established")
            }
            EventKind::ConnectionFaulted => {
                warn!(generation = ?e.generation, reason, "connection faulted")
            }
            EventKind::ConnectionClosed => {
                debug!(generation = ?e.generation, "connection closed")
            }
            EventKind::BackoffScheduled => warn!(
                operation = e.operation.as_deref().unwrap_or("-"),
                endpoint,
                attempt = ?e.attempt,
                delay_ms = ?e.delay_ms,
                reason,
                "backoff scheduled"
            ),
            EventKind::ErrorIgnored => debug!(endpoint, reason, "error ignored"),
            EventKind::EndpointAdded => debug!(endpoint, "endpoint added"),
            EventKind::EndpointStarting => {
                debug!(endpoint, attempt = ?e.attempt, "endpoint starting")
            }
            EventKind::EndpointReady => {
                info!(endpoint, generation = ?e.generation, "endpoint ready")
            }
            EventKind::EndpointStopped => info!(endpoint, reason, "endpoint stopped"),
            EventKind::EndpointFaulted => error!(endpoint, reason, "endpoint faulted"),
            EventKind::DeliveryFaulted => warn!(endpoint, reason, "delivery faulted"),
            EventKind::SubscriberOverflow => warn!(subscriber = endpoint, reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => error!(subscriber = endpoint, reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
