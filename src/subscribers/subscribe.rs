//! # Subscriber trait
//!
//! `Subscribe` is the extension point for observing host events (logging,
//! metrics, alerting). Each subscriber gets a dedicated worker fed by a
//! bounded queue owned by the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Slow subscribers do **not** block publishers or other subscribers.
//! - On queue overflow, events for that subscriber are **dropped** (warn).
//!
//! ## Example
//! ```rust
//! use brokervisor::{Event, EventKind, Subscribe};
//!
//! struct FaultCounter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FaultCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::EndpointFaulted {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "fault-counter" }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
