//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ConnectionContextSupervisor`, `ReceiveEndpoint`,
//!   `ClientContext` dispatch, `RetryPolicy::execute`, `Host`, `SubscriberSet`.
//! - **Consumers**: the host listener (fans out to `SubscriberSet`) and any
//!   receiver from `Host::subscribe_events()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
