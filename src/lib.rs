//! # brokervisor
//!
//! **Brokervisor** is the transport-host layer for a managed message broker
//! (queues, topics and subscriptions).
//!
//! It keeps one shared connection per namespace alive, builds it at most once
//! at a time, recycles it when it faults, and runs receive endpoints on top of
//! it. Every endpoint owns one processor, classifies the errors its processor
//! raises and is restarted when the shared connection is replaced.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌───────────────────────┐
//!     │  endpoint    │   │  endpoint    │   │  endpoint             │
//!     │  "orders"    │   │  "payments"  │   │  "events/…/audit"     │
//!     └──────┬───────┘   └──────┬───────┘   └──────────┬────────────┘
//!            ▼                  ▼                      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Host                                                             │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - Registry (endpoint handles by entity path)                     │
//! │  - ConnectionContextSupervisor (one shared connection)            │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!  ┌────────────────┐ ┌────────────────┐ ┌────────────────┐    │
//!  │ReceiveEndpoint │ │ReceiveEndpoint │ │ReceiveEndpoint │    │
//!  │ (restart loop) │ │ (restart loop) │ │ (restart loop) │    │
//!  └┬───────────────┘ └┬───────────────┘ └┬───────────────┘    │
//!   │ ClientContext    │ ClientContext    │ ClientContext      │
//!   │ (one processor)  │                  │                    │
//!   └──────────────────┴─────────┬────────┘                    │
//!                                ▼                             │
//!                      ConnectionContext (generation N)        │
//!                                │                             ▼
//! ┌──────────────────────────────┴────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                   (capacity: Config::bus_capacity)                │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         subscriber_listener ──► SubscriberSet
//!                                                 (per-sub queues)
//! ```
//!
//! ### Error routing
//! ```text
//! processor error ──► RetryClassifier
//!     ├─ Ignore ─► ErrorIgnored, keep receiving
//!     └─ Fatal  ─► DeliveryFaulted ─► handler.on_error()
//!           ├─ connection-scoped ─► ConnectionContext::fault()  (every endpoint restarts)
//!           ├─ Unrecoverable ────► client agent stopped        (this endpoint only)
//!           └─ Handled ──────────► keep receiving
//! ```
//!
//! ## Features
//! | Area               | Description                                                   | Key types / traits                                 |
//! |--------------------|---------------------------------------------------------------|----------------------------------------------------|
//! | **Host**           | Declare, connect, stop and probe receive endpoints.           | [`Host`], [`HostBuilder`], [`ReceiveEndpointHandle`] |
//! | **Connection**     | Single-flight connection supervision and recycling.           | [`ConnectionContextSupervisor`], [`ConnectionContext`] |
//! | **Clients**        | Processor lifecycle and callback registration.                | [`ClientContext`], [`ClientState`]                 |
//! | **Policies**       | Retry classification and backoff.                             | [`RetryClassifier`], [`RetryPolicy`], [`BackoffPolicy`] |
//! | **Settings**       | Namespace, credentials, queue and subscription settings.      | [`HostSettings`], [`ReceiveEndpointConfigurator`]  |
//! | **Handlers**       | Message callbacks as trait objects or closures.               | [`MessageHandler`], [`HandlerFn`]                  |
//! | **Subscriber API** | Hook into lifecycle events (logging, metrics).                | [`Subscribe`]                                      |
//! | **Errors**         | Typed errors per layer.                                       | [`BrokerError`], [`ClientError`], [`HostError`]    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use brokervisor::{BrokerError, HandlerFn, Host, HostConfig, HostSettings, ReceivedMessage};
//! use brokervisor::broker::memory::MemoryBroker;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = HostSettings::builder("sb://example.servicebus.windows.net")
//!         .named_key("RootManageSharedAccessKey", "secret")
//!         .build();
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn brokervisor::Subscribe>> = vec![Arc::new(brokervisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn brokervisor::Subscribe>> = Vec::new();
//!
//!     let broker = MemoryBroker::new();
//!     let host = Host::builder(settings, Arc::new(broker.clone()))
//!         .with_config(HostConfig::default())
//!         .with_subscribers(subs)
//!         .receive_endpoint("orders", |e| {
//!             e.max_concurrent_calls(4)
//!                 .handler(HandlerFn::arc(|msg: ReceivedMessage, _c: CancellationToken| async move {
//!                     println!("order {}", msg.message_id);
//!                     Ok::<_, BrokerError>(())
//!                 }));
//!         })
//!         .build()?;
//!
//!     for endpoint in host.start().await? {
//!         endpoint.ready().await?;
//!     }
//!     broker.send("orders", ReceivedMessage::new("o-1", "{}"));
//!
//!     host.stop().await?;
//!     Ok(())
//! }
//! ```
pub mod broker;
mod core;
mod error;
mod events;
mod handlers;
mod policies;
mod settings;
mod subscribers;

// ---- Public re-exports ----

pub use broker::{BrokerClient, BrokerConnection, Dispatch, EntityKind, Processor, ProcessorOptions, ReceivedMessage};
pub use core::{
    Agent, ClientContext, ClientState, Config as HostConfig, ConnectionContext, ConnectionContextSupervisor,
    ConnectionProbe, EndpointProbe, EndpointStatus, HOST_TYPE, Host, HostBuilder, HostProbe, ReceiveEndpointHandle,
};
pub use error::{AsBrokerError, BrokerError, ClientError, ConfigError, FailureReason, HostError};
pub use events::{Event, EventKind};
pub use handlers::{ErrorDisposition, HandlerFn, HandlerRef, MessageHandler};
pub use policies::{BackoffPolicy, JitterPolicy, Outcome, RetryClassifier, RetryDecision, RetryPolicy};
pub use settings::{
    BASIC_TIER_MESSAGE_TTL, CallbackKind, ClientSettings, Credential, EntitySettings, HostSettings, HostSettingsBuilder,
    MAX_LOCK_DURATION, PLACEHOLDER_URI, QueueSettings, ReceiveEndpointConfigurator, RuleFilter, SubscriptionRule,
    SubscriptionSettings, TransportType,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
