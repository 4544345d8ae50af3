//! # Example: memory_host
//!
//! Runs a host against the in-process broker and walks through the
//! connection and endpoint lifecycle.
//!
//! Shows how to:
//! - Declare queue and subscription endpoints on [`HostBuilder`].
//! - Attach the built-in [`LogWriter`] subscriber.
//! - Survive a throttled connect, an ignorable processor error and a lost connection.
//! - Fault a single endpoint with an unrecoverable handler error.
//!
//! ## Flow
//! ```text
//! Host::start()
//!     ├─► connect (busy x2 ─► BackoffScheduled ─► ConnectionEstablished gen 1)
//!     ├─► orders, events/Subscriptions/audit ─► EndpointReady
//!     ├─► raise MessageSizeExceeded on orders ─► ErrorIgnored
//!     ├─► raise ConnectionLost on orders ─► ConnectionFaulted ─► both endpoints restart on gen 2
//!     ├─► poison message on orders ─► Unrecoverable ─► EndpointFaulted (audit keeps running)
//!     └─► Host::stop() ─► endpoints closed, then the connection
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example memory_host --features logging
//! ```

use std::{sync::Arc, time::Duration};

use brokervisor::broker::memory::MemoryBroker;
use brokervisor::{
    BrokerError, ErrorDisposition, HandlerFn, HandlerRef, Host, HostSettings, LogWriter, ReceivedMessage, Subscribe,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct OrderSubmitted;

fn handler(label: &'static str) -> HandlerRef {
    HandlerFn::new(move |msg: ReceivedMessage, _cancel: CancellationToken| async move {
        if msg.body.is_empty() {
            return Err(BrokerError::delivery(format!("{} has no body", msg.message_id)));
        }
        println!("[{label}] handled {}", msg.message_id);
        Ok(())
    })
    .with_error_handler(|err| match err {
        BrokerError::Delivery { .. } => ErrorDisposition::Unrecoverable,
        _ => ErrorDisposition::Handled,
    })
    .into_ref()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let broker = MemoryBroker::new();
    broker.fail_next_connects(2, BrokerError::busy("namespace throttled"));

    let settings = HostSettings::builder("sb://demo.servicebus.windows.net")
        .named_key("RootManageSharedAccessKey", "not-a-real-key")
        .retry(Duration::from_millis(50), Duration::from_secs(1), 5)
        .build();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let host = Host::builder(settings, Arc::new(broker.clone()))
        .with_subscribers(subs)
        .receive_endpoint("orders", |e| {
            e.max_concurrent_calls(4).handler(handler("orders"));
        })
        .subscription_endpoint("events", "audit", |e| {
            e.handler(handler("audit"));
        })
        .build()?;

    for endpoint in host.start().await? {
        endpoint.ready().await?;
    }
    let typed = host
        .connect_message_subscription_endpoint::<OrderSubmitted, _>("billing", |e| {
            e.handler(handler("billing"));
        })
        .await?;
    typed.ready().await?;
    println!("typed endpoint bound to {}", typed.input_address());

    broker.send("orders", ReceivedMessage::new("o-1", "{\"qty\":1}"));
    broker.raise("orders", BrokerError::message_too_large("o-2 is 300KB"));
    broker.send("events/Subscriptions/audit", ReceivedMessage::new("a-1", "{}"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    broker.raise("orders", BrokerError::connection_lost("socket reset by peer"));
    tokio::time::sleep(Duration::from_millis(500)).await;
    broker.send("orders", ReceivedMessage::new("o-3", "{\"qty\":3}"));

    broker.send("orders", ReceivedMessage::new("poison", ""));
    if let Some(orders) = host.endpoint("orders").await {
        println!("orders finished as {:?}", orders.stopped().await);
    }

    let probe = host.probe().await;
    println!(
        "connection generation={:?} builds={}",
        probe.connection.generation, probe.connection.builds
    );
    for e in &probe.endpoints {
        println!("  {} -> {:?}", e.name, e.status);
    }

    host.stop().await?;
    Ok(())
}
