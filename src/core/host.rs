//! # Host: connection supervisor plus receive endpoints.
//!
//! The [`Host`] owns the event bus, the [`SubscriberSet`], the shared
//! [`ConnectionContextSupervisor`] and the endpoint registry.
//!
//! ## Architecture
//! ```text
//! HostBuilder::build()
//!   └─► Host { bus, subs, supervisor, registry, token }
//!          ├─ subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!          │
//!          ├─ start() / connect_*_endpoint(..)
//!          │     └─► validate ─► Registry::insert ─► spawn ReceiveEndpoint::run(token.child_token())
//!          │
//!          └─ stop()
//!                ├─► publish ShutdownRequested
//!                ├─► token.cancel()                  → every endpoint stops and closes its client
//!                ├─► Registry::stop_all(grace)       → abort stragglers
//!                ├─► supervisor.stop()               → close the connection last
//!                └─► publish AllStoppedWithin | GraceExceeded
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use brokervisor::{BrokerError, HandlerFn, Host, HostSettings, ReceivedMessage};
//! use brokervisor::broker::memory::MemoryBroker;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let host = Host::builder(HostSettings::default(), Arc::new(broker.clone()))
//!         .receive_endpoint("orders", |e| {
//!             e.handler(HandlerFn::arc(|msg: ReceivedMessage, _c: CancellationToken| async move {
//!                 println!("order {}", msg.message_id);
//!                 Ok::<_, BrokerError>(())
//!             }));
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

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::broker::BrokerClient;
use crate::core::{
    builder::HostBuilder,
    config::Config,
    endpoint::ReceiveEndpoint,
    handle::{EndpointStatus, ReceiveEndpointHandle},
    registry::Registry,
    shutdown,
    supervisor::{ConnectionContextSupervisor, ConnectionProbe},
};
use crate::error::HostError;
use crate::events::{Bus, Event, EventKind};
use crate::settings::{EndpointDefinition, EntitySettings, HostSettings, ReceiveEndpointConfigurator};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Transport kind reported by [`Host::probe`].
pub const HOST_TYPE: &str = "azure-service-bus";

/// Snapshot of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProbe {
    /// Endpoint name (entity path).
    pub name: String,
    /// Input address.
    pub input_address: String,
    /// Current status.
    pub status: EndpointStatus,
}

/// Snapshot of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProbe {
    /// Transport kind.
    pub host_type: &'static str,
    /// Namespace address.
    pub address: String,
    /// Connection supervisor state.
    pub connection: ConnectionProbe,
    /// Registered endpoints, sorted by name.
    pub endpoints: Vec<EndpointProbe>,
}

/// Transport host for one broker namespace.
pub struct Host {
    cfg: Config,
    settings: Arc<HostSettings>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    supervisor: Arc<ConnectionContextSupervisor>,
    registry: Registry,
    token: CancellationToken,
    declared: Mutex<Vec<EndpointDefinition>>,
    entities: Mutex<Vec<EntitySettings>>,
}

impl Host {
    /// Starts building a host.
    pub fn builder(settings: HostSettings, client: Arc<dyn BrokerClient>) -> HostBuilder {
        HostBuilder::new(settings, client)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        settings: Arc<HostSettings>,
        client: Arc<dyn BrokerClient>,
        subscribers: Vec<Arc<dyn Subscribe>>,
        declared: Vec<EndpointDefinition>,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        let supervisor = Arc::new(ConnectionContextSupervisor::new(
            Arc::clone(&settings),
            client,
            bus.clone(),
        ));
        let entities = declared.iter().map(|d| d.entity.clone()).collect();

        let host = Arc::new(Self {
            cfg,
            settings,
            bus,
            subs,
            supervisor,
            registry: Registry::new(),
            token: CancellationToken::new(),
            declared: Mutex::new(declared),
            entities: Mutex::new(entities),
        });
        host.subscriber_listener();
        host
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Starts the endpoints declared on the builder, in declaration order.
    ///
    /// An endpoint that cannot be registered is logged and skipped; the
    /// others still start. Calling `start` again starts nothing.
    pub async fn start(&self) -> Result<Vec<ReceiveEndpointHandle>, HostError> {
        if self.token.is_cancelled() {
            return Err(HostError::Stopped);
        }
        let declared = std::mem::take(&mut *self.declared.lock());

        let mut handles = Vec::with_capacity(declared.len());
        for def in declared {
            let path = def.entity.path().to_string();
            match self.spawn_endpoint(def).await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(endpoint = %path, error = %e, "endpoint not started"),
            }
        }
        Ok(handles)
    }

    /// Validates and starts a queue endpoint.
    ///
    /// ### Errors
    /// - [`HostError::Config`] when validation fails (nothing is contacted);
    /// - [`HostError::EndpointExists`] when the queue already has a live endpoint;
    /// - [`HostError::Stopped`] after [`stop`](Self::stop).
    pub async fn connect_receive_endpoint<F>(&self, queue: &str, configure: F) -> Result<ReceiveEndpointHandle, HostError>
    where
        F: FnOnce(&mut ReceiveEndpointConfigurator),
    {
        let mut cfg = ReceiveEndpointConfigurator::queue(queue);
        configure(&mut cfg);
        self.connect(cfg).await
    }

    /// Validates and starts a subscription endpoint keyed by `(topic, subscription)`.
    pub async fn connect_subscription_endpoint<F>(
        &self,
        topic: &str,
        subscription: &str,
        configure: F,
    ) -> Result<ReceiveEndpointHandle, HostError>
    where
        F: FnOnce(&mut ReceiveEndpointConfigurator),
    {
        let mut cfg = ReceiveEndpointConfigurator::subscription(topic, subscription);
        configure(&mut cfg);
        self.connect(cfg).await
    }

    /// Subscription endpoint on the topic derived from message type `M`.
    ///
    /// The topic name comes from [`HostSettings::format_message_topic`].
    pub async fn connect_message_subscription_endpoint<M, F>(
        &self,
        subscription: &str,
        configure: F,
    ) -> Result<ReceiveEndpointHandle, HostError>
    where
        M: ?Sized,
        F: FnOnce(&mut ReceiveEndpointConfigurator),
    {
        let topic = self.settings.format_message_topic(std::any::type_name::<M>());
        self.connect_subscription_endpoint(&topic, subscription, configure)
            .await
    }

    async fn connect(&self, cfg: ReceiveEndpointConfigurator) -> Result<ReceiveEndpointHandle, HostError> {
        let def = cfg.finish()?;
        let entity = def.entity.clone();
        let handle = self.spawn_endpoint(def).await?;

        let mut entities = self.entities.lock();
        match entities.iter_mut().find(|e| e.path() == entity.path()) {
            Some(known) => *known = entity,
            None => entities.push(entity),
        }
        Ok(handle)
    }

    async fn spawn_endpoint(&self, def: EndpointDefinition) -> Result<ReceiveEndpointHandle, HostError> {
        if self.token.is_cancelled() {
            return Err(HostError::Stopped);
        }

        let name: Arc<str> = Arc::from(def.entity.path());
        let input_address: Arc<str> = Arc::from(def.entity.input_address(self.settings.service_uri()));

        self.registry
            .insert(&name, || {
                let stop = self.token.child_token();
                let (tx, rx) = watch::channel(EndpointStatus::Starting);
                let handle = ReceiveEndpointHandle::new(
                    Arc::clone(&name),
                    input_address,
                    Arc::clone(&name),
                    rx,
                    stop.clone(),
                );
                let endpoint = ReceiveEndpoint::new(
                    Arc::clone(&name),
                    def,
                    Arc::clone(&self.supervisor),
                    self.bus.clone(),
                    self.cfg.receive_retry,
                    self.cfg.restart,
                    tx,
                );

                self.bus
                    .publish(Event::new(EventKind::EndpointAdded).with_endpoint(Arc::clone(&name)));
                let join = tokio::spawn(endpoint.run(stop));
                (handle, join)
            })
            .await
    }

    /// Stops every endpoint, then the connection.
    ///
    /// ### Errors
    /// [`HostError::GraceExceeded`] listing endpoints aborted after [`Config::grace`].
    pub async fn stop(&self) -> Result<(), HostError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.token.cancel();

        let grace = self.cfg.grace;
        let stuck = self.registry.stop_all(grace).await;
        self.supervisor.stop().await;

        if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus
                .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
            Err(HostError::GraceExceeded { grace, stuck })
        }
    }

    /// Waits for a termination signal (or a `stop` from elsewhere), then stops.
    pub async fn run_until_signal(&self) -> Result<(), HostError> {
        tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => {
                if let Err(e) = res {
                    warn!(error = %e, "signal registration failed; waiting for stop");
                    self.token.cancelled().await;
                }
            }
            _ = self.token.cancelled() => {}
        }
        self.stop().await
    }

    /// Snapshot of the connection and every registered endpoint.
    pub async fn probe(&self) -> HostProbe {
        let endpoints = self
            .registry
            .list()
            .await
            .into_iter()
            .map(|h| EndpointProbe {
                name: h.name().to_string(),
                input_address: h.input_address().to_string(),
                status: h.status(),
            })
            .collect();

        HostProbe {
            host_type: HOST_TYPE,
            address: self.settings.service_uri().to_string(),
            connection: self.supervisor.probe(),
            endpoints,
        }
    }

    /// Entity paths of every endpoint declared or connected on this host.
    pub fn entity_paths(&self) -> Vec<String> {
        self.collect_paths(|_| true)
    }

    /// Subscription paths configured with `remove_subscriptions`, for the
    /// collaborator that deletes entities at teardown.
    pub fn subscriptions_to_remove(&self) -> Vec<String> {
        self.collect_paths(EntitySettings::removes_subscription)
    }

    fn collect_paths(&self, keep: impl Fn(&EntitySettings) -> bool) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entities
            .lock()
            .iter()
            .filter(|e| keep(e))
            .map(|e| e.path().to_string())
            .collect();
        paths.sort_unstable();
        paths
    }

    /// Handle of the endpoint on `entity_path`, if registered.
    pub async fn endpoint(&self, entity_path: &str) -> Option<ReceiveEndpointHandle> {
        self.registry.get(entity_path).await
    }

    /// Raw event stream (in addition to configured subscribers).
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The shared connection supervisor.
    pub fn supervisor(&self) -> &Arc<ConnectionContextSupervisor> {
        &self.supervisor
    }

    /// Namespace settings.
    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ReceivedMessage;
    use crate::broker::memory::MemoryBroker;
    use crate::error::{BrokerError, ConfigError};
    use crate::handlers::{ErrorDisposition, HandlerFn, HandlerRef};
    use crate::policies::RetryPolicy;
    use crate::settings::{RuleFilter, SubscriptionRule};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct OrderSubmitted;

    fn settings() -> HostSettings {
        HostSettings::builder("sb://ns.servicebus.windows.net").build()
    }

    fn host(broker: &MemoryBroker) -> Arc<Host> {
        Host::builder(settings(), Arc::new(broker.clone())).build().unwrap()
    }

    /// Forwards message ids; empty bodies fail and are unrecoverable.
    fn recorder() -> (HandlerRef, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = HandlerFn::new(move |msg: ReceivedMessage, _c: CancellationToken| {
            let tx = tx.clone();
            async move {
                if msg.body.is_empty() {
                    return Err(BrokerError::delivery(format!("{} has no body", msg.message_id)));
                }
                let _ = tx.send(msg.message_id);
                Ok(())
            }
        })
        .with_error_handler(|e| match e {
            BrokerError::Delivery { .. } => ErrorDisposition::Unrecoverable,
            _ => ErrorDisposition::Handled,
        })
        .into_ref();
        (handler, rx)
    }

    async fn next_event(rx: &mut broadcast::Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
        loop {
            let ev = rx.recv().await.unwrap();
            if pred(&ev) {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn ignored_processor_error_keeps_endpoint_running() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let (handler, mut seen) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(handler);
            })
            .await
            .unwrap();
        orders.ready().await.unwrap();

        broker.raise("orders", BrokerError::message_too_large("300KB"));
        broker.send("orders", ReceivedMessage::new("m-1", "x"));

        assert_eq!(seen.recv().await.unwrap(), "m-1");
        assert_eq!(orders.status(), EndpointStatus::Ready);
        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stopping_one_endpoint_leaves_the_other_receiving() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let (h1, _seen_orders) = recorder();
        let (h2, mut seen_audit) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(h1);
            })
            .await
            .unwrap();
        let audit = host
            .connect_subscription_endpoint("events", "audit", |e| {
                e.rule(SubscriptionRule::new("audit-only", RuleFilter::Sql("kind = 'audit'".into())))
                    .handler(h2);
            })
            .await
            .unwrap();
        orders.ready().await.unwrap();
        audit.ready().await.unwrap();

        assert_eq!(orders.stop().await, EndpointStatus::Stopped);
        assert_eq!(broker.close_calls("orders"), 1);

        broker.send("events/Subscriptions/audit", ReceivedMessage::new("a-1", "x"));
        assert_eq!(seen_audit.recv().await.unwrap(), "a-1");
        assert_eq!(audit.status(), EndpointStatus::Ready);
        assert_eq!(broker.connections_opened(), 1);
        host.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn connection_loss_recycles_every_endpoint() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let mut events = host.subscribe_events();
        let (h1, mut seen_orders) = recorder();
        let (h2, _seen_audit) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(h1);
            })
            .await
            .unwrap();
        let audit = host
            .connect_subscription_endpoint("events", "audit", |e| {
                e.handler(h2);
            })
            .await
            .unwrap();
        orders.ready().await.unwrap();
        audit.ready().await.unwrap();

        broker.raise("orders", BrokerError::connection_lost("socket reset"));

        let mut stopped = HashSet::new();
        let mut ready = HashSet::new();
        while ready.len() < 2 {
            let ev = next_event(&mut events, |ev| {
                matches!(ev.kind, EventKind::EndpointStopped | EventKind::EndpointReady)
            })
            .await;
            let name = ev.endpoint.as_deref().unwrap_or_default().to_string();
            match ev.kind {
                EventKind::EndpointStopped => {
                    stopped.insert(name);
                }
                _ if ev.generation == Some(2) => {
                    ready.insert(name);
                }
                _ => {}
            }
        }
        assert_eq!(stopped.len(), 2);

        let probe = host.probe().await;
        assert_eq!(probe.connection.generation, Some(2));
        assert_eq!(broker.connections_opened(), 2);
        assert_eq!(broker.open_connections(), 1);
        assert!(probe.endpoints.iter().all(|e| e.status == EndpointStatus::Ready));

        broker.send("orders", ReceivedMessage::new("m-2", "x"));
        assert_eq!(seen_orders.recv().await.unwrap(), "m-2");
        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn session_subscription_endpoint_receives() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let (handler, mut seen) = recorder();

        let carts = host
            .connect_subscription_endpoint("events", "carts", |e| {
                e.requires_session(true).session_handler(handler);
            })
            .await
            .unwrap();
        carts.ready().await.unwrap();

        broker.send(
            "events/Subscriptions/carts",
            ReceivedMessage::new("s-1", "x").with_session("cart-7"),
        );
        assert_eq!(seen.recv().await.unwrap(), "s-1");
        assert_eq!(carts.status(), EndpointStatus::Ready);
        host.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_namespace_faults_the_endpoint() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(10_000, BrokerError::connection_lost("dns failure"));
        let settings = HostSettings::builder("sb://ns.servicebus.windows.net")
            .retry(Duration::from_millis(100), Duration::from_secs(30), 3)
            .build();
        let host = Host::builder(settings, Arc::new(broker.clone())).build().unwrap();
        let (handler, _seen) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(handler);
            })
            .await
            .unwrap();

        match orders.ready().await {
            Err(HostError::EndpointFaulted { reason, .. }) => {
                assert!(reason.starts_with("connection unavailable"), "{reason}");
            }
            other => panic!("unexpected readiness {other:?}"),
        }
        assert_eq!(broker.connections_opened(), 0);
        assert!(!host.probe().await.connection.connected);
        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_lists_subscriptions_marked_for_removal() {
        let broker = MemoryBroker::new();
        let (h1, _s1) = recorder();
        let (h2, _s2) = recorder();
        let (h3, _s3) = recorder();
        let host = Host::builder(settings(), Arc::new(broker.clone()))
            .receive_endpoint("orders", |e| {
                e.handler(h1);
            })
            .subscription_endpoint("events", "audit", |e| {
                e.remove_subscriptions(true).handler(h2);
            })
            .subscription_endpoint("events", "billing", |e| {
                e.handler(h3);
            })
            .build()
            .unwrap();

        assert_eq!(
            host.entity_paths(),
            vec!["events/Subscriptions/audit", "events/Subscriptions/billing", "orders"]
        );
        assert_eq!(host.subscriptions_to_remove(), vec!["events/Subscriptions/audit"]);
    }

    #[tokio::test]
    async fn invalid_endpoint_is_rejected_before_connecting() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let (handler, _seen) = recorder();

        let err = host
            .connect_receive_endpoint("orders", |e| {
                e.requires_session(true).handler(handler);
            })
            .await
            .unwrap_err();

        assert!(matches!(err, HostError::Config(ConfigError::SessionMismatch { .. })));
        assert_eq!(broker.connections_opened(), 0);
        assert!(host.probe().await.endpoints.is_empty());
    }

    #[tokio::test]
    async fn unrecoverable_handler_error_faults_only_its_endpoint() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let (h1, _seen_orders) = recorder();
        let (h2, mut seen_audit) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(h1);
            })
            .await
            .unwrap();
        let audit = host
            .connect_subscription_endpoint("events", "audit", |e| {
                e.handler(h2);
            })
            .await
            .unwrap();
        orders.ready().await.unwrap();
        audit.ready().await.unwrap();

        broker.send("orders", ReceivedMessage::new("poison", ""));

        assert_eq!(
            orders.stopped().await,
            EndpointStatus::Faulted(Arc::from("Unrecoverable exception on orders"))
        );
        assert!(matches!(orders.ready().await, Err(HostError::EndpointFaulted { .. })));

        broker.send("events/Subscriptions/audit", ReceivedMessage::new("a-1", "x"));
        assert_eq!(seen_audit.recv().await.unwrap(), "a-1");
        assert_eq!(broker.connections_opened(), 1);
        host.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn busy_start_is_retried_by_receive_policy() {
        let broker = MemoryBroker::new();
        broker.fail_next_starts("orders", 2, BrokerError::busy("throttled"));
        let host = host(&broker);
        let mut events = host.subscribe_events();
        let (handler, _seen) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(handler);
            })
            .await
            .unwrap();
        orders.ready().await.unwrap();

        let retries: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::BackoffScheduled)
            .collect();
        assert_eq!(retries.len(), 2);
        assert!(retries.iter().all(|ev| ev.operation.as_deref() == Some("start_receive")));
        assert!(retries.iter().all(|ev| ev.delay_ms == Some(10_000)));
        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_entity_faults_the_endpoint() {
        let broker = MemoryBroker::new();
        broker.fail_next_starts("orders", 1, BrokerError::entity_not_found("orders"));
        let host = host(&broker);
        let (handler, _seen) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(handler);
            })
            .await
            .unwrap();

        assert!(matches!(orders.ready().await, Err(HostError::EndpointFaulted { .. })));
        host.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bind_retries_fault_the_endpoint() {
        let broker = MemoryBroker::new();
        broker.fail_next_starts("orders", 10, BrokerError::timeout("start"));
        let cfg = Config {
            receive_retry: RetryPolicy::interval(2, Duration::from_secs(1)),
            ..Config::default()
        };
        let host = Host::builder(settings(), Arc::new(broker.clone()))
            .with_config(cfg)
            .build()
            .unwrap();
        let (handler, _seen) = recorder();

        let orders = host
            .connect_receive_endpoint("orders", |e| {
                e.handler(handler);
            })
            .await
            .unwrap();

        match orders.stopped().await {
            EndpointStatus::Faulted(reason) => assert!(reason.contains("after 3 attempts")),
            other => panic!("unexpected status {other:?}"),
        }
        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_closes_endpoints_before_the_connection() {
        let broker = MemoryBroker::new();
        let (h1, _s1) = recorder();
        let (h2, _s2) = recorder();
        let host = Host::builder(settings(), Arc::new(broker.clone()))
            .receive_endpoint("orders", |e| {
                e.handler(h1);
            })
            .subscription_endpoint("events", "audit", |e| {
                e.handler(h2);
            })
            .build()
            .unwrap();
        let mut events = host.subscribe_events();

        let handles = host.start().await.unwrap();
        assert_eq!(handles.len(), 2);
        for h in &handles {
            h.ready().await.unwrap();
        }

        host.stop().await.unwrap();

        let kinds: Vec<(EventKind, Option<String>)> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|ev| (ev.kind, ev.endpoint.as_deref().map(str::to_string)))
            .collect();
        let position = |kind: EventKind| kinds.iter().rposition(|(k, _)| *k == kind).unwrap();

        assert!(position(EventKind::EndpointStopped) < position(EventKind::ConnectionClosed));
        assert_eq!(kinds.last().map(|(k, _)| *k), Some(EventKind::AllStoppedWithin));
        assert_eq!(broker.close_calls("orders"), 1);
        assert_eq!(broker.close_calls("events/Subscriptions/audit"), 1);
        assert_eq!(broker.open_connections(), 0);

        let (late, _s3) = recorder();
        assert!(matches!(
            host.connect_receive_endpoint("late", |e| {
                e.handler(late);
            })
            .await,
            Err(HostError::Stopped)
        ));
        assert!(host.stop().await.is_ok());
    }

    #[test]
    fn duplicate_declared_endpoints_are_rejected() {
        let broker = MemoryBroker::new();
        let (h1, _s1) = recorder();
        let (h2, _s2) = recorder();

        let err = Host::builder(settings(), Arc::new(broker))
            .receive_endpoint("orders", |e| {
                e.handler(h1);
            })
            .receive_endpoint("orders", |e| {
                e.handler(h2);
            })
            .build()
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::DuplicateEndpoint { path: "orders".into() });
    }

    #[tokio::test]
    async fn message_type_names_the_topic() {
        let broker = MemoryBroker::new();
        let host = host(&broker);
        let (handler, _seen) = recorder();

        let audit = host
            .connect_message_subscription_endpoint::<OrderSubmitted, _>("audit", |e| {
                e.handler(handler);
            })
            .await
            .unwrap();

        assert!(audit.entity_path().ends_with("~OrderSubmitted/Subscriptions/audit"));
        assert!(audit.input_address().starts_with("sb://ns.servicebus.windows.net/"));
        assert_eq!(host.entity_paths(), vec![audit.entity_path().to_string()]);
        host.stop().await.unwrap();
    }
}
