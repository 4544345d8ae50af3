//! # Connection context: one live broker connection.
//!
//! A [`ConnectionContext`] wraps a [`BrokerConnection`] with the generation
//! number assigned by the supervisor and a fault agent. Endpoints never own
//! it; they derive [`ClientContext`]s from it through the four processor
//! factories and watch [`faulted`](ConnectionContext::faulted) to learn when
//! the connection is being recycled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::broker::BrokerConnection;
use crate::core::agent::Agent;
use crate::core::client::ClientContext;
use crate::error::ClientError;
use crate::events::{Bus, Event, EventKind};
use crate::settings::{CallbackKind, EntitySettings, QueueSettings, SubscriptionSettings};

/// One live connection plus its fault signal.
pub struct ConnectionContext {
    generation: u64,
    address: Arc<str>,
    connection: Arc<dyn BrokerConnection>,
    agent: Agent,
    bus: Bus,
    closed: AtomicBool,
}

impl ConnectionContext {
    pub(crate) fn new(
        generation: u64,
        address: impl Into<Arc<str>>,
        connection: Arc<dyn BrokerConnection>,
        bus: Bus,
    ) -> Self {
        Self {
            generation,
            address: address.into(),
            connection,
            agent: Agent::new(),
            bus,
            closed: AtomicBool::new(false),
        }
    }

    /// Build number of this connection (1 for the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Namespace address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Invalidates the connection. Returns `true` for the call that faulted it.
    pub fn fault(&self, reason: &str) -> bool {
        let first = self.agent.stop(reason);
        if first {
            self.bus.publish(
                Event::new(EventKind::ConnectionFaulted)
                    .with_generation(self.generation)
                    .with_reason(reason),
            );
        }
        first
    }

    /// True once faulted.
    pub fn is_faulted(&self) -> bool {
        self.agent.is_stopped()
    }

    /// Completes when the connection is faulted.
    pub async fn faulted(&self) {
        self.agent.stopped().await
    }

    /// Reason recorded by the first fault.
    pub fn fault_reason(&self) -> Option<&str> {
        self.agent.reason()
    }

    /// Closes the underlying connection once. Failures are logged.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.connection.close().await {
            warn!(generation = self.generation, error = %e, "connection close failed");
        }
        self.bus
            .publish(Event::new(EventKind::ConnectionClosed).with_generation(self.generation));
    }

    /// Non-session processor on a queue.
    pub fn create_queue_processor(self: &Arc<Self>, settings: &QueueSettings) -> Result<ClientContext, ClientError> {
        self.create(EntitySettings::Queue(settings.clone()), false)
    }

    /// Session processor on a queue.
    pub fn create_queue_session_processor(
        self: &Arc<Self>,
        settings: &QueueSettings,
    ) -> Result<ClientContext, ClientError> {
        self.create(EntitySettings::Queue(settings.clone()), true)
    }

    /// Non-session processor on a subscription.
    pub fn create_subscription_processor(
        self: &Arc<Self>,
        settings: &SubscriptionSettings,
    ) -> Result<ClientContext, ClientError> {
        self.create(EntitySettings::Subscription(settings.clone()), false)
    }

    /// Session processor on a subscription.
    pub fn create_subscription_session_processor(
        self: &Arc<Self>,
        settings: &SubscriptionSettings,
    ) -> Result<ClientContext, ClientError> {
        self.create(EntitySettings::Subscription(settings.clone()), true)
    }

    /// Picks the factory matching the entity and callback kind.
    pub(crate) fn create_client(
        self: &Arc<Self>,
        entity: &EntitySettings,
        callback: CallbackKind,
    ) -> Result<ClientContext, ClientError> {
        match (entity, callback) {
            (EntitySettings::Queue(q), CallbackKind::Message) => self.create_queue_processor(q),
            (EntitySettings::Queue(q), CallbackKind::Session) => self.create_queue_session_processor(q),
            (EntitySettings::Subscription(s), CallbackKind::Message) => self.create_subscription_processor(s),
            (EntitySettings::Subscription(s), CallbackKind::Session) => {
                self.create_subscription_session_processor(s)
            }
        }
    }

    fn create(self: &Arc<Self>, entity: EntitySettings, session: bool) -> Result<ClientContext, ClientError> {
        if entity.requires_session() != session {
            return Err(ClientError::SessionMismatch {
                path: entity.path().to_string(),
                requires_session: entity.requires_session(),
                requested: if session { "session" } else { "message" },
            });
        }

        let processor = self
            .connection
            .create_processor(entity.processor_options(session))?;
        let input_address = entity.input_address(&self.address);

        Ok(ClientContext::new(
            entity,
            input_address,
            session,
            processor,
            Arc::clone(self),
            self.bus.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerClient;
    use crate::broker::memory::MemoryBroker;
    use crate::settings::HostSettings;

    async fn context(broker: &MemoryBroker) -> Arc<ConnectionContext> {
        let conn = broker.connect(&HostSettings::default()).await.unwrap();
        Arc::new(ConnectionContext::new(1, "sb://ns", conn, Bus::new(16)))
    }

    #[tokio::test]
    async fn session_flag_must_match_factory() {
        let broker = MemoryBroker::new();
        let ctx = context(&broker).await;

        let mut sessions = QueueSettings::new("orders");
        sessions.client.requires_session = true;

        let err = ctx.create_queue_processor(&sessions).err().unwrap();
        assert_eq!(
            err,
            ClientError::SessionMismatch {
                path: "orders".into(),
                requires_session: true,
                requested: "message",
            }
        );
        assert!(ctx.create_queue_session_processor(&sessions).is_ok());

        let plain = SubscriptionSettings::new("events", "audit");
        assert!(ctx.create_subscription_session_processor(&plain).is_err());
        let client = ctx.create_subscription_processor(&plain).unwrap();
        assert_eq!(client.input_address(), "sb://ns/events/Subscriptions/audit");
    }

    #[tokio::test]
    async fn fault_is_reported_once() {
        let broker = MemoryBroker::new();
        let ctx = context(&broker).await;
        let mut rx = ctx.bus.subscribe();

        assert!(ctx.fault("socket reset"));
        assert!(!ctx.fault("again"));
        ctx.faulted().await;

        assert_eq!(ctx.fault_reason(), Some("socket reset"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ConnectionFaulted);
        assert_eq!(ev.generation, Some(1));
        assert!(rx.try_recv().is_err());
    }
}
