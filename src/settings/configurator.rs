//! # Receive endpoint configurator.
//!
//! Passed to the closure given to
//! [`Host::connect_receive_endpoint`](crate::Host::connect_receive_endpoint)
//! and friends. Collects entity settings and the handler, then validates them
//! in one place before anything touches the network.
//!
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use brokervisor::{BrokerError, HandlerFn, ReceivedMessage, ReceiveEndpointConfigurator};
//!
//! fn configure(e: &mut ReceiveEndpointConfigurator) {
//!     e.lock_duration(Duration::from_secs(30))
//!         .max_concurrent_calls(8)
//!         .handler(HandlerFn::arc(|_m: ReceivedMessage, _c: CancellationToken| async {
//!             Ok::<_, BrokerError>(())
//!         }));
//! }
//! ```

use std::time::Duration;

use crate::error::ConfigError;
use crate::handlers::HandlerRef;
use crate::settings::{EntitySettings, QueueSettings, SubscriptionRule, SubscriptionSettings};

/// Callback shape registered on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// Plain message callback.
    Message,
    /// Session-aware callback.
    Session,
}

impl CallbackKind {
    /// `"message"` or `"session"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::Message => "message",
            CallbackKind::Session => "session",
        }
    }
}

/// A validated endpoint ready to be spawned.
#[derive(Clone)]
pub(crate) struct EndpointDefinition {
    pub(crate) entity: EntitySettings,
    pub(crate) callback: CallbackKind,
    pub(crate) handler: HandlerRef,
}

/// Mutable endpoint configuration.
pub struct ReceiveEndpointConfigurator {
    entity: EntitySettings,
    handler: Option<(CallbackKind, HandlerRef)>,
    rule: Option<SubscriptionRule>,
    remove_subscriptions: bool,
}

impl ReceiveEndpointConfigurator {
    pub(crate) fn queue(path: impl Into<String>) -> Self {
        Self::with_entity(EntitySettings::Queue(QueueSettings::new(path)))
    }

    pub(crate) fn subscription(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self::with_entity(EntitySettings::Subscription(SubscriptionSettings::new(
            topic,
            subscription,
        )))
    }

    fn with_entity(entity: EntitySettings) -> Self {
        Self {
            entity,
            handler: None,
            rule: None,
            remove_subscriptions: false,
        }
    }

    /// Entity path being configured.
    pub fn path(&self) -> &str {
        self.entity.path()
    }

    /// Message lock duration (default 60s, at most 5 minutes).
    pub fn lock_duration(&mut self, d: Duration) -> &mut Self {
        self.entity.client_mut().lock_duration = d;
        self
    }

    /// Marks the entity as session-enabled.
    pub fn requires_session(&mut self, yes: bool) -> &mut Self {
        self.entity.client_mut().requires_session = yes;
        self
    }

    /// Deletes the entity after it has been idle for `d`.
    pub fn auto_delete_on_idle(&mut self, d: Duration) -> &mut Self {
        self.entity.client_mut().auto_delete_on_idle = Some(d);
        self
    }

    /// Default time-to-live of messages.
    pub fn default_message_ttl(&mut self, d: Duration) -> &mut Self {
        self.entity.client_mut().default_message_ttl = Some(d);
        self
    }

    /// Deliveries processed concurrently (default 1).
    pub fn max_concurrent_calls(&mut self, n: usize) -> &mut Self {
        self.entity.client_mut().max_concurrent_calls = n;
        self
    }

    /// Messages fetched ahead of the handler (default 0).
    pub fn prefetch_count(&mut self, n: u32) -> &mut Self {
        self.entity.client_mut().prefetch_count = n;
        self
    }

    /// Basic-tier namespace: no auto-delete, 14 day TTL.
    pub fn select_basic_tier(&mut self) -> &mut Self {
        self.entity.client_mut().select_basic_tier();
        self
    }

    /// Replaces the subscription's default filter. Only valid on subscriptions.
    pub fn rule(&mut self, rule: SubscriptionRule) -> &mut Self {
        self.rule = Some(rule);
        self
    }

    /// Removes the subscription on teardown. Ignored for queues.
    pub fn remove_subscriptions(&mut self, yes: bool) -> &mut Self {
        self.remove_subscriptions = yes;
        self
    }

    /// Registers a plain message handler.
    pub fn handler(&mut self, handler: HandlerRef) -> &mut Self {
        self.handler = Some((CallbackKind::Message, handler));
        self
    }

    /// Registers a session handler; the entity must require sessions.
    pub fn session_handler(&mut self, handler: HandlerRef) -> &mut Self {
        self.handler = Some((CallbackKind::Session, handler));
        self
    }

    pub(crate) fn finish(self) -> Result<EndpointDefinition, ConfigError> {
        let Self {
            mut entity,
            handler,
            rule,
            remove_subscriptions,
        } = self;

        entity.validate()?;

        match &mut entity {
            EntitySettings::Queue(q) => {
                if rule.is_some() {
                    return Err(ConfigError::FilterOnQueue {
                        path: q.path().to_string(),
                    });
                }
            }
            EntitySettings::Subscription(s) => {
                s.rule = rule;
                s.remove_subscriptions = remove_subscriptions;
            }
        }

        let Some((callback, handler)) = handler else {
            return Err(ConfigError::MissingHandler {
                path: entity.path().to_string(),
            });
        };

        let wants_session = callback == CallbackKind::Session;
        if wants_session != entity.requires_session() {
            return Err(ConfigError::SessionMismatch {
                path: entity.path().to_string(),
                requires_session: entity.requires_session(),
                callback: callback.as_str(),
            });
        }

        Ok(EndpointDefinition {
            entity,
            callback,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ReceivedMessage;
    use crate::error::BrokerError;
    use crate::handlers::HandlerFn;
    use crate::settings::RuleFilter;
    use tokio_util::sync::CancellationToken;

    fn noop() -> HandlerRef {
        HandlerFn::arc(|_m: ReceivedMessage, _c: CancellationToken| async { Ok::<_, BrokerError>(()) })
    }

    #[test]
    fn missing_handler_is_rejected() {
        let cfg = ReceiveEndpointConfigurator::queue("orders");
        assert!(matches!(cfg.finish(), Err(ConfigError::MissingHandler { .. })));
    }

    #[test]
    fn session_flag_must_match_callback() {
        let mut cfg = ReceiveEndpointConfigurator::queue("orders");
        cfg.requires_session(true).handler(noop());
        assert_eq!(
            cfg.finish().err(),
            Some(ConfigError::SessionMismatch {
                path: "orders".into(),
                requires_session: true,
                callback: "message",
            })
        );

        let mut cfg = ReceiveEndpointConfigurator::queue("orders");
        cfg.session_handler(noop());
        assert!(matches!(cfg.finish(), Err(ConfigError::SessionMismatch { .. })));

        let mut cfg = ReceiveEndpointConfigurator::queue("orders");
        cfg.requires_session(true).session_handler(noop());
        assert_eq!(cfg.finish().map(|d| d.callback).ok(), Some(CallbackKind::Session));
    }

    #[test]
    fn rules_only_apply_to_subscriptions() {
        let rule = SubscriptionRule::new("only-eu", RuleFilter::Sql("region = 'eu'".into()));

        let mut cfg = ReceiveEndpointConfigurator::queue("orders");
        cfg.rule(rule.clone()).handler(noop());
        assert!(matches!(cfg.finish(), Err(ConfigError::FilterOnQueue { .. })));

        let mut cfg = ReceiveEndpointConfigurator::subscription("events", "audit");
        cfg.rule(rule.clone()).handler(noop());
        let def = cfg.finish().ok().unwrap();
        match def.entity {
            EntitySettings::Subscription(s) => assert_eq!(s.rule, Some(rule)),
            EntitySettings::Queue(_) => panic!("expected subscription"),
        }
    }
}
