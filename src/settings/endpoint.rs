//! # Entity settings for receive endpoints.
//!
//! ```text
//! EntitySettings
//!   ├── Queue(QueueSettings)                 path = "orders"
//!   └── Subscription(SubscriptionSettings)   path = "events/Subscriptions/audit"
//!           └── ClientSettings (lock, session, auto-delete, tier, ttl, concurrency, prefetch)
//! ```

use std::time::Duration;

use crate::broker::{EntityKind, ProcessorOptions};
use crate::error::ConfigError;

/// Longest message lock the broker grants.
pub const MAX_LOCK_DURATION: Duration = Duration::from_secs(5 * 60);

/// Default message time-to-live on the basic tier.
pub const BASIC_TIER_MESSAGE_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Receive settings shared by queues and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Message or session lock duration.
    pub lock_duration: Duration,
    /// Whether the entity requires sessions.
    pub requires_session: bool,
    /// Idle time after which the broker deletes the entity.
    pub auto_delete_on_idle: Option<Duration>,
    /// Namespace is on the basic tier (queues only).
    pub basic_tier: bool,
    /// Default time-to-live for messages.
    pub default_message_ttl: Option<Duration>,
    /// Deliveries processed concurrently.
    pub max_concurrent_calls: usize,
    /// Messages fetched ahead of the handler.
    pub prefetch_count: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(60),
            requires_session: false,
            auto_delete_on_idle: None,
            basic_tier: false,
            default_message_ttl: None,
            max_concurrent_calls: 1,
            prefetch_count: 0,
        }
    }
}

impl ClientSettings {
    /// Switches to basic-tier semantics: no auto-delete, 14 day TTL.
    pub fn select_basic_tier(&mut self) {
        self.basic_tier = true;
        self.auto_delete_on_idle = None;
        self.default_message_ttl = Some(BASIC_TIER_MESSAGE_TTL);
    }
}

/// Queue receive settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    path: String,
    /// Receive settings.
    pub client: ClientSettings,
}

impl QueueSettings {
    /// Settings for the queue at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            client: ClientSettings::default(),
        }
    }

    /// Queue path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Filter applied by a subscription rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFilter {
    /// Accept every message.
    True,
    /// SQL-like expression over message properties.
    Sql(String),
    /// Match on correlation id.
    Correlation(String),
}

/// Named rule replacing a subscription's default filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRule {
    /// Rule name.
    pub name: String,
    /// Filter expression.
    pub filter: RuleFilter,
}

impl SubscriptionRule {
    /// Creates a rule.
    pub fn new(name: impl Into<String>, filter: RuleFilter) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }
}

/// Topic subscription receive settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSettings {
    topic: String,
    subscription: String,
    path: String,
    /// Receive settings.
    pub client: ClientSettings,
    /// Filter rule, if any.
    pub rule: Option<SubscriptionRule>,
    /// Remove the subscription when the endpoint is torn down.
    pub remove_subscriptions: bool,
}

impl SubscriptionSettings {
    /// Settings for `subscription` on `topic`.
    pub fn new(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        let topic = topic.into();
        let subscription = subscription.into();
        let path = format!("{topic}/Subscriptions/{subscription}");
        Self {
            topic,
            subscription,
            path,
            client: ClientSettings::default(),
            rule: None,
            remove_subscriptions: false,
        }
    }

    /// Topic path.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscription name.
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// `{topic}/Subscriptions/{subscription}`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Settings of the entity an endpoint receives from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySettings {
    /// A queue.
    Queue(QueueSettings),
    /// A topic subscription.
    Subscription(SubscriptionSettings),
}

impl EntitySettings {
    /// Entity path.
    pub fn path(&self) -> &str {
        match self {
            EntitySettings::Queue(q) => q.path(),
            EntitySettings::Subscription(s) => s.path(),
        }
    }

    /// Receive settings.
    pub fn client(&self) -> &ClientSettings {
        match self {
            EntitySettings::Queue(q) => &q.client,
            EntitySettings::Subscription(s) => &s.client,
        }
    }

    /// Mutable receive settings.
    pub fn client_mut(&mut self) -> &mut ClientSettings {
        match self {
            EntitySettings::Queue(q) => &mut q.client,
            EntitySettings::Subscription(s) => &mut s.client,
        }
    }

    /// True for a subscription flagged for removal at teardown.
    pub fn removes_subscription(&self) -> bool {
        matches!(self, EntitySettings::Subscription(s) if s.remove_subscriptions)
    }

    /// Whether the entity requires sessions.
    pub fn requires_session(&self) -> bool {
        self.client().requires_session
    }

    /// Queue or subscription.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntitySettings::Queue(_) => EntityKind::Queue,
            EntitySettings::Subscription(s) => EntityKind::Subscription {
                topic: s.topic.clone(),
                subscription: s.subscription.clone(),
            },
        }
    }

    /// Address endpoints report: `{service_uri}/{path}` plus `?autodelete={secs}` when set.
    pub fn input_address(&self, service_uri: &str) -> String {
        let mut address = format!("{}/{}", service_uri.trim_end_matches('/'), self.path());
        if let Some(idle) = self.client().auto_delete_on_idle {
            address.push_str(&format!("?autodelete={}", idle.as_secs()));
        }
        address
    }

    /// Options handed to the broker to create a processor.
    pub fn processor_options(&self, session: bool) -> ProcessorOptions {
        let client = self.client();
        ProcessorOptions {
            entity_path: self.path().to_string(),
            kind: self.kind(),
            session,
            lock_duration: client.lock_duration,
            max_concurrent_calls: client.max_concurrent_calls,
            prefetch_count: client.prefetch_count,
        }
    }

    /// Checks names and receive settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            EntitySettings::Queue(q) if q.path.trim().is_empty() => return Err(ConfigError::EmptyPath),
            EntitySettings::Subscription(s) => {
                if s.topic.trim().is_empty() || s.subscription.trim().is_empty() {
                    return Err(ConfigError::EmptySubscription {
                        topic: s.topic.clone(),
                        subscription: s.subscription.clone(),
                    });
                }
                if s.client.basic_tier {
                    return Err(ConfigError::BasicTierSubscription { path: s.path.clone() });
                }
            }
            EntitySettings::Queue(_) => {}
        }

        let client = self.client();
        if client.lock_duration.is_zero() || client.lock_duration > MAX_LOCK_DURATION {
            return Err(ConfigError::InvalidLockDuration {
                path: self.path().to_string(),
                lock: client.lock_duration,
                max: MAX_LOCK_DURATION,
            });
        }
        if client.max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidConcurrency {
                path: self.path().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_path_is_derived() {
        let s = SubscriptionSettings::new("events", "audit");
        assert_eq!(s.path(), "events/Subscriptions/audit");
    }

    #[test]
    fn input_address_carries_auto_delete() {
        let mut e = EntitySettings::Queue(QueueSettings::new("orders"));
        assert_eq!(e.input_address("sb://ns/"), "sb://ns/orders");

        e.client_mut().auto_delete_on_idle = Some(Duration::from_secs(300));
        assert_eq!(e.input_address("sb://ns"), "sb://ns/orders?autodelete=300");
    }

    #[test]
    fn basic_tier_drops_auto_delete() {
        let mut c = ClientSettings {
            auto_delete_on_idle: Some(Duration::from_secs(60)),
            ..ClientSettings::default()
        };
        c.select_basic_tier();
        assert_eq!(c.auto_delete_on_idle, None);
        assert_eq!(c.default_message_ttl, Some(BASIC_TIER_MESSAGE_TTL));
    }

    #[test]
    fn validation_rejects_bad_settings() {
        assert_eq!(
            EntitySettings::Queue(QueueSettings::new(" ")).validate(),
            Err(ConfigError::EmptyPath)
        );
        assert!(matches!(
            EntitySettings::Subscription(SubscriptionSettings::new("events", "")).validate(),
            Err(ConfigError::EmptySubscription { .. })
        ));

        let mut lock = EntitySettings::Queue(QueueSettings::new("orders"));
        lock.client_mut().lock_duration = Duration::from_secs(301);
        assert!(matches!(lock.validate(), Err(ConfigError::InvalidLockDuration { .. })));
        lock.client_mut().lock_duration = Duration::ZERO;
        assert!(matches!(lock.validate(), Err(ConfigError::InvalidLockDuration { .. })));
        lock.client_mut().lock_duration = MAX_LOCK_DURATION;
        assert_eq!(lock.validate(), Ok(()));

        let mut conc = EntitySettings::Queue(QueueSettings::new("orders"));
        conc.client_mut().max_concurrent_calls = 0;
        assert!(matches!(conc.validate(), Err(ConfigError::InvalidConcurrency { .. })));

        let mut basic = EntitySettings::Subscription(SubscriptionSettings::new("events", "audit"));
        basic.client_mut().select_basic_tier();
        assert!(matches!(basic.validate(), Err(ConfigError::BasicTierSubscription { .. })));
    }
}
