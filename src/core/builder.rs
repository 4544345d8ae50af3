use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    broker::BrokerClient,
    core::{Config, host::Host},
    error::ConfigError,
    settings::{EndpointDefinition, HostSettings, ReceiveEndpointConfigurator},
    subscribers::Subscribe,
};

/// Builder for a [`Host`] with endpoints declared up front.
pub struct HostBuilder {
    settings: HostSettings,
    client: Arc<dyn BrokerClient>,
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    declared: Vec<Result<EndpointDefinition, ConfigError>>,
}

impl HostBuilder {
    /// Creates a builder for the namespace described by `settings`.
    pub fn new(settings: HostSettings, client: Arc<dyn BrokerClient>) -> Self {
        Self {
            settings,
            client,
            cfg: Config::default(),
            subscribers: Vec::new(),
            declared: Vec::new(),
        }
    }

    /// Replaces the runtime configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Declares a queue endpoint started by [`Host::start`].
    pub fn receive_endpoint<F>(mut self, queue: &str, configure: F) -> Self
    where
        F: FnOnce(&mut ReceiveEndpointConfigurator),
    {
        let mut cfg = ReceiveEndpointConfigurator::queue(queue);
        configure(&mut cfg);
        self.declared.push(cfg.finish());
        self
    }

    /// Declares a subscription endpoint started by [`Host::start`].
    pub fn subscription_endpoint<F>(mut self, topic: &str, subscription: &str, configure: F) -> Self
    where
        F: FnOnce(&mut ReceiveEndpointConfigurator),
    {
        let mut cfg = ReceiveEndpointConfigurator::subscription(topic, subscription);
        configure(&mut cfg);
        self.declared.push(cfg.finish());
        self
    }

    /// Validates the declared endpoints and builds the host.
    ///
    /// Must be called inside a tokio runtime (subscriber workers are spawned).
    ///
    /// ### Errors
    /// The first invalid endpoint, or [`ConfigError::DuplicateEndpoint`].
    pub fn build(self) -> Result<Arc<Host>, ConfigError> {
        let mut seen = HashSet::new();
        let mut declared = Vec::with_capacity(self.declared.len());
        for def in self.declared {
            let def = def?;
            if !seen.insert(def.entity.path().to_string()) {
                return Err(ConfigError::DuplicateEndpoint {
                    path: def.entity.path().to_string(),
                });
            }
            declared.push(def);
        }

        Ok(Host::new_internal(
            self.cfg,
            Arc::new(self.settings),
            self.client,
            self.subscribers,
            declared,
        ))
    }
}
