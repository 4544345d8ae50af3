//! # Host and endpoint settings.
//!
//! - [`HostSettings`] / [`HostSettingsBuilder`] - namespace, credential, transport, retry bounds
//! - [`EntitySettings`] - queue or subscription receive settings
//! - [`ReceiveEndpointConfigurator`] - user-facing endpoint configuration

mod configurator;
mod endpoint;
mod host;

pub(crate) use configurator::EndpointDefinition;
pub use configurator::{CallbackKind, ReceiveEndpointConfigurator};
pub use endpoint::{
    BASIC_TIER_MESSAGE_TTL, ClientSettings, EntitySettings, MAX_LOCK_DURATION, QueueSettings, RuleFilter,
    SubscriptionRule, SubscriptionSettings,
};
pub use host::{Credential, HostSettings, HostSettingsBuilder, PLACEHOLDER_URI, TransportType};
