//! # Broker namespace settings.
//!
//! [`HostSettings`] carries everything needed to open a connection: service
//! URI, one authoritative [`Credential`], transport, connection retry bounds,
//! and the separator used when deriving topic names from message types.
//!
//! ## Credential precedence
//! When several credentials are given to the builder, exactly one wins:
//!
//! ```text
//! connection string > named key > shared access signature > token > ambient default
//! ```
//!
//! ## Example
//! ```rust
//! use brokervisor::{Credential, HostSettings};
//!
//! let settings = HostSettings::builder("sb://no-host-configured")
//!     .connection_string("Endpoint=sb://demo.servicebus.windows.net/;SharedAccessKeyName=root;SharedAccessKey=k")
//!     .token("ignored")
//!     .build();
//!
//! assert_eq!(settings.service_uri(), "sb://demo.servicebus.windows.net");
//! assert!(matches!(settings.credential(), Credential::ConnectionString(_)));
//! assert_eq!(settings.separator(), "~");
//! ```

use std::fmt;
use std::time::Duration;

use crate::policies::RetryPolicy;

/// Service URI used until one is configured.
pub const PLACEHOLDER_URI: &str = "sb://no-host-configured";

const DEFAULT_SEPARATOR: &str = "~";
const TOKEN_SEPARATOR: &str = "_";

/// How the host authenticates against the namespace.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// Full connection string (`Endpoint=...;SharedAccessKeyName=...;SharedAccessKey=...`).
    ConnectionString(String),
    /// Shared access key name and value.
    NamedKey {
        /// Key name.
        name: String,
        /// Key value.
        key: String,
    },
    /// Pre-signed shared access signature.
    SharedAccessSignature(String),
    /// Bearer token issued by an identity provider.
    Token(String),
    /// Whatever the environment provides.
    #[default]
    Default,
}

impl Credential {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Credential::ConnectionString(_) => "connection_string",
            Credential::NamedKey { .. } => "named_key",
            Credential::SharedAccessSignature(_) => "shared_access_signature",
            Credential::Token(_) => "token",
            Credential::Default => "default",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::NamedKey { name, .. } => write!(f, "NamedKey({name}, ***)"),
            Credential::Default => f.write_str("Default"),
            other => write!(f, "{}(***)", other.as_label()),
        }
    }
}

/// Wire transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    /// AMQP over TCP (port 5671).
    #[default]
    AmqpTcp,
    /// AMQP over WebSockets (port 443).
    AmqpWebSockets,
}

/// Resolved namespace settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    service_uri: String,
    credential: Credential,
    transport: TransportType,
    retry_min_backoff: Duration,
    retry_max_backoff: Duration,
    retry_limit: u32,
    separator: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings::builder(PLACEHOLDER_URI).build()
    }
}

impl HostSettings {
    /// Starts building settings for `service_uri`.
    pub fn builder(service_uri: impl Into<String>) -> HostSettingsBuilder {
        HostSettingsBuilder::new(service_uri)
    }

    /// Namespace URI without a trailing slash.
    pub fn service_uri(&self) -> &str {
        &self.service_uri
    }

    /// Path part of the service URI, trimmed of slashes.
    pub fn base_path(&self) -> &str {
        let rest = self
            .service_uri
            .split_once("://")
            .map_or(self.service_uri.as_str(), |(_, rest)| rest);
        rest.split_once('/').map_or("", |(_, path)| path.trim_matches('/'))
    }

    /// The authoritative credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Wire transport.
    pub fn transport(&self) -> TransportType {
        self.transport
    }

    /// Smallest delay between connection attempts.
    pub fn retry_min_backoff(&self) -> Duration {
        self.retry_min_backoff
    }

    /// Largest delay between connection attempts.
    pub fn retry_max_backoff(&self) -> Duration {
        self.retry_max_backoff
    }

    /// Connection retries after the first attempt.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Retry policy used while building connections.
    pub fn connection_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.retry_limit, self.retry_min_backoff, self.retry_max_backoff)
    }

    /// Separator placed between namespace and type name in topic names.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Replaces the credential.
    ///
    /// A token credential switches the separator to `_`; any other credential
    /// keeps the current separator.
    pub fn set_credential(&mut self, credential: Credential) {
        if matches!(credential, Credential::Token(_)) {
            self.separator = TOKEN_SEPARATOR.to_string();
        }
        self.credential = credential;
    }

    /// Sets the separator explicitly.
    pub fn set_separator(&mut self, separator: impl Into<String>) {
        self.separator = separator.into();
    }

    /// Topic name for a message type name such as `my_app::events::OrderSubmitted`.
    ///
    /// ```rust
    /// use brokervisor::HostSettings;
    ///
    /// let s = HostSettings::default();
    /// assert_eq!(s.format_message_topic("my_app::events::OrderSubmitted"), "my_app.events~OrderSubmitted");
    /// assert_eq!(s.format_message_topic("Ping"), "Ping");
    /// ```
    pub fn format_message_topic(&self, type_name: &str) -> String {
        let name = type_name.split('<').next().unwrap_or(type_name);
        match name.rsplit_once("::") {
            Some((namespace, ty)) => format!("{}{}{}", namespace.replace("::", "."), self.separator, ty),
            None => name.to_string(),
        }
    }
}

/// Builder for [`HostSettings`].
#[derive(Debug, Clone)]
pub struct HostSettingsBuilder {
    service_uri: String,
    connection_string: Option<String>,
    named_key: Option<(String, String)>,
    sas: Option<String>,
    token: Option<String>,
    transport: TransportType,
    retry_min_backoff: Duration,
    retry_max_backoff: Duration,
    retry_limit: u32,
    separator: Option<String>,
}

impl HostSettingsBuilder {
    fn new(service_uri: impl Into<String>) -> Self {
        Self {
            service_uri: service_uri.into(),
            connection_string: None,
            named_key: None,
            sas: None,
            token: None,
            transport: TransportType::default(),
            retry_min_backoff: Duration::from_millis(100),
            retry_max_backoff: Duration::from_secs(30),
            retry_limit: 10,
            separator: None,
        }
    }

    /// Authenticates with a connection string.
    pub fn connection_string(mut self, value: impl Into<String>) -> Self {
        self.connection_string = Some(value.into());
        self
    }

    /// Authenticates with a shared access key.
    pub fn named_key(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.named_key = Some((name.into(), key.into()));
        self
    }

    /// Authenticates with a shared access signature.
    pub fn shared_access_signature(mut self, value: impl Into<String>) -> Self {
        self.sas = Some(value.into());
        self
    }

    /// Authenticates with a bearer token.
    pub fn token(mut self, value: impl Into<String>) -> Self {
        self.token = Some(value.into());
        self
    }

    /// Selects the wire transport.
    pub fn transport(mut self, transport: TransportType) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the connection retry bounds and limit.
    pub fn retry(mut self, min: Duration, max: Duration, limit: u32) -> Self {
        self.retry_min_backoff = min;
        self.retry_max_backoff = max.max(min);
        self.retry_limit = limit;
        self
    }

    /// Sets the topic-name separator explicitly.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Resolves the credential and derived values.
    pub fn build(self) -> HostSettings {
        let credential = if let Some(cs) = self.connection_string {
            Credential::ConnectionString(cs)
        } else if let Some((name, key)) = self.named_key {
            Credential::NamedKey { name, key }
        } else if let Some(sas) = self.sas {
            Credential::SharedAccessSignature(sas)
        } else if let Some(token) = self.token {
            Credential::Token(token)
        } else {
            Credential::Default
        };

        let mut service_uri = self.service_uri.trim_end_matches('/').to_string();
        if service_uri == PLACEHOLDER_URI {
            if let Credential::ConnectionString(cs) = &credential {
                if let Some(endpoint) = endpoint_from_connection_string(cs) {
                    service_uri = endpoint;
                }
            }
        }

        let separator = match (&self.separator, &credential) {
            (Some(explicit), _) => explicit.clone(),
            (None, Credential::Token(_)) => TOKEN_SEPARATOR.to_string(),
            (None, _) => DEFAULT_SEPARATOR.to_string(),
        };

        HostSettings {
            service_uri,
            credential,
            transport: self.transport,
            retry_min_backoff: self.retry_min_backoff,
            retry_max_backoff: self.retry_max_backoff,
            retry_limit: self.retry_limit,
            separator,
        }
    }
}

fn endpoint_from_connection_string(cs: &str) -> Option<String> {
    cs.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("endpoint")
            .then(|| value.trim().trim_end_matches('/').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_namespace_conventions() {
        let s = HostSettings::default();
        assert_eq!(s.service_uri(), PLACEHOLDER_URI);
        assert_eq!(s.transport(), TransportType::AmqpTcp);
        assert_eq!(s.retry_min_backoff(), Duration::from_millis(100));
        assert_eq!(s.retry_max_backoff(), Duration::from_secs(30));
        assert_eq!(s.retry_limit(), 10);
        assert_eq!(s.credential(), &Credential::Default);
        assert_eq!(s.separator(), "~");
    }

    #[test]
    fn credential_precedence() {
        let b = || HostSettings::builder("sb://ns.servicebus.windows.net").token("t");
        assert!(matches!(b().build().credential(), Credential::Token(_)));
        assert!(matches!(
            b().shared_access_signature("sig").build().credential(),
            Credential::SharedAccessSignature(_)
        ));
        assert!(matches!(
            b().shared_access_signature("sig").named_key("root", "k").build().credential(),
            Credential::NamedKey { .. }
        ));
        assert!(matches!(
            b().named_key("root", "k").connection_string("Endpoint=sb://x/").build().credential(),
            Credential::ConnectionString(_)
        ));
    }

    #[test]
    fn explicit_uri_is_not_replaced_by_connection_string() {
        let s = HostSettings::builder("sb://ns.servicebus.windows.net/")
            .connection_string("Endpoint=sb://other.servicebus.windows.net/")
            .build();
        assert_eq!(s.service_uri(), "sb://ns.servicebus.windows.net");
    }

    #[test]
    fn token_credential_switches_separator() {
        let built = HostSettings::builder(PLACEHOLDER_URI).token("t").build();
        assert_eq!(built.separator(), "_");

        let mut s = HostSettings::default();
        s.set_separator("-");
        s.set_credential(Credential::SharedAccessSignature("sig".into()));
        assert_eq!(s.separator(), "-");
        s.set_credential(Credential::Token("t".into()));
        assert_eq!(s.separator(), "_");
    }

    #[test]
    fn base_path_and_debug_redaction() {
        let s = HostSettings::builder("sb://ns.servicebus.windows.net/tenant-a/")
            .named_key("root", "secret")
            .build();
        assert_eq!(s.base_path(), "tenant-a");
        assert!(!format!("{s:?}").contains("secret"));
    }
}
