//! Error types used by the transport host, client contexts, and broker collaborators.
//!
//! This module defines four error enums:
//!
//! - [`BrokerError`] - failures reported by the broker client (with a [`FailureReason`]).
//! - [`ClientError`] - contract violations on a [`ClientContext`](crate::ClientContext).
//! - [`ConfigError`] - settings and endpoint validation failures.
//! - [`HostError`] - errors raised by the host runtime itself.
//!
//! Every type provides `as_label` for logs/metrics. Retry judgement lives in
//! [`RetryClassifier`](crate::RetryClassifier), not here.

use std::time::Duration;
use thiserror::Error;

/// Reason code attached to a broker-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Unclassified broker failure.
    GeneralError,
    /// The addressed queue, topic or subscription does not exist.
    MessagingEntityNotFound,
    /// The entity being created already exists.
    MessagingEntityAlreadyExists,
    /// A referenced message (lock token, sequence number) does not exist.
    MessageNotFound,
    /// The message exceeds the entity's size limit.
    MessageSizeExceeded,
    /// The lock on a message was lost.
    MessageLockLost,
    /// The lock on a session was lost.
    SessionLockLost,
    /// A session could not be locked by this receiver.
    SessionCannotBeLocked,
    /// Namespace or entity quota exceeded.
    QuotaExceeded,
    /// The broker is throttling requests.
    ServiceBusy,
    /// The broker did not answer in time.
    ServiceTimeout,
    /// The link to the broker is broken.
    ServiceCommunicationProblem,
}

impl FailureReason {
    fn as_str(&self) -> &'static str {
        match self {
            FailureReason::GeneralError => "general_error",
            FailureReason::MessagingEntityNotFound => "entity_not_found",
            FailureReason::MessagingEntityAlreadyExists => "entity_already_exists",
            FailureReason::MessageNotFound => "message_not_found",
            FailureReason::MessageSizeExceeded => "message_size_exceeded",
            FailureReason::MessageLockLost => "message_lock_lost",
            FailureReason::SessionLockLost => "session_lock_lost",
            FailureReason::SessionCannotBeLocked => "session_cannot_be_locked",
            FailureReason::QuotaExceeded => "quota_exceeded",
            FailureReason::ServiceBusy => "service_busy",
            FailureReason::ServiceTimeout => "service_timeout",
            FailureReason::ServiceCommunicationProblem => "service_communication_problem",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Errors reported by the broker client.
///
/// These come from the broker collaborator (connection build, processor
/// operations, message dispatch) and are classified by
/// [`RetryClassifier`](crate::RetryClassifier).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker-side failure with a reason code and the broker's transient flag.
    #[error("service bus failure ({reason}, transient={transient}): {message}")]
    ServiceBus {
        /// Reason code reported by the broker.
        reason: FailureReason,
        /// Whether the broker marked the failure as transient.
        transient: bool,
        /// Broker-supplied description.
        message: String,
    },

    /// The credential was rejected for the requested operation.
    #[error("unauthorized access: {message}")]
    Unauthorized {
        /// Broker-supplied description.
        message: String,
    },

    /// A client-side timeout elapsed.
    #[error("operation timed out: {message}")]
    Timeout {
        /// Description of the timed-out operation.
        message: String,
    },

    /// The underlying connection was lost; every processor on it is affected.
    #[error("connection lost: {message}")]
    ConnectionLost {
        /// Description of the failure.
        message: String,
    },

    /// An application handler failed while processing a delivery.
    #[error("delivery failed: {message}")]
    Delivery {
        /// Handler-supplied description.
        message: String,
    },
}

impl BrokerError {
    /// Builds a [`BrokerError::ServiceBus`] error.
    pub fn service_bus(reason: FailureReason, transient: bool, message: impl Into<String>) -> Self {
        BrokerError::ServiceBus {
            reason,
            transient,
            message: message.into(),
        }
    }

    /// Transient "service busy" throttling error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::service_bus(FailureReason::ServiceBusy, true, message)
    }

    /// Entity-not-found error.
    pub fn entity_not_found(message: impl Into<String>) -> Self {
        Self::service_bus(FailureReason::MessagingEntityNotFound, false, message)
    }

    /// Message-size-exceeded error.
    pub fn message_too_large(message: impl Into<String>) -> Self {
        Self::service_bus(FailureReason::MessageSizeExceeded, false, message)
    }

    /// Unauthorized-access error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        BrokerError::Unauthorized {
            message: message.into(),
        }
    }

    /// Client-side timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        BrokerError::Timeout {
            message: message.into(),
        }
    }

    /// Connection-lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        BrokerError::ConnectionLost {
            message: message.into(),
        }
    }

    /// Handler failure during a delivery.
    pub fn delivery(message: impl Into<String>) -> Self {
        BrokerError::Delivery {
            message: message.into(),
        }
    }

    /// Returns the broker reason code, if this is a [`BrokerError::ServiceBus`] error.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            BrokerError::ServiceBus { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the broker marked this failure as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            BrokerError::ServiceBus { transient, .. } => *transient,
            BrokerError::Timeout { .. } | BrokerError::ConnectionLost { .. } => true,
            _ => false,
        }
    }

    /// Whether the failure affects the whole connection rather than one entity.
    ///
    /// Connection-scoped faults recycle the shared connection and stop every
    /// endpoint bound to it.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            BrokerError::ConnectionLost { .. }
                | BrokerError::ServiceBus {
                    reason: FailureReason::ServiceCommunicationProblem,
                    ..
                }
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use brokervisor::BrokerError;
    ///
    /// assert_eq!(BrokerError::busy("throttled").as_label(), "service_busy");
    /// assert_eq!(BrokerError::timeout("10s").as_label(), "broker_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::ServiceBus { reason, .. } => reason.as_str(),
            BrokerError::Unauthorized { .. } => "unauthorized",
            BrokerError::Timeout { .. } => "broker_timeout",
            BrokerError::ConnectionLost { .. } => "connection_lost",
            BrokerError::Delivery { .. } => "delivery_failed",
        }
    }
}

/// # Contract violations on a client context.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A callback slot was already taken; only one registration is allowed.
    #[error("{slot} can only be called once")]
    AlreadyRegistered {
        /// Name of the slot that is already registered.
        slot: &'static str,
    },

    /// The processor factory does not match the entity's session requirement.
    #[error("entity {path} requires_session={requires_session} cannot use a {requested} processor")]
    SessionMismatch {
        /// Entity path.
        path: String,
        /// Session flag from the entity settings.
        requires_session: bool,
        /// Processor shape that was requested ("session" or "message").
        requested: &'static str,
    },

    /// `start` was called before a callback was registered.
    #[error("no callback registered for {path}")]
    NotRegistered {
        /// Entity path.
        path: String,
    },

    /// The context is closed or closing.
    #[error("client for {path} is closed")]
    Closed {
        /// Entity path.
        path: String,
    },

    /// The broker rejected an operation.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::AlreadyRegistered { .. } => "client_already_registered",
            ClientError::SessionMismatch { .. } => "client_session_mismatch",
            ClientError::NotRegistered { .. } => "client_not_registered",
            ClientError::Closed { .. } => "client_closed",
            ClientError::Broker(e) => e.as_label(),
        }
    }
}

/// # Settings and endpoint validation errors.
///
/// Returned synchronously before any network activity takes place.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The entity path is empty.
    #[error("entity path must not be empty")]
    EmptyPath,

    /// Topic or subscription name is empty.
    #[error("topic and subscription names must not be empty (topic={topic:?}, subscription={subscription:?})")]
    EmptySubscription {
        /// Topic path.
        topic: String,
        /// Subscription name.
        subscription: String,
    },

    /// The lock duration is zero or above the broker maximum.
    #[error("lock duration {lock:?} for {path} must be within (0, {max:?}]")]
    InvalidLockDuration {
        /// Entity path.
        path: String,
        /// Configured lock duration.
        lock: Duration,
        /// Upper bound accepted by the broker.
        max: Duration,
    },

    /// Max concurrent calls is zero.
    #[error("max concurrent calls for {path} must be positive")]
    InvalidConcurrency {
        /// Entity path.
        path: String,
    },

    /// No callback was registered on the endpoint.
    #[error("no handler configured for {path}")]
    MissingHandler {
        /// Entity path.
        path: String,
    },

    /// Session flag and callback kind disagree.
    #[error("entity {path} requires_session={requires_session} but a {callback} handler was configured")]
    SessionMismatch {
        /// Entity path.
        path: String,
        /// Session flag from the settings.
        requires_session: bool,
        /// Configured callback kind ("session" or "message").
        callback: &'static str,
    },

    /// Filter rules only apply to subscriptions.
    #[error("filter rules are not supported on queue {path}")]
    FilterOnQueue {
        /// Entity path.
        path: String,
    },

    /// The basic tier has no topics.
    #[error("basic tier does not support subscription {path}")]
    BasicTierSubscription {
        /// Entity path.
        path: String,
    },

    /// Two endpoints share one entity path.
    #[error("endpoint {path} declared more than once")]
    DuplicateEndpoint {
        /// Entity path.
        path: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::EmptyPath => "config_empty_path",
            ConfigError::EmptySubscription { .. } => "config_empty_subscription",
            ConfigError::InvalidLockDuration { .. } => "config_invalid_lock_duration",
            ConfigError::InvalidConcurrency { .. } => "config_invalid_concurrency",
            ConfigError::MissingHandler { .. } => "config_missing_handler",
            ConfigError::SessionMismatch { .. } => "config_session_mismatch",
            ConfigError::FilterOnQueue { .. } => "config_filter_on_queue",
            ConfigError::BasicTierSubscription { .. } => "config_basic_tier_subscription",
            ConfigError::DuplicateEndpoint { .. } => "config_duplicate_endpoint",
        }
    }
}

/// # Errors produced by the host runtime.
///
/// Everything surfaced as a `HostError` is fatal for the operation that
/// returned it.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HostError {
    /// Broker failure that was not retried.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Client context contract violation.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Endpoint or settings validation failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A retryable operation kept failing past its retry limit.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Name of the operation.
        operation: String,
        /// Total attempts made (initial + retries).
        attempts: u32,
        /// Last error observed.
        last: BrokerError,
    },

    /// The shared connection could not be built.
    #[error("connection unavailable: {reason}")]
    ConnectionUnavailable {
        /// Build failure.
        reason: String,
    },

    /// The host or supervisor was stopped.
    #[error("host stopped")]
    Stopped,

    /// An endpoint with the same entity path is already connected.
    #[error("endpoint {name} is already connected")]
    EndpointExists {
        /// Endpoint name (entity path).
        name: String,
    },

    /// The endpoint stopped on an unrecoverable fault.
    #[error("endpoint {name} faulted: {reason}")]
    EndpointFaulted {
        /// Endpoint name.
        name: String,
        /// Fault description.
        reason: String,
    },

    /// The endpoint was stopped before it became ready.
    #[error("endpoint {name} stopped")]
    EndpointStopped {
        /// Endpoint name.
        name: String,
    },

    /// Shutdown grace period was exceeded; some endpoints had to be aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Endpoints that did not stop in time.
        stuck: Vec<String>,
    },
}

impl HostError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use brokervisor::HostError;
    /// use std::time::Duration;
    ///
    /// let err = HostError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "host_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HostError::Broker(e) => e.as_label(),
            HostError::Client(e) => e.as_label(),
            HostError::Config(e) => e.as_label(),
            HostError::RetryExhausted { .. } => "host_retry_exhausted",
            HostError::ConnectionUnavailable { .. } => "host_connection_unavailable",
            HostError::Stopped => "host_stopped",
            HostError::EndpointExists { .. } => "host_endpoint_exists",
            HostError::EndpointFaulted { .. } => "host_endpoint_faulted",
            HostError::EndpointStopped { .. } => "host_endpoint_stopped",
            HostError::GraceExceeded { .. } => "host_grace_exceeded",
        }
    }
}

/// Access to the broker error carried by a wrapper error, if any.
///
/// Used by [`RetryClassifier`](crate::RetryClassifier) to judge errors that
/// travel inside [`ClientError`] or [`HostError`]. Wrappers without a broker
/// error are always fatal.
pub trait AsBrokerError {
    /// Returns the inner broker error.
    fn as_broker_error(&self) -> Option<&BrokerError>;
}

impl AsBrokerError for BrokerError {
    fn as_broker_error(&self) -> Option<&BrokerError> {
        Some(self)
    }
}

impl AsBrokerError for ClientError {
    fn as_broker_error(&self) -> Option<&BrokerError> {
        match self {
            ClientError::Broker(e) => Some(e),
            _ => None,
        }
    }
}

impl AsBrokerError for HostError {
    fn as_broker_error(&self) -> Option<&BrokerError> {
        match self {
            HostError::Broker(e) => Some(e),
            HostError::Client(e) => e.as_broker_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_registered_names_the_taken_slot() {
        let err = ClientError::AlreadyRegistered { slot: "on_session" };
        assert_eq!(err.to_string(), "on_session can only be called once");
    }

    #[test]
    fn connection_scope_covers_communication_problems() {
        assert!(BrokerError::connection_lost("socket reset").is_connection_scoped());
        assert!(
            BrokerError::service_bus(FailureReason::ServiceCommunicationProblem, true, "amqp")
                .is_connection_scoped()
        );
        assert!(!BrokerError::busy("throttled").is_connection_scoped());
    }

    #[test]
    fn host_error_exposes_nested_broker_error() {
        let err = HostError::Client(ClientError::Broker(BrokerError::busy("throttled")));
        assert_eq!(err.as_broker_error(), Some(&BrokerError::busy("throttled")));
        assert!(HostError::Stopped.as_broker_error().is_none());
    }
}
