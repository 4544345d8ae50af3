//! # Application message handler.
//!
//! [`MessageHandler`] is the seam between the transport host and whatever runs
//! application code (a pipeline, a consumer, a closure). The host hands it
//! every delivery and asks it how to treat processor errors.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::broker::ReceivedMessage;
use crate::error::BrokerError;

/// How a handler wants a processor error treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDisposition {
    /// The error was dealt with; keep receiving.
    #[default]
    Handled,
    /// The endpoint cannot continue; stop it and report a fault.
    Unrecoverable,
}

/// # Asynchronous consumer of broker deliveries.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use brokervisor::{BrokerError, MessageHandler, ReceivedMessage};
///
/// struct Audit;
///
/// #[async_trait]
/// impl MessageHandler for Audit {
///     async fn deliver(&self, msg: ReceivedMessage, _cancel: CancellationToken) -> Result<(), BrokerError> {
///         if msg.body.is_empty() {
///             return Err(BrokerError::delivery("empty body"));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Processes one delivery.
    ///
    /// `cancel` fires when the endpoint is stopping; long-running handlers
    /// should finish or abandon the message promptly.
    async fn deliver(&self, message: ReceivedMessage, cancel: CancellationToken) -> Result<(), BrokerError>;

    /// Called for processor errors that were not ignored.
    fn on_error(&self, _error: &BrokerError) -> ErrorDisposition {
        ErrorDisposition::Handled
    }
}

/// Shared handle to a handler object.
pub type HandlerRef = Arc<dyn MessageHandler>;
