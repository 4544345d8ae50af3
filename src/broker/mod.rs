//! # Broker client collaborator.
//!
//! The host never speaks the wire protocol itself. It drives a broker client
//! through four traits:
//!
//! ```text
//! BrokerClient ──connect(settings)──► BrokerConnection ──create_processor(opts)──► Processor
//!                                                                                     │
//!                                            start_processing(dispatch) ◄─────────────┘
//!                                                   │
//!                                                   ▼
//!                                     Dispatch::on_message / Dispatch::on_error
//! ```
//!
//! [`memory::MemoryBroker`] implements all of them in-process.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BrokerError;
use crate::settings::HostSettings;

pub mod memory;
mod message;

pub use message::{EntityKind, ProcessorOptions, ReceivedMessage};

/// Opens connections to the broker namespace.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Establishes a new connection.
    async fn connect(&self, settings: &HostSettings) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

/// One live broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Creates a processor for one entity on this connection.
    fn create_processor(&self, options: ProcessorOptions) -> Result<Arc<dyn Processor>, BrokerError>;

    /// Closes the connection and every processor on it.
    async fn close(&self) -> Result<(), BrokerError>;

    /// True once the connection is closed.
    fn is_closed(&self) -> bool;
}

/// Pulls messages from one entity and hands them to a [`Dispatch`].
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Starts receiving; returns once the processor is running.
    async fn start_processing(&self, dispatch: Arc<dyn Dispatch>) -> Result<(), BrokerError>;

    /// Stops receiving; returns after in-flight deliveries finish.
    async fn stop_processing(&self) -> Result<(), BrokerError>;

    /// Releases the processor.
    async fn close(&self) -> Result<(), BrokerError>;

    /// True once the processor is closed.
    fn is_closed(&self) -> bool;
}

/// Receives what a processor produces.
///
/// A processor reports a failed `on_message` back through `on_error`.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Handles one delivery.
    async fn on_message(&self, message: ReceivedMessage, cancel: CancellationToken) -> Result<(), BrokerError>;

    /// Handles a processor or delivery error.
    async fn on_error(&self, error: BrokerError);
}
