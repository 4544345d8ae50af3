use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::HostError;

/// Observable state of a receive endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Binding to a connection (first start or after a recycle).
    Starting,
    /// Receiving.
    Ready,
    /// Stopped on request; terminal.
    Stopped,
    /// Stopped on an unrecoverable fault; terminal.
    Faulted(Arc<str>),
}

impl EndpointStatus {
    /// True for `Stopped` and `Faulted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EndpointStatus::Stopped | EndpointStatus::Faulted(_))
    }
}

/// Clonable handle to a running receive endpoint.
#[derive(Clone)]
pub struct ReceiveEndpointHandle {
    name: Arc<str>,
    input_address: Arc<str>,
    entity_path: Arc<str>,
    status: watch::Receiver<EndpointStatus>,
    stop: CancellationToken,
}

impl ReceiveEndpointHandle {
    pub(crate) fn new(
        name: Arc<str>,
        input_address: Arc<str>,
        entity_path: Arc<str>,
        status: watch::Receiver<EndpointStatus>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            name,
            input_address,
            entity_path,
            status,
            stop,
        }
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input address (`{service_uri}/{path}[?autodelete=N]`).
    pub fn input_address(&self) -> &str {
        &self.input_address
    }

    /// Entity path.
    pub fn entity_path(&self) -> &str {
        &self.entity_path
    }

    /// Current status.
    pub fn status(&self) -> EndpointStatus {
        self.status.borrow().clone()
    }

    /// Waits until the endpoint is receiving.
    ///
    /// ### Errors
    /// - [`HostError::EndpointFaulted`] if it faulted first;
    /// - [`HostError::EndpointStopped`] if it was stopped first.
    pub async fn ready(&self) -> Result<(), HostError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| *s != EndpointStatus::Starting)
            .await
            .map(|s| s.clone())
            .unwrap_or(EndpointStatus::Stopped);

        match status {
            EndpointStatus::Ready => Ok(()),
            EndpointStatus::Faulted(reason) => Err(HostError::EndpointFaulted {
                name: self.name.to_string(),
                reason: reason.to_string(),
            }),
            EndpointStatus::Starting | EndpointStatus::Stopped => Err(HostError::EndpointStopped {
                name: self.name.to_string(),
            }),
        }
    }

    /// Stops this endpoint and waits for it to finish; returns the final status.
    pub async fn stop(&self) -> EndpointStatus {
        self.request_stop();
        self.stopped().await
    }

    pub(crate) fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Waits for a terminal status without requesting a stop.
    pub async fn stopped(&self) -> EndpointStatus {
        let mut rx = self.status.clone();
        let status = rx.wait_for(EndpointStatus::is_terminal).await.map(|s| s.clone());
        status.unwrap_or_else(|_| rx.borrow().clone())
    }
}

impl std::fmt::Debug for ReceiveEndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveEndpointHandle")
            .field("name", &self.name)
            .field("input_address", &self.input_address)
            .field("status", &*self.status.borrow())
            .finish()
    }
}
