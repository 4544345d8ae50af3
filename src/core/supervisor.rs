//! # Connection supervisor: one shared connection per host.
//!
//! [`ConnectionContextSupervisor`] hands out the live [`ConnectionContext`]
//! and builds a new one when there is none or the current one is faulted.
//!
//! ## Acquisition
//! ```text
//! get_context()
//!   ├─ stopped? ──────────────────────────► Err(Stopped)
//!   ├─ live context? ─────────────────────► Ok(ctx)           (fast path, no await)
//!   └─ lock build gate (cancellable)
//!        ├─ live context now? ────────────► Ok(ctx)           (someone else built it)
//!        ├─ close faulted predecessor (best-effort)
//!        ├─ publish ConnectionBuilding{ generation }
//!        ├─ connect() under RetryPolicy::exponential(limit, min, max)
//!        │     ├─ Completed ──► publish ConnectionEstablished, store, Ok(ctx)
//!        │     ├─ Ignored ────► Err(Broker)                  (nothing to proceed with)
//!        │     └─ Err ────────► Err(..)
//!        └─ release gate
//! ```
//!
//! ## Rules
//! - At most one build runs at a time; concurrent callers share its result.
//! - At most one live connection exists: a faulted one is closed before the
//!   next is opened.
//! - After [`stop`](ConnectionContextSupervisor::stop) every acquisition fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerClient;
use crate::core::connection::ConnectionContext;
use crate::error::HostError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::{Outcome, RetryClassifier, RetryContext};
use crate::settings::{HostSettings, TransportType};

/// Read-only view of the supervisor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProbe {
    /// Namespace address.
    pub address: String,
    /// Wire transport.
    pub transport: TransportType,
    /// A live, non-faulted connection exists.
    pub connected: bool,
    /// Generation of the current connection, if any.
    pub generation: Option<u64>,
    /// Successful builds so far.
    pub builds: u64,
    /// Retries the last build needed.
    pub last_build_retries: u32,
}

/// Owner of the shared connection.
pub struct ConnectionContextSupervisor {
    settings: Arc<HostSettings>,
    client: Arc<dyn BrokerClient>,
    bus: Bus,
    classifier: RetryClassifier,
    current: Mutex<Option<Arc<ConnectionContext>>>,
    gate: AsyncMutex<()>,
    generation: AtomicU64,
    stop: CancellationToken,
    builds: AtomicU64,
    last_build_retries: AtomicU32,
}

impl ConnectionContextSupervisor {
    pub(crate) fn new(settings: Arc<HostSettings>, client: Arc<dyn BrokerClient>, bus: Bus) -> Self {
        Self {
            settings,
            client,
            bus,
            classifier: RetryClassifier,
            current: Mutex::new(None),
            gate: AsyncMutex::new(()),
            generation: AtomicU64::new(0),
            stop: CancellationToken::new(),
            builds: AtomicU64::new(0),
            last_build_retries: AtomicU32::new(0),
        }
    }

    /// Returns the live connection, building one if needed.
    ///
    /// ### Errors
    /// - [`HostError::Stopped`] after [`stop`](Self::stop);
    /// - the build error when connecting fails fatally or exhausts its retries.
    pub async fn get_context(&self) -> Result<Arc<ConnectionContext>, HostError> {
        if let Some(ctx) = self.live()? {
            return Ok(ctx);
        }

        let _gate = tokio::select! {
            g = self.gate.lock() => g,
            _ = self.stop.cancelled() => return Err(HostError::Stopped),
        };

        if let Some(ctx) = self.live()? {
            return Ok(ctx);
        }

        let previous = self.current.lock().take();
        if let Some(prev) = previous {
            prev.close().await;
        }

        let ctx = Arc::new(self.build().await?);
        if self.stop.is_cancelled() {
            ctx.close().await;
            return Err(HostError::Stopped);
        }
        *self.current.lock() = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Faults the current connection if it is still `generation`.
    ///
    /// Returns `true` when a connection was faulted by this call.
    pub fn recycle(&self, generation: u64, reason: &str) -> bool {
        let current = self.current.lock().clone();
        match current {
            Some(ctx) if ctx.generation() == generation => ctx.fault(reason),
            _ => false,
        }
    }

    /// Refuses further acquisitions and closes the live connection.
    pub async fn stop(&self) {
        self.stop.cancel();
        let _gate = self.gate.lock().await;
        let current = self.current.lock().take();
        if let Some(ctx) = current {
            ctx.fault("supervisor stopped");
            ctx.close().await;
        }
    }

    /// True after [`stop`](Self::stop).
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Snapshot of the supervisor state.
    pub fn probe(&self) -> ConnectionProbe {
        let current = self.current.lock().clone();
        ConnectionProbe {
            address: self.settings.service_uri().to_string(),
            transport: self.settings.transport(),
            connected: current.as_ref().is_some_and(|c| !c.is_faulted()),
            generation: current.map(|c| c.generation()),
            builds: self.builds.load(Ordering::SeqCst),
            last_build_retries: self.last_build_retries.load(Ordering::SeqCst),
        }
    }

    fn live(&self) -> Result<Option<Arc<ConnectionContext>>, HostError> {
        if self.stop.is_cancelled() {
            return Err(HostError::Stopped);
        }
        Ok(self
            .current
            .lock()
            .as_ref()
            .filter(|c| !c.is_faulted())
            .cloned())
    }

    async fn build(&self) -> Result<ConnectionContext, HostError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.bus
            .publish(Event::new(EventKind::ConnectionBuilding).with_generation(generation));

        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let ctx = RetryContext {
            operation: "connect",
            endpoint: None,
            bus: &self.bus,
            cancel: &self.stop,
        };

        let outcome = self
            .settings
            .connection_retry()
            .execute(&self.classifier, &ctx, || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.client.connect(&self.settings).await
            })
            .await;

        let retries = counter.load(Ordering::SeqCst).saturating_sub(1);
        self.last_build_retries.store(retries, Ordering::SeqCst);

        let connection = match outcome? {
            Outcome::Completed(connection) => connection,
            Outcome::Ignored(err) => return Err(HostError::Broker(err)),
        };

        self.builds.fetch_add(1, Ordering::SeqCst);
        let address = self.settings.service_uri();
        self.bus.publish(
            Event::new(EventKind::ConnectionEstablished)
                .with_generation(generation)
                .with_reason(address),
        );
        Ok(ConnectionContext::new(generation, address, connection, self.bus.clone()))
    }
}
