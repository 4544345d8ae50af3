//! # Receive endpoint: binds one entity to the shared connection and keeps it bound.
//!
//! ## Lifecycle
//! ```text
//! loop {
//!   ├─► publish EndpointStarting{ attempt }
//!   ├─► bind under receive retry: get_context → create client → register → start
//!   │       ├─ Completed ───────► publish EndpointReady{ generation }
//!   │       ├─ Ignored ─────────► Faulted (nothing to receive from)
//!   │       ├─ Stopped ─────────► Stopped
//!   │       ├─ connection-scoped ► fault connection, restart after backoff
//!   │       │                       (connect failures fault the endpoint instead)
//!   │       └─ other error ─────► Faulted
//!   └─► wait (biased):
//!          ├─ stop token ────────► stop + close client ─► Stopped
//!          ├─ connection faulted ► stop + close client ─► EndpointStopped, restart after backoff
//!          └─ client agent ──────► stop + close client ─► Faulted (no restart)
//! }
//! ```
//!
//! The restart delay grows per consecutive recycle and resets once the
//! endpoint is ready again.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::core::client::ClientContext;
use crate::core::handle::EndpointStatus;
use crate::core::supervisor::ConnectionContextSupervisor;
use crate::error::{AsBrokerError, ClientError, HostError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::{BackoffPolicy, Outcome, RetryClassifier, RetryContext, RetryPolicy};
use crate::settings::{CallbackKind, EndpointDefinition};

enum Exit {
    Stopped,
    Faulted(String),
    Recycle(String),
}

pub(crate) struct ReceiveEndpoint {
    name: Arc<str>,
    definition: EndpointDefinition,
    supervisor: Arc<ConnectionContextSupervisor>,
    bus: Bus,
    classifier: RetryClassifier,
    receive_retry: RetryPolicy,
    restart: BackoffPolicy,
    status: watch::Sender<EndpointStatus>,
}

impl ReceiveEndpoint {
    pub(crate) fn new(
        name: Arc<str>,
        definition: EndpointDefinition,
        supervisor: Arc<ConnectionContextSupervisor>,
        bus: Bus,
        receive_retry: RetryPolicy,
        restart: BackoffPolicy,
        status: watch::Sender<EndpointStatus>,
    ) -> Self {
        Self {
            name,
            definition,
            supervisor,
            bus,
            classifier: RetryClassifier,
            receive_retry,
            restart,
            status,
        }
    }

    /// Runs until stopped or faulted.
    pub(crate) async fn run(self, token: CancellationToken) {
        let mut cycle: u32 = 0;
        let mut recycles: u32 = 0;

        loop {
            cycle += 1;
            self.status.send_replace(EndpointStatus::Starting);
            self.bus.publish(
                Event::new(EventKind::EndpointStarting)
                    .with_endpoint(Arc::clone(&self.name))
                    .with_attempt(cycle),
            );

            let exit = match self.bind(&token).await {
                Ok(Outcome::Completed(client)) => {
                    recycles = 0;
                    self.serve(client, &token).await
                }
                Ok(Outcome::Ignored(err)) => Exit::Faulted(err.to_string()),
                Err(HostError::Stopped) => Exit::Stopped,
                Err(err) if is_connection_scoped(&err) => Exit::Recycle(err.to_string()),
                Err(err) => Exit::Faulted(err.to_string()),
            };

            match exit {
                Exit::Stopped => {
                    self.finish(EventKind::EndpointStopped, "stop requested", EndpointStatus::Stopped);
                    return;
                }
                Exit::Faulted(reason) => {
                    let status = EndpointStatus::Faulted(Arc::from(reason.as_str()));
                    self.finish(EventKind::EndpointFaulted, &reason, status);
                    return;
                }
                Exit::Recycle(reason) => {
                    self.bus.publish(
                        Event::new(EventKind::EndpointStopped)
                            .with_endpoint(Arc::clone(&self.name))
                            .with_reason(reason),
                    );
                    let delay = self.restart.next(recycles);
                    recycles = recycles.saturating_add(1);
                    self.bus.publish(
                        Event::new(EventKind::BackoffScheduled)
                            .with_operation("restart")
                            .with_endpoint(Arc::clone(&self.name))
                            .with_attempt(recycles)
                            .with_delay(delay),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => {
                            self.finish(EventKind::EndpointStopped, "stop requested", EndpointStatus::Stopped);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn bind(&self, token: &CancellationToken) -> Result<Outcome<ClientContext>, HostError> {
        let ctx = RetryContext {
            operation: "start_receive",
            endpoint: Some(&self.name),
            bus: &self.bus,
            cancel: token,
        };
        self.receive_retry
            .execute(&self.classifier, &ctx, || self.bind_once())
            .await
    }

    async fn bind_once(&self) -> Result<ClientContext, HostError> {
        // Build failures are final here; only a built connection is recycled.
        let connection = self.supervisor.get_context().await.map_err(|e| match e {
            e if is_connection_scoped(&e) => HostError::ConnectionUnavailable { reason: e.to_string() },
            e => e,
        })?;

        let bound = async {
            let client = connection.create_client(&self.definition.entity, self.definition.callback)?;
            let handler = Arc::clone(&self.definition.handler);
            match self.definition.callback {
                CallbackKind::Message => client.register_message_callback(handler)?,
                CallbackKind::Session => client.register_session_callback(handler)?,
            }
            if let Err(e) = client.start().await {
                client.close().await;
                return Err(e);
            }
            Ok::<_, ClientError>(client)
        }
        .await;

        bound.map_err(|e| {
            let err = HostError::from(e);
            if is_connection_scoped(&err) {
                connection.fault(&err.to_string());
            }
            err
        })
    }

    async fn serve(&self, client: ClientContext, token: &CancellationToken) -> Exit {
        self.status.send_replace(EndpointStatus::Ready);
        self.bus.publish(
            Event::new(EventKind::EndpointReady)
                .with_endpoint(Arc::clone(&self.name))
                .with_generation(client.connection().generation()),
        );

        let exit = select! {
            biased;
            _ = token.cancelled() => Exit::Stopped,
            _ = client.connection().faulted() => Exit::Recycle(
                client.connection().fault_reason().unwrap_or("connection faulted").to_string(),
            ),
            _ = client.agent().stopped() => Exit::Faulted(
                client.agent().reason().unwrap_or("client faulted").to_string(),
            ),
        };

        client.stop().await;
        client.close().await;
        exit
    }

    fn finish(&self, kind: EventKind, reason: &str, status: EndpointStatus) {
        self.bus.publish(
            Event::new(kind)
                .with_endpoint(Arc::clone(&self.name))
                .with_reason(reason),
        );
        self.status.send_replace(status);
    }
}

fn is_connection_scoped(err: &HostError) -> bool {
    err.as_broker_error().is_some_and(|e| e.is_connection_scoped())
}
