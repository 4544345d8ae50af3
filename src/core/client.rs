//! # Client context: one processor bound to one entity.
//!
//! ## States
//! ```text
//! Unbound ──register_*──► CallbackRegistered ──start──► Started
//!                                                          │ stop
//!                                                          ▼
//!                                           Stopping ──► Stopped ──close──► Closed
//! ```
//!
//! - Exactly one callback, registered exactly once, before `start`.
//! - `start`, `stop` and `close` are serialized by an async transition lock.
//! - `stop` and `close` never fail; broker errors are logged and swallowed.
//! - `close` reaches the processor at most once, however often it is called.
//!
//! ## Error routing
//! Processor errors reach the internal dispatcher:
//! ```text
//! on_error(err)
//!   ├─ classify == Ignore ─────────► publish ErrorIgnored, drop
//!   └─ otherwise ──► publish DeliveryFaulted, handler.on_error(err)
//!                      ├─ connection-scoped ──► ConnectionContext::fault (all endpoints recycle)
//!                      └─ Unrecoverable ──────► stop this client's agent (endpoint faults)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::broker::{Dispatch, Processor, ReceivedMessage};
use crate::core::agent::Agent;
use crate::core::connection::ConnectionContext;
use crate::error::{BrokerError, ClientError};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::{ErrorDisposition, HandlerRef};
use crate::policies::{RetryClassifier, RetryDecision};
use crate::settings::EntitySettings;

/// Lifecycle state of a [`ClientContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No callback yet.
    Unbound,
    /// Callback registered, processor idle.
    CallbackRegistered,
    /// Processor running.
    Started,
    /// Stop in progress.
    Stopping,
    /// Processor stopped, not closed.
    Stopped,
    /// Processor released.
    Closed,
}

enum Callback {
    Empty,
    Message(HandlerRef),
    Session(HandlerRef),
}

struct Inner {
    state: ClientState,
    callback: Callback,
}

/// Processor lifecycle for one entity.
pub struct ClientContext {
    entity: EntitySettings,
    path: Arc<str>,
    input_address: String,
    session: bool,
    processor: Arc<dyn Processor>,
    connection: Arc<ConnectionContext>,
    bus: Bus,
    agent: Arc<Agent>,
    inner: Mutex<Inner>,
    transition: AsyncMutex<()>,
    closing: AtomicBool,
}

impl ClientContext {
    pub(crate) fn new(
        entity: EntitySettings,
        input_address: String,
        session: bool,
        processor: Arc<dyn Processor>,
        connection: Arc<ConnectionContext>,
        bus: Bus,
    ) -> Self {
        let path: Arc<str> = Arc::from(entity.path());
        Self {
            entity,
            path,
            input_address,
            session,
            processor,
            connection,
            bus,
            agent: Arc::new(Agent::new()),
            inner: Mutex::new(Inner {
                state: ClientState::Unbound,
                callback: Callback::Empty,
            }),
            transition: AsyncMutex::new(()),
            closing: AtomicBool::new(false),
        }
    }

    /// Entity path.
    pub fn entity_path(&self) -> &str {
        &self.path
    }

    /// Entity settings the processor was created with.
    pub fn entity(&self) -> &EntitySettings {
        &self.entity
    }

    /// Address reported by the endpoint.
    pub fn input_address(&self) -> &str {
        &self.input_address
    }

    /// Connection this client belongs to.
    pub fn connection(&self) -> &Arc<ConnectionContext> {
        &self.connection
    }

    /// Agent stopped when this client faults.
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.inner.lock().state
    }

    /// True once `close` was called (or drop began).
    pub fn is_closed_or_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Registers the message callback.
    ///
    /// ### Errors
    /// - [`ClientError::AlreadyRegistered`] if any callback is already set;
    /// - [`ClientError::SessionMismatch`] on a session processor;
    /// - [`ClientError::Closed`] once closing.
    pub fn register_message_callback(&self, handler: HandlerRef) -> Result<(), ClientError> {
        self.register(Callback::Message(handler))
    }

    /// Registers the session callback. Same rules as
    /// [`register_message_callback`](Self::register_message_callback).
    pub fn register_session_callback(&self, handler: HandlerRef) -> Result<(), ClientError> {
        self.register(Callback::Session(handler))
    }

    fn register(&self, callback: Callback) -> Result<(), ClientError> {
        let mut inner = self.inner.lock();
        if self.is_closed_or_closing() {
            return Err(self.closed());
        }
        match inner.callback {
            Callback::Message(_) => return Err(ClientError::AlreadyRegistered { slot: "on_message" }),
            Callback::Session(_) => return Err(ClientError::AlreadyRegistered { slot: "on_session" }),
            Callback::Empty => {}
        }

        let wants_session = matches!(callback, Callback::Session(_));
        if wants_session != self.session {
            return Err(ClientError::SessionMismatch {
                path: self.path.to_string(),
                requires_session: self.session,
                requested: if wants_session { "session" } else { "message" },
            });
        }

        inner.callback = callback;
        inner.state = ClientState::CallbackRegistered;
        Ok(())
    }

    /// Starts the processor with the registered callback.
    ///
    /// ### Errors
    /// - [`ClientError::NotRegistered`] without a callback;
    /// - [`ClientError::Closed`] once closing;
    /// - [`ClientError::Broker`] when the processor refuses to start.
    pub async fn start(&self) -> Result<(), ClientError> {
        let _t = self.transition.lock().await;

        let handler = {
            let inner = self.inner.lock();
            if self.is_closed_or_closing() {
                return Err(self.closed());
            }
            match (inner.state, &inner.callback) {
                (ClientState::Started, _) => return Ok(()),
                (_, Callback::Message(h) | Callback::Session(h)) => Arc::clone(h),
                (_, Callback::Empty) => {
                    return Err(ClientError::NotRegistered {
                        path: self.path.to_string(),
                    });
                }
            }
        };

        let dispatch = Arc::new(ClientDispatch {
            handler,
            path: Arc::clone(&self.path),
            bus: self.bus.clone(),
            connection: Arc::clone(&self.connection),
            agent: Arc::clone(&self.agent),
            classifier: RetryClassifier,
        });
        self.processor.start_processing(dispatch).await?;

        self.inner.lock().state = ClientState::Started;
        Ok(())
    }

    /// Stops the processor; waits for in-flight deliveries. Never fails.
    pub async fn stop(&self) {
        let _t = self.transition.lock().await;
        self.stop_locked().await;
    }

    /// Stops and releases the processor. Idempotent; never fails.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let _t = self.transition.lock().await;
        self.stop_locked().await;

        if let Err(e) = self.processor.close().await {
            warn!(entity = %self.path, error = %e, "processor close failed");
        }
        self.inner.lock().state = ClientState::Closed;
    }

    /// Stops the owning agent with an unrecoverable fault.
    pub fn notify_faulted(&self, error: &BrokerError, entity_path: &str) {
        notify_faulted(&self.agent, error, entity_path);
    }

    async fn stop_locked(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state != ClientState::Started {
                return;
            }
            inner.state = ClientState::Stopping;
        }
        if let Err(e) = self.processor.stop_processing().await {
            warn!(entity = %self.path, error = %e, "processor stop failed");
        }
        self.inner.lock().state = ClientState::Stopped;
    }

    fn closed(&self) -> ClientError {
        ClientError::Closed {
            path: self.path.to_string(),
        }
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let processor = Arc::clone(&self.processor);
        let path = Arc::clone(&self.path);
        rt.spawn(async move {
            if let Err(e) = processor.stop_processing().await {
                warn!(entity = %path, error = %e, "processor stop on drop failed");
            }
            if let Err(e) = processor.close().await {
                warn!(entity = %path, error = %e, "processor close on drop failed");
            }
        });
    }
}

fn notify_faulted(agent: &Agent, error: &BrokerError, entity_path: &str) {
    if agent.stop(format!("Unrecoverable exception on {entity_path}")) {
        warn!(entity = entity_path, error = %error, "endpoint faulted");
    }
}

struct ClientDispatch {
    handler: HandlerRef,
    path: Arc<str>,
    bus: Bus,
    connection: Arc<ConnectionContext>,
    agent: Arc<Agent>,
    classifier: RetryClassifier,
}

#[async_trait]
impl Dispatch for ClientDispatch {
    async fn on_message(&self, message: ReceivedMessage, cancel: CancellationToken) -> Result<(), BrokerError> {
        self.handler.deliver(message, cancel).await
    }

    async fn on_error(&self, error: BrokerError) {
        if self.classifier.classify(&error) == RetryDecision::Ignore {
            self.bus.publish(
                Event::new(EventKind::ErrorIgnored)
                    .with_endpoint(Arc::clone(&self.path))
                    .with_reason(error.to_string()),
            );
            return;
        }

        self.bus.publish(
            Event::new(EventKind::DeliveryFaulted)
                .with_endpoint(Arc::clone(&self.path))
                .with_reason(error.to_string()),
        );
        let disposition = self.handler.on_error(&error);

        if error.is_connection_scoped() {
            self.connection.fault(&error.to_string());
        } else if disposition == ErrorDisposition::Unrecoverable {
            notify_faulted(&self.agent, &error, &self.path);
        }
    }
}
