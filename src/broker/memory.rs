//! # In-process broker.
//!
//! [`MemoryBroker`] implements the broker traits on top of tokio channels.
//! Each entity path owns one unbounded queue; at most one processor drains it
//! at a time. Failures can be scripted per operation, which is what the host
//! tests and the demo use to exercise retry and recycle paths.
//!
//! ```rust
//! # async fn demo() {
//! use brokervisor::{BrokerError, ReceivedMessage};
//! use brokervisor::broker::memory::MemoryBroker;
//!
//! let broker = MemoryBroker::new();
//! broker.fail_next_connects(2, BrokerError::busy("namespace throttled"));
//! broker.send("orders", ReceivedMessage::new("m-1", "{}"));
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerClient, BrokerConnection, Dispatch, Processor, ProcessorOptions, ReceivedMessage};
use crate::error::{BrokerError, FailureReason};
use crate::settings::HostSettings;

enum Item {
    Message(ReceivedMessage),
    Error(BrokerError),
}

struct Entity {
    tx: mpsc::UnboundedSender<Item>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Item>>>,
    receiving: AtomicUsize,
    close_calls: AtomicU32,
    fail_stop: AtomicBool,
    fail_close: AtomicBool,
    start_failures: Mutex<VecDeque<BrokerError>>,
}

impl Entity {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            receiving: AtomicUsize::new(0),
            close_calls: AtomicU32::new(0),
            fail_stop: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            start_failures: Mutex::new(VecDeque::new()),
        }
    }
}

#[derive(Default)]
struct Shared {
    entities: Mutex<HashMap<String, Arc<Entity>>>,
    connect_failures: Mutex<VecDeque<BrokerError>>,
    opened: AtomicU64,
    connections: Mutex<Vec<Arc<MemoryConnection>>>,
}

impl Shared {
    fn entity(&self, path: &str) -> Arc<Entity> {
        let mut entities = self.entities.lock();
        Arc::clone(
            entities
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(Entity::new())),
        )
    }
}

/// In-process broker with scripted failures.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` connection attempts fail with `err`.
    pub fn fail_next_connects(&self, n: usize, err: BrokerError) {
        let mut failures = self.shared.connect_failures.lock();
        failures.extend(std::iter::repeat_n(err, n));
    }

    /// Makes the next `n` `start_processing` calls on `path` fail with `err`.
    pub fn fail_next_starts(&self, path: &str, n: usize, err: BrokerError) {
        let entity = self.shared.entity(path);
        entity.start_failures.lock().extend(std::iter::repeat_n(err, n));
    }

    /// Makes every `stop_processing` on `path` report a failure (after stopping).
    pub fn fail_stop(&self, path: &str) {
        self.shared.entity(path).fail_stop.store(true, Ordering::SeqCst);
    }

    /// Makes every processor `close` on `path` report a failure (after closing).
    pub fn fail_close(&self, path: &str) {
        self.shared.entity(path).fail_close.store(true, Ordering::SeqCst);
    }

    /// Enqueues a message on `path`.
    pub fn send(&self, path: &str, message: ReceivedMessage) {
        let _ = self.shared.entity(path).tx.send(Item::Message(message));
    }

    /// Makes the processor draining `path` report `err`.
    pub fn raise(&self, path: &str, err: BrokerError) {
        let _ = self.shared.entity(path).tx.send(Item::Error(err));
    }

    /// Number of connections opened so far.
    pub fn connections_opened(&self) -> u64 {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Number of connections not yet closed.
    pub fn open_connections(&self) -> usize {
        self.shared
            .connections
            .lock()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Number of processor `close` calls made for `path`.
    pub fn close_calls(&self, path: &str) -> u32 {
        self.shared.entity(path).close_calls.load(Ordering::SeqCst)
    }

    /// True while a processor is draining `path`.
    pub fn is_receiving(&self, path: &str) -> bool {
        self.shared.entity(path).receiving.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn connect(&self, _settings: &HostSettings) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        tokio::task::yield_now().await;

        let failure = self.shared.connect_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        let id = self.shared.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = Arc::new(MemoryConnection {
            id,
            closed: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
            processors: Mutex::new(Vec::new()),
        });
        self.shared.connections.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}

struct MemoryConnection {
    id: u64,
    closed: AtomicBool,
    shared: Arc<Shared>,
    processors: Mutex<Vec<Arc<MemoryProcessor>>>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn create_processor(&self, options: ProcessorOptions) -> Result<Arc<dyn Processor>, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::connection_lost(format!("connection {} is closed", self.id)));
        }
        let processor = Arc::new(MemoryProcessor {
            entity: self.shared.entity(&options.entity_path),
            options,
            running: Mutex::new(None),
            release: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        self.processors.lock().push(Arc::clone(&processor));
        Ok(processor)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let processors = std::mem::take(&mut *self.processors.lock());
        for p in processors {
            p.release.cancel();
            p.halt().await;
            p.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct Running {
    token: CancellationToken,
    join: JoinHandle<()>,
}

struct MemoryProcessor {
    entity: Arc<Entity>,
    options: ProcessorOptions,
    running: Mutex<Option<Running>>,
    // Handed to deliveries; cancelled on close only, never on stop.
    release: CancellationToken,
    closed: AtomicBool,
}

impl MemoryProcessor {
    async fn halt(&self) {
        let running = self.running.lock().take();
        if let Some(Running { token, join }) = running {
            token.cancel();
            let _ = join.await;
        }
    }
}

#[async_trait]
impl Processor for MemoryProcessor {
    async fn start_processing(&self, dispatch: Arc<dyn Dispatch>) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::service_bus(
                FailureReason::GeneralError,
                false,
                format!("processor for {} is closed", self.options.entity_path),
            ));
        }
        let failure = self.entity.start_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        let mut running = self.running.lock();
        if running.is_none() {
            let token = CancellationToken::new();
            let join = tokio::spawn(receive_loop(
                Arc::clone(&self.entity),
                dispatch,
                token.clone(),
                self.release.clone(),
                self.options.max_concurrent_calls,
            ));
            *running = Some(Running { token, join });
        }
        Ok(())
    }

    async fn stop_processing(&self) -> Result<(), BrokerError> {
        self.halt().await;
        if self.entity.fail_stop.load(Ordering::SeqCst) {
            return Err(BrokerError::timeout(format!(
                "stop of {} timed out",
                self.options.entity_path
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.entity.close_calls.fetch_add(1, Ordering::SeqCst);
        self.release.cancel();
        self.halt().await;
        self.closed.store(true, Ordering::SeqCst);
        if self.entity.fail_close.load(Ordering::SeqCst) {
            return Err(BrokerError::connection_lost(format!(
                "close of {} failed",
                self.options.entity_path
            )));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn receive_loop(
    entity: Arc<Entity>,
    dispatch: Arc<dyn Dispatch>,
    token: CancellationToken,
    release: CancellationToken,
    limit: usize,
) {
    let rx = tokio::select! {
        rx = Arc::clone(&entity.rx).lock_owned() => rx,
        _ = token.cancelled() => return,
    };
    entity.receiving.fetch_add(1, Ordering::SeqCst);

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
        .take_until(token.clone().cancelled_owned())
        .for_each_concurrent(limit.max(1), |item| {
            let dispatch = Arc::clone(&dispatch);
            let cancel = release.child_token();
            async move {
                match item {
                    Item::Message(msg) => {
                        if let Err(err) = dispatch.on_message(msg, cancel).await {
                            dispatch.on_error(err).await;
                        }
                    }
                    Item::Error(err) => dispatch.on_error(err).await,
                }
            }
        })
        .await;

    entity.receiving.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::EntityKind;
    use std::time::Duration;

    struct Recorder(mpsc::UnboundedSender<Result<String, BrokerError>>);

    #[async_trait]
    impl Dispatch for Recorder {
        async fn on_message(&self, message: ReceivedMessage, _cancel: CancellationToken) -> Result<(), BrokerError> {
            if message.body.is_empty() {
                return Err(BrokerError::delivery(format!("{} has no body", message.message_id)));
            }
            let _ = self.0.send(Ok(message.message_id));
            Ok(())
        }

        async fn on_error(&self, error: BrokerError) {
            let _ = self.0.send(Err(error));
        }
    }

    fn options(path: &str) -> ProcessorOptions {
        ProcessorOptions {
            entity_path: path.to_string(),
            kind: EntityKind::Queue,
            session: false,
            lock_duration: Duration::from_secs(60),
            max_concurrent_calls: 1,
            prefetch_count: 0,
        }
    }

    #[tokio::test]
    async fn delivers_messages_and_errors_in_order() {
        let broker = MemoryBroker::new();
        let conn = broker.connect(&HostSettings::default()).await.unwrap();
        let processor = conn.create_processor(options("orders")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        processor.start_processing(Arc::new(Recorder(tx))).await.unwrap();

        broker.send("orders", ReceivedMessage::new("m-1", "a"));
        broker.send("orders", ReceivedMessage::new("m-2", ""));
        broker.raise("orders", BrokerError::busy("throttled"));

        assert_eq!(rx.recv().await.unwrap(), Ok("m-1".to_string()));
        assert!(matches!(rx.recv().await.unwrap(), Err(BrokerError::Delivery { .. })));
        assert_eq!(rx.recv().await.unwrap(), Err(BrokerError::busy("throttled")));

        processor.stop_processing().await.unwrap();
        assert!(!broker.is_receiving("orders"));
    }

    /// Reports whether each delivery ran to completion or saw its token cancelled.
    struct Patient(mpsc::UnboundedSender<&'static str>);

    #[async_trait]
    impl Dispatch for Patient {
        async fn on_message(&self, _message: ReceivedMessage, cancel: CancellationToken) -> Result<(), BrokerError> {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => "cancelled",
                _ = tokio::time::sleep(Duration::from_millis(50)) => "completed",
            };
            let _ = self.0.send(outcome);
            Ok(())
        }

        async fn on_error(&self, _error: BrokerError) {}
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_in_flight_delivery_finish() {
        let broker = MemoryBroker::new();
        let conn = broker.connect(&HostSettings::default()).await.unwrap();
        let processor = conn.create_processor(options("orders")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        processor.start_processing(Arc::new(Patient(tx))).await.unwrap();
        broker.send("orders", ReceivedMessage::new("m-1", "a"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        processor.stop_processing().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "completed");
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_in_flight_delivery() {
        let broker = MemoryBroker::new();
        let conn = broker.connect(&HostSettings::default()).await.unwrap();
        let processor = conn.create_processor(options("orders")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        processor.start_processing(Arc::new(Patient(tx))).await.unwrap();
        broker.send("orders", ReceivedMessage::new("m-1", "a"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        processor.close().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "cancelled");
    }

    #[tokio::test]
    async fn scripted_connect_failures_are_consumed_in_order() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(1, BrokerError::timeout("connect"));

        assert!(broker.connect(&HostSettings::default()).await.is_err());
        let conn = broker.connect(&HostSettings::default()).await.unwrap();
        assert_eq!(broker.connections_opened(), 1);

        conn.close().await.unwrap();
        assert_eq!(broker.open_connections(), 0);
        assert!(conn.create_processor(options("orders")).is_err());
    }

    #[tokio::test]
    async fn close_failure_still_closes() {
        let broker = MemoryBroker::new();
        broker.fail_close("orders");
        let conn = broker.connect(&HostSettings::default()).await.unwrap();
        let processor = conn.create_processor(options("orders")).unwrap();

        assert!(processor.close().await.is_err());
        assert!(processor.is_closed());
        assert_eq!(broker.close_calls("orders"), 1);
    }
}
