use std::time::{Duration, SystemTime};

/// A message delivered by a broker processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Broker message id.
    pub message_id: String,
    /// Session the message belongs to, for session-enabled entities.
    pub session_id: Option<String>,
    /// Raw payload; the host never interprets it.
    pub body: Vec<u8>,
    /// Number of delivery attempts, starting at 1.
    pub delivery_count: u32,
    /// Time the broker accepted the message.
    pub enqueued_at: SystemTime,
}

impl ReceivedMessage {
    /// Creates a first-delivery message.
    pub fn new(message_id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: message_id.into(),
            session_id: None,
            body: body.into(),
            delivery_count: 1,
            enqueued_at: SystemTime::now(),
        }
    }

    /// Assigns the message to a session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Entity a processor receives from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    /// A queue.
    Queue,
    /// A topic subscription.
    Subscription {
        /// Topic path.
        topic: String,
        /// Subscription name.
        subscription: String,
    },
}

/// What a connection needs to create a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Entity path (`orders`, `events/Subscriptions/audit`).
    pub entity_path: String,
    /// Queue or subscription.
    pub kind: EntityKind,
    /// Whether the processor accepts sessions.
    pub session: bool,
    /// Message (or session) lock duration.
    pub lock_duration: Duration,
    /// Maximum deliveries in flight.
    pub max_concurrent_calls: usize,
    /// Messages fetched ahead of the handler.
    pub prefetch_count: u32,
}
