//! Stop signal with a first-wins reason.
//!
//! An [`Agent`] is what endpoints and clients wait on: a cancellation token
//! plus the reason recorded by whoever stopped it first.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Stoppable lifecycle marker.
#[derive(Debug, Default)]
pub struct Agent {
    token: CancellationToken,
    reason: OnceLock<Arc<str>>,
}

impl Agent {
    /// Creates a running agent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the agent. Returns `true` for the call that actually stopped it.
    pub fn stop(&self, reason: impl Into<Arc<str>>) -> bool {
        let first = self.reason.set(reason.into()).is_ok();
        self.token.cancel();
        first
    }

    /// True once stopped.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the agent is stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Reason given by the first `stop` call.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(|r| r.as_ref())
    }
}
