//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(ReceivedMessage, CancellationToken) -> Fut`
//! producing a fresh future per delivery. Shared state goes in an explicit
//! `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use brokervisor::{BrokerError, ErrorDisposition, HandlerFn, HandlerRef, ReceivedMessage};
//!
//! let h: HandlerRef = HandlerFn::arc(|msg: ReceivedMessage, _cancel: CancellationToken| async move {
//!     println!("got {}", msg.message_id);
//!     Ok::<_, BrokerError>(())
//! });
//!
//! let strict: HandlerRef = HandlerFn::new(|_msg: ReceivedMessage, _cancel: CancellationToken| async {
//!     Ok::<_, BrokerError>(())
//! })
//! .with_error_handler(|_err| ErrorDisposition::Unrecoverable)
//! .into_ref();
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::broker::ReceivedMessage;
use crate::error::BrokerError;
use crate::handlers::{ErrorDisposition, HandlerRef, MessageHandler};

type ErrorFn = Arc<dyn Fn(&BrokerError) -> ErrorDisposition + Send + Sync>;

/// Function-backed handler implementation.
pub struct HandlerFn<F> {
    f: F,
    on_error: Option<ErrorFn>,
}

impl<F> HandlerFn<F> {
    /// Creates a handler from a delivery closure.
    pub fn new(f: F) -> Self {
        Self { f, on_error: None }
    }

    /// Creates the handler and returns it behind an `Arc`.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }

    /// Sets the closure deciding how processor errors are treated.
    ///
    /// Without one, every error is [`ErrorDisposition::Handled`].
    pub fn with_error_handler<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&BrokerError) -> ErrorDisposition + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(ReceivedMessage, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BrokerError>> + Send + 'static,
{
    /// Converts into a shared [`HandlerRef`].
    pub fn into_ref(self) -> HandlerRef {
        Arc::new(self)
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(ReceivedMessage, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BrokerError>> + Send + 'static,
{
    async fn deliver(&self, message: ReceivedMessage, cancel: CancellationToken) -> Result<(), BrokerError> {
        (self.f)(message, cancel).await
    }

    fn on_error(&self, error: &BrokerError) -> ErrorDisposition {
        self.on_error
            .as_ref()
            .map_or(ErrorDisposition::Handled, |f| f(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closure_receives_each_delivery() {
        let h = HandlerFn::new(|msg: ReceivedMessage, _c: CancellationToken| async move {
            if msg.body == b"bad" {
                Err(BrokerError::delivery("bad body"))
            } else {
                Ok(())
            }
        });

        let token = CancellationToken::new();
        assert!(h.deliver(ReceivedMessage::new("1", "ok"), token.clone()).await.is_ok());
        assert!(h.deliver(ReceivedMessage::new("2", "bad"), token).await.is_err());
    }

    #[test]
    fn error_closure_overrides_default_disposition() {
        let noop = |_m: ReceivedMessage, _c: CancellationToken| async { Ok::<_, BrokerError>(()) };
        let lenient = HandlerFn::new(noop);
        let strict = HandlerFn::new(noop).with_error_handler(|_| ErrorDisposition::Unrecoverable);

        let err = BrokerError::delivery("x");
        assert_eq!(lenient.on_error(&err), ErrorDisposition::Handled);
        assert_eq!(strict.on_error(&err), ErrorDisposition::Unrecoverable);
    }
}
