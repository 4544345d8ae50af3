//! # Broker error classification and bounded retry.
//!
//! [`RetryClassifier`] is the single policy deciding what a broker failure
//! means for the operation that hit it:
//!
//! | Decision | Errors                                                                 |
//! |----------|------------------------------------------------------------------------|
//! | Ignore   | entity not found / already exists, message not found / too large, unauthorized |
//! | Retry    | service busy (transient), timeouts                                     |
//! | Fatal    | everything else, including non-broker errors                           |
//!
//! [`RetryPolicy`] drives one logical operation with that judgement:
//!
//! ```text
//! loop {
//!   ├─► attempt += 1
//!   ├─► op() ── Ok(v) ─────────────────────► Outcome::Completed(v)
//!   │     └──── Err(e) ─► classify(e)
//!   │                      ├─ Ignore ──────► Outcome::Ignored(e)
//!   │                      ├─ Fatal ───────► Err(e)
//!   │                      └─ Retry
//!   │                          ├─ retries == limit ─► Err(RetryExhausted)
//!   │                          ├─ publish BackoffScheduled{ delay, attempt }
//!   │                          └─ sleep(delay) (cancellable → Err(Stopped))
//! }
//! ```
//!
//! The classification is shared host-wide; endpoints do not override it.

use std::future::Future;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AsBrokerError, BrokerError, FailureReason, HostError},
    events::{Bus, Event, EventKind},
    policies::BackoffPolicy,
};

/// What to do with a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Goal already satisfied or unreachable; proceed without retrying.
    Ignore,
    /// Transient; retry after a backoff.
    Retry,
    /// Surface to the caller.
    Fatal,
}

/// Stateless classifier of broker errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryClassifier;

impl RetryClassifier {
    /// Classifies a broker error.
    ///
    /// # Example
    /// ```
    /// use brokervisor::{BrokerError, RetryClassifier, RetryDecision};
    ///
    /// let c = RetryClassifier;
    /// assert_eq!(c.classify(&BrokerError::message_too_large("2MB")), RetryDecision::Ignore);
    /// assert_eq!(c.classify(&BrokerError::busy("throttled")), RetryDecision::Retry);
    /// assert_eq!(c.classify(&BrokerError::connection_lost("reset")), RetryDecision::Fatal);
    /// ```
    pub fn classify(&self, error: &BrokerError) -> RetryDecision {
        match error {
            BrokerError::ServiceBus { reason, transient, .. } => match reason {
                FailureReason::MessagingEntityNotFound
                | FailureReason::MessagingEntityAlreadyExists
                | FailureReason::MessageNotFound
                | FailureReason::MessageSizeExceeded => RetryDecision::Ignore,
                FailureReason::ServiceBusy if *transient => RetryDecision::Retry,
                _ => RetryDecision::Fatal,
            },
            BrokerError::Unauthorized { .. } => RetryDecision::Ignore,
            BrokerError::Timeout { .. } => RetryDecision::Retry,
            _ => RetryDecision::Fatal,
        }
    }

    /// Classifies any error that may carry a broker error; others are fatal.
    pub fn classify_error<E: AsBrokerError + ?Sized>(&self, error: &E) -> RetryDecision {
        error
            .as_broker_error()
            .map_or(RetryDecision::Fatal, |e| self.classify(e))
    }
}

/// Result of an operation run under a [`RetryPolicy`].
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation succeeded.
    Completed(T),
    /// The operation failed with an ignorable error and was not retried.
    Ignored(BrokerError),
}

impl<T> Outcome<T> {
    /// Returns the value if the operation completed.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::Ignored(_) => None,
        }
    }
}

/// Where a retried operation runs: for events and cancellation.
pub(crate) struct RetryContext<'a> {
    /// Operation name (appears in events and errors).
    pub operation: &'a str,
    /// Endpoint the operation belongs to, if any.
    pub endpoint: Option<&'a str>,
    /// Bus receiving `BackoffScheduled` events.
    pub bus: &'a Bus,
    /// Cancels the operation and any pending backoff.
    pub cancel: &'a CancellationToken,
}

/// Bounded retry: at most `limit` retries after the first attempt.
///
/// A fresh counter is used for every [`execute`](Self::execute) call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries (`0` = single attempt).
    pub limit: u32,
    /// Delay between retries.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Receive-transport default: 5 retries spaced 10 seconds apart.
    fn default() -> Self {
        Self::interval(5, Duration::from_secs(10))
    }
}

impl RetryPolicy {
    /// Fixed number of retries with constant spacing.
    pub fn interval(count: u32, delay: Duration) -> Self {
        Self {
            limit: count,
            backoff: BackoffPolicy::fixed(delay),
        }
    }

    /// Exponential spacing between `min` and `max`, at most `limit` retries.
    pub fn exponential(limit: u32, min: Duration, max: Duration) -> Self {
        Self {
            limit,
            backoff: BackoffPolicy::exponential(min, max),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::interval(0, Duration::ZERO)
    }

    /// Runs `op` until it completes, is ignored, fails fatally, or exhausts the limit.
    ///
    /// ### Errors
    /// - fatal errors are returned converted into [`HostError`];
    /// - exhaustion returns [`HostError::RetryExhausted`];
    /// - cancellation returns [`HostError::Stopped`].
    pub(crate) async fn execute<T, E, F, Fut>(
        &self,
        classifier: &RetryClassifier,
        ctx: &RetryContext<'_>,
        mut op: F,
    ) -> Result<Outcome<T>, HostError>
    where
        E: AsBrokerError + Into<HostError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(HostError::Stopped);
            }
            attempt += 1;

            let res = select! {
                res = op() => res,
                _ = ctx.cancel.cancelled() => return Err(HostError::Stopped),
            };
            let err = match res {
                Ok(v) => return Ok(Outcome::Completed(v)),
                Err(e) => e,
            };

            match classifier.classify_error(&err) {
                RetryDecision::Ignore => {
                    let Some(broker) = err.as_broker_error().cloned() else {
                        return Err(err.into());
                    };
                    self.publish(ctx, EventKind::ErrorIgnored, attempt, &broker, None);
                    return Ok(Outcome::Ignored(broker));
                }
                RetryDecision::Fatal => return Err(err.into()),
                RetryDecision::Retry => {}
            }

            let Some(last) = err.as_broker_error().cloned() else {
                return Err(err.into());
            };
            let retry = attempt - 1;
            if retry >= self.limit {
                return Err(HostError::RetryExhausted {
                    operation: ctx.operation.to_string(),
                    attempts: attempt,
                    last,
                });
            }

            let delay = self.backoff.next(retry);
            self.publish(ctx, EventKind::BackoffScheduled, attempt, &last, Some(delay));

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = ctx.cancel.cancelled() => return Err(HostError::Stopped),
            }
        }
    }

    fn publish(
        &self,
        ctx: &RetryContext<'_>,
        kind: EventKind,
        attempt: u32,
        err: &BrokerError,
        delay: Option<Duration>,
    ) {
        let mut ev = Event::new(kind)
            .with_operation(ctx.operation)
            .with_attempt(attempt)
            .with_reason(err.to_string());
        if let Some(endpoint) = ctx.endpoint {
            ev = ev.with_endpoint(endpoint);
        }
        if let Some(delay) = delay {
            ev = ev.with_delay(delay);
        }
        ctx.bus.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ctx<'a>(bus: &'a Bus, cancel: &'a CancellationToken) -> RetryContext<'a> {
        RetryContext {
            operation: "test",
            endpoint: None,
            bus,
            cancel,
        }
    }

    #[test]
    fn classifier_ignores_satisfied_or_unreachable_goals() {
        let c = RetryClassifier;
        for err in [
            BrokerError::entity_not_found("orders"),
            BrokerError::service_bus(FailureReason::MessagingEntityAlreadyExists, false, "x"),
            BrokerError::service_bus(FailureReason::MessageNotFound, false, "x"),
            BrokerError::message_too_large("x"),
            BrokerError::unauthorized("x"),
        ] {
            assert_eq!(c.classify(&err), RetryDecision::Ignore, "{err}");
        }
    }

    #[test]
    fn classifier_retries_only_transient_busy_and_timeouts() {
        let c = RetryClassifier;
        assert_eq!(c.classify(&BrokerError::busy("x")), RetryDecision::Retry);
        assert_eq!(c.classify(&BrokerError::timeout("x")), RetryDecision::Retry);
        assert_eq!(
            c.classify(&BrokerError::service_bus(FailureReason::ServiceBusy, false, "x")),
            RetryDecision::Fatal
        );
        assert_eq!(
            c.classify(&BrokerError::service_bus(FailureReason::QuotaExceeded, true, "x")),
            RetryDecision::Fatal
        );
    }

    #[test]
    fn contract_violations_are_fatal() {
        let err = ClientError::AlreadyRegistered { slot: "on_message" };
        assert_eq!(RetryClassifier.classify_error(&err), RetryDecision::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_error_is_not_retried() {
        let bus = Bus::new(16);
        let cancel = CancellationToken::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let out = RetryPolicy::interval(5, Duration::from_secs(10))
            .execute(&RetryClassifier, &ctx(&bus, &cancel), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(BrokerError::message_too_large("256KB"))
            })
            .await
            .unwrap();

        assert!(matches!(out, Outcome::Ignored(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_past_limit_become_fatal() {
        let bus = Bus::new(16);
        let cancel = CancellationToken::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let err = RetryPolicy::interval(3, Duration::from_secs(10))
            .execute(&RetryClassifier, &ctx(&bus, &cancel), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(BrokerError::busy("throttled"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, HostError::RetryExhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_completes_with_backoff_events() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let cancel = CancellationToken::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let out = RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_secs(30))
            .execute(&RetryClassifier, &ctx(&bus, &cancel), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BrokerError::timeout("connect"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(out.completed(), Some(7));
        let delays: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::BackoffScheduled)
            .filter_map(|ev| ev.delay_ms)
            .collect();
        assert_eq!(delays, vec![100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops() {
        let bus = Bus::new(16);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let handle = tokio::spawn(async move {
            RetryPolicy::interval(5, Duration::from_secs(10))
                .execute(&RetryClassifier, &ctx(&bus, &cancel), || async {
                    Err::<(), _>(BrokerError::busy("throttled"))
                })
                .await
        });
        time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();

        assert!(matches!(handle.await.unwrap(), Err(HostError::Stopped)));
    }
}
