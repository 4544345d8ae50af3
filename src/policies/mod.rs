//! Retry, backoff and error-classification policies.
//!
//! ## Contents
//! - [`RetryClassifier`] maps a broker error to ignore / retry / fatal
//! - [`RetryPolicy`]     runs one operation with bounded retries
//! - [`BackoffPolicy`]   how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]    randomization to avoid synchronized reconnects
//!
//! ## Quick wiring
//! ```text
//! HostSettings { retry_limit, retry_min_backoff, retry_max_backoff }
//!      └─► ConnectionContextSupervisor: RetryPolicy::exponential(..) around connect()
//! HostConfig { receive_retry, restart }
//!      └─► ReceiveEndpoint: receive_retry around bind/start,
//!                           restart backoff after a connection recycle
//! ```
//!
//! ## Defaults
//! - receive retry: 5 retries, 10s apart.
//! - connection retry: 10 retries, 100ms doubling up to 30s.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub(crate) use retry::RetryContext;
pub use retry::{Outcome, RetryClassifier, RetryDecision, RetryPolicy};
