//! # Event subscribers for the host runtime.
//!
//! ```text
//!   ReceiveEndpoint / Supervisor ── publish(Event) ──► Bus ──► Host listener
//!                                                                 │
//!                                                           SubscriberSet::emit
//!                                                        ┌────────┼────────┐
//!                                                        ▼        ▼        ▼
//!                                                    LogWriter  Metrics  Custom
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
