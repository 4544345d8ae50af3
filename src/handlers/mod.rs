//! # Application-side message handlers.
//!
//! - [`MessageHandler`] - trait the host dispatches deliveries to
//! - [`HandlerFn`] - closure-backed handler
//! - [`HandlerRef`] - shared handle (`Arc<dyn MessageHandler>`)
//! - [`ErrorDisposition`] - handler verdict on processor errors

mod handler;
mod handler_fn;

pub use handler::{ErrorDisposition, HandlerRef, MessageHandler};
pub use handler_fn::HandlerFn;
