//! Runtime core: connection supervision and endpoint lifecycle.
//!
//! Public entry points are [`Host`] (with [`HostBuilder`]) and the
//! connection-level types it hands out.
//!
//! Internal modules:
//! - [`supervisor`]: single-flight connection construction and recycling;
//! - [`connection`]: one live connection and its processor factories;
//! - [`client`]: one entity processor and its callback routing;
//! - [`endpoint`]: binds an entity and restarts it after connection loss;
//! - [`registry`]: endpoint handles keyed by entity path;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod agent;
mod builder;
mod client;
mod config;
mod connection;
mod endpoint;
mod handle;
mod host;
mod registry;
mod shutdown;
mod supervisor;

pub use agent::Agent;
pub use builder::HostBuilder;
pub use client::{ClientContext, ClientState};
pub use config::Config;
pub use connection::ConnectionContext;
pub use handle::{EndpointStatus, ReceiveEndpointHandle};
pub use host::{EndpointProbe, HOST_TYPE, Host, HostProbe};
pub use supervisor::{ConnectionContextSupervisor, ConnectionProbe};
