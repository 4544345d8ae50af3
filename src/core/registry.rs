//! # Endpoint registry.
//!
//! Owns the handles of running endpoints, keyed by entity path.
//!
//! ## Rules
//! - One live endpoint per entity path; a terminal endpoint may be replaced.
//! - The registry owns each endpoint's `JoinHandle`; handles given to users
//!   only observe and stop.
//! - `stop_all` drains the registry: cancel every endpoint, then join each one
//!   against a shared deadline and abort the stragglers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::core::handle::{EndpointStatus, ReceiveEndpointHandle};
use crate::error::HostError;

struct Entry {
    handle: ReceiveEndpointHandle,
    join: JoinHandle<()>,
}

/// Registry of receive endpoints.
pub(crate) struct Registry {
    endpoints: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the endpoint produced by `spawn` unless `name` is taken.
    ///
    /// `spawn` runs under the registry lock, so the check and the insert are atomic.
    pub(crate) async fn insert<F>(&self, name: &str, spawn: F) -> Result<ReceiveEndpointHandle, HostError>
    where
        F: FnOnce() -> (ReceiveEndpointHandle, JoinHandle<()>),
    {
        let mut endpoints = self.endpoints.write().await;
        if let Some(existing) = endpoints.get(name) {
            if !existing.handle.status().is_terminal() {
                return Err(HostError::EndpointExists { name: name.to_string() });
            }
        }

        let (handle, join) = spawn();
        endpoints.insert(
            name.to_string(),
            Entry {
                handle: handle.clone(),
                join,
            },
        );
        Ok(handle)
    }

    /// Handle of the endpoint registered under `name`.
    pub(crate) async fn get(&self, name: &str) -> Option<ReceiveEndpointHandle> {
        self.endpoints.read().await.get(name).map(|e| e.handle.clone())
    }

    /// Handles sorted by name.
    pub(crate) async fn list(&self) -> Vec<ReceiveEndpointHandle> {
        let endpoints = self.endpoints.read().await;
        let mut handles: Vec<ReceiveEndpointHandle> = endpoints.values().map(|e| e.handle.clone()).collect();
        handles.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// Stops every endpoint, waiting up to `grace` in total.
    ///
    /// Returns the names of endpoints that had to be aborted, sorted.
    pub(crate) async fn stop_all(&self, grace: Duration) -> Vec<String> {
        let entries: Vec<(String, Entry)> = {
            let mut endpoints = self.endpoints.write().await;
            endpoints.drain().collect()
        };

        for (_, entry) in &entries {
            entry.handle.request_stop();
        }

        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();
        for (name, mut entry) in entries {
            if time::timeout_at(deadline, &mut entry.join).await.is_err() {
                entry.join.abort();
                stuck.push(name);
            }
        }
        stuck.sort_unstable();
        stuck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    fn spawn_endpoint(name: &str, stubborn: bool) -> (ReceiveEndpointHandle, JoinHandle<()>) {
        let (tx, rx) = watch::channel(EndpointStatus::Ready);
        let stop = CancellationToken::new();
        let handle = ReceiveEndpointHandle::new(
            Arc::from(name),
            Arc::from(format!("sb://ns/{name}")),
            Arc::from(name),
            rx,
            stop.clone(),
        );
        let join = tokio::spawn(async move {
            stop.cancelled().await;
            if stubborn {
                time::sleep(Duration::from_secs(3600)).await;
            }
            tx.send_replace(EndpointStatus::Stopped);
        });
        (handle, join)
    }

    #[tokio::test]
    async fn duplicate_live_endpoint_is_rejected() {
        let registry = Registry::new();
        let first = registry.insert("orders", || spawn_endpoint("orders", false)).await.unwrap();

        let err = registry
            .insert("orders", || spawn_endpoint("orders", false))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::EndpointExists { .. }));

        first.stop().await;
        assert!(registry.insert("orders", || spawn_endpoint("orders", false)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_aborts_stragglers_after_grace() {
        let registry = Registry::new();
        registry.insert("orders", || spawn_endpoint("orders", false)).await.unwrap();
        registry.insert("stuck", || spawn_endpoint("stuck", true)).await.unwrap();

        let stuck = registry.stop_all(Duration::from_secs(5)).await;
        assert_eq!(stuck, vec!["stuck".to_string()]);
        assert!(registry.list().await.is_empty());
    }
}
