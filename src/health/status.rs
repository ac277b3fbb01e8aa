//! Server status propagation.
//!
//! `LbStatusUpdater` wraps a load balancer and mirrors every successful
//! membership change into a `StatusStore`. Rejected changes leave the store
//! untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use dashmap::DashMap;
use url::Url;

use crate::load_balancer::{BalancerHandler, LoadBalancerError};

/// Status of one server as seen by the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerStatus {
    Up,
    Down,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Up => "UP",
            ServerStatus::Down => "DOWN",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External registry of per-server status.
pub trait StatusStore: Send + Sync {
    fn update_status(&self, url: &str, status: ServerStatus);
}

/// In-process status store for one service.
#[derive(Debug, Default)]
pub struct ServiceInfo {
    statuses: DashMap<String, ServerStatus>,
}

impl ServiceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, url: &str) -> Option<ServerStatus> {
        self.statuses.get(url).map(|r| *r.value())
    }

    /// Snapshot of every known server status.
    pub fn statuses(&self) -> HashMap<String, ServerStatus> {
        self.statuses
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }
}

impl StatusStore for ServiceInfo {
    fn update_status(&self, url: &str, status: ServerStatus) {
        self.statuses.insert(url.to_string(), status);
    }
}

/// Load balancer decorator that reports membership changes to a status store.
pub struct LbStatusUpdater {
    inner: Arc<dyn BalancerHandler>,
    service_info: Option<Arc<dyn StatusStore>>,
}

impl LbStatusUpdater {
    pub fn new(inner: Arc<dyn BalancerHandler>, service_info: Option<Arc<dyn StatusStore>>) -> Self {
        Self { inner, service_info }
    }

    fn notify(&self, url: &Url, status: ServerStatus) {
        if let Some(store) = &self.service_info {
            store.update_status(url.as_str(), status);
        }
    }
}

#[async_trait]
impl BalancerHandler for LbStatusUpdater {
    fn servers(&self) -> Vec<Url> {
        self.inner.servers()
    }

    fn upsert_server(&self, url: &Url, weight: u32) -> Result<(), LoadBalancerError> {
        self.inner.upsert_server(url, weight)?;
        self.notify(url, ServerStatus::Up);
        Ok(())
    }

    fn remove_server(&self, url: &Url) -> Result<(), LoadBalancerError> {
        self.inner.remove_server(url)?;
        self.notify(url, ServerStatus::Down);
        Ok(())
    }

    async fn serve(&self, request: Request<Body>) -> Response<Body> {
        self.inner.serve(request).await
    }
}
