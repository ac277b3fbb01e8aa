//! Startup wiring.
//!
//! # Responsibilities
//! - Build one load balancer per configured backend
//! - Wrap each balancer so membership changes reach this table's status store
//! - Derive the health check set for backends that configure a probe

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use url::Url;

use crate::config::schema::{BackendConfig, HealthCheckConfig, ProxyConfig};
use crate::health::{LbStatusUpdater, MonitoredBackend, ProbeOptions, ServiceInfo, StatusStore, Transport};
use crate::load_balancer::{BalancerHandler, WeightedRoundRobin};

/// Initial weight of configured servers.
const INITIAL_WEIGHT: u32 = 1;

/// A routable backend.
pub struct BackendEntry {
    pub name: String,
    pub host: Option<String>,
    pub lb: Arc<dyn BalancerHandler>,
}

/// Balancers, status store and health check set built from one configuration.
///
/// Each table owns its `ServiceInfo`. Cycles still finishing against a
/// replaced table only reach that table's store.
#[derive(Default)]
pub struct BackendTable {
    entries: Vec<BackendEntry>,
    monitored: HashMap<String, Arc<MonitoredBackend>>,
    service_info: Arc<ServiceInfo>,
}

impl BackendTable {
    /// Build every backend of `config`.
    ///
    /// Configured servers are added with weight 1 through the status
    /// decorator, so the store starts with every server `UP`. Every balancer
    /// forwards through `client`.
    pub fn build(config: &ProxyConfig, client: &Client<HttpConnector, Body>, transport: Arc<dyn Transport>) -> Self {
        let mut table = Self::default();
        let store: Arc<dyn StatusStore> = table.service_info.clone();

        for backend in &config.backends {
            let lb: Arc<dyn BalancerHandler> = Arc::new(LbStatusUpdater::new(
                Arc::new(WeightedRoundRobin::with_client(client.clone())),
                Some(store.clone()),
            ));
            register_servers(backend, lb.as_ref());

            if let Some(hc) = &backend.health_check {
                let options = probe_options(hc, lb.clone(), transport.clone());
                tracing::info!(backend = %backend.name, options = %options, "Health check configured");
                table.monitored.insert(
                    backend.name.clone(),
                    Arc::new(MonitoredBackend::new(options, backend.name.clone())),
                );
            }

            table.entries.push(BackendEntry {
                name: backend.name.clone(),
                host: backend.host.clone(),
                lb,
            });
        }

        table
    }

    pub fn entries(&self) -> &[BackendEntry] {
        &self.entries
    }

    /// Status store fed by this table's balancers.
    pub fn service_info(&self) -> Arc<ServiceInfo> {
        self.service_info.clone()
    }

    /// Backends with an active health check.
    pub fn monitored(&self) -> HashMap<String, Arc<MonitoredBackend>> {
        self.monitored.clone()
    }

    /// Pick the backend for a request `Host` header.
    ///
    /// Falls back to the only backend when exactly one is configured.
    pub fn route(&self, host: Option<&str>) -> Option<&BackendEntry> {
        let hostname = host.map(strip_port);
        let matched = self.entries.iter().find(|entry| {
            matches!((entry.host.as_deref(), hostname), (Some(want), Some(got)) if want.eq_ignore_ascii_case(got))
        });

        match matched {
            Some(entry) => Some(entry),
            None if self.entries.len() == 1 => self.entries.first(),
            None => None,
        }
    }
}

fn register_servers(backend: &BackendConfig, lb: &dyn BalancerHandler) {
    for server in &backend.servers {
        match Url::parse(server) {
            Ok(url) => {
                if let Err(e) = lb.upsert_server(&url, INITIAL_WEIGHT) {
                    tracing::error!(backend = %backend.name, url = %url, error = %e, "Failed to add server");
                }
            }
            Err(e) => tracing::warn!(backend = %backend.name, url = %server, error = %e, "Invalid server URL"),
        }
    }
}

fn probe_options(hc: &HealthCheckConfig, lb: Arc<dyn BalancerHandler>, transport: Arc<dyn Transport>) -> ProbeOptions {
    ProbeOptions {
        headers: hc.headers.clone(),
        hostname: hc.hostname.clone(),
        scheme: hc.scheme.clone(),
        path: hc.path.clone(),
        port: hc.port,
        transport,
        interval: hc.interval(),
        timeout: hc.timeout(),
        lb,
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, e.g. "[::1]:8080"
        return host.split_once(']').map_or(host, |(addr, _)| &host[..addr.len() + 1]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}
