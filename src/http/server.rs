//! HTTP server setup and configuration reload.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware
//! - Route each request to its backend's load balancer
//! - Start health checks for the initial configuration
//! - Rebuild balancers and restart health checks on every reload

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::health::{HealthCheck, HttpTransport, ServiceInfo, Transport};
use crate::lifecycle::{BackendTable, Shutdown};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub backends: Arc<ArcSwap<BackendTable>>,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    config: ProxyConfig,
    state: AppState,
    health: Arc<HealthCheck>,
    client: Client<HttpConnector, Body>,
    transport: Arc<dyn Transport>,
}

impl HttpServer {
    /// Create a server probing over plain HTTP.
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Create a server whose health checks use `transport`.
    pub fn with_transport(config: ProxyConfig, transport: Arc<dyn Transport>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let table = BackendTable::build(&config, &client, transport.clone());

        Self {
            config,
            state: AppState {
                backends: Arc::new(ArcSwap::from_pointee(table)),
            },
            health: Arc::new(HealthCheck::new()),
            client,
            transport,
        }
    }

    /// Engine driving this server's health checks.
    pub fn health(&self) -> Arc<HealthCheck> {
        self.health.clone()
    }

    /// Status store of the configuration currently serving traffic.
    ///
    /// A reload installs a fresh store; callers should fetch it again after one.
    pub fn service_info(&self) -> Arc<ServiceInfo> {
        self.state.backends.load().service_info()
    }

    fn reloader(&self) -> Reloader {
        Reloader {
            backends: self.state.backends.clone(),
            health: self.health.clone(),
            client: self.client.clone(),
            transport: self.transport.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` is triggered.
    ///
    /// Every configuration received on `config_updates` replaces the running
    /// backends. Listener and timeout settings are only read at startup.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let initial = self.state.backends.load().monitored();
        self.health.set_backends_configuration(shutdown.token(), initial);

        tokio::spawn(self.reloader().run(config_updates, shutdown.clone()));

        let app = self.router();
        let signal = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.wait().await })
            .await?;

        self.health.stop();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

struct Reloader {
    backends: Arc<ArcSwap<BackendTable>>,
    health: Arc<HealthCheck>,
    client: Client<HttpConnector, Body>,
    transport: Arc<dyn Transport>,
}

impl Reloader {
    async fn run(self, mut updates: mpsc::UnboundedReceiver<ProxyConfig>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                update = updates.recv() => match update {
                    Some(config) => self.apply(&config, &shutdown),
                    None => break,
                },
            }
        }
    }

    fn apply(&self, config: &ProxyConfig, shutdown: &Shutdown) {
        let table = BackendTable::build(config, &self.client, self.transport.clone());
        let monitored = table.monitored();

        self.backends.store(Arc::new(table));
        self.health.set_backends_configuration(shutdown.token(), monitored);
        tracing::info!(backends = config.backends.len(), "Configuration applied");
    }
}

/// Main proxy handler.
/// Selects the backend by Host header and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let table = state.backends.load_full();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host());

    let lb = match table.route(host) {
        Some(entry) => entry.lb.clone(),
        None => {
            tracing::warn!(host = ?host, path = %request.uri().path(), "No backend matched");
            return (StatusCode::NOT_FOUND, "No matching backend found").into_response();
        }
    };

    lb.serve(request).await
}
