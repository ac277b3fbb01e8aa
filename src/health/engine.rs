//! Active health checking.
//!
//! # Responsibilities
//! - Run one monitoring task per backend
//! - Periodically probe enabled and disabled servers
//! - Move servers in and out of the load balancer based on results

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::health::options::MonitoredBackend;
use crate::health::probe::check_health;
use crate::observability::metrics;

/// Weight given to a server returning to the load balancer.
pub const RECOVERED_WEIGHT: u32 = 1;

#[derive(Default)]
struct Registry {
    backends: HashMap<String, Arc<MonitoredBackend>>,
    cancel: Option<CancellationToken>,
}

/// Coordinator for the per-backend monitoring tasks.
///
/// One instance is created at startup and shared by every reload path.
#[derive(Default)]
pub struct HealthCheck {
    registry: Mutex<Registry>,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every monitored backend.
    ///
    /// Tasks of the previous configuration are cancelled before the new ones
    /// are spawned. They stop at their next wait point, so a cycle already in
    /// flight still completes. Must be called from within a Tokio runtime.
    pub fn set_backends_configuration(
        &self,
        parent: &CancellationToken,
        backends: HashMap<String, Arc<MonitoredBackend>>,
    ) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = registry.cancel.take() {
            previous.cancel();
        }

        let token = parent.child_token();
        for backend in backends.values() {
            tokio::spawn(execute(token.clone(), backend.clone()));
        }

        tracing::info!(backends = backends.len(), "Health check configuration applied");
        registry.backends = backends;
        registry.cancel = Some(token);
    }

    /// Cancel the running monitoring tasks.
    pub fn stop(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cancel) = registry.cancel.take() {
            cancel.cancel();
            tracing::info!("Health checks stopped");
        }
    }

    /// Snapshot of the registered backends.
    pub fn backends(&self) -> HashMap<String, Arc<MonitoredBackend>> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .backends
            .clone()
    }
}

async fn execute(token: CancellationToken, backend: Arc<MonitoredBackend>) {
    tracing::debug!(backend = %backend.name(), "Initial health check");
    check_backend(&backend).await;

    let period = backend.options().interval;
    if period.is_zero() {
        tracing::error!(backend = %backend.name(), "Health check interval is zero, not rescheduling");
        return;
    }

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(backend = %backend.name(), "Stopping health check");
                return;
            }
            _ = ticker.tick() => {
                tracing::debug!(backend = %backend.name(), "Refreshing health check");
                check_backend(&backend).await;
            }
        }
    }
}

/// Run one probe cycle for a backend.
///
/// Disabled servers are re-probed first, then every server the load balancer
/// currently holds. The disabled list is rebuilt from those two snapshots,
/// so a server missing from both is no longer tracked.
pub async fn check_backend(backend: &MonitoredBackend) {
    let lb = &backend.options().lb;
    let enabled: Vec<Url> = lb.servers();
    let disabled = backend.disabled_urls();
    let mut still_disabled = Vec::with_capacity(disabled.len());

    for url in disabled {
        match check_health(&url, backend).await {
            Ok(()) => {
                tracing::warn!(
                    backend = %backend.name(),
                    url = %url,
                    "Health check up: returning to server list"
                );
                if let Err(e) = lb.upsert_server(&url, RECOVERED_WEIGHT) {
                    tracing::error!(backend = %backend.name(), url = %url, error = %e, "Failed to re-add server");
                }
                metrics::record_server_up(backend.name(), url.as_str(), true);
            }
            Err(reason) => {
                tracing::warn!(
                    backend = %backend.name(),
                    url = %url,
                    reason = %reason,
                    "Health check still failing"
                );
                metrics::record_server_up(backend.name(), url.as_str(), false);
                still_disabled.push(url);
            }
        }
    }

    for url in enabled {
        match check_health(&url, backend).await {
            Ok(()) => metrics::record_server_up(backend.name(), url.as_str(), true),
            Err(reason) => {
                tracing::warn!(
                    backend = %backend.name(),
                    url = %url,
                    reason = %reason,
                    "Health check failed: removing from server list"
                );
                if let Err(e) = lb.remove_server(&url) {
                    tracing::error!(backend = %backend.name(), url = %url, error = %e, "Failed to remove server");
                }
                metrics::record_server_up(backend.name(), url.as_str(), false);
                still_disabled.push(url);
            }
        }
    }

    backend.set_disabled_urls(still_disabled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, Response};

    use crate::health::options::ProbeOptions;
    use crate::health::transport::{Transport, TransportError};
    use crate::load_balancer::{BalancerHandler, LoadBalancerError, WeightedRoundRobin};

    /// Answers per authority from a queue of status codes; 0 means refused.
    /// An exhausted queue keeps answering 200.
    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<u16>>>,
        probes: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedTransport {
        fn script(&self, authority: &str, codes: &[u16]) {
            self.scripts
                .lock()
                .unwrap()
                .insert(authority.to_string(), codes.iter().copied().collect());
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            let authority = request.uri().authority().map(|a| a.to_string()).unwrap_or_default();
            let code = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&authority)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(200);
            if code == 0 {
                return Err(TransportError::Other("connection refused".into()));
            }
            Ok(Response::builder().status(code).body(Body::empty()).unwrap())
        }
    }

    /// Round-robin balancer that records mutations and can reject them.
    #[derive(Default)]
    struct RecordingLb {
        inner: WeightedRoundRobin,
        calls: Mutex<Vec<String>>,
        reject: AtomicBool,
    }

    impl RecordingLb {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BalancerHandler for RecordingLb {
        fn servers(&self) -> Vec<Url> {
            self.inner.servers()
        }

        fn upsert_server(&self, url: &Url, weight: u32) -> Result<(), LoadBalancerError> {
            self.calls.lock().unwrap().push(format!("upsert {} {}", url, weight));
            if self.reject.load(Ordering::SeqCst) {
                return Err(LoadBalancerError::InvalidWeight(weight));
            }
            self.inner.upsert_server(url, weight)
        }

        fn remove_server(&self, url: &Url) -> Result<(), LoadBalancerError> {
            self.calls.lock().unwrap().push(format!("remove {}", url));
            if self.reject.load(Ordering::SeqCst) {
                return Err(LoadBalancerError::ServerNotFound(url.clone()));
            }
            self.inner.remove_server(url)
        }

        async fn serve(&self, request: Request<Body>) -> Response<Body> {
            self.inner.serve(request).await
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn backend(
        name: &str,
        lb: Arc<RecordingLb>,
        transport: Arc<ScriptedTransport>,
        servers: &[&str],
    ) -> Arc<MonitoredBackend> {
        for server in servers {
            lb.inner.upsert_server(&url(server), 1).unwrap();
        }
        let mut options = ProbeOptions::new(lb);
        options.transport = transport;
        options.path = "/healthz".into();
        options.interval = Duration::from_secs(1);
        options.timeout = Duration::from_millis(500);
        Arc::new(MonitoredBackend::new(options, name))
    }

    fn single(backend: Arc<MonitoredBackend>) -> HashMap<String, Arc<MonitoredBackend>> {
        HashMap::from([(backend.name().to_string(), backend)])
    }

    fn assert_partition(lb: &RecordingLb, backend: &MonitoredBackend, population: &[&str]) {
        let enabled: HashSet<Url> = lb.servers().into_iter().collect();
        let disabled: HashSet<Url> = backend.disabled_urls().into_iter().collect();
        let all: HashSet<Url> = population.iter().map(|s| url(s)).collect();

        assert!(enabled.is_disjoint(&disabled), "enabled {:?} disabled {:?}", enabled, disabled);
        assert_eq!(&enabled | &disabled, all);
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_scenario() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        transport.script("10.0.0.1:8080", &[200, 503, 200]);
        let api = backend("api", lb.clone(), transport.clone(), &["http://10.0.0.1:8080"]);
        let server = url("http://10.0.0.1:8080");

        let hc = HealthCheck::new();
        let root = CancellationToken::new();
        hc.set_backends_configuration(&root, single(api.clone()));

        // Initial cycle: healthy, nothing changes.
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.probes(), 1);
        assert!(lb.calls().is_empty());
        assert_eq!(lb.servers(), vec![server.clone()]);

        // Second cycle: 503 evicts the server.
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.probes(), 2);
        assert_eq!(lb.calls(), vec![format!("remove {}", server)]);
        assert!(lb.servers().is_empty());
        assert_eq!(api.disabled_urls(), vec![server.clone()]);

        // Third cycle: recovery with weight 1.
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.probes(), 3);
        assert_eq!(lb.calls()[1], format!("upsert {} 1", server));
        assert_eq!(lb.servers(), vec![server]);
        assert!(api.disabled_urls().is_empty());

        hc.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_cycle_precedes_interval() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        let servers = ["http://10.0.0.1:8080", "http://10.0.0.2:8080"];
        let api = backend("api", lb.clone(), transport.clone(), &servers);

        let hc = HealthCheck::new();
        hc.set_backends_configuration(&CancellationToken::new(), single(api));

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.probes(), servers.len());

        hc.stop();
    }

    #[tokio::test]
    async fn test_partition_holds_across_cycles() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        let servers = ["http://10.0.0.1:8080", "http://10.0.0.2:8080", "http://10.0.0.3:8080"];
        transport.script("10.0.0.1:8080", &[500, 500, 200]);
        transport.script("10.0.0.2:8080", &[200, 0, 0, 200]);
        transport.script("10.0.0.3:8080", &[404, 200, 302]);
        let api = backend("api", lb.clone(), transport.clone(), &servers);

        for _ in 0..5 {
            check_backend(&api).await;
            assert_partition(&lb, &api, &servers);
        }
        assert!(api.disabled_urls().is_empty());
        assert_eq!(lb.servers().len(), 3);
    }

    #[tokio::test]
    async fn test_each_url_probed_once_per_cycle() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        let servers = ["http://10.0.0.1:8080", "http://10.0.0.2:8080"];
        transport.script("10.0.0.1:8080", &[503, 200]);
        let api = backend("api", lb.clone(), transport.clone(), &servers);

        check_backend(&api).await;
        assert_eq!(transport.probes(), 2);
        assert_eq!(api.disabled_urls(), vec![url(servers[0])]);

        // The recovered URL is not probed a second time as an enabled one.
        check_backend(&api).await;
        assert_eq!(transport.probes(), 4);
        assert!(api.disabled_urls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_mutations_do_not_abort_cycle() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        let servers = ["http://10.0.0.1:8080", "http://10.0.0.2:8080"];
        transport.script("10.0.0.1:8080", &[503]);
        transport.script("10.0.0.2:8080", &[0]);
        let api = backend("api", lb.clone(), transport.clone(), &servers);
        lb.reject.store(true, Ordering::SeqCst);

        check_backend(&api).await;

        assert_eq!(transport.probes(), 2);
        assert_eq!(lb.calls().len(), 2);
        // Bookkeeping still records both as disabled even though the
        // balancer kept them.
        assert_eq!(api.disabled_urls().len(), 2);
        assert_eq!(lb.servers().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_halts_previous_backends() {
        let old_lb = Arc::new(RecordingLb::default());
        let old_transport = Arc::new(ScriptedTransport::default());
        let old = backend("old", old_lb.clone(), old_transport.clone(), &["http://10.0.0.1:8080"]);

        let new_lb = Arc::new(RecordingLb::default());
        let new_transport = Arc::new(ScriptedTransport::default());
        let new = backend("new", new_lb.clone(), new_transport.clone(), &["http://10.0.0.2:8080"]);

        let hc = HealthCheck::new();
        let root = CancellationToken::new();
        hc.set_backends_configuration(&root, single(old));
        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(old_transport.probes(), 3);

        hc.set_backends_configuration(&root, single(new));
        let frozen = old_transport.probes();
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(old_transport.probes(), frozen);
        assert!(old_lb.calls().is_empty());
        assert!(new_transport.probes() >= 5);
        assert_eq!(hc.backends().keys().collect::<Vec<_>>(), vec!["new"]);

        hc.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_in_flight_at_reload_completes() {
        let old_lb = Arc::new(RecordingLb::default());
        let old_transport = Arc::new(ScriptedTransport {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        old_transport.script("10.0.0.1:8080", &[200, 503]);
        let old = backend("old", old_lb.clone(), old_transport.clone(), &["http://10.0.0.1:8080"]);
        let server = url("http://10.0.0.1:8080");

        let new_lb = Arc::new(RecordingLb::default());
        let new_transport = Arc::new(ScriptedTransport::default());
        let new = backend("new", new_lb, new_transport, &["http://10.0.0.2:8080"]);

        let hc = HealthCheck::new();
        let root = CancellationToken::new();
        hc.set_backends_configuration(&root, single(old.clone()));

        // The first cycle ends at 0.3s, so the second starts at 1.3s and
        // answers 503 at 1.6s.
        time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(old_transport.probes(), 2);
        assert!(old_lb.calls().is_empty());

        hc.set_backends_configuration(&root, single(new));
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(old_lb.calls(), vec![format!("remove {}", server)]);
        assert!(old_lb.servers().is_empty());
        assert_eq!(old.disabled_urls(), vec![server]);
        assert_eq!(old_transport.probes(), 2);

        hc.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_tasks() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        let api = backend("api", lb, transport.clone(), &["http://10.0.0.1:8080"]);

        let hc = HealthCheck::new();
        let root = CancellationToken::new();
        hc.set_backends_configuration(&root, single(api));
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.probes(), 2);

        root.cancel();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.probes(), 2);
    }

    /// A server removed from the balancer by someone else is dropped from
    /// tracking entirely and never probed again.
    #[tokio::test]
    async fn test_out_of_band_removal_is_forgotten() {
        let lb = Arc::new(RecordingLb::default());
        let transport = Arc::new(ScriptedTransport::default());
        let servers = ["http://10.0.0.1:8080", "http://10.0.0.2:8080"];
        let api = backend("api", lb.clone(), transport.clone(), &servers);

        check_backend(&api).await;
        assert_eq!(transport.probes(), 2);

        lb.inner.remove_server(&url(servers[1])).unwrap();
        check_backend(&api).await;
        check_backend(&api).await;

        assert_eq!(transport.probes(), 4);
        assert!(api.disabled_urls().is_empty());
        assert_eq!(lb.servers(), vec![url(servers[0])]);
    }
}
