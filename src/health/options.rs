//! Per-backend probe parameters and disabled-server bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use url::Url;

use crate::health::transport::{HttpTransport, Transport};
use crate::load_balancer::BalancerHandler;

/// Default probe interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Default probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable health check parameters for one backend.
#[derive(Clone)]
pub struct ProbeOptions {
    /// Headers set on every probe.
    pub headers: BTreeMap<String, String>,
    /// Overrides the `Host` header.
    pub hostname: Option<String>,
    /// Overrides the server URL scheme.
    pub scheme: Option<String>,
    /// Path resolved against each server URL.
    pub path: String,
    /// Overrides the server URL port.
    pub port: Option<u16>,
    pub transport: Arc<dyn Transport>,
    pub interval: Duration,
    pub timeout: Duration,
    /// Load balancer whose membership the probes drive.
    pub lb: Arc<dyn BalancerHandler>,
}

impl ProbeOptions {
    /// Options with default timing and a plain HTTP transport.
    pub fn new(lb: Arc<dyn BalancerHandler>) -> Self {
        Self {
            headers: BTreeMap::new(),
            hostname: None,
            scheme: None,
            path: String::new(),
            port: None,
            transport: Arc::new(HttpTransport::new()),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            lb,
        }
    }
}

impl fmt::Display for ProbeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Hostname: {} Headers: {:?} Path: {} Port: {} Interval: {:?} Timeout: {:?}]",
            self.hostname.as_deref().unwrap_or(""),
            self.headers,
            self.path,
            self.port.unwrap_or(0),
            self.interval,
            self.timeout,
        )
    }
}

impl fmt::Debug for ProbeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A backend under active health checking.
///
/// The disabled list is only written by the backend's own monitoring task.
#[derive(Debug)]
pub struct MonitoredBackend {
    options: ProbeOptions,
    name: String,
    disabled: Mutex<Vec<Url>>,
}

impl MonitoredBackend {
    pub fn new(options: ProbeOptions, name: impl Into<String>) -> Self {
        Self {
            options,
            name: name.into(),
            disabled: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Snapshot of the servers currently disabled by failed probes.
    pub fn disabled_urls(&self) -> Vec<Url> {
        self.disabled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_disabled_urls(&self, urls: Vec<Url>) {
        *self.disabled.lock().unwrap_or_else(PoisonError::into_inner) = urls;
    }
}
