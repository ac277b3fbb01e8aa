//! Single HTTP health probe.
//!
//! # Responsibilities
//! - Build the probe request from the server URL and backend options
//! - Send it through the backend's transport, bounded by its timeout
//! - Classify the outcome: 2xx and 3xx are healthy, everything else is not

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use thiserror::Error;
use tokio::time;
use url::Url;

use crate::health::options::MonitoredBackend;
use crate::health::transport::TransportError;

/// Why a probe was classified as failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to create HTTP request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP request timed out after {0:?}")]
    Timeout(Duration),

    #[error("received error status code: {}", .0.as_u16())]
    Status(StatusCode),
}

/// Compute the URL probed for `server_url` under the backend's options.
pub fn probe_url(server_url: &Url, backend: &MonitoredBackend) -> Result<Url, ProbeError> {
    let options = backend.options();
    let mut url = server_url
        .join(&options.path)
        .map_err(|e| ProbeError::InvalidRequest(format!("invalid path {:?}: {}", options.path, e)))?;

    if let Some(scheme) = options.scheme.as_deref().filter(|s| !s.is_empty()) {
        url.set_scheme(scheme)
            .map_err(|()| ProbeError::InvalidRequest(format!("invalid scheme {:?}", scheme)))?;
    }

    if let Some(port) = options.port {
        url.set_port(Some(port))
            .map_err(|()| ProbeError::InvalidRequest(format!("invalid port {}", port)))?;
    }

    Ok(url)
}

fn build_request(server_url: &Url, backend: &MonitoredBackend) -> Result<Request<Body>, ProbeError> {
    let options = backend.options();
    let url = probe_url(server_url, backend)?;

    let mut request = Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .header(header::USER_AGENT, "lb-healthcheck")
        .body(Body::empty())
        .map_err(|e| ProbeError::InvalidRequest(e.to_string()))?;

    // Set, not append: names differing only in case collapse to one value.
    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProbeError::InvalidRequest(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProbeError::InvalidRequest(format!("invalid header value for {}: {}", name, e)))?;
        request.headers_mut().insert(name, value);
    }

    if let Some(hostname) = options.hostname.as_deref().filter(|h| !h.is_empty()) {
        let value = HeaderValue::from_str(hostname)
            .map_err(|e| ProbeError::InvalidRequest(format!("invalid hostname {:?}: {}", hostname, e)))?;
        request.headers_mut().insert(header::HOST, value);
    }

    Ok(request)
}

/// Probe `server_url` once.
///
/// Returns `Ok(())` when the server answered with a status in `[200, 400)`.
pub async fn check_health(server_url: &Url, backend: &MonitoredBackend) -> Result<(), ProbeError> {
    let options = backend.options();
    let request = build_request(server_url, backend)?;

    let response = match time::timeout(options.timeout, options.transport.round_trip(request)).await {
        Ok(result) => result?,
        Err(_) => return Err(ProbeError::Timeout(options.timeout)),
    };

    // The body is never read; dropping the response releases it.
    let status = response.status();
    drop(response);

    if status.as_u16() < 200 || status.as_u16() >= 400 {
        return Err(ProbeError::Status(status));
    }
    Ok(())
}
