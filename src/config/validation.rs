//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Backend names unique and non-empty
//! - Server URLs parse and carry a host
//! - Health check timings non-zero, scheme overrides supported
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("backend name must not be empty")]
    EmptyBackendName,

    #[error("duplicate backend name '{0}'")]
    DuplicateBackend(String),

    #[error("backend '{backend}': invalid server URL '{url}': {reason}")]
    InvalidServerUrl {
        backend: String,
        url: String,
        reason: String,
    },

    #[error("backend '{backend}': health check {field} must be greater than zero")]
    ZeroDuration { backend: String, field: &'static str },

    #[error("backend '{backend}': unsupported health check scheme '{scheme}'")]
    UnsupportedScheme { backend: String, scheme: String },
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for backend in &config.backends {
        if backend.name.is_empty() {
            errors.push(ValidationError::EmptyBackendName);
        } else if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }

        for server in &backend.servers {
            let reason = match Url::parse(server) {
                Ok(url) if url.host_str().is_some() => continue,
                Ok(_) => "missing host".to_string(),
                Err(e) => e.to_string(),
            };
            errors.push(ValidationError::InvalidServerUrl {
                backend: backend.name.clone(),
                url: server.clone(),
                reason,
            });
        }

        if let Some(hc) = &backend.health_check {
            if hc.interval_ms == 0 {
                errors.push(ValidationError::ZeroDuration {
                    backend: backend.name.clone(),
                    field: "interval_ms",
                });
            }
            if hc.timeout_ms == 0 {
                errors.push(ValidationError::ZeroDuration {
                    backend: backend.name.clone(),
                    field: "timeout_ms",
                });
            }
            if let Some(scheme) = &hc.scheme {
                if scheme != "http" && scheme != "https" {
                    errors.push(ValidationError::UnsupportedScheme {
                        backend: backend.name.clone(),
                        scheme: scheme.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
