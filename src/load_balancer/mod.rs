//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request routed to a backend
//!     → BalancerHandler::serve
//!     → round_robin.rs (rotate through weighted servers)
//!     → forward to the chosen server
//!
//! Health checks:
//!     engine → BalancerHandler::servers (snapshot)
//!            → upsert_server / remove_server (membership changes)
//! ```
//!
//! # Design Decisions
//! - The health-check engine only sees the `BalancerHandler` trait
//! - Implementations synchronize their own state; every method takes `&self`
//! - Membership errors are reported, never retried by the caller

pub mod round_robin;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use thiserror::Error;
use url::Url;

pub use round_robin::WeightedRoundRobin;

/// Errors returned by load balancer membership operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadBalancerError {
    /// The server is not part of the balancer.
    #[error("server not found: {0}")]
    ServerNotFound(Url),

    /// Weights must be strictly positive.
    #[error("invalid weight {0}, must be at least 1")]
    InvalidWeight(u32),
}

/// Capability set the health-check engine needs from a load balancer.
#[async_trait]
pub trait BalancerHandler: Send + Sync {
    /// Snapshot of the servers currently receiving traffic.
    fn servers(&self) -> Vec<Url>;

    /// Add a server, or update its weight if it is already present.
    fn upsert_server(&self, url: &Url, weight: u32) -> Result<(), LoadBalancerError>;

    /// Remove a server from rotation.
    fn remove_server(&self, url: &Url) -> Result<(), LoadBalancerError>;

    /// Proxy a request to one of the servers.
    async fn serve(&self, request: Request<Body>) -> Response<Body>;
}
