//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! health engine, load balancer, server
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (per-server up gauge, probe counter)
//!
//! Consumers:
//!     → stdout log stream
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;
