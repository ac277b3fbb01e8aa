//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! HealthCheck::set_backends_configuration (engine.rs)
//!     → one task per backend
//!     → probe cycle every interval
//!         → probe.rs (one HTTP GET per server, via transport.rs)
//!         → BalancerHandler::upsert_server / remove_server
//!             → status.rs (LbStatusUpdater mirrors UP/DOWN into a StatusStore)
//! ```
//!
//! # Design Decisions
//! - A single probe decides: no thresholds, no backoff
//! - Disabled servers are re-probed first, then enabled ones
//! - Mutation failures are logged, never retried within a cycle
//! - Cancellation is only observed between cycles

pub mod engine;
pub mod options;
pub mod probe;
pub mod status;
pub mod transport;

pub use engine::{check_backend, HealthCheck};
pub use options::{MonitoredBackend, ProbeOptions};
pub use probe::{check_health, ProbeError};
pub use status::{LbStatusUpdater, ServerStatus, ServiceInfo, StatusStore};
pub use transport::{HttpTransport, Transport, TransportError};
