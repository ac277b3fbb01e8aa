//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → balancers + status decorators → health check set
//!
//! Shutdown (shutdown.rs):
//!     Signal received → root token cancelled → server drains, checks stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{BackendEntry, BackendTable};
