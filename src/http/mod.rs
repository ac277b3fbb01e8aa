//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing and timeout layers)
//!     → Host header selects a backend (lifecycle::startup::BackendTable)
//!     → BalancerHandler::serve forwards to a live server
//!     → Send to client
//! ```

pub mod server;

pub use server::HttpServer;
