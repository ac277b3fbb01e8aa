//! Reverse proxy data plane with active health checking.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use health::HealthCheck;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
