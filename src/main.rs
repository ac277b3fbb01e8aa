//! Reverse proxy with active health checking.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request          ┌──────────────────────────────────────────────┐
//!     ────────────────────────┼─▶ http::server ──▶ BackendTable (by Host)    │
//!                             │                        │                     │
//!                             │                        ▼                     │
//!                             │               LbStatusUpdater ──▶ ServiceInfo │
//!                             │                        │                     │
//!                             │                        ▼                     │
//!     Client Response         │               WeightedRoundRobin ────────────┼──▶ Servers
//!     ◀───────────────────────┼────────────────────────┘                     │      ▲
//!                             │                                              │      │
//!                             │   HealthCheck: one task per backend ─────────┼──────┘
//!                             │   probe → upsert_server / remove_server      │  GET /path
//!                             └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use lb_healthcheck::config::{load_config, watcher::ConfigWatcher};
use lb_healthcheck::http::HttpServer;
use lb_healthcheck::lifecycle::{signals, Shutdown};
use lb_healthcheck::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "lb-healthcheck")]
#[command(about = "Reverse proxy with active backend health checks", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "lb-healthcheck.toml")]
    config: PathBuf,

    /// Overrides the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level)?;

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let (watcher, config_updates) = ConfigWatcher::new(&cli.config, Some(config.clone()));
    let _watcher = if cli.no_watch {
        None
    } else {
        Some(watcher.run()?)
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));

    HttpServer::new(config).run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
