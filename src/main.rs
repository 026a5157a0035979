//! CRM integration bridge.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                        BRIDGE                            │
//!                  │                                                          │
//!  Chat platform   │  ┌──────────┐   ┌─────────┐   ┌──────────────────────┐   │
//!  / API client ───┼─▶│   http   │──▶│ routing │──▶│  pipeline            │   │
//!                  │  │  server  │   │  table  │   │  rate limit          │   │
//!                  │  └──────────┘   └─────────┘   │  signature / auth    │   │
//!                  │       ▲                       │  validation, replay  │   │
//!                  │       │ uniform JSON          └──────────┬───────────┘   │
//!  ◀───────────────┼───────┘                                  │               │
//!                  │                                          ▼               │
//!                  │                                ┌───────────────────┐     │
//!                  │                                │ dispatch queue    │─────┼──▶ CRM worker
//!                  │                                └───────────────────┘     │
//!                  │                                                          │
//!                  │  config (hot reload) · observability · lifecycle · admin │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use crm_bridge::config::loader::{load_config, load_default_config};
use crm_bridge::config::watcher::ConfigWatcher;
use crm_bridge::lifecycle::signals::spawn_signal_handler;
use crm_bridge::lifecycle::Shutdown;
use crm_bridge::observability::{logging, metrics};
use crm_bridge::pipeline::QueueDispatcher;
use crm_bridge::security::redact;
use crm_bridge::HttpServer;

#[derive(Parser)]
#[command(name = "crm-bridge")]
#[command(about = "Webhook and API security bridge for the CRM", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Capacity of the dispatch queue
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_default_config()?,
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "crm-bridge starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.0.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();

    let (dispatcher, mut events) = QueueDispatcher::channel(args.queue_capacity);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(
                request_id = %event.request_id,
                route = %event.route,
                event_id = event.event_id.as_deref().unwrap_or("-"),
                principal = %event.principal.as_deref().map(redact::identity).unwrap_or_default(),
                payload = %redact::payload(&event.payload),
                "Event dispatched"
            );
        }
    });

    let server = HttpServer::new(config, Arc::new(dispatcher));

    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            server.spawn_config_updates(updates, &shutdown);
            Some(watcher.run()?)
        }
        None => None,
    };

    spawn_signal_handler(shutdown.clone());
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
