//! AIAS resilience gateway.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                  AIAS GATEWAY                    │
//!   Client        │  ┌──────────┐   ┌────────────┐   ┌────────────┐  │
//!   ──────────────┼─▶│rate limit│──▶│  routing   │──▶│  circuit   │──┼──▶ Upstream
//!                 │  │middleware│   │ (prefix)   │   │  breaker   │  │    service
//!                 │  └────┬─────┘   └────────────┘   └────────────┘  │
//!                 │       │                                          │
//!                 │       ▼                                          │
//!                 │  redis → kv rest → in-process map                │
//!                 │                                                  │
//!                 │  admin API · config watcher · metrics · cleanup  │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `aias-gateway [CONFIG_PATH]` (default `aias.toml`; defaults are
//! used when the file does not exist).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use aias_gateway::admin::setup_admin_router;
use aias_gateway::config::watcher::ConfigWatcher;
use aias_gateway::config::{load_config, GatewayConfig};
use aias_gateway::http::HttpServer;
use aias_gateway::lifecycle::{wait_for_signal, Shutdown};
use aias_gateway::observability::{logging, metrics};
use aias_gateway::resilience::CircuitBreakerRegistry;
use aias_gateway::security::DistributedRateLimiter;

const DEFAULT_CONFIG_PATH: &str = "aias.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        let mut config = GatewayConfig::default();
        aias_gateway::config::loader::apply_overrides(&mut config, |k| std::env::var(k).ok());
        config
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "aias-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        upstreams = config.upstreams.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let limiter = Arc::new(DistributedRateLimiter::from_config(&config.rate_limit.store).await);
    let breakers = CircuitBreakerRegistry::new();
    let server = HttpServer::with_components(config.clone(), limiter, breakers);

    let shutdown = Shutdown::new();

    // Keep the watcher alive for the life of the process.
    let (config_updates, _watcher) = if config_path.exists() {
        let (watcher, rx) = ConfigWatcher::new(&config_path);
        match watcher.run() {
            Ok(handle) => (rx, Some(handle)),
            Err(e) => {
                tracing::warn!(error = %e, "Config hot reload disabled");
                (mpsc::unbounded_channel().1, None)
            }
        }
    } else {
        (mpsc::unbounded_channel().1, None)
    };

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin_app = setup_admin_router(server.state());
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin_app)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
