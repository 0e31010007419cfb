//! Hot reload of the gateway configuration file.
//!
//! Each write to the file is loaded and validated again. Only configs that
//! pass validation reach the server; a bad edit is logged and the running
//! route table stays in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Watches one config file and publishes every valid revision.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Updates stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let reload_path = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reload(&reload_path, &update_tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<GatewayConfig>) {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(
                routes = config.routes.len(),
                upstreams = config.upstreams.len(),
                "Config file changed, publishing new route table"
            );
            if tx.send(config).is_err() {
                tracing::debug!("Config receiver gone, dropping update");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected config change, keeping current configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEADS: &str = r#"
[[upstreams]]
name = "crm"
base_url = "http://127.0.0.1:9100"

[[routes]]
name = "leads"
path_prefix = "/api/leads"
upstream = "crm"
"#;

    const PAYMENTS: &str = r#"
[[upstreams]]
name = "stripe"
base_url = "http://127.0.0.1:9200"

[[routes]]
name = "payments"
path_prefix = "/api/payments"
upstream = "stripe"
"#;

    const ORPHAN: &str = r#"
[[routes]]
name = "orphan"
path_prefix = "/api/orphan"
upstream = "missing"
"#;

    /// Wait for a published config carrying `route`, failing on any that
    /// carries `forbidden`.
    async fn wait_for_route(
        rx: &mut mpsc::UnboundedReceiver<GatewayConfig>,
        route: &str,
        forbidden: &str,
    ) -> GatewayConfig {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let config = rx.recv().await.expect("watcher channel closed");
                let names: Vec<&str> = config.routes.iter().map(|r| r.name.as_str()).collect();
                assert!(!names.contains(&forbidden), "published rejected config: {:?}", names);
                if names.contains(&route) {
                    return config;
                }
            }
        })
        .await
        .expect("no config update within 10s")
    }

    #[tokio::test]
    async fn test_rewrite_publishes_new_routes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aias.toml");
        std::fs::write(&path, LEADS).unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(&path, PAYMENTS).unwrap();
        let config = wait_for_route(&mut rx, "payments", "orphan").await;
        assert_eq!(config.upstreams[0].name, "stripe");
        assert_eq!(config.routes[0].path_prefix, "/api/payments");
    }

    #[tokio::test]
    async fn test_invalid_rewrite_is_not_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aias.toml");
        std::fs::write(&path, LEADS).unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(&path, ORPHAN).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(&path, PAYMENTS).unwrap();

        wait_for_route(&mut rx, "payments", "orphan").await;
    }
}
