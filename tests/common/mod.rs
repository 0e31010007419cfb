//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aias_gateway::config::GatewayConfig;
use aias_gateway::http::{AppState, HttpServer};
use aias_gateway::lifecycle::Shutdown;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    start_programmable_backend(addr, move || async move { (200, response.to_string()) }).await;
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// In-memory stand-in for a managed KV REST endpoint.
#[derive(Debug, Default)]
pub struct MockKv {
    pub token: String,
    pub entries: Mutex<HashMap<String, String>>,
    pub failing: AtomicBool,
    pub calls: AtomicU32,
}

impl MockKv {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).map(|raw| serde_json::from_str(raw).unwrap())
    }
}

async fn kv_command(
    State(kv): State<Arc<MockKv>>,
    headers: HeaderMap,
    Json(args): Json<Vec<Value>>,
) -> (StatusCode, Json<Value>) {
    kv.calls.fetch_add(1, Ordering::SeqCst);

    let expected = format!("Bearer {}", kv.token);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
    }
    if kv.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "unavailable" })));
    }

    let command = args.first().and_then(Value::as_str).unwrap_or_default();
    let key = args.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
    let mut entries = kv.entries.lock().unwrap();
    match command {
        "GET" => (StatusCode::OK, Json(json!({ "result": entries.get(&key) }))),
        "SET" => {
            let value = args.get(2).and_then(Value::as_str).unwrap_or_default().to_string();
            entries.insert(key, value);
            (StatusCode::OK, Json(json!({ "result": "OK" })))
        }
        other => (
            StatusCode::OK,
            Json(json!({ "error": format!("ERR unknown command '{}'", other) })),
        ),
    }
}

/// Start a mock KV REST server. Returns its shared state.
pub async fn start_mock_kv(addr: SocketAddr, token: &str) -> Arc<MockKv> {
    let kv = Arc::new(MockKv {
        token: token.to_string(),
        ..MockKv::default()
    });
    let app = Router::new().route("/", post(kv_command)).with_state(kv.clone());
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    kv
}

/// Run `server` on `addr` until the returned coordinator fires.
pub async fn spawn_gateway(server: HttpServer, addr: SocketAddr) -> (Shutdown, AppState) {
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let state = server.state();
    let listener = TcpListener::bind(addr).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    (shutdown, state)
}

/// Gateway config listening on `addr` with a single catch-all route.
pub fn single_route_config(addr: SocketAddr, upstream_addr: SocketAddr) -> GatewayConfig {
    let mut config: GatewayConfig = toml::from_str(&format!(
        r#"
        [[upstreams]]
        name = "core"
        base_url = "http://{upstream_addr}"

        [[routes]]
        name = "all"
        path_prefix = "/"
        upstream = "core"
        "#
    ))
    .unwrap();
    config.listener.bind_address = addr.to_string();
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
