//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID, concurrency, rate limit)
//! - Bind server to listener
//! - Dispatch requests to the route table
//! - Forward requests to upstreams through their circuit breakers
//! - Swap the route table on config reload

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::SystemClock;
use crate::config::GatewayConfig;
use crate::http::middleware::rate_limit_middleware;
use crate::http::request::{forwarded_headers, request_id};
use crate::http::response::GatewayError;
use crate::lifecycle::startup::spawn_cleanup_task;
use crate::observability::metrics;
use crate::resilience::{CircuitBreakerError, CircuitBreakerRegistry};
use crate::routing::Router as GatewayRouter;
use crate::security::rate_limit::DistributedRateLimiter;

/// Snapshot replaced wholesale on every config reload.
#[derive(Debug)]
pub struct InnerState {
    pub config: GatewayConfig,
    pub router: GatewayRouter,
}

impl InnerState {
    fn new(config: GatewayConfig) -> Self {
        let router = GatewayRouter::new(&config);
        Self { config, router }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<InnerState>>,
    pub breakers: CircuitBreakerRegistry,
    pub limiter: Arc<DistributedRateLimiter>,
    pub client: Client<HttpConnector, Body>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        limiter: Arc<DistributedRateLimiter>,
        breakers: CircuitBreakerRegistry,
    ) -> Self {
        register_upstreams(&config, &breakers);
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            inner: Arc::new(ArcSwap::from_pointee(InnerState::new(config))),
            breakers,
            limiter,
            client,
            started_at: Instant::now(),
        }
    }

    /// Install a new configuration. Breakers for upstreams that already
    /// exist keep their state and thresholds.
    pub fn apply_config(&self, config: GatewayConfig) {
        register_upstreams(&config, &self.breakers);
        let routes = config.routes.len();
        self.inner.store(Arc::new(InnerState::new(config)));
        tracing::info!(routes, "Configuration applied");
    }
}

fn register_upstreams(config: &GatewayConfig, breakers: &CircuitBreakerRegistry) {
    for upstream in &config.upstreams {
        breakers.get_or_create(config.breaker_config(upstream));
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Server with an in-process rate limiter and fresh breakers.
    pub fn new(config: GatewayConfig) -> Self {
        let limiter = DistributedRateLimiter::in_memory(Arc::new(SystemClock))
            .with_key_prefix(config.rate_limit.store.key_prefix.clone());
        Self::with_components(config, Arc::new(limiter), CircuitBreakerRegistry::new())
    }

    pub fn with_components(
        config: GatewayConfig,
        limiter: Arc<DistributedRateLimiter>,
        breakers: CircuitBreakerRegistry,
    ) -> Self {
        let state = AppState::new(config.clone(), limiter, breakers);
        let router = Self::build_router(&config, state.clone());
        Self { router, state }
    }

    /// Handle on the shared state, for the admin API.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until `shutdown` fires. Config updates received meanwhile
    /// replace the route table.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_state = self.state.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => reload_state.apply_config(config),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let inner = self.state.inner.load_full();
        let rate_limit = &inner.config.rate_limit;
        let cleanup = rate_limit.enabled.then(|| {
            spawn_cleanup_task(
                self.state.limiter.clone(),
                Duration::from_secs(rate_limit.cleanup_interval_secs),
                shutdown.resubscribe(),
            )
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        if let Some(handle) = cleanup {
            let _ = handle.await;
        }
        self.state.limiter.close().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Why an upstream exchange counted as a failure.
enum UpstreamFailure {
    TimedOut,
    Transport(String),
    /// 5xx from the upstream; relayed to the client unchanged.
    Status(Response),
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Main gateway handler.
/// Looks up the route, then forwards through the upstream's breaker.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let inner = state.inner.load_full();
    let path = request.uri().path().to_string();
    let request_id = request_id(request.headers()).to_string();

    let Some(route) = inner.router.match_path(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request("none", 404, start);
        return GatewayError::NoRoute { path }.into_response();
    };

    // Detached so a dropped handler cannot skip the breaker's accounting.
    let forwarding = tokio::spawn({
        let state = state.clone();
        let inner = inner.clone();
        let upstream = route.upstream.clone();
        async move { forward(&state, &inner, &upstream, request).await }
    });
    let outcome = forwarding.await.unwrap_or_else(|e| {
        Err(GatewayError::Upstream {
            service: route.upstream.clone(),
            message: e.to_string(),
        })
    });

    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(request_id = %request_id, route = %route.name, error = %e, "Gateway error");
            e.into_response()
        }
    };

    metrics::record_request(&route.name, response.status().as_u16(), start);
    response
}

async fn forward(
    state: &AppState,
    inner: &InnerState,
    upstream_name: &str,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let upstream = inner
        .config
        .upstream(upstream_name)
        .ok_or_else(|| GatewayError::Upstream {
            service: upstream_name.to_string(),
            message: "upstream not configured".to_string(),
        })?;
    let service = upstream.name.clone();
    let breaker = state.breakers.get_or_create(inner.config.breaker_config(upstream));

    let uri = upstream_uri(&upstream.base_url, request.uri()).map_err(|e| GatewayError::Upstream {
        service: service.clone(),
        message: e.to_string(),
    })?;
    let (parts, body) = request.into_parts();
    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(body)
        .map_err(|e| GatewayError::Upstream {
            service: service.clone(),
            message: e.to_string(),
        })?;
    *outbound.headers_mut() = forwarded_headers(&parts.headers);

    let client = state.client.clone();
    let limit = Duration::from_secs(inner.config.timeouts.upstream_secs);

    let result = breaker
        .execute(move || async move {
            match tokio::time::timeout(limit, client.request(outbound)).await {
                Err(_) => Err(UpstreamFailure::TimedOut),
                Ok(Err(e)) => Err(UpstreamFailure::Transport(e.to_string())),
                Ok(Ok(resp)) if resp.status().is_server_error() => Err(UpstreamFailure::Status(relay(resp))),
                Ok(Ok(resp)) => Ok(relay(resp)),
            }
        })
        .await;

    match result {
        Ok(response) => Ok(response),
        Err(CircuitBreakerError::Open { .. }) => Err(GatewayError::CircuitOpen { service }),
        Err(CircuitBreakerError::Timeout { .. })
        | Err(CircuitBreakerError::Operation(UpstreamFailure::TimedOut)) => {
            Err(GatewayError::UpstreamTimeout { service })
        }
        Err(CircuitBreakerError::Operation(UpstreamFailure::Transport(message))) => {
            Err(GatewayError::Upstream { service, message })
        }
        Err(CircuitBreakerError::Operation(UpstreamFailure::Status(response))) => Ok(response),
    }
}

/// Stream an upstream response back without buffering the body.
fn relay(response: hyper::Response<Incoming>) -> Response {
    response.map(Body::new)
}

/// Join the upstream base URL with the request's path and query.
fn upstream_uri(base_url: &str, original: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
    let path_and_query = original.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{}{}", base_url.trim_end_matches('/'), path_and_query).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let original: Uri = "/api/payments?id=7".parse().unwrap();
        let uri = upstream_uri("http://127.0.0.1:4000/", &original).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:4000/api/payments?id=7");

        let based = upstream_uri("http://127.0.0.1:4000/v1", &original).unwrap();
        assert_eq!(based.path(), "/v1/api/payments");
    }

    #[tokio::test]
    async fn test_apply_config_registers_new_upstreams() {
        let state = AppState::new(
            GatewayConfig::default(),
            Arc::new(DistributedRateLimiter::in_memory(Arc::new(SystemClock))),
            CircuitBreakerRegistry::new(),
        );
        assert!(state.breakers.is_empty());

        let config: GatewayConfig = toml::from_str(
            r#"
            [[upstreams]]
            name = "wave"
            base_url = "http://127.0.0.1:4001"

            [[routes]]
            name = "mobile-money"
            path_prefix = "/wave"
            upstream = "wave"
            "#,
        )
        .unwrap();
        state.apply_config(config);

        assert_eq!(state.breakers.names(), vec!["wave".to_string()]);
        assert_eq!(state.inner.load().router.len(), 1);
    }
}
