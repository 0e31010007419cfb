//! Load testing for the gateway and the rate limiter under contention.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aias_gateway::config::RouteRateLimit;
use aias_gateway::http::HttpServer;
use aias_gateway::{DistributedRateLimiter, RateLimitRule, SystemClock};
use axum::http::StatusCode;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_never_exceed_limit() {
    let limiter = Arc::new(DistributedRateLimiter::in_memory(Arc::new(SystemClock)));
    let rule = RateLimitRule::new(Duration::from_secs(60), 50);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let limiter = limiter.clone();
        tasks.push(tokio::spawn(async move {
            let mut allowed = 0;
            for _ in 0..25 {
                if limiter.check_rate_limit("burst", "client", &rule).await.allowed {
                    allowed += 1;
                }
            }
            allowed
        }));
    }

    let mut total_allowed = 0;
    for task in tasks {
        total_allowed += task.await.unwrap();
    }
    assert_eq!(total_allowed, 50);
}

#[tokio::test]
async fn test_load_performance() {
    let backend_addr: SocketAddr = "127.0.0.1:28701".parse().unwrap();
    let gateway_addr: SocketAddr = "127.0.0.1:28702".parse().unwrap();
    common::start_mock_backend(backend_addr, "Hello from upstream").await;

    let mut config = common::single_route_config(gateway_addr, backend_addr);
    config.routes[0].rate_limit = Some(RouteRateLimit {
        window_ms: 60_000,
        max_requests: 600,
    });
    let (shutdown, _) = common::spawn_gateway(HttpServer::new(config), gateway_addr).await;

    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}", gateway_addr);
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let mut limited = 0;
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    match res.status() {
                        StatusCode::OK => latencies.push(req_start.elapsed()),
                        StatusCode::TOO_MANY_REQUESTS => limited += 1,
                        _ => {}
                    }
                }
            }
            (latencies, limited)
        }));
    }

    let mut all_latencies = Vec::new();
    let mut total_limited = 0;
    for task in tasks {
        let (latencies, limited) = task.await.unwrap();
        all_latencies.extend(latencies);
        total_limited += limited;
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    // Every request comes from 127.0.0.1, so one counter covers them all.
    assert_eq!(total_limited, total_requests - 600);
    assert!(!all_latencies.is_empty(), "No successful requests recorded");
    assert!(all_latencies.len() <= 600);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("Admitted:       {}/{}", all_latencies.len(), total_requests);
    println!("-------------------------\n");

    shutdown.trigger();
}
