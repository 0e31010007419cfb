//! Background tasks started alongside the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::security::rate_limit::DistributedRateLimiter;

/// Purge expired rate limit entries every `interval` until shutdown.
pub fn spawn_cleanup_task(
    limiter: Arc<DistributedRateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::debug!(interval = ?interval, "Rate limit cleanup task started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    limiter.cleanup().await;
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Rate limit cleanup task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::rate_limit::RateLimitRule;

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_purges_and_stops() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(DistributedRateLimiter::in_memory(clock.clone()));
        limiter
            .check_rate_limit("route", "client", &RateLimitRule::per_second(5))
            .await;
        assert_eq!(limiter.local_entries(), 1);

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_cleanup_task(limiter.clone(), Duration::from_secs(10), rx);

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(limiter.local_entries(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
