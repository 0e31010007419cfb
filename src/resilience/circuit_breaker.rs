//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast or take the fallback
//! - Half-Open: probing whether the upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: first call (or is_open poll) at or after next_attempt_time
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream service name (see `registry.rs`)
//! - Fail fast in Open state; the wrapped operation is never invoked
//! - State lives behind a mutex that is never held across an `.await`
//! - No call timeout unless `call_timeout` is configured

use std::fmt;
use std::future::{Future, Ready};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are rejected without reaching the upstream.
    Open,
    /// Trial calls decide whether to close or reopen.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Identity of the guarded service.
    pub name: String,
    /// Failures in Closed state before opening.
    pub failure_threshold: u32,
    /// Cooldown before a probe is allowed.
    pub timeout: Duration,
    /// Half-open successes required to close.
    pub success_threshold: u32,
    /// Accepted for compatibility; the state machine only reads `timeout`.
    pub reset_timeout: Duration,
    /// Optional deadline for each guarded call. Expiry counts as a failure.
    pub call_timeout: Option<Duration>,
}

impl CircuitBreakerConfig {
    /// Create a configuration with default thresholds for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            timeout: Duration::from_millis(60_000),
            success_threshold: 2,
            reset_timeout: Duration::from_millis(60_000),
            call_timeout: None,
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Point-in-time view of a breaker, for admin endpoints and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub last_failure_time: Option<u64>,
    pub last_success_time: Option<u64>,
    pub next_attempt_time: Option<u64>,
}

/// Errors surfaced by [`CircuitBreaker::execute`].
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open and no fallback was supplied.
    Open { name: String },
    /// The configured call timeout elapsed before the operation finished.
    Timeout { name: String, after: Duration },
    /// The operation (or fallback) returned an error.
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the call was rejected without reaching the upstream.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { name } => write!(f, "Circuit breaker '{}' is open", name),
            Self::Timeout { name, after } => {
                write!(f, "Call through '{}' timed out after {:?}", name, after)
            }
            Self::Operation(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CircuitBreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<u64>,
    last_success_time: Option<u64>,
    next_attempt_time: Option<u64>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
}

type NoFallback<T, E> = fn() -> Ready<Result<T, E>>;

/// Per-service circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker on the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a breaker on an explicit clock.
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state without triggering any transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` under the breaker.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, None::<NoFallback<T, E>>).await
    }

    /// Run `operation` under the breaker, answering with `fallback` while the
    /// circuit is open or when the operation fails.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        self.run(operation, Some(fallback)).await
    }

    async fn run<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: Option<G>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            metrics::record_circuit_rejection(&self.config.name);
            return match fallback {
                Some(fallback) => {
                    tracing::debug!(name = %self.config.name, "Circuit open, serving fallback");
                    fallback().await.map_err(CircuitBreakerError::Operation)
                }
                None => Err(CircuitBreakerError::Open {
                    name: self.config.name.clone(),
                }),
            };
        }

        let outcome = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(CircuitBreakerError::Operation),
                Err(_) => Err(CircuitBreakerError::Timeout {
                    name: self.config.name.clone(),
                    after: limit,
                }),
            },
            None => operation().await.map_err(CircuitBreakerError::Operation),
        };

        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                match fallback {
                    Some(fallback) => fallback().await.map_err(CircuitBreakerError::Operation),
                    None => Err(err),
                }
            }
        }
    }

    /// Side-effecting poll: an expired Open circuit moves to Half-Open and
    /// reports `false` so the next call becomes the probe.
    pub fn is_open(&self) -> bool {
        let now = self.clock.now_ms();
        let mut s = self.lock();
        if s.state == CircuitState::Open && self.cooldown_elapsed(&s, now) {
            self.half_open(&mut s);
            return false;
        }
        s.state == CircuitState::Open
    }

    /// Snapshot of state and counters.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let s = self.lock();
        CircuitBreakerMetrics {
            name: self.config.name.clone(),
            state: s.state,
            failure_count: s.failure_count,
            success_count: s.success_count,
            total_requests: s.total_requests,
            total_failures: s.total_failures,
            total_successes: s.total_successes,
            last_failure_time: s.last_failure_time,
            last_success_time: s.last_success_time,
            next_attempt_time: s.next_attempt_time,
        }
    }

    /// Force the breaker back to Closed with every counter zeroed.
    pub fn reset(&self) {
        let mut s = self.lock();
        let previous = s.state;
        *s = BreakerState::default();
        if previous != CircuitState::Closed {
            tracing::info!(name = %self.config.name, from = %previous, "Circuit breaker reset");
            metrics::record_circuit_transition(&self.config.name, CircuitState::Closed);
        }
    }

    /// Count the call and decide whether it may reach the upstream.
    fn admit(&self) -> bool {
        let now = self.clock.now_ms();
        let mut s = self.lock();
        s.total_requests += 1;

        let current = s.state;
        match current {
            CircuitState::Open if self.cooldown_elapsed(&s, now) => {
                self.half_open(&mut s);
                true
            }
            CircuitState::Open => false,
            CircuitState::Closed | CircuitState::HalfOpen => true,
        }
    }

    fn on_success(&self) {
        let now = self.clock.now_ms();
        let mut s = self.lock();
        s.total_successes += 1;
        s.last_success_time = Some(now);

        let current = s.state;
        match current {
            CircuitState::Closed => {
                s.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                s.success_count += 1;
                tracing::debug!(
                    name = %self.config.name,
                    successes = s.success_count,
                    threshold = self.config.success_threshold,
                    "Half-open probe succeeded"
                );
                if s.success_count >= self.config.success_threshold {
                    s.state = CircuitState::Closed;
                    s.failure_count = 0;
                    s.success_count = 0;
                    s.next_attempt_time = None;
                    tracing::info!(name = %self.config.name, "Circuit breaker closed");
                    metrics::record_circuit_transition(&self.config.name, CircuitState::Closed);
                }
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now_ms();
        let mut s = self.lock();
        s.total_failures += 1;
        s.failure_count += 1;
        s.last_failure_time = Some(now);

        let current = s.state;
        match current {
            CircuitState::HalfOpen => {
                tracing::warn!(name = %self.config.name, "Half-open probe failed, reopening circuit");
                self.trip(&mut s, now);
            }
            CircuitState::Closed if s.failure_count >= self.config.failure_threshold => {
                self.trip(&mut s, now);
            }
            CircuitState::Closed => {
                tracing::debug!(
                    name = %self.config.name,
                    failures = s.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, s: &mut BreakerState, now: u64) {
        let next_attempt = now.saturating_add(self.config.timeout.as_millis() as u64);
        s.state = CircuitState::Open;
        s.success_count = 0;
        s.next_attempt_time = Some(next_attempt);
        tracing::info!(
            name = %self.config.name,
            failures = s.failure_count,
            next_attempt_time = next_attempt,
            "Circuit breaker opened"
        );
        metrics::record_circuit_transition(&self.config.name, CircuitState::Open);
    }

    fn half_open(&self, s: &mut BreakerState) {
        s.state = CircuitState::HalfOpen;
        s.success_count = 0;
        tracing::info!(name = %self.config.name, "Circuit breaker entering half-open state");
        metrics::record_circuit_transition(&self.config.name, CircuitState::HalfOpen);
    }

    fn cooldown_elapsed(&self, s: &BreakerState, now: u64) -> bool {
        s.next_attempt_time.map_or(true, |at| now >= at)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still holds valid data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
