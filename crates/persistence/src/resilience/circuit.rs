//! Circuit breaker for a single outbound provider.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ProviderError;

use super::retry::Classify;

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close it again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// How long the circuit stays open before a probe is allowed.
    #[serde(default = "default_open_duration")]
    pub open_duration_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_duration() -> u64 {
    30
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_duration_secs: default_open_duration(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Sets the open duration.
    pub fn with_open_duration_secs(mut self, secs: u64) -> Self {
        self.open_duration_secs = secs;
        self
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast.
    Open,
    /// Calls pass through as probes.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

/// Fails calls fast while a provider is known to be down.
///
/// Only transient failures count toward opening. A permanent failure says
/// nothing about provider health and leaves the state unchanged.
///
/// The breaker's own [`ProviderError::CircuitOpen`] is permanent, so a
/// [`RetryExecutor`](super::RetryExecutor) wrapped around [`call`](Self::call)
/// stops at once instead of retrying into an open circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    state: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for `provider`.
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            state: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    /// Returns the provider name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the current state, moving Open to HalfOpen once the open
    /// duration has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        match *state {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Runs `op` unless the circuit is open.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<ProviderError>,
    {
        if self.state() == CircuitState::Open {
            return Err(ProviderError::CircuitOpen {
                provider: self.provider.clone(),
            }
            .into());
        }

        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) if e.is_transient() => self.record_failure(),
            Err(_) => {}
        }
        result
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        match *state {
            Inner::Closed { ref mut failures } => *failures = 0,
            Inner::HalfOpen { ref mut successes } => {
                *successes += 1;
                if *successes >= self.config.success_threshold {
                    info!(provider = %self.provider, "Circuit closed");
                    *state = Inner::Closed { failures: 0 };
                }
            }
            Inner::Open { .. } => {}
        }
    }

    /// Records a transient failure.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        match *state {
            Inner::Closed { ref mut failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    warn!(
                        provider = %self.provider,
                        failures = *failures,
                        "Circuit opened"
                    );
                    *state = Inner::Open {
                        since: Instant::now(),
                    };
                }
            }
            Inner::HalfOpen { .. } => {
                warn!(provider = %self.provider, "Probe failed, circuit reopened");
                *state = Inner::Open {
                    since: Instant::now(),
                };
            }
            Inner::Open { .. } => {}
        }
    }

    /// Forces the breaker closed.
    pub fn reset(&self) {
        *self.state.lock() = Inner::Closed { failures: 0 };
    }

    fn refresh(&self, state: &mut Inner) {
        if let Inner::Open { since } = *state {
            if since.elapsed() >= Duration::from_secs(self.config.open_duration_secs) {
                info!(provider = %self.provider, "Circuit half-open");
                *state = Inner::HalfOpen { successes: 0 };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{RetryExecutor, RetryPolicy};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "twilio",
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_open_duration_secs(10),
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), ProviderError> {
        b.call(|| async { Err(ProviderError::timeout("twilio")) })
            .await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), ProviderError> {
        b.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let b = breaker();
        for _ in 0..3 {
            assert!(matches!(fail(&b).await, Err(ProviderError::Transient { .. })));
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert!(matches!(
            succeed(&b).await,
            Err(ProviderError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failures_do_not_open() {
        let b = breaker();
        for _ in 0..10 {
            let _ = b
                .call(|| async {
                    Err::<(), _>(ProviderError::from_http_status("twilio", 400, "bad"))
                })
                .await;
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_recovery() {
        let b = breaker();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(b.state(), CircuitState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let b = breaker();
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_at_open_circuit() {
        let b = Arc::new(breaker());
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new("twilio", RetryPolicy::default().with_max_retries(10));

        let result: Result<(), ProviderError> = executor
            .execute(|| {
                let b = b.clone();
                let calls = calls.clone();
                async move {
                    b.call(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(ProviderError::connection_reset("twilio"))
                    })
                    .await
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
        // Three real calls opened the circuit; the fourth attempt failed fast
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
