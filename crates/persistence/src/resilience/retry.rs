//! Exponential backoff with jitter for outbound provider calls.
//!
//! Each call runs as a small state machine:
//!
//! ```text
//! Attempt(n) --ok-------------------------> Success
//! Attempt(n) --transient, budget left-----> sleep(backoff(n)) -> Attempt(n + 1)
//! Attempt(n) --transient, budget spent----> last error
//! Attempt(n) --permanent------------------> error, no retry
//! ```
//!
//! The executor never swallows a failure. Writing the failed operation to the
//! dead-letter queue is left to the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BackendError, ProviderError, StorageError};

/// Whether an error is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Timeouts, resets, 5xx, 429 and similar.
    Transient,
    /// Everything that will fail the same way again.
    Permanent,
}

/// Classifies an error for the retry executor.
pub trait Classify {
    /// Returns the retry class of this error.
    fn retry_class(&self) -> RetryClass;

    /// Returns `true` if the error is transient.
    fn is_transient(&self) -> bool {
        self.retry_class() == RetryClass::Transient
    }
}

impl Classify for ProviderError {
    fn retry_class(&self) -> RetryClass {
        match self {
            ProviderError::Transient { .. } => RetryClass::Transient,
            ProviderError::Permanent { .. } | ProviderError::CircuitOpen { .. } => {
                RetryClass::Permanent
            }
        }
    }
}

impl Classify for StorageError {
    fn retry_class(&self) -> RetryClass {
        match self {
            StorageError::Provider(e) => e.retry_class(),
            StorageError::Backend(
                BackendError::Unavailable { .. }
                | BackendError::ConnectionFailed { .. }
                | BackendError::PoolExhausted { .. }
                | BackendError::TransactionTimeout { .. },
            ) => RetryClass::Transient,
            _ => RetryClass::Permanent,
        }
    }
}

/// Backoff parameters for one kind of outbound call.
///
/// The delay before retry `n` (zero-based) is
/// `min(initial_delay_ms * multiplier^n, max_delay_ms)`, moved by a uniform
/// random offset of at most `jitter_factor * delay / 2` either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor between successive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Relative jitter width, between 0 and 1.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// SMS sends: a few quick retries, the message is time sensitive.
    pub fn sms() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            ..Self::default()
        }
    }

    /// Payment calls: more patience, the provider may be rate limiting.
    pub fn payment() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
            ..Self::default()
        }
    }

    /// Outbound webhooks.
    pub fn webhook() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            ..Self::default()
        }
    }

    /// Sets the retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first delay.
    pub fn with_initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `retry` in milliseconds, without jitter.
    pub fn base_delay_ms(&self, retry: u32) -> f64 {
        let cap = self.max_delay_ms as f64;
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        // powi overflows to infinity, which min() folds back into the cap
        raw.min(cap)
    }

    /// Delay before retry `retry`, with jitter drawn from `rng`.
    pub fn jittered_delay<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.base_delay_ms(retry);
        let half_span = self.jitter_factor.clamp(0.0, 1.0) * base / 2.0;
        let offset = if half_span > 0.0 {
            rng.gen_range(-half_span..=half_span)
        } else {
            0.0
        };
        Duration::from_millis((base + offset).max(0.0).round() as u64)
    }
}

/// Result of a call together with what the executor did to get it.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result: the first success or the last error.
    pub result: Result<T, E>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Every delay slept between attempts, in order.
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Total time spent sleeping.
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// Attempts are strictly sequential.
///
/// # Example
///
/// ```
/// use chorus_persistence::error::ProviderError;
/// use chorus_persistence::resilience::{RetryExecutor, RetryPolicy};
///
/// # async fn send() -> Result<&'static str, ProviderError> { Ok("SM123") }
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), ProviderError> {
/// let executor = RetryExecutor::new("twilio", RetryPolicy::sms());
/// let sid = executor.execute(|| send()).await?;
/// assert_eq!(sid, "SM123");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    name: String,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor. `name` labels log events.
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    /// Returns the policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the executor's label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `op` until it succeeds, fails permanently or the budget is spent.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        self.execute_with_stats(op).await.result
    }

    /// Like [`execute`](Self::execute), also reporting attempts and delays.
    pub async fn execute_with_stats<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let max_attempts = self.policy.max_attempts();
        let mut delays = Vec::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = %self.name, attempt, "Succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        delays,
                    };
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!(
                    operation = %self.name,
                    attempt,
                    error = %error,
                    "Permanent failure, not retrying"
                );
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    delays,
                };
            }

            if attempt >= max_attempts {
                warn!(
                    operation = %self.name,
                    attempts = attempt,
                    error = %error,
                    "Retry budget exhausted"
                );
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    delays,
                };
            }

            let delay = self
                .policy
                .jittered_delay(attempt - 1, &mut rand::thread_rng());
            warn!(
                operation = %self.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retry scheduled"
            );
            tokio::time::sleep(delay).await;
            delays.push(delay);
        }
    }
}

/// Runs `op` under `policy` with an unnamed executor.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    RetryExecutor::new("operation", policy.clone())
        .execute(op)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenantError;
    use crate::tenant::TenantId;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(
        calls: &Arc<AtomicU32>,
        failures: u32,
        error: fn() -> ProviderError,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, ProviderError>> + Send>>
    {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures { Err(error()) } else { Ok(n) }
            })
        }
    }

    fn unavailable() -> ProviderError {
        ProviderError::from_http_status("twilio", 503, "service unavailable")
    }

    fn bad_request() -> ProviderError {
        ProviderError::from_http_status("twilio", 400, "invalid number")
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_503s_then_success_sleeps_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new("twilio", RetryPolicy::default());

        let outcome = executor
            .execute_with_stats(flaky(&calls, 2, unavailable))
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.delays.len(), 2);
        // 1000ms and 2000ms, each within +/- 5%
        let first = outcome.delays[0].as_millis();
        let second = outcome.delays[1].as_millis();
        assert!((950..=1050).contains(&first), "first delay {first}");
        assert!((1900..=2100).contains(&second), "second delay {second}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new("twilio", RetryPolicy::default());

        let outcome = executor
            .execute_with_stats(flaky(&calls, 10, bad_request))
            .await;

        assert!(matches!(outcome.result, Err(ProviderError::Permanent { .. })));
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.delays.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_open_is_not_retried() {
        let executor = RetryExecutor::new("twilio", RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), ProviderError> = executor
            .execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::CircuitOpen {
                        provider: "twilio".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default().with_max_retries(2);
        let executor = RetryExecutor::new("twilio", policy);

        let outcome = executor
            .execute_with_stats(flaky(&calls, u32::MAX, unavailable))
            .await;

        assert!(matches!(
            outcome.result,
            Err(ProviderError::Transient { status: Some(503), .. })
        ));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.delays.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(
            &RetryPolicy::default().with_max_retries(0),
            flaky(&calls, 1, unavailable),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_storage_error_classification() {
        let err: StorageError = BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        }
        .into();
        assert!(err.is_transient());

        let err: StorageError = TenantError::Suspended {
            tenant_id: TenantId::new("grace-chapel"),
        }
        .into();
        assert_eq!(err.retry_class(), RetryClass::Permanent);

        let err: StorageError = ProviderError::timeout("stripe").into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_base_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_ms(0), 1_000.0);
        assert_eq!(policy.base_delay_ms(1), 2_000.0);
        assert_eq!(policy.base_delay_ms(4), 16_000.0);
        assert_eq!(policy.base_delay_ms(5), 30_000.0);
        assert_eq!(policy.base_delay_ms(u32::MAX), 30_000.0);
    }

    #[test]
    fn test_no_jitter_is_exact() {
        let policy = RetryPolicy::default().with_jitter_factor(0.0);
        let mut rng = rand::thread_rng();
        assert_eq!(policy.jittered_delay(2, &mut rng), Duration::from_millis(4_000));
    }

    #[test]
    fn test_policy_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 7}"#).unwrap();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.initial_delay_ms, 1_000);
        assert_eq!(policy.jitter_factor, 0.1);
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic(
            initial in 1u64..10_000,
            extra in 0u64..100_000,
            multiplier in 1.0f64..4.0,
            retry in 0u32..40,
        ) {
            let policy = RetryPolicy::default()
                .with_initial_delay_ms(initial)
                .with_max_delay_ms(initial + extra)
                .with_multiplier(multiplier);

            let here = policy.base_delay_ms(retry);
            let next = policy.base_delay_ms(retry + 1);
            prop_assert!(here <= next);
            prop_assert!(next <= policy.max_delay_ms as f64);
        }

        #[test]
        fn prop_jitter_stays_in_band(retry in 0u32..10, jitter in 0.0f64..1.0) {
            let policy = RetryPolicy::default().with_jitter_factor(jitter);
            let base = policy.base_delay_ms(retry);
            let half = jitter * base / 2.0;
            let delay = policy.jittered_delay(retry, &mut rand::thread_rng()).as_millis() as f64;
            prop_assert!(delay >= (base - half).floor());
            prop_assert!(delay <= (base + half).ceil());
        }
    }
}
