//! Retry and circuit breaking for outbound provider calls.
//!
//! - [`RetryExecutor`] - exponential backoff with jitter, driven by [`RetryPolicy`]
//! - [`CircuitBreaker`] - fails fast while a provider is down
//! - [`Classify`] - decides whether an error is worth another attempt

mod circuit;
mod retry;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{Classify, RetryClass, RetryExecutor, RetryOutcome, RetryPolicy, with_retry};
