//! Backoff policies
//!
//! Two policies live here:
//! - [`with_retry`] re-runs an async operation with exponential backoff while
//!   its error is [`IsRetryable`]. Submissions use it, and only for failures
//!   where the request never reached the service.
//! - [`PollBackoff`] picks the jittered pause between poll passes.
//!
//! # Example
//!
//! ```no_run
//! use genbatch::retry::{IsRetryable, with_retry};
//! use genbatch::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let attempted = with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await;
//! println!("took {} attempt(s)", attempted.attempts);
//! attempted.result?;
//! # Ok(())
//! # }
//! ```

use crate::config::{PollConfig, RetryConfig};
use crate::error::SubmissionError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Only failures that are safe to repeat should return `true`. The create-job
/// call is not idempotent, so anything that might have reached the service is
/// permanent from the retry loop's point of view.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SubmissionError {
    fn is_retryable(&self) -> bool {
        // A request that never connected cannot have created a job.
        matches!(self, SubmissionError::Unreachable(_))
    }
}

/// Outcome of [`with_retry`]: the final result and how many attempts it took
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Last result
    pub result: Result<T, E>,
    /// Number of times the operation ran (at least 1)
    pub attempts: u32,
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `config.max_attempts` times (at least once).
/// Non-retryable errors return immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return Attempted {
                    result: Ok(result),
                    attempts,
                };
            }
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    max_attempts,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Attempted {
                    result: Err(e),
                    attempts,
                };
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result is uniformly distributed in `[delay, 2 * delay]`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Jittered pause between poll passes
///
/// Each call to [`next_interval`](PollBackoff::next_interval) draws a fresh
/// value uniformly from `[min, max]`, so the mean pause converges on
/// `(min + max) / 2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollBackoff {
    /// Lower bound (inclusive)
    pub min: Duration,
    /// Upper bound (inclusive)
    pub max: Duration,
}

impl PollBackoff {
    /// Create a policy; bounds are swapped if given in the wrong order
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Build from the polling configuration
    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.min_interval, config.max_interval)
    }

    /// Draw the next pause
    pub fn next_interval(&self) -> Duration {
        let unit: f64 = rand::thread_rng().gen_range(0.0..=1.0);
        self.interval_at(unit)
    }

    /// Pause for a given point `unit` in `[0, 1]` of the band
    pub fn interval_at(&self, unit: f64) -> Duration {
        let unit = unit.clamp(0.0, 1.0);
        let span = self.max.saturating_sub(self.min).as_secs_f64();
        self.min + Duration::from_secs_f64(span * unit)
    }

    /// Next pause, never longer than `remaining`
    pub fn next_within(&self, remaining: Duration) -> Duration {
        self.next_interval().min(remaining)
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}
