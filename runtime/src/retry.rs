//! Retry with exponential backoff for write conflicts.
//!
//! Admission and lifecycle transactions re-run once when the store reports a
//! [`RegistrationError::WriteConflict`]. Every other error is returned as is.
//!
//! # Example
//!
//! ```rust
//! use seatline_runtime::retry::{RetryPolicy, retry_on_conflict};
//! use std::time::Duration;
//!
//! # async fn example() -> seatline_core::Result<()> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(1)
//!     .initial_delay(Duration::from_millis(20))
//!     .build();
//!
//! let value = retry_on_conflict(&policy, "example", || async { Ok(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use seatline_core::error::{RegistrationError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 1
/// - `initial_delay`: 25ms
/// - `max_delay`: 500ms
/// - `multiplier`: 2 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: 1,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }

    /// No retries at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
    }
}

/// Run `operation`, re-running it after a backoff delay while it fails with
/// [`RegistrationError::WriteConflict`] and retries remain.
///
/// `operation_name` labels the `seatline.write_conflict_retries` counter.
///
/// # Errors
///
/// Returns the operation's error when it is not a write conflict, or the last
/// conflict once retries are exhausted.
pub async fn retry_on_conflict<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err @ RegistrationError::WriteConflict(_)) if attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Write conflict, retrying"
                );
                metrics::counter!("seatline.write_conflict_retries", "operation" => operation_name)
                    .increment(1);

                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if matches!(err, RegistrationError::WriteConflict(_)) {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Write conflict persisted after retries"
                    );
                }
                return Err(err);
            }
        }
    }
}
