//! Exponential backoff around cluster calls
//!
//! The wrapper retries every error it sees. Which failures are worth retrying
//! is decided by the caller through what it lets escape the operation: the
//! reconciler checks existence outside of [`retry`] so a not-found read is
//! never retried.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

/// Backoff policy for cluster calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,

    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: u32,

    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    /// Upper bound on any delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Randomize each delay by up to +/-50%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_factor: 2,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(3000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before `attempt` (1-based), without jitter
    ///
    /// The first attempt runs immediately; attempt `n >= 2` waits
    /// `min(max_delay, min_delay * factor^(n-2))`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = attempt - 2;
        let multiplier = self.backoff_factor.max(1).saturating_pow(exponent);
        self.min_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Delay before `attempt`, jittered when enabled
    fn sleep_for(&self, attempt: u32) -> Duration {
        let base = self.delay_before(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor = rand::rng().random_range(0.5..1.5);
        base.mul_f64(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached
///
/// Each failure is logged with the attempt number and `description`. After the
/// last attempt the final error is returned as is.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    description: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, operation = description, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts,
                    operation = description,
                    error = %e,
                    "Attempt failed"
                );
                if attempt >= max_attempts {
                    return Err(e);
                }
                attempt += 1;
                tokio::time::sleep(policy.sleep_for(attempt)).await;
            }
        }
    }
}
