//! Retry with exponential backoff for object store calls.

use crate::upload::store::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// How often and how patiently a failed store call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(ms)
    }
}

/// Run `operation` until it succeeds, fails with a permanent error, or runs
/// out of attempts. Returns the last error in the latter two cases.
///
/// # Errors
/// Returns the error of the final attempt.
pub fn retry_with_backoff<F, T>(config: &RetryConfig, mut operation: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind.is_transient() && attempt < config.max_attempts => {
                let delay = config.delay_after(attempt);
                debug!(attempt, delay_ms = crate::pipeline::millis(delay), error = %err, "retrying");
                std::thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}
