//! Retry policy for readiness probing
//!
//! Delays grow multiplicatively: a backend that stays cold sees a
//! thinning stream of probes rather than a request storm.

use std::time::Duration;

use thiserror::Error;

/// Default number of probes before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default wait before the first retry
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Default growth factor between consecutive retry delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;

/// Errors from constructing a retry policy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff_multiplier must be a finite number >= 1, got {0}")]
    InvalidMultiplier(f64),
}

/// Bounded, escalating retry schedule
///
/// Attempts are 1-indexed. Attempt 1 runs immediately; the delay before
/// attempt `n >= 2` is `initial_delay * backoff_multiplier^(n - 2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(backoff_multiplier));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Delay to wait before making `attempt`
    ///
    /// Zero for the first attempt. Saturates at `Duration::MAX` instead of
    /// overflowing for absurd attempt numbers.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Every retry delay in order (one entry per attempt after the first)
    pub fn schedule(&self) -> Vec<Duration> {
        (2..=self.max_attempts)
            .map(|attempt| self.delay_before(attempt))
            .collect()
    }

    /// Total time spent waiting between probes if every attempt fails
    pub fn total_wait(&self) -> Duration {
        self.schedule()
            .into_iter()
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}
