use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Exponential backoff applied to cycles failing with a transient error.
///
/// The delay before retry `n` (starting at zero) is
/// `min(initial_delay_ms * backoff_factor^n, max_delay_ms)`. Transient failures are retried
/// without an attempt limit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Delay before the first retry.
    ///
    /// Default: 100ms
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt. Must be >= 1.0.
    ///
    /// Default: 2.0
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for a single delay.
    ///
    /// Default: 10000ms (10 seconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

    pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

    pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.retry.backoff_factor",
                constraint: "must be a finite number >= 1.0",
            });
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.retry.max_delay_ms",
                constraint: "must be >= `initial_delay_ms`",
            });
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_backoff_factor() -> f64 {
    RetryConfig::DEFAULT_BACKOFF_FACTOR
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}
