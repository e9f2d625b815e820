use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, RetryConfig, ValidationError};

/// Scheduling and batching behaviour of the indexing loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    #[serde(default)]
    pub batch: BatchConfig,
    /// Pause between two consecutive cycles.
    ///
    /// Default: 60000ms (1 minute)
    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Age after which a running flag left behind by a crashed process is taken over.
    ///
    /// Default: 3600000ms (1 hour)
    #[serde(default = "default_stale_running_flag_ms")]
    pub stale_running_flag_ms: u64,
}

impl PipelineConfig {
    pub const DEFAULT_SLEEP_MS: u64 = 60_000;

    pub const DEFAULT_STALE_RUNNING_FLAG_MS: u64 = 3_600_000;

    pub fn sleep(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn stale_running_flag(&self) -> Duration {
        Duration::from_millis(self.stale_running_flag_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;
        self.retry.validate()?;

        if self.stale_running_flag_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.stale_running_flag_ms",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            sleep_ms: default_sleep_ms(),
            retry: RetryConfig::default(),
            stale_running_flag_ms: default_stale_running_flag_ms(),
        }
    }
}

fn default_sleep_ms() -> u64 {
    PipelineConfig::DEFAULT_SLEEP_MS
}

fn default_stale_running_flag_ms() -> u64 {
    PipelineConfig::DEFAULT_STALE_RUNNING_FLAG_MS
}
