use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Chunking configuration used when extracting and loading records.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of records extracted, transformed and loaded together.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
}

impl BatchConfig {
    /// Default chunk size.
    pub const DEFAULT_MAX_SIZE: usize = 50;

    /// Ensures `max_size` is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.batch.max_size",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}
