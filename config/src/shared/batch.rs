use serde::Deserialize;

use crate::shared::ValidationError;

/// Batching of rows written to the staging table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of rows written to staging in a single statement batch.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
}

impl BatchConfig {
    /// Default maximum batch size for staging writes.
    pub const DEFAULT_MAX_SIZE: usize = 10000;

    /// Ensures `max_size` is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::invalid(
                "pipeline.batch.max_size",
                "must be greater than 0",
            ));
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
