use serde::Deserialize;

use crate::shared::{BatchConfig, ValidationError};

/// Identity and batching of a reconciliation pipeline.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// Human readable name, used in logs and notifications.
    pub name: String,
    /// Staging write batching.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::invalid("pipeline.name", "must not be empty"));
        }

        self.batch.validate()
    }
}
