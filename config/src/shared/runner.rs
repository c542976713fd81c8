use serde::Deserialize;

use crate::Config;
use crate::shared::{
    NotificationsConfig, PgConnectionConfig, PipelineConfig, ScheduleConfig, SourceConfig,
    TablesConfig, ValidationError,
};

/// Complete configuration of the runner service.
///
/// This intentionally does not implement `Serialize` to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub pipeline: PipelineConfig,
    /// Database holding the target, staging and changelog tables.
    pub warehouse: PgConnectionConfig,
    pub tables: TablesConfig,
    pub source: SourceConfig,
    /// Completion notifications. Runs finish silently when unset.
    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.warehouse.validate("warehouse")?;
        self.tables.validate()?;
        self.source.validate()?;
        if let Some(notifications) = &self.notifications {
            notifications.validate()?;
        }
        self.schedule.validate()
    }
}

impl Config for RunnerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["notifications.email.addresses"];
}
