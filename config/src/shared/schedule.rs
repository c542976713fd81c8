use std::time::Duration;

use serde::Deserialize;

use crate::shared::ValidationError;

/// Cadence and retry policy of scheduled runs.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Seconds between the start of consecutive runs. `None` runs once and exits.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Starts scheduled runs on multiples of the interval since the Unix epoch, so an hourly
    /// interval runs at the top of every hour. When `false` the first run starts immediately.
    #[serde(default = "default_align_to_interval")]
    pub align_to_interval: bool,
    /// Attempts per scheduled run, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound on the duration of a single attempt.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl ScheduleConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 60_000;
    pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3 * 60 * 60;

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::invalid(
                "schedule.max_attempts",
                "must be greater than 0",
            ));
        }

        if self.run_timeout_secs == 0 {
            return Err(ValidationError::invalid(
                "schedule.run_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.interval_secs == Some(0) {
            return Err(ValidationError::invalid(
                "schedule.interval_secs",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: None,
            align_to_interval: default_align_to_interval(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

fn default_align_to_interval() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    ScheduleConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    ScheduleConfig::DEFAULT_RETRY_DELAY_MS
}

fn default_run_timeout_secs() -> u64 {
    ScheduleConfig::DEFAULT_RUN_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_retry_once_after_a_minute() {
        let schedule: ScheduleConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(schedule, ScheduleConfig::default());
        assert_eq!(schedule.max_attempts, 2);
        assert_eq!(schedule.retry_delay(), Duration::from_secs(60));
        assert_eq!(schedule.run_timeout(), Duration::from_secs(10800));
        assert_eq!(schedule.interval(), None);
        assert!(schedule.align_to_interval);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let schedule = ScheduleConfig {
            max_attempts: 0,
            ..ScheduleConfig::default()
        };

        assert!(schedule.validate().is_err());
    }
}
