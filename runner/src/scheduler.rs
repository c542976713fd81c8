//! Cadence, retries and timeouts around pipeline runs.

use std::future::Future;
use std::time::Duration;

use cdc::bail;
use cdc::error::{CdcResult, ErrorKind};
use cdc::notification::Notifier;
use cdc::pipeline::{Pipeline, RunReport};
use cdc::staging::StagingLoader;
use cdc::store::TableStore;
use chrono::{DateTime, Utc};
use config::shared::ScheduleConfig;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Drives a [`Pipeline`] according to a [`ScheduleConfig`].
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    /// Runs the pipeline once with retries, or on every interval tick until `shutdown` resolves.
    ///
    /// Shutdown is only observed between runs, an ongoing run always finishes. In run-once mode
    /// the error of the last failed attempt is returned; scheduled runs log failures and wait for
    /// the next tick.
    pub async fn run<S, L, N, F>(&self, pipeline: &Pipeline<S, L, N>, shutdown: F) -> CdcResult<()>
    where
        S: TableStore + Sync,
        L: StagingLoader,
        N: Notifier,
        F: Future<Output = ()>,
    {
        let Some(interval) = self.config.interval() else {
            self.run_with_retries(pipeline).await?;
            return Ok(());
        };

        let first_delay = if self.config.align_to_interval {
            delay_until_boundary(Utc::now(), interval)
        } else {
            Duration::ZERO
        };

        info!(
            pipeline = pipeline.name(),
            interval_secs = interval.as_secs(),
            first_run_in_secs = first_delay.as_secs(),
            "starting scheduled runs"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + first_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(pipeline = pipeline.name(), "shutdown requested, stopping schedule");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.run_with_retries(pipeline).await {
                error!(
                    pipeline = pipeline.name(),
                    error = %err,
                    "scheduled run failed, waiting for the next one"
                );
            }
        }
    }

    /// Runs up to `max_attempts` full attempts, each bounded by the run timeout.
    pub async fn run_with_retries<S, L, N>(&self, pipeline: &Pipeline<S, L, N>) -> CdcResult<RunReport>
    where
        S: TableStore + Sync,
        L: StagingLoader,
        N: Notifier,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.run_attempt(pipeline).await {
                Ok(report) => return Ok(report),
                Err(err) if attempt < max_attempts => {
                    warn!(
                        pipeline = pipeline.name(),
                        attempt,
                        max_attempts,
                        retry_delay_ms = self.config.retry_delay_ms,
                        error = %err,
                        "run attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        pipeline = pipeline.name(),
                        attempt,
                        error = %err,
                        "run failed, no attempts left"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn run_attempt<S, L, N>(&self, pipeline: &Pipeline<S, L, N>) -> CdcResult<RunReport>
    where
        S: TableStore + Sync,
        L: StagingLoader,
        N: Notifier,
    {
        let timeout = self.config.run_timeout();
        match tokio::time::timeout(timeout, pipeline.run()).await {
            Ok(result) => result,
            Err(_) => {
                bail!(
                    ErrorKind::RunTimedOut,
                    "Run exceeded its timeout",
                    format!("the run did not finish within {}s", timeout.as_secs())
                );
            }
        }
    }
}

/// Time from `now` until the next multiple of `interval` since the Unix epoch.
fn delay_until_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let period = interval.as_millis().max(1);
    let elapsed = u128::try_from(now.timestamp_millis()).unwrap_or(0);
    let remainder = elapsed % period;
    if remainder == 0 {
        return Duration::ZERO;
    }

    Duration::from_millis(u64::try_from(period - remainder).unwrap_or(u64::MAX))
}
