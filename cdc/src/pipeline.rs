//! One complete run: stage, reconcile, clean up and notify.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bail;
use crate::error::{CdcResult, ErrorKind, RunFailure};
use crate::failpoints::{PIPELINE_AFTER_LOAD, cdc_fail_point};
use crate::notification::{Notifier, RunCompletion};
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::staging::StagingLoader;
use crate::store::TableStore;

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub rows_loaded: u64,
    pub summary: ReconcileSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives a single run against a store, a staging loader and a notifier.
///
/// Every call to [`Pipeline::run`] starts from an empty staging table, so a failed run can be
/// retried by simply running again.
#[derive(Debug)]
pub struct Pipeline<S, L, N> {
    name: String,
    reconciler: Reconciler<S>,
    loader: L,
    notifier: N,
}

impl<S, L, N> Pipeline<S, L, N>
where
    S: TableStore + Sync,
    L: StagingLoader,
    N: Notifier,
{
    pub fn new(name: impl Into<String>, store: S, loader: L, notifier: N) -> Self {
        Self {
            name: name.into(),
            reconciler: Reconciler::new(store),
            loader,
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &S {
        self.reconciler.store()
    }

    /// Runs once under the store's run lock.
    ///
    /// The lock is held from the first staging truncate until staging is cleared after the
    /// commit, so no other run can touch staging in between. A run that finds the lock taken
    /// fails with [`ErrorKind::ConcurrentRun`] as a load failure.
    pub async fn run(&self) -> CdcResult<RunReport> {
        let started_at = Utc::now();
        info!(pipeline = %self.name, "starting run");

        let lock = self.store().lock_run().await.map_err(|err| {
            warn!(pipeline = %self.name, error = %err.description(), "could not lock the target table");
            err.into_run_failure(RunFailure::Load)
        })?;

        let result = self.run_locked(&lock).await;
        if let Err(err) = self.store().unlock_run(lock).await {
            warn!(pipeline = %self.name, error = %err, "failed to release the run lock");
        }
        let (rows_loaded, summary) = result?;

        let finished_at = Utc::now();
        let completion = RunCompletion {
            pipeline_name: self.name.clone(),
            finished_at,
        };
        if let Err(err) = self.notifier.notify_success(&completion).await {
            warn!(pipeline = %self.name, error = %err, "success notification failed");
        }

        info!(
            pipeline = %self.name,
            rows_loaded,
            changes = summary.changes(),
            "run finished"
        );

        Ok(RunReport {
            rows_loaded,
            summary,
            started_at,
            finished_at,
        })
    }

    async fn run_locked(&self, lock: &S::RunLock) -> CdcResult<(u64, ReconcileSummary)> {
        let rows_loaded = self.stage().await.map_err(|err| {
            warn!(pipeline = %self.name, error = %err.description(), "staging load failed");
            err.into_run_failure(RunFailure::Load)
        })?;

        let summary = self.reconciler.reconcile(lock).await?;
        info!(
            pipeline = %self.name,
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            unchanged = summary.unchanged,
            "reconciliation committed"
        );

        // Changes are committed from here on, cleanup must not fail the run.
        if let Err(err) = self.store().truncate_staging().await {
            warn!(pipeline = %self.name, error = %err, "failed to clear staging after commit");
        }

        Ok((rows_loaded, summary))
    }

    /// Truncates and reloads staging, returning the number of rows loaded.
    async fn stage(&self) -> CdcResult<u64> {
        let store = self.store();

        store.truncate_staging().await?;
        let rows_loaded = self.loader.load(store).await?;
        cdc_fail_point(PIPELINE_AFTER_LOAD)?;

        let staged = store.count_staging_rows().await?;
        if staged != rows_loaded {
            bail!(
                ErrorKind::StagingIncomplete,
                "Staging row count does not match the rows loaded",
                format!("loaded {rows_loaded} rows but staging holds {staged}")
            );
        }

        info!(pipeline = %self.name, rows = rows_loaded, "staging loaded");

        Ok(rows_loaded)
    }
}
