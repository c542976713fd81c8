use chrono::{DateTime, Utc};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::reconcile::ChangeSet;
use crate::store::{ReconcileTransaction, StagingSink, TableStore};
use crate::types::TableRow;

/// Steps of a [`TableStore`] that can be made to fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultConfig {
    pub lock_run: bool,
    pub truncate_staging: bool,
    pub write_staging_rows: bool,
    pub count_staging_rows: bool,
    pub begin: bool,
    pub target_rows: bool,
    pub staging_rows: bool,
    /// Fails after the wrapped transaction applied the change set.
    pub apply: bool,
    /// Fails instead of committing; the wrapped transaction is dropped.
    pub commit: bool,
}

/// Wraps a [`TableStore`] and fails the steps selected in a [`FaultConfig`].
#[derive(Debug, Clone)]
pub struct FaultInjectingTableStore<S> {
    inner: S,
    faults: FaultConfig,
}

impl<S> FaultInjectingTableStore<S> {
    pub fn wrap(inner: S, faults: FaultConfig) -> Self {
        Self { inner, faults }
    }

    pub fn get_inner(&self) -> &S {
        &self.inner
    }
}

fn injected(enabled: bool, step: &'static str) -> CdcResult<()> {
    if enabled {
        bail!(
            ErrorKind::WarehouseQueryFailed,
            "Injected warehouse fault",
            format!("step `{step}` was configured to fail")
        );
    }

    Ok(())
}

impl<S> StagingSink for FaultInjectingTableStore<S>
where
    S: StagingSink + Sync,
{
    async fn write_staging_rows(&self, rows: Vec<TableRow>) -> CdcResult<()> {
        injected(self.faults.write_staging_rows, "write_staging_rows")?;
        self.inner.write_staging_rows(rows).await
    }
}

impl<S> TableStore for FaultInjectingTableStore<S>
where
    S: TableStore + Sync,
{
    type RunLock = S::RunLock;
    type Transaction = FaultInjectingTransaction<S::Transaction>;

    async fn lock_run(&self) -> CdcResult<S::RunLock> {
        injected(self.faults.lock_run, "lock_run")?;
        self.inner.lock_run().await
    }

    async fn unlock_run(&self, lock: S::RunLock) -> CdcResult<()> {
        self.inner.unlock_run(lock).await
    }

    async fn truncate_staging(&self) -> CdcResult<()> {
        injected(self.faults.truncate_staging, "truncate_staging")?;
        self.inner.truncate_staging().await
    }

    async fn count_staging_rows(&self) -> CdcResult<u64> {
        injected(self.faults.count_staging_rows, "count_staging_rows")?;
        self.inner.count_staging_rows().await
    }

    async fn begin(&self, lock: &S::RunLock) -> CdcResult<Self::Transaction> {
        injected(self.faults.begin, "begin")?;
        let inner = self.inner.begin(lock).await?;

        Ok(FaultInjectingTransaction {
            inner,
            faults: self.faults,
        })
    }
}

/// Transaction handed out by [`FaultInjectingTableStore`].
#[derive(Debug)]
pub struct FaultInjectingTransaction<T> {
    inner: T,
    faults: FaultConfig,
}

impl<T> ReconcileTransaction for FaultInjectingTransaction<T>
where
    T: ReconcileTransaction + Send,
{
    async fn target_rows(&mut self) -> CdcResult<Vec<TableRow>> {
        injected(self.faults.target_rows, "target_rows")?;
        self.inner.target_rows().await
    }

    async fn staging_rows(&mut self) -> CdcResult<Vec<TableRow>> {
        injected(self.faults.staging_rows, "staging_rows")?;
        self.inner.staging_rows().await
    }

    async fn apply(&mut self, change_set: &ChangeSet, changed_at: DateTime<Utc>) -> CdcResult<()> {
        self.inner.apply(change_set, changed_at).await?;
        injected(self.faults.apply, "apply")
    }

    async fn commit(self) -> CdcResult<()> {
        injected(self.faults.commit, "commit")?;
        self.inner.commit().await
    }
}
