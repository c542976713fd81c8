use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::CdcResult;
use crate::reconcile::ChangeSet;
use crate::types::TableRow;

/// Receives rows produced by a [`crate::staging::StagingLoader`].
pub trait StagingSink {
    /// Appends `rows` to the staging table.
    fn write_staging_rows(&self, rows: Vec<TableRow>) -> impl Future<Output = CdcResult<()>> + Send;
}

/// A warehouse holding one reconciled target table, its staging table and its change log.
///
/// Runs are serialized through a run lock. While one [`TableStore::RunLock`] is held,
/// [`TableStore::lock_run`] fails with [`crate::error::ErrorKind::ConcurrentRun`], so the staging
/// table is only ever written by the run holding the lock.
pub trait TableStore: StagingSink {
    type RunLock: Send + Sync;
    type Transaction: ReconcileTransaction + Send;

    /// Claims the target and staging tables for one run.
    fn lock_run(&self) -> impl Future<Output = CdcResult<Self::RunLock>> + Send;

    /// Releases a claim taken with [`TableStore::lock_run`].
    ///
    /// Dropping a lock without releasing it must release it as well, possibly later.
    fn unlock_run(&self, lock: Self::RunLock) -> impl Future<Output = CdcResult<()>> + Send;

    /// Removes every row from the staging table.
    fn truncate_staging(&self) -> impl Future<Output = CdcResult<()>> + Send;

    /// Counts the rows currently in the staging table.
    fn count_staging_rows(&self) -> impl Future<Output = CdcResult<u64>> + Send;

    /// Opens the atomic boundary for one reconciliation under `lock`.
    fn begin(
        &self,
        lock: &Self::RunLock,
    ) -> impl Future<Output = CdcResult<Self::Transaction>> + Send;
}

/// The atomic apply boundary of a single reconciliation.
///
/// Reads see the state as of [`TableStore::begin`] plus nothing else; writes become visible
/// only on [`ReconcileTransaction::commit`]. Dropping an uncommitted transaction discards every
/// write made through it.
pub trait ReconcileTransaction {
    /// Returns the target rows.
    fn target_rows(&mut self) -> impl Future<Output = CdcResult<Vec<TableRow>>> + Send;

    /// Returns the staging rows.
    fn staging_rows(&mut self) -> impl Future<Output = CdcResult<Vec<TableRow>>> + Send;

    /// Applies `change_set` to the target and appends its change log entries.
    fn apply(
        &mut self,
        change_set: &ChangeSet,
        changed_at: DateTime<Utc>,
    ) -> impl Future<Output = CdcResult<()>> + Send;

    /// Makes every write of this transaction durable.
    fn commit(self) -> impl Future<Output = CdcResult<()>> + Send;
}
