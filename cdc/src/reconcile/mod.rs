//! Row reconciliation between a staging snapshot and the target table.
//!
//! Both snapshots are read inside one store transaction, joined on the key column and
//! classified once. The resulting [`ChangeSet`] drives both the target mutation and the change
//! log, and everything commits together or not at all.

mod classify;
mod fingerprint;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

pub use classify::{Change, ChangeSet, RowClassification, classify_row};
pub use fingerprint::RowFingerprint;

use crate::error::{CdcError, CdcResult, RunFailure};
use crate::failpoints::{RECONCILE_BEFORE_COMMIT, cdc_fail_point};
use crate::store::{ReconcileTransaction, TableStore};

/// Counts of a committed reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub unchanged: u64,
    /// Timestamp stamped on every change log entry of the run.
    pub changed_at: DateTime<Utc>,
}

impl ReconcileSummary {
    /// Number of change log entries written.
    pub fn changes(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }
}

/// Applies the difference between staging and target to a [`TableStore`].
///
/// The reconciler never retries. Failures before classification completes surface as
/// [`crate::error::ErrorKind::LoadFailure`], later failures as
/// [`crate::error::ErrorKind::ApplyFailure`]; in both cases the target is left as it was.
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    store: S,
}

impl<S> Reconciler<S>
where
    S: TableStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconciles staging into the target under a run lock taken from the same store.
    pub async fn reconcile(&self, lock: &S::RunLock) -> CdcResult<ReconcileSummary> {
        let mut transaction = self.store.begin(lock).await.map_err(load_failure)?;

        let target = transaction.target_rows().await.map_err(load_failure)?;
        let staging = transaction.staging_rows().await.map_err(load_failure)?;
        debug!(
            target_rows = target.len(),
            staging_rows = staging.len(),
            "read reconciliation snapshots"
        );

        let change_set = ChangeSet::classify(target, staging).map_err(load_failure)?;
        let changed_at = Utc::now();

        info!(
            inserts = change_set.inserts(),
            updates = change_set.updates(),
            deletes = change_set.deletes(),
            unchanged = change_set.unchanged(),
            "classified staging rows"
        );

        transaction
            .apply(&change_set, changed_at)
            .await
            .map_err(apply_failure)?;
        cdc_fail_point(RECONCILE_BEFORE_COMMIT).map_err(apply_failure)?;
        transaction.commit().await.map_err(apply_failure)?;

        Ok(ReconcileSummary {
            inserts: change_set.inserts(),
            updates: change_set.updates(),
            deletes: change_set.deletes(),
            unchanged: change_set.unchanged(),
            changed_at,
        })
    }
}

fn load_failure(err: CdcError) -> CdcError {
    warn!(error = %err.description(), "reconciliation aborted before classification");
    err.into_run_failure(RunFailure::Load)
}

fn apply_failure(err: CdcError) -> CdcError {
    warn!(error = %err.description(), "reconciliation could not apply changes");
    err.into_run_failure(RunFailure::Apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::{StagingSink, TableStore};
    use crate::store::memory::MemoryTableStore;
    use crate::types::{Cell, ChangeOp, TableRow};

    fn row(id: i64, name: &str, version: i64) -> TableRow {
        TableRow::new(Cell::I64(id), vec![name.into(), Cell::I64(version)])
    }

    #[tokio::test]
    async fn reconcile_commits_changes_and_log_together() {
        let store = MemoryTableStore::with_target_rows(vec![row(1, "a", 1)]);
        store
            .write_staging_rows(vec![row(1, "a", 2), row(2, "b", 1)])
            .await
            .unwrap();

        let lock = store.lock_run().await.unwrap();
        let summary = Reconciler::new(store.clone()).reconcile(&lock).await.unwrap();

        assert_eq!((summary.inserts, summary.updates, summary.deletes), (1, 1, 0));
        assert_eq!(store.target_rows().await, vec![row(1, "a", 2), row(2, "b", 1)]);
        let log = store.changelog().await;
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|entry| entry.changed_at == summary.changed_at));
        assert_eq!(log[0].op, ChangeOp::Update);
        assert_eq!(log[1].op, ChangeOp::Insert);
    }

    #[tokio::test]
    async fn duplicate_staging_keys_fail_as_load_failure() {
        let store = MemoryTableStore::new();
        store
            .write_staging_rows(vec![row(1, "a", 1), row(1, "a", 2)])
            .await
            .unwrap();

        let lock = store.lock_run().await.unwrap();
        let err = Reconciler::new(store.clone()).reconcile(&lock).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LoadFailure);
        assert!(err.has_kind(ErrorKind::DuplicateRowKey));
        assert!(store.changelog().await.is_empty());
    }

    #[tokio::test]
    async fn lock_from_another_store_is_a_load_failure() {
        let store = MemoryTableStore::new();
        let foreign = MemoryTableStore::new().lock_run().await.unwrap();

        let err = Reconciler::new(store).reconcile(&foreign).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LoadFailure);
        assert!(err.has_kind(ErrorKind::ConcurrentRun));
    }
}
