use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::reconcile::ChangeSet;
use crate::store::{ReconcileTransaction, StagingSink, TableStore};
use crate::types::{ChangeLogEntry, ChangeOp, RowKey, TableRow};

#[derive(Debug, Default)]
struct Inner {
    target: Vec<TableRow>,
    staging: Vec<TableRow>,
    changelog: Vec<ChangeLogEntry>,
}

/// In-memory table store for tests and local experiments.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<Inner>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose target table already holds `rows`.
    pub fn with_target_rows(rows: Vec<TableRow>) -> Self {
        let inner = Inner {
            target: rows,
            ..Inner::default()
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub async fn target_rows(&self) -> Vec<TableRow> {
        self.inner.lock().await.target.clone()
    }

    pub async fn staging_rows(&self) -> Vec<TableRow> {
        self.inner.lock().await.staging.clone()
    }

    pub async fn changelog(&self) -> Vec<ChangeLogEntry> {
        self.inner.lock().await.changelog.clone()
    }
}

impl StagingSink for MemoryTableStore {
    async fn write_staging_rows(&self, rows: Vec<TableRow>) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;
        debug!(rows = rows.len(), "writing rows to in-memory staging");
        inner.staging.extend(rows);

        Ok(())
    }
}

/// Run lock of a [`MemoryTableStore`], released on drop.
#[derive(Debug)]
pub struct MemoryRunLock {
    writer: Arc<Mutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl TableStore for MemoryTableStore {
    type RunLock = MemoryRunLock;
    type Transaction = MemoryReconcileTransaction;

    async fn lock_run(&self) -> CdcResult<MemoryRunLock> {
        let Ok(guard) = self.writer.clone().try_lock_owned() else {
            bail!(
                ErrorKind::ConcurrentRun,
                "Another run holds the target table"
            );
        };

        Ok(MemoryRunLock {
            writer: self.writer.clone(),
            _guard: guard,
        })
    }

    async fn unlock_run(&self, lock: MemoryRunLock) -> CdcResult<()> {
        drop(lock);

        Ok(())
    }

    async fn truncate_staging(&self) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;
        info!(rows = inner.staging.len(), "truncating in-memory staging");
        inner.staging.clear();

        Ok(())
    }

    async fn count_staging_rows(&self) -> CdcResult<u64> {
        Ok(self.inner.lock().await.staging.len() as u64)
    }

    async fn begin(&self, lock: &MemoryRunLock) -> CdcResult<MemoryReconcileTransaction> {
        if !Arc::ptr_eq(&lock.writer, &self.writer) {
            bail!(
                ErrorKind::ConcurrentRun,
                "Run lock was taken on a different store"
            );
        }

        Ok(MemoryReconcileTransaction {
            inner: self.inner.clone(),
            pending: None,
        })
    }
}

#[derive(Debug)]
struct PendingWrites {
    target: Vec<TableRow>,
    log_entries: Vec<ChangeLogEntry>,
}

/// Transaction over a [`MemoryTableStore`].
///
/// Writes are staged in memory and swapped in on commit.
#[derive(Debug)]
pub struct MemoryReconcileTransaction {
    inner: Arc<Mutex<Inner>>,
    pending: Option<PendingWrites>,
}

impl ReconcileTransaction for MemoryReconcileTransaction {
    async fn target_rows(&mut self) -> CdcResult<Vec<TableRow>> {
        match &self.pending {
            Some(pending) => Ok(pending.target.clone()),
            None => Ok(self.inner.lock().await.target.clone()),
        }
    }

    async fn staging_rows(&mut self) -> CdcResult<Vec<TableRow>> {
        Ok(self.inner.lock().await.staging.clone())
    }

    async fn apply(&mut self, change_set: &ChangeSet, changed_at: DateTime<Utc>) -> CdcResult<()> {
        let current = self.target_rows().await?;

        let replaced: HashSet<RowKey> = change_set
            .replaced_keys()
            .map(TableRow::row_key)
            .collect();
        let mut updates = change_set
            .changes()
            .iter()
            .filter(|change| change.op == ChangeOp::Update)
            .map(|change| (change.row.row_key(), change.row.clone()))
            .collect::<std::collections::HashMap<_, _>>();

        // Updated rows keep their position, deleted rows drop out, inserts go last.
        let mut target = Vec::with_capacity(current.len() + change_set.changes().len());
        for row in current {
            let key = row.row_key();
            if let Some(updated) = updates.remove(&key) {
                target.push(updated);
            } else if !replaced.contains(&key) {
                target.push(row);
            }
        }
        target.extend(
            change_set
                .changes()
                .iter()
                .filter(|change| change.op == ChangeOp::Insert)
                .map(|change| change.row.clone()),
        );

        let mut log_entries = self
            .pending
            .take()
            .map(|pending| pending.log_entries)
            .unwrap_or_default();
        log_entries.extend(change_set.log_entries(changed_at));

        self.pending = Some(PendingWrites {
            target,
            log_entries,
        });

        Ok(())
    }

    async fn commit(mut self) -> CdcResult<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        let mut inner = self.inner.lock().await;
        inner.target = pending.target;
        inner.changelog.extend(pending.log_entries);

        Ok(())
    }
}
