use std::sync::Arc;

use tokio::sync::Notify;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::staging::StagingLoader;
use crate::store::StagingSink;
use crate::types::TableRow;

/// Loader that writes some rows and then fails like a broken source connection.
#[derive(Debug, Clone)]
pub struct FailingLoader {
    rows: Vec<TableRow>,
}

impl FailingLoader {
    /// Writes `rows` to staging before failing.
    pub fn after(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    /// Fails before writing anything.
    pub fn immediately() -> Self {
        Self { rows: Vec::new() }
    }
}

impl StagingLoader for FailingLoader {
    async fn load<K>(&self, sink: &K) -> CdcResult<u64>
    where
        K: StagingSink + Sync,
    {
        if !self.rows.is_empty() {
            sink.write_staging_rows(self.rows.clone()).await?;
        }

        bail!(
            ErrorKind::SourceQueryFailed,
            "Source connection dropped during the copy",
            format!("{} rows were written before the failure", self.rows.len())
        );
    }
}

/// Loader that reports more rows than it actually wrote.
#[derive(Debug, Clone)]
pub struct MiscountingLoader {
    rows: Vec<TableRow>,
    reported: u64,
}

impl MiscountingLoader {
    pub fn new(rows: Vec<TableRow>, reported: u64) -> Self {
        Self { rows, reported }
    }
}

impl StagingLoader for MiscountingLoader {
    async fn load<K>(&self, sink: &K) -> CdcResult<u64>
    where
        K: StagingSink + Sync,
    {
        sink.write_staging_rows(self.rows.clone()).await?;

        Ok(self.reported)
    }
}

/// Loader that writes its rows and then waits until [`GatedLoader::release`] is called.
///
/// Clones share the gate, so a test can hold a run mid-load while it starts another one.
#[derive(Debug, Clone)]
pub struct GatedLoader {
    rows: Vec<TableRow>,
    loaded: Arc<Notify>,
    released: Arc<Notify>,
}

impl GatedLoader {
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self {
            rows,
            loaded: Arc::new(Notify::new()),
            released: Arc::new(Notify::new()),
        }
    }

    /// Resolves once the rows are in staging.
    pub async fn wait_until_loaded(&self) {
        self.loaded.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

impl StagingLoader for GatedLoader {
    async fn load<K>(&self, sink: &K) -> CdcResult<u64>
    where
        K: StagingSink + Sync,
    {
        sink.write_staging_rows(self.rows.clone()).await?;
        self.loaded.notify_one();
        self.released.notified().await;

        Ok(self.rows.len() as u64)
    }
}
