use std::sync::Arc;

use crate::error::CdcResult;
use crate::staging::StagingLoader;
use crate::store::StagingSink;
use crate::types::TableRow;

/// Loader that writes a fixed set of rows, in batches of `batch_size`.
#[derive(Debug, Clone)]
pub struct MemoryStagingLoader {
    rows: Arc<Vec<TableRow>>,
    batch_size: usize,
}

impl MemoryStagingLoader {
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self::with_batch_size(rows, usize::MAX)
    }

    pub fn with_batch_size(rows: Vec<TableRow>, batch_size: usize) -> Self {
        Self {
            rows: Arc::new(rows),
            batch_size: batch_size.max(1),
        }
    }
}

impl StagingLoader for MemoryStagingLoader {
    async fn load<K>(&self, sink: &K) -> CdcResult<u64>
    where
        K: StagingSink + Sync,
    {
        let mut written = 0;
        for chunk in self.rows.chunks(self.batch_size) {
            sink.write_staging_rows(chunk.to_vec()).await?;
            written += chunk.len() as u64;
        }

        Ok(written)
    }
}
