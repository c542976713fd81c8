use std::future::Future;

use futures::{Stream, TryStreamExt, pin_mut};
use tracing::{debug, info};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::store::StagingSink;
use crate::types::{Cell, TableRow};

/// Populates an empty staging table from the external source.
///
/// A loader writes the complete change set or fails; partial loads are detected by the pipeline
/// through the staging row count.
pub trait StagingLoader {
    /// Writes every source row to `sink` and returns the number of rows written.
    fn load<K>(&self, sink: &K) -> impl Future<Output = CdcResult<u64>> + Send
    where
        K: StagingSink + Sync;
}

/// Writes decoded source rows to `sink` in batches of at most `batch_size` rows.
///
/// The first cell of every row is its key. Returns the number of rows written.
pub(crate) async fn copy_into_staging<K, S>(rows: S, sink: &K, batch_size: usize) -> CdcResult<u64>
where
    K: StagingSink + Sync,
    S: Stream<Item = CdcResult<Vec<Cell>>>,
{
    pin_mut!(rows);

    let batch_size = batch_size.max(1);
    let mut batch: Vec<TableRow> = Vec::with_capacity(batch_size.min(1024));
    let mut written = 0u64;

    while let Some(cells) = rows.try_next().await? {
        let mut cells = cells.into_iter();
        let Some(key) = cells.next() else {
            bail!(
                ErrorKind::InvalidData,
                "Source query returned rows without columns"
            );
        };
        batch.push(TableRow::new(key, cells.collect()));

        if batch.len() >= batch_size {
            written += batch.len() as u64;
            sink.write_staging_rows(std::mem::take(&mut batch)).await?;
            debug!(rows = written, "staging batch written");
        }
    }

    if !batch.is_empty() {
        written += batch.len() as u64;
        sink.write_staging_rows(batch).await?;
    }

    info!(rows = written, "source copy finished");

    Ok(written)
}
