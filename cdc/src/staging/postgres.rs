use std::time::Duration;

use config::shared::{BatchConfig, IntoConnectOptions, PgConnectionConfig};
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::conversions::decode_row_by_driver_types;
use crate::error::{CdcResult, source_sqlx_error};
use crate::staging::StagingLoader;
use crate::staging::base::copy_into_staging;
use crate::store::StagingSink;

const MAX_POOL_CONNECTIONS: u32 = 2;

const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Copies the result set of a query on a relational Postgres source into staging.
///
/// The first result column is the row key, the remaining columns are the values in order, so
/// the query's column list must line up with the staging table's.
#[derive(Debug, Clone)]
pub struct PostgresQueryLoader {
    pool: PgPool,
    query: String,
    batch_size: usize,
}

impl PostgresQueryLoader {
    /// Connects lazily to the source; the first load opens the connection.
    pub fn connect_lazy(
        connection: &PgConnectionConfig,
        query: &str,
        batch: &BatchConfig,
    ) -> PostgresQueryLoader {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect_lazy_with(connection.with_db());

        Self::new(pool, query.to_string(), batch.max_size)
    }

    pub fn new(pool: PgPool, query: String, batch_size: usize) -> PostgresQueryLoader {
        PostgresQueryLoader {
            pool,
            query,
            batch_size: batch_size.max(1),
        }
    }
}

impl StagingLoader for PostgresQueryLoader {
    async fn load<K>(&self, sink: &K) -> CdcResult<u64>
    where
        K: StagingSink + Sync,
    {
        info!(batch_size = self.batch_size, "copying postgres source rows into staging");

        let rows = sqlx::query(&self.query)
            .fetch(&self.pool)
            .and_then(|row| futures::future::ready(decode_row_by_driver_types(&row)))
            .map_err(source_sqlx_error);

        copy_into_staging(rows, sink, self.batch_size).await
    }
}
