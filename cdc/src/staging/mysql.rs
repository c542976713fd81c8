use std::time::Duration;

use config::shared::{BatchConfig, IntoConnectOptions, MySqlConnectionConfig};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::info;

use crate::conversions::decode_mysql_row;
use crate::error::{CdcResult, source_sqlx_error};
use crate::staging::StagingLoader;
use crate::staging::base::copy_into_staging;
use crate::store::StagingSink;

const MAX_POOL_CONNECTIONS: u32 = 2;

const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Copies the result set of a query on a MySQL source into staging.
///
/// Same column contract as [`crate::staging::postgres::PostgresQueryLoader`]: key first, then
/// the staging table's value columns in order.
#[derive(Debug, Clone)]
pub struct MySqlQueryLoader {
    pool: MySqlPool,
    query: String,
    batch_size: usize,
}

impl MySqlQueryLoader {
    /// Connects lazily to the source; the first load opens the connection.
    pub fn connect_lazy(
        connection: &MySqlConnectionConfig,
        query: &str,
        batch: &BatchConfig,
    ) -> MySqlQueryLoader {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect_lazy_with(connection.with_db());

        Self::new(pool, query.to_string(), batch.max_size)
    }

    pub fn new(pool: MySqlPool, query: String, batch_size: usize) -> MySqlQueryLoader {
        MySqlQueryLoader {
            pool,
            query,
            batch_size: batch_size.max(1),
        }
    }
}

impl StagingLoader for MySqlQueryLoader {
    async fn load<K>(&self, sink: &K) -> CdcResult<u64>
    where
        K: StagingSink + Sync,
    {
        info!(batch_size = self.batch_size, "copying mysql source rows into staging");

        let rows = sqlx::query(&self.query)
            .fetch(&self.pool)
            .and_then(|row| futures::future::ready(decode_mysql_row(&row)))
            .map_err(source_sqlx_error);

        copy_into_staging(rows, sink, self.batch_size).await
    }
}
