use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::{IntoConnectOptions, PgConnectionConfig, TablesConfig};
use pg_escape::quote_identifier;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, warn};

use crate::bail;
use crate::conversions::{PgColumnType, decode_cell, push_cell_bind};
use crate::error::{CdcResult, ErrorKind};
use crate::reconcile::{Change, ChangeSet};
use crate::store::{ReconcileTransaction, StagingSink, TableStore};
use crate::types::{Cell, ColumnSchema, TableName, TableRow, TableSchema};

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Upper bound on rows per multi-row statement.
const MAX_ROWS_PER_STATEMENT: usize = 1_000;

const MAX_POOL_CONNECTIONS: u32 = 4;

const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved tables and their columns, validated once at construction.
#[derive(Debug)]
struct Layout {
    target: TableName,
    staging: TableName,
    changelog: TableName,
    schema: TableSchema,
    column_types: Vec<PgColumnType>,
    op_column: ColumnSchema,
    change_time_column: ColumnSchema,
}

impl Layout {
    /// Target column list, key first, for SELECT statements.
    fn select_list(&self) -> String {
        self.schema
            .column_names()
            .zip(&self.column_types)
            .map(|(name, column_type)| {
                let name = quote_identifier(name);
                if column_type.needs_text_cast() {
                    format!("{name}::text")
                } else {
                    name.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Target column list, key first, for INSERT statements.
    fn insert_list(&self) -> String {
        self.schema
            .column_names()
            .map(|name| quote_identifier(name).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column types, key first, used as bind casts.
    fn cast_types(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.schema.key_column.type_name.as_str()).chain(
            self.schema
                .value_columns
                .iter()
                .map(|column| column.type_name.as_str()),
        )
    }

    fn quoted_key(&self) -> String {
        quote_identifier(&self.schema.key_column.name).to_string()
    }

    fn check_row_width(&self, row: &TableRow) -> CdcResult<()> {
        if row.values().len() != self.schema.value_columns.len() {
            bail!(
                ErrorKind::SchemaMismatch,
                "Row width does not match the target table",
                format!(
                    "row `{}` has {} value columns, `{}` has {}",
                    row.key(),
                    row.values().len(),
                    self.target,
                    self.schema.value_columns.len()
                )
            );
        }

        Ok(())
    }

    fn decode_row(&self, row: &PgRow) -> CdcResult<TableRow> {
        let mut cells = Vec::with_capacity(self.column_types.len());
        for (index, column_type) in self.column_types.iter().enumerate() {
            cells.push(decode_cell(row, index, column_type)?);
        }

        let mut cells = cells.into_iter();
        let key = cells.next().unwrap_or(Cell::Null);

        Ok(TableRow::new(key, cells.collect()))
    }
}

/// Table store backed by a Postgres warehouse.
///
/// The target, staging and change log tables must already exist. Staging must have exactly the
/// target's columns; the change log must have the target's columns plus the op and change time
/// columns.
#[derive(Debug, Clone)]
pub struct PostgresTableStore {
    pool: PgPool,
    layout: Arc<Layout>,
}

impl PostgresTableStore {
    /// Connects to the warehouse and validates the configured tables.
    pub async fn connect(
        connection: &PgConnectionConfig,
        tables: &TablesConfig,
    ) -> CdcResult<PostgresTableStore> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .connect_with(connection.with_db())
            .await?;

        info!(
            host = %connection.host,
            database = %connection.name,
            "connected to warehouse"
        );

        Self::new(pool, tables).await
    }

    /// Creates a store over an existing pool, validating the configured tables.
    pub async fn new(pool: PgPool, tables: &TablesConfig) -> CdcResult<PostgresTableStore> {
        let layout = load_layout(&pool, tables).await?;

        info!(
            target_table = %layout.target,
            staging_table = %layout.staging,
            changelog_table = %layout.changelog,
            columns = layout.schema.column_count(),
            "validated warehouse tables"
        );

        Ok(PostgresTableStore {
            pool,
            layout: Arc::new(layout),
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.layout.schema
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl StagingSink for PostgresTableStore {
    async fn write_staging_rows(&self, rows: Vec<TableRow>) -> CdcResult<()> {
        let layout = &self.layout;
        for row in &rows {
            layout.check_row_width(row)?;
        }

        let mut connection = self.pool.acquire().await?;
        for chunk in rows.chunks(rows_per_statement(layout.schema.column_count())) {
            insert_rows_statement(layout, &layout.staging, chunk)
                .build()
                .execute(&mut *connection)
                .await?;
        }

        debug!(rows = rows.len(), staging_table = %layout.staging, "wrote staging rows");

        Ok(())
    }
}

/// Session-level advisory lock on the target table, held on a dedicated connection.
///
/// Dropping it closes the connection, which makes the server release the lock.
#[derive(Debug)]
pub struct PostgresRunLock {
    connection: PgConnection,
    target: TableName,
}

impl TableStore for PostgresTableStore {
    type RunLock = PostgresRunLock;
    type Transaction = PostgresReconcileTransaction;

    async fn lock_run(&self) -> CdcResult<PostgresRunLock> {
        let options = self.pool.connect_options();
        let mut connection = PgConnection::connect_with(&options).await?;

        let locked: bool = sqlx::query_scalar("select pg_try_advisory_lock(hashtext($1))")
            .bind(self.layout.target.to_string())
            .fetch_one(&mut connection)
            .await?;
        if !locked {
            if let Err(err) = connection.close().await {
                warn!(error = %err, "failed to close lock connection");
            }
            bail!(
                ErrorKind::ConcurrentRun,
                "Another run holds the target table",
                format!("advisory lock on `{}` is taken", self.layout.target)
            );
        }

        debug!(target_table = %self.layout.target, "acquired run lock");

        Ok(PostgresRunLock {
            connection,
            target: self.layout.target.clone(),
        })
    }

    async fn unlock_run(&self, lock: PostgresRunLock) -> CdcResult<()> {
        let PostgresRunLock {
            mut connection,
            target,
        } = lock;

        sqlx::query("select pg_advisory_unlock(hashtext($1))")
            .bind(target.to_string())
            .execute(&mut connection)
            .await?;
        connection.close().await?;

        debug!(target_table = %target, "released run lock");

        Ok(())
    }

    async fn truncate_staging(&self) -> CdcResult<()> {
        let statement = format!(
            "truncate table {}",
            self.layout.staging.as_quoted_identifier()
        );
        sqlx::query(&statement).execute(&self.pool).await?;

        info!(staging_table = %self.layout.staging, "truncated staging table");

        Ok(())
    }

    async fn count_staging_rows(&self) -> CdcResult<u64> {
        let statement = format!(
            "select count(*) from {}",
            self.layout.staging.as_quoted_identifier()
        );
        let count: i64 = sqlx::query_scalar(&statement)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn begin(&self, lock: &PostgresRunLock) -> CdcResult<PostgresReconcileTransaction> {
        if lock.target != self.layout.target {
            bail!(
                ErrorKind::ConcurrentRun,
                "Run lock was taken on a different target table",
                format!("lock on `{}`, store on `{}`", lock.target, self.layout.target)
            );
        }

        let transaction = self.pool.begin().await?;

        Ok(PostgresReconcileTransaction {
            transaction,
            layout: self.layout.clone(),
        })
    }
}

/// A warehouse transaction opened under a [`PostgresRunLock`].
///
/// Dropping it rolls back every write.
#[derive(Debug)]
pub struct PostgresReconcileTransaction {
    transaction: Transaction<'static, Postgres>,
    layout: Arc<Layout>,
}

impl PostgresReconcileTransaction {
    async fn read_table(&mut self, table: &TableName) -> CdcResult<Vec<TableRow>> {
        let statement = format!(
            "select {} from {} order by {}",
            self.layout.select_list(),
            table.as_quoted_identifier(),
            self.layout.quoted_key()
        );
        let rows = sqlx::query(&statement)
            .fetch_all(&mut *self.transaction)
            .await?;

        rows.iter().map(|row| self.layout.decode_row(row)).collect()
    }

    async fn append_changelog(
        &mut self,
        change_set: &ChangeSet,
        changed_at: DateTime<Utc>,
    ) -> CdcResult<()> {
        let layout = self.layout.clone();
        let change_time = change_time_cell(&layout.change_time_column, changed_at);

        for chunk in change_set
            .changes()
            .chunks(rows_per_statement(layout.schema.column_count() + 2))
        {
            changelog_statement(&layout, chunk, &change_time)
                .build()
                .execute(&mut *self.transaction)
                .await?;
        }

        Ok(())
    }

    async fn delete_replaced(&mut self, change_set: &ChangeSet) -> CdcResult<()> {
        let layout = self.layout.clone();
        let replaced: Vec<&TableRow> = change_set.replaced_keys().collect();

        for chunk in replaced.chunks(rows_per_statement(1)) {
            delete_keys_statement(&layout, chunk)
                .build()
                .execute(&mut *self.transaction)
                .await?;
        }

        Ok(())
    }

    async fn insert_upserts(&mut self, change_set: &ChangeSet) -> CdcResult<()> {
        let layout = self.layout.clone();
        let upserts: Vec<&TableRow> = change_set.upserts().collect();

        for chunk in upserts.chunks(rows_per_statement(layout.schema.column_count())) {
            insert_rows_statement(&layout, &layout.target, chunk.iter().copied())
                .build()
                .execute(&mut *self.transaction)
                .await?;
        }

        Ok(())
    }
}

impl ReconcileTransaction for PostgresReconcileTransaction {
    async fn target_rows(&mut self) -> CdcResult<Vec<TableRow>> {
        let target = self.layout.target.clone();
        self.read_table(&target).await
    }

    async fn staging_rows(&mut self) -> CdcResult<Vec<TableRow>> {
        let staging = self.layout.staging.clone();
        self.read_table(&staging).await
    }

    async fn apply(&mut self, change_set: &ChangeSet, changed_at: DateTime<Utc>) -> CdcResult<()> {
        if change_set.is_empty() {
            return Ok(());
        }

        for row in change_set.changes().iter().map(|change| &change.row) {
            self.layout.check_row_width(row)?;
        }

        self.append_changelog(change_set, changed_at).await?;
        self.delete_replaced(change_set).await?;
        self.insert_upserts(change_set).await?;

        debug!(
            target_table = %self.layout.target,
            changes = change_set.changes().len(),
            "applied change set"
        );

        Ok(())
    }

    async fn commit(self) -> CdcResult<()> {
        self.transaction.commit().await?;

        Ok(())
    }
}

fn push_row_binds(
    separated: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    layout: &Layout,
    row: &TableRow,
) {
    let cells = std::iter::once(row.key()).chain(row.values());
    for (cell, type_name) in cells.zip(layout.cast_types()) {
        push_cell_bind(separated, cell, type_name);
    }
}

/// Builds one multi-row insert of `rows` into `table`, which has the target's columns.
fn insert_rows_statement<'a>(
    layout: &Layout,
    table: &TableName,
    rows: impl IntoIterator<Item = &'a TableRow>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "insert into {} ({}) ",
        table.as_quoted_identifier(),
        layout.insert_list()
    ));
    builder.push_values(rows, |mut separated, row| {
        push_row_binds(&mut separated, layout, row);
    });

    builder
}

/// Builds one delete of the target rows keyed like `rows`.
fn delete_keys_statement(layout: &Layout, rows: &[&TableRow]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "delete from {} where {} in (",
        layout.target.as_quoted_identifier(),
        layout.quoted_key()
    ));
    let mut separated = builder.separated(", ");
    for row in rows {
        push_cell_bind(&mut separated, row.key(), &layout.schema.key_column.type_name);
    }
    separated.push_unseparated(")");

    builder
}

/// Builds one change log insert of `changes`, all stamped with `change_time`.
fn changelog_statement(
    layout: &Layout,
    changes: &[Change],
    change_time: &Cell,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "insert into {} ({}, {}, {}) ",
        layout.changelog.as_quoted_identifier(),
        quote_identifier(&layout.op_column.name),
        layout.insert_list(),
        quote_identifier(&layout.change_time_column.name)
    ));
    builder.push_values(changes, |mut separated, change| {
        push_cell_bind(
            &mut separated,
            &Cell::String(change.op.code().to_string()),
            &layout.op_column.type_name,
        );
        push_row_binds(&mut separated, layout, &change.row);
        push_cell_bind(&mut separated, change_time, &layout.change_time_column.type_name);
    });

    builder
}

/// Renders the change time for the change log column, naive UTC for `timestamp` columns.
fn change_time_cell(column: &ColumnSchema, changed_at: DateTime<Utc>) -> Cell {
    match PgColumnType::from_name(&column.type_name) {
        PgColumnType::Timestamp => Cell::Timestamp(changed_at.naive_utc()),
        _ => Cell::TimestampTz(changed_at),
    }
}

fn rows_per_statement(params_per_row: usize) -> usize {
    (MAX_BIND_PARAMS / params_per_row.max(1)).clamp(1, MAX_ROWS_PER_STATEMENT)
}

async fn load_columns(pool: &PgPool, table: &TableName) -> CdcResult<Vec<ColumnSchema>> {
    let rows: Vec<(String, String, bool)> = sqlx::query_as(
        r#"
        select column_name::text, udt_name::text, is_nullable = 'YES'
        from information_schema.columns
        where table_schema = $1 and table_name = $2
        order by ordinal_position
        "#,
    )
    .bind(&table.schema)
    .bind(&table.name)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        bail!(
            ErrorKind::SchemaMismatch,
            "Table does not exist or has no columns",
            format!("table `{table}`")
        );
    }

    Ok(rows
        .into_iter()
        .map(|(name, type_name, nullable)| ColumnSchema::new(name, type_name, nullable))
        .collect())
}

async fn load_layout(pool: &PgPool, tables: &TablesConfig) -> CdcResult<Layout> {
    let target = TableName::from(&tables.target);
    let staging = TableName::from(&tables.staging);
    let changelog = TableName::from(&tables.changelog);

    let target_columns = load_columns(pool, &target).await?;
    let staging_columns = load_columns(pool, &staging).await?;
    let changelog_columns = load_columns(pool, &changelog).await?;

    validate_layout(
        target,
        staging,
        changelog,
        target_columns,
        &staging_columns,
        &changelog_columns,
        tables,
    )
}

fn validate_layout(
    target: TableName,
    staging: TableName,
    changelog: TableName,
    target_columns: Vec<ColumnSchema>,
    staging_columns: &[ColumnSchema],
    changelog_columns: &[ColumnSchema],
    tables: &TablesConfig,
) -> CdcResult<Layout> {
    let Some(schema) = TableSchema::from_columns(target_columns, &tables.key_column) else {
        bail!(
            ErrorKind::SchemaMismatch,
            "Key column is missing from the target table",
            format!("column `{}` not found in `{target}`", tables.key_column)
        );
    };

    let find = |columns: &[ColumnSchema], name: &str| {
        columns.iter().find(|column| column.name == name).cloned()
    };

    let columns = schema_columns(&schema);

    // Staging must hold exactly the target's columns with the same types.
    for column in &columns {
        let matches = find(staging_columns, &column.name)
            .is_some_and(|found| found.type_name == column.type_name);
        if !matches {
            bail!(
                ErrorKind::SchemaMismatch,
                "Staging table columns do not match the target table",
                format!(
                    "column `{}` differs between `{target}` and `{staging}`",
                    column.name
                )
            );
        }
    }
    if staging_columns.len() != schema.column_count() {
        bail!(
            ErrorKind::SchemaMismatch,
            "Staging table columns do not match the target table",
            format!(
                "`{staging}` has {} columns, `{target}` has {}",
                staging_columns.len(),
                schema.column_count()
            )
        );
    }

    for column in &columns {
        let matches = find(changelog_columns, &column.name)
            .is_some_and(|found| found.type_name == column.type_name);
        if !matches {
            bail!(
                ErrorKind::SchemaMismatch,
                "Change log table is missing a target column",
                format!("column `{}` of `{target}` not found in `{changelog}`", column.name)
            );
        }
    }

    let Some(op_column) = find(changelog_columns, &tables.op_column) else {
        bail!(
            ErrorKind::SchemaMismatch,
            "Change log table has no op column",
            format!("column `{}` not found in `{changelog}`", tables.op_column)
        );
    };
    let Some(change_time_column) = find(changelog_columns, &tables.change_time_column) else {
        bail!(
            ErrorKind::SchemaMismatch,
            "Change log table has no change time column",
            format!(
                "column `{}` not found in `{changelog}`",
                tables.change_time_column
            )
        );
    };
    if !matches!(
        PgColumnType::from_name(&change_time_column.type_name),
        PgColumnType::Timestamp | PgColumnType::TimestampTz
    ) {
        bail!(
            ErrorKind::SchemaMismatch,
            "Change time column must be a timestamp",
            format!(
                "column `{}` of `{changelog}` has type `{}`",
                change_time_column.name, change_time_column.type_name
            )
        );
    }

    let column_types = columns
        .iter()
        .map(|column| PgColumnType::from_name(&column.type_name))
        .collect();

    Ok(Layout {
        target,
        staging,
        changelog,
        schema,
        column_types,
        op_column,
        change_time_column,
    })
}

/// Target columns, key first.
fn schema_columns(schema: &TableSchema) -> Vec<ColumnSchema> {
    std::iter::once(schema.key_column.clone())
        .chain(schema.value_columns.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::shared::TableRef;

    fn tables() -> TablesConfig {
        let table = |name: &str| TableRef {
            schema: "testdb".to_string(),
            name: name.to_string(),
        };

        TablesConfig {
            target: table("table1"),
            staging: table("table1_staging"),
            changelog: table("table1_log"),
            key_column: "id".to_string(),
            op_column: "op".to_string(),
            change_time_column: "changetime".to_string(),
        }
    }

    fn target_columns() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("id", "int8", false),
            ColumnSchema::new("amount", "text", true),
            ColumnSchema::new("duration", "interval", true),
        ]
    }

    fn changelog_columns() -> Vec<ColumnSchema> {
        let mut columns = vec![ColumnSchema::new("op", "text", false)];
        columns.extend(target_columns());
        columns.push(ColumnSchema::new("changetime", "timestamp", false));
        columns
    }

    fn validate(staging: &[ColumnSchema], changelog: &[ColumnSchema]) -> CdcResult<Layout> {
        let config = tables();
        validate_layout(
            TableName::from(&config.target),
            TableName::from(&config.staging),
            TableName::from(&config.changelog),
            target_columns(),
            staging,
            changelog,
            &config,
        )
    }

    #[test]
    fn matching_tables_produce_a_layout() {
        let layout = validate(&target_columns(), &changelog_columns()).unwrap();

        assert_eq!(layout.select_list(), "id, amount, duration::text");
        assert_eq!(layout.insert_list(), "id, amount, duration");
        assert_eq!(
            layout.cast_types().collect::<Vec<_>>(),
            vec!["int8", "text", "interval"]
        );
    }

    #[test]
    fn staging_with_a_different_type_is_rejected() {
        let mut staging = target_columns();
        staging[1] = ColumnSchema::new("amount", "varchar", true);

        let err = validate(&staging, &changelog_columns()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn staging_with_an_extra_column_is_rejected() {
        let mut staging = target_columns();
        staging.push(ColumnSchema::new("extra", "text", true));

        let err = validate(&staging, &changelog_columns()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn changelog_without_op_column_is_rejected() {
        let changelog: Vec<_> = changelog_columns()
            .into_iter()
            .filter(|column| column.name != "op")
            .collect();

        let err = validate(&target_columns(), &changelog).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.description().contains("op column"));
    }

    #[test]
    fn change_time_column_is_rendered_for_its_type() {
        let now = Utc::now();

        assert_eq!(
            change_time_cell(&ColumnSchema::new("changetime", "timestamp", false), now),
            Cell::Timestamp(now.naive_utc())
        );
        assert_eq!(
            change_time_cell(&ColumnSchema::new("changetime", "timestamptz", false), now),
            Cell::TimestampTz(now)
        );
    }

    #[test]
    fn target_inserts_bind_every_column_with_a_cast() {
        let layout = validate(&target_columns(), &changelog_columns()).unwrap();
        let rows = [
            TableRow::new(Cell::I64(1), vec!["10".into(), Cell::Null]),
            TableRow::new(Cell::I64(2), vec!["20".into(), "1 day".into()]),
        ];

        let statement = insert_rows_statement(&layout, &layout.target, &rows);

        assert_eq!(
            statement.sql(),
            "insert into testdb.table1 (id, amount, duration) VALUES \
             ($1::int8, $2::text, $3::interval), ($4::int8, $5::text, $6::interval)"
        );
    }

    #[test]
    fn replaced_keys_are_deleted_by_key_column() {
        let layout = validate(&target_columns(), &changelog_columns()).unwrap();
        let first = TableRow::new(Cell::I64(1), vec!["10".into(), Cell::Null]);
        let third = TableRow::new(Cell::I64(3), vec!["30".into(), Cell::Null]);

        let statement = delete_keys_statement(&layout, &[&first, &third]);

        assert_eq!(
            statement.sql(),
            "delete from testdb.table1 where id in ($1::int8, $2::int8)"
        );
    }

    #[test]
    fn changelog_rows_carry_op_image_and_change_time() {
        let layout = validate(&target_columns(), &changelog_columns()).unwrap();
        let target = vec![TableRow::new(Cell::I64(3), vec!["30".into(), Cell::Null])];
        let staging = vec![TableRow::new(Cell::I64(1), vec!["10".into(), Cell::Null])];
        let change_set = ChangeSet::classify(target, staging).unwrap();
        let change_time = change_time_cell(&layout.change_time_column, Utc::now());

        let statement = changelog_statement(&layout, change_set.changes(), &change_time);

        assert_eq!(
            statement.sql(),
            "insert into testdb.table1_log (op, id, amount, duration, changetime) VALUES \
             ($1::text, $2::int8, $3::text, $4::interval, $5::timestamp), \
             ($6::text, $7::int8, $8::text, $9::interval, $10::timestamp)"
        );
    }

    #[test]
    fn statements_stay_below_the_bind_parameter_limit() {
        assert_eq!(rows_per_statement(3), MAX_ROWS_PER_STATEMENT);
        assert_eq!(rows_per_statement(100), 655);
        assert_eq!(rows_per_statement(0), MAX_ROWS_PER_STATEMENT);
    }
}
