use cdc::error::ErrorKind;
use cdc::pipeline::Pipeline;
use cdc::staging::memory::MemoryStagingLoader;
use cdc::staging::postgres::PostgresQueryLoader;
use cdc::store::{ReconcileTransaction, TableStore};
use cdc::store::postgres::PostgresTableStore;
use cdc::test_utils::database::{TestDatabase, spawn_database};
use cdc::test_utils::notifier::MemoryNotifier;
use cdc::test_utils::table::rows;
use config::shared::{TableRef, TablesConfig};
use telemetry::init_test_tracing;

const SCHEMA: &str = r#"
create schema cdc;
create table cdc.table1 (id bigint primary key, name text, version bigint);
create table cdc.table1_staging (id bigint, name text, version bigint);
create table cdc.table1_changelog (
    id bigint,
    name text,
    version bigint,
    op text not null,
    changetime timestamptz not null
);
"#;

fn tables() -> TablesConfig {
    let table = |name: &str| TableRef {
        schema: "cdc".to_string(),
        name: name.to_string(),
    };

    TablesConfig {
        target: table("table1"),
        staging: table("table1_staging"),
        changelog: table("table1_changelog"),
        key_column: TablesConfig::DEFAULT_KEY_COLUMN.to_string(),
        op_column: TablesConfig::DEFAULT_OP_COLUMN.to_string(),
        change_time_column: TablesConfig::DEFAULT_CHANGE_TIME_COLUMN.to_string(),
    }
}

async fn setup() -> (TestDatabase, PostgresTableStore) {
    let database = spawn_database().await;
    database.execute(SCHEMA).await;

    let store = PostgresTableStore::new(database.pool.clone(), &tables())
        .await
        .unwrap();

    (database, store)
}

async fn changelog(database: &TestDatabase) -> Vec<(i64, String)> {
    sqlx::query_as("select id, op from cdc.table1_changelog order by op desc, id")
        .fetch_all(&database.pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a Postgres server, see `TESTS_DATABASE_HOST`"]
async fn postgres_run_applies_and_logs_changes_atomically() {
    init_test_tracing();
    let (database, store) = setup().await;
    database
        .execute("insert into cdc.table1 values (1, 'a', 1), (3, 'c', 1);")
        .await;

    let pipeline = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(1, "a", 2), (2, "b", 1)])),
        MemoryNotifier::new(),
    );
    let report = pipeline.run().await.unwrap();

    assert_eq!(
        (
            report.summary.inserts,
            report.summary.updates,
            report.summary.deletes
        ),
        (1, 1, 1)
    );
    let target: Vec<(i64, String, i64)> =
        sqlx::query_as("select id, name, version from cdc.table1 order by id")
            .fetch_all(&database.pool)
            .await
            .unwrap();
    assert_eq!(
        target,
        vec![(1, "a".to_string(), 2), (2, "b".to_string(), 1)]
    );
    assert_eq!(
        changelog(&database).await,
        vec![
            (1, "U".to_string()),
            (2, "I".to_string()),
            (3, "D".to_string())
        ]
    );
    assert_eq!(store.count_staging_rows().await.unwrap(), 0);

    let second = pipeline.run().await.unwrap();
    assert_eq!(second.summary.changes(), 0);
    assert_eq!(changelog(&database).await.len(), 3);

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres server, see `TESTS_DATABASE_HOST`"]
async fn postgres_query_loader_copies_source_rows() {
    init_test_tracing();
    let (database, store) = setup().await;
    database
        .execute(
            "create table cdc.source (id bigint, name text, version bigint);
             insert into cdc.source values (1, 'a', 1), (2, 'b', 1), (3, 'c', 1);",
        )
        .await;

    let loader = PostgresQueryLoader::new(
        database.pool.clone(),
        "select id, name, version from cdc.source".to_string(),
        2,
    );
    let pipeline = Pipeline::new("table1", store, loader, MemoryNotifier::new());
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.rows_loaded, 3);
    assert_eq!(report.summary.inserts, 3);

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres server, see `TESTS_DATABASE_HOST`"]
async fn run_lock_is_exclusive_until_released() {
    init_test_tracing();
    let (database, store) = setup().await;

    let held = store.lock_run().await.unwrap();
    let err = store.lock_run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentRun);

    let pipeline = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(1, "a", 1)])),
        MemoryNotifier::new(),
    );
    let err = pipeline.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.has_kind(ErrorKind::ConcurrentRun));

    let transaction = store.begin(&held).await.unwrap();
    transaction.commit().await.unwrap();
    store.unlock_run(held).await.unwrap();

    let relocked = store.lock_run().await.unwrap();
    store.unlock_run(relocked).await.unwrap();

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres server, see `TESTS_DATABASE_HOST`"]
async fn dropped_run_lock_is_released_by_the_server() {
    init_test_tracing();
    let (database, store) = setup().await;

    drop(store.lock_run().await.unwrap());

    // The server releases the lock once it notices the closed session.
    let mut relocked = None;
    for _ in 0..50 {
        if let Ok(lock) = store.lock_run().await {
            relocked = Some(lock);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    store.unlock_run(relocked.unwrap()).await.unwrap();

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres server, see `TESTS_DATABASE_HOST`"]
async fn staging_with_different_columns_is_rejected() {
    init_test_tracing();
    let database = spawn_database().await;
    database
        .execute(
            "create schema cdc;
             create table cdc.table1 (id bigint, name text, version bigint);
             create table cdc.table1_staging (id bigint, name text);
             create table cdc.table1_changelog (id bigint, name text, version bigint, op text, changetime timestamptz);",
        )
        .await;

    let err = PostgresTableStore::new(database.pool.clone(), &tables())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

    database.cleanup().await;
}
