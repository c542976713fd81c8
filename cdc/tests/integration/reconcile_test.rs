use cdc::reconcile::Reconciler;
use cdc::store::{StagingSink, TableStore};
use cdc::store::memory::MemoryTableStore;
use cdc::test_utils::table::{row, rows};
use cdc::types::ChangeOp;
use telemetry::init_test_tracing;

async fn reconcile_once(
    target: &[(i64, &str, i64)],
    staging: &[(i64, &str, i64)],
) -> MemoryTableStore {
    let store = MemoryTableStore::with_target_rows(rows(target));
    store.write_staging_rows(rows(staging)).await.unwrap();
    let lock = store.lock_run().await.unwrap();
    Reconciler::new(store.clone()).reconcile(&lock).await.unwrap();
    store.unlock_run(lock).await.unwrap();

    store
}

#[tokio::test]
async fn update_and_insert_are_applied_and_logged() {
    init_test_tracing();

    let store = reconcile_once(&[(1, "a", 1)], &[(1, "a", 2), (2, "b", 1)]).await;

    assert_eq!(store.target_rows().await, rows(&[(1, "a", 2), (2, "b", 1)]));
    let log = store.changelog().await;
    let entries: Vec<_> = log.iter().map(|entry| (entry.op, entry.row.clone())).collect();
    assert_eq!(
        entries,
        vec![
            (ChangeOp::Update, row(1, "a", 2)),
            (ChangeOp::Insert, row(2, "b", 1)),
        ]
    );
}

#[tokio::test]
async fn missing_staging_row_is_deleted_and_logged_with_old_image() {
    init_test_tracing();

    let store = reconcile_once(&[(1, "a", 1), (3, "c", 1)], &[(1, "a", 1)]).await;

    assert_eq!(store.target_rows().await, rows(&[(1, "a", 1)]));
    let log = store.changelog().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].op, ChangeOp::Delete);
    assert_eq!(log[0].row, row(3, "c", 1));
}

#[tokio::test]
async fn disjoint_keys_become_inserts_and_deletes() {
    init_test_tracing();

    let store = reconcile_once(&[(1, "a", 1), (2, "b", 1)], &[(3, "c", 1), (4, "d", 1)]).await;

    assert_eq!(store.target_rows().await, rows(&[(3, "c", 1), (4, "d", 1)]));
    let ops: Vec<_> = store.changelog().await.iter().map(|entry| entry.op).collect();
    assert_eq!(
        ops,
        vec![
            ChangeOp::Insert,
            ChangeOp::Insert,
            ChangeOp::Delete,
            ChangeOp::Delete
        ]
    );
}

#[tokio::test]
async fn identical_rows_are_neither_written_nor_logged() {
    init_test_tracing();

    let store = reconcile_once(&[(1, "a", 1), (2, "b", 1)], &[(1, "a", 1), (2, "b", 9)]).await;

    let log = store.changelog().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].row.key(), row(2, "b", 9).key());
}

#[tokio::test]
async fn reconciling_the_same_staging_twice_logs_nothing_the_second_time() {
    init_test_tracing();

    let store = reconcile_once(&[(1, "a", 1)], &[(1, "a", 2), (2, "b", 1)]).await;
    let first_log = store.changelog().await;

    let lock = store.lock_run().await.unwrap();
    let summary = Reconciler::new(store.clone()).reconcile(&lock).await.unwrap();

    assert_eq!(summary.changes(), 0);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(store.changelog().await, first_log);
}

#[tokio::test]
async fn one_run_stamps_every_entry_with_the_same_time() {
    init_test_tracing();

    let store = reconcile_once(&[(1, "a", 1), (5, "e", 1)], &[(1, "a", 2), (2, "b", 1)]).await;

    let log = store.changelog().await;
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|entry| entry.changed_at == log[0].changed_at));
}
