use cdc::error::ErrorKind;
use cdc::pipeline::Pipeline;
use cdc::staging::memory::MemoryStagingLoader;
use cdc::store::TableStore;
use cdc::store::memory::MemoryTableStore;
use cdc::test_utils::loader::{FailingLoader, GatedLoader, MiscountingLoader};
use cdc::test_utils::notifier::MemoryNotifier;
use cdc::test_utils::store::{FaultConfig, FaultInjectingTableStore};
use cdc::test_utils::table::rows;
use telemetry::init_test_tracing;

#[tokio::test]
async fn successful_run_leaves_target_equal_to_source() {
    init_test_tracing();
    let store = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1), (3, "c", 1)]));
    let loader = MemoryStagingLoader::with_batch_size(rows(&[(1, "a", 2), (2, "b", 1)]), 1);
    let notifier = MemoryNotifier::new();
    let pipeline = Pipeline::new("table1", store.clone(), loader, notifier.clone());

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.rows_loaded, 2);
    assert_eq!(
        (
            report.summary.inserts,
            report.summary.updates,
            report.summary.deletes
        ),
        (1, 1, 1)
    );
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 2), (2, "b", 1)]));
    assert_eq!(store.count_staging_rows().await.unwrap(), 0);

    let completions = notifier.completions().await;
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].finished_at, report.finished_at);
}

#[tokio::test]
async fn rerunning_against_an_unchanged_source_is_idempotent() {
    init_test_tracing();
    let store = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1)]));
    let loader = MemoryStagingLoader::new(rows(&[(1, "a", 2), (2, "b", 1)]));
    let pipeline = Pipeline::new("table1", store.clone(), loader, MemoryNotifier::new());

    pipeline.run().await.unwrap();
    let log_after_first_run = store.changelog().await;
    let second = pipeline.run().await.unwrap();

    assert_eq!(second.summary.changes(), 0);
    assert_eq!(store.changelog().await, log_after_first_run);
}

#[tokio::test]
async fn source_failure_is_a_load_failure_and_retry_starts_from_empty_staging() {
    init_test_tracing();
    let store = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1)]));
    let notifier = MemoryNotifier::new();

    let failing = Pipeline::new(
        "table1",
        store.clone(),
        FailingLoader::after(rows(&[(7, "partial", 1)])),
        notifier.clone(),
    );
    let err = failing.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.has_kind(ErrorKind::SourceQueryFailed));
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 1)]));
    assert!(store.changelog().await.is_empty());
    assert!(notifier.completions().await.is_empty());

    let retry = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(1, "a", 1)])),
        notifier.clone(),
    );
    let report = retry.run().await.unwrap();

    assert_eq!(report.summary.changes(), 0);
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 1)]));
    assert_eq!(notifier.completions().await.len(), 1);
}

#[tokio::test]
async fn incomplete_staging_is_a_load_failure() {
    init_test_tracing();
    let store = MemoryTableStore::new();
    let loader = MiscountingLoader::new(rows(&[(1, "a", 1)]), 2);
    let pipeline = Pipeline::new("table1", store.clone(), loader, MemoryNotifier::new());

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.has_kind(ErrorKind::StagingIncomplete));
    assert!(store.target_rows().await.is_empty());
}

#[tokio::test]
async fn failed_commit_is_an_apply_failure_and_keeps_target_and_staging() {
    init_test_tracing();
    let inner = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1)]));
    let store = FaultInjectingTableStore::wrap(
        inner.clone(),
        FaultConfig {
            commit: true,
            ..FaultConfig::default()
        },
    );
    let loader = MemoryStagingLoader::new(rows(&[(1, "a", 2), (2, "b", 1)]));
    let notifier = MemoryNotifier::new();
    let pipeline = Pipeline::new("table1", store, loader, notifier.clone());

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApplyFailure);
    assert!(err.has_kind(ErrorKind::WarehouseQueryFailed));
    assert_eq!(inner.target_rows().await, rows(&[(1, "a", 1)]));
    assert!(inner.changelog().await.is_empty());
    assert_eq!(inner.staging_rows().await.len(), 2);
    assert!(notifier.completions().await.is_empty());
}

#[tokio::test]
async fn failed_apply_is_an_apply_failure() {
    init_test_tracing();
    let inner = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1)]));
    let store = FaultInjectingTableStore::wrap(
        inner.clone(),
        FaultConfig {
            apply: true,
            ..FaultConfig::default()
        },
    );
    let pipeline = Pipeline::new(
        "table1",
        store,
        MemoryStagingLoader::new(rows(&[(2, "b", 1)])),
        MemoryNotifier::new(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApplyFailure);
    assert_eq!(inner.target_rows().await, rows(&[(1, "a", 1)]));
}

#[tokio::test]
async fn unreadable_target_is_a_load_failure() {
    init_test_tracing();
    let store = FaultInjectingTableStore::wrap(
        MemoryTableStore::new(),
        FaultConfig {
            target_rows: true,
            ..FaultConfig::default()
        },
    );
    let pipeline = Pipeline::new(
        "table1",
        store,
        MemoryStagingLoader::new(rows(&[(1, "a", 1)])),
        MemoryNotifier::new(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailure);
}

#[tokio::test]
async fn notification_failure_does_not_fail_a_committed_run() {
    init_test_tracing();
    let store = MemoryTableStore::new();
    let notifier = MemoryNotifier::failing();
    let pipeline = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(1, "a", 1)])),
        notifier.clone(),
    );

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.summary.inserts, 1);
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 1)]));
    assert_eq!(notifier.completions().await.len(), 1);
}

#[tokio::test]
async fn run_is_rejected_while_another_holds_the_target() {
    init_test_tracing();
    let store = MemoryTableStore::new();
    let _held = store.lock_run().await.unwrap();
    let pipeline = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(1, "a", 1)])),
        MemoryNotifier::new(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.has_kind(ErrorKind::ConcurrentRun));
    assert!(store.target_rows().await.is_empty());
}

#[tokio::test]
async fn overlapping_run_is_rejected_without_touching_staging_or_target() {
    init_test_tracing();
    let source = rows(&[(1, "a", 1), (2, "b", 1), (3, "c", 1)]);
    let store = MemoryTableStore::with_target_rows(source.clone());
    let gated = GatedLoader::new(source.clone());
    let first = Pipeline::new("table1", store.clone(), gated.clone(), MemoryNotifier::new());
    let second_notifier = MemoryNotifier::new();
    let second = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(source.clone()),
        second_notifier.clone(),
    );

    let overlapping = async {
        gated.wait_until_loaded().await;
        let result = second.run().await;
        gated.release();
        result
    };
    let (first_result, second_result) = tokio::join!(first.run(), overlapping);

    let err = second_result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.has_kind(ErrorKind::ConcurrentRun));
    assert!(second_notifier.completions().await.is_empty());

    let report = first_result.unwrap();
    assert_eq!(report.rows_loaded, 3);
    assert_eq!(report.summary.changes(), 0);
    assert_eq!(store.target_rows().await, source);
    assert!(store.changelog().await.is_empty());

    // The lock is released once the first run is done.
    let rerun = second.run().await.unwrap();
    assert_eq!(rerun.summary.changes(), 0);
    assert_eq!(store.target_rows().await, source);
}
