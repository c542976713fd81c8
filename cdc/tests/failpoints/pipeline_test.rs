use cdc::error::ErrorKind;
use cdc::failpoints::{PIPELINE_AFTER_LOAD, RECONCILE_BEFORE_COMMIT};
use cdc::pipeline::Pipeline;
use cdc::staging::memory::MemoryStagingLoader;
use cdc::store::memory::MemoryTableStore;
use cdc::test_utils::failpoints::CustomFailScenario;
use cdc::test_utils::notifier::MemoryNotifier;
use cdc::test_utils::table::rows;
use telemetry::init_test_tracing;

#[tokio::test]
async fn failure_before_commit_leaves_target_untouched() {
    init_test_tracing();
    let scenario = CustomFailScenario::setup(&[(RECONCILE_BEFORE_COMMIT, "return")]);

    let store = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1), (3, "c", 1)]));
    let notifier = MemoryNotifier::new();
    let pipeline = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(1, "a", 2), (2, "b", 1)])),
        notifier.clone(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApplyFailure);
    assert!(err.has_kind(ErrorKind::FailpointTriggered));
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 1), (3, "c", 1)]));
    assert!(store.changelog().await.is_empty());
    assert!(notifier.completions().await.is_empty());

    // With the failpoint off the retried run reloads staging and commits.
    fail::cfg(RECONCILE_BEFORE_COMMIT, "off").unwrap();
    let report = pipeline.run().await.unwrap();
    assert_eq!(report.summary.changes(), 3);
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 2), (2, "b", 1)]));

    scenario.teardown();
}

#[tokio::test]
async fn failure_after_load_is_a_load_failure() {
    init_test_tracing();
    let scenario = CustomFailScenario::setup(&[(PIPELINE_AFTER_LOAD, "return")]);

    let store = MemoryTableStore::with_target_rows(rows(&[(1, "a", 1)]));
    let pipeline = Pipeline::new(
        "table1",
        store.clone(),
        MemoryStagingLoader::new(rows(&[(2, "b", 1)])),
        MemoryNotifier::new(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.has_kind(ErrorKind::FailpointTriggered));
    assert_eq!(store.target_rows().await, rows(&[(1, "a", 1)]));
    assert!(store.changelog().await.is_empty());

    scenario.teardown();
}
