mod pipeline_test;
mod postgres_store_test;
mod reconcile_test;
