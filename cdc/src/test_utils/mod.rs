//! Helpers for testing runs without a warehouse or a source database.
//!
//! Everything here is exposed through the `test-utils` feature:
//!
//! - [`table`] builds rows of the `(id, name, version)` shape used across tests.
//! - [`loader`] provides staging loaders that fail, miscount or pause mid-load.
//! - [`store`] wraps any [`crate::store::TableStore`] and injects faults at chosen steps.
//! - [`notifier`] records the completions it was told about.
//! - [`database`] creates throwaway Postgres databases on the server named by `TESTS_DATABASE_*`.
//! - [`failpoints`] configures named failpoints for the duration of a test.

pub mod database;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod loader;
pub mod notifier;
pub mod store;
pub mod table;
