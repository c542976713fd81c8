//! Staged change data capture reconciliation.
//!
//! A run truncates a staging table, bulk loads it from a relational source, classifies every row
//! against the target table as an insert, update, delete or no-op, applies the changes to the
//! target and appends them to a change log inside one transaction, then signals completion.
//!
//! The building blocks are:
//!
//! - [`store::TableStore`]: the warehouse holding target, staging and change log tables.
//! - [`staging::StagingLoader`]: the bulk-load collaborator that fills staging.
//! - [`reconcile::Reconciler`]: classification and atomic apply.
//! - [`notification::Notifier`]: the success signal sent after a committed run.
//! - [`pipeline::Pipeline`]: one full run tying the pieces together.

mod conversions;
pub mod error;
pub mod failpoints;
mod macros;
pub mod notification;
pub mod pipeline;
pub mod reconcile;
pub mod staging;
pub mod store;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;
