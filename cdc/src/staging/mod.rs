//! Bulk-load collaborators that fill the staging table.

mod base;
pub mod memory;
pub mod mysql;
pub mod postgres;

pub use base::*;
