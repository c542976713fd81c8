//! Warehouse table stores holding the target, staging and change log tables.

mod base;
pub mod memory;
pub mod postgres;

pub use base::*;
