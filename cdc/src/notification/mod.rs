//! Success signals sent after a committed run.

mod base;
pub mod email;
pub mod noop;

pub use base::*;
