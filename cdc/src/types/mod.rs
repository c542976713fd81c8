//! Row, schema and change log types shared by stores, loaders and the reconciler.

mod cell;
mod change;
mod row;
mod schema;

pub use cell::*;
pub use change::*;
pub use row::*;
pub use schema::*;
