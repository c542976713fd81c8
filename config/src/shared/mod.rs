mod base;
mod batch;
mod connection;
mod notification;
mod pipeline;
mod runner;
mod schedule;
mod source;
mod tables;

pub use base::*;
pub use batch::*;
pub use connection::*;
pub use notification::*;
pub use pipeline::*;
pub use runner::*;
pub use schedule::*;
pub use source::*;
pub use tables::*;
