use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::bail;
use crate::error::{CdcError, ErrorKind};
use crate::types::TableRow;

/// Kind of change recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    /// Single letter code stored in the change log's op column.
    pub fn code(&self) -> &'static str {
        match self {
            ChangeOp::Insert => "I",
            ChangeOp::Update => "U",
            ChangeOp::Delete => "D",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ChangeOp {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(ChangeOp::Insert),
            "U" => Ok(ChangeOp::Update),
            "D" => Ok(ChangeOp::Delete),
            other => bail!(
                ErrorKind::InvalidData,
                "Unknown change log operation code",
                format!("expected one of `I`, `U`, `D`, got `{other}`")
            ),
        }
    }
}

/// An immutable change log record.
///
/// `row` is the staging image for inserts and updates, and the last target image for deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    pub op: ChangeOp,
    pub row: TableRow,
    pub changed_at: DateTime<Utc>,
}
