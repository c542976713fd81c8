use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::reconcile::fingerprint::RowFingerprint;
use crate::types::{ChangeLogEntry, ChangeOp, RowKey, TableRow};

/// Outcome of comparing the target and staging images of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClassification {
    Insert,
    Update,
    Delete,
    Unchanged,
}

impl RowClassification {
    /// The change log operation recorded for this classification, `None` for unchanged rows.
    pub fn change_op(&self) -> Option<ChangeOp> {
        match self {
            RowClassification::Insert => Some(ChangeOp::Insert),
            RowClassification::Update => Some(ChangeOp::Update),
            RowClassification::Delete => Some(ChangeOp::Delete),
            RowClassification::Unchanged => None,
        }
    }
}

/// Classifies a key from its target and staging images.
///
/// Returns `None` when the key is absent on both sides.
pub fn classify_row(
    target: Option<&TableRow>,
    staging: Option<&TableRow>,
) -> Option<RowClassification> {
    match (target, staging) {
        (None, None) => None,
        (None, Some(_)) => Some(RowClassification::Insert),
        (Some(_), None) => Some(RowClassification::Delete),
        (Some(target), Some(staging)) => {
            if same_values(target, staging) {
                Some(RowClassification::Unchanged)
            } else {
                Some(RowClassification::Update)
            }
        }
    }
}

/// Compares the value columns of two rows.
///
/// Fingerprints decide quickly when rows differ; equal fingerprints are confirmed column by column.
fn same_values(target: &TableRow, staging: &TableRow) -> bool {
    if RowFingerprint::of(target.values()) != RowFingerprint::of(staging.values()) {
        return false;
    }

    target.values().len() == staging.values().len()
        && target
            .values()
            .iter()
            .zip(staging.values())
            .all(|(a, b)| a.same_value(b))
}

/// A classified change together with its winning row image.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub op: ChangeOp,
    pub row: TableRow,
}

/// The full difference between a target snapshot and a staging snapshot.
///
/// Computed once per run and used for both apply and change logging. Inserts and updates come
/// in staging order, followed by deletes in target order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
    unchanged: u64,
}

impl ChangeSet {
    /// Joins `target` and `staging` on their keys and classifies every key.
    ///
    /// Fails with [`ErrorKind::DuplicateRowKey`] when a key appears twice on either side.
    pub fn classify(target: Vec<TableRow>, staging: Vec<TableRow>) -> CdcResult<ChangeSet> {
        let mut target_index: HashMap<RowKey, usize> = HashMap::with_capacity(target.len());
        for (position, row) in target.iter().enumerate() {
            if target_index.insert(row.row_key(), position).is_some() {
                bail!(
                    ErrorKind::DuplicateRowKey,
                    "Duplicate row key in the target table",
                    format!("key `{}` appears more than once", row.key())
                );
            }
        }

        let mut staged_keys: HashSet<RowKey> = HashSet::with_capacity(staging.len());
        let mut changes = Vec::new();
        let mut unchanged = 0;

        for row in staging {
            let key = row.row_key();
            if staged_keys.contains(&key) {
                bail!(
                    ErrorKind::DuplicateRowKey,
                    "Duplicate row key in the staging table",
                    format!("key `{}` appears more than once", row.key())
                );
            }

            let target_row = target_index.get(&key).map(|&position| &target[position]);
            let op = classify_row(target_row, Some(&row)).and_then(|c| c.change_op());
            staged_keys.insert(key);

            match op {
                Some(op) => changes.push(Change { op, row }),
                None => unchanged += 1,
            }
        }

        for row in target {
            if !staged_keys.contains(&row.row_key()) {
                changes.push(Change {
                    op: ChangeOp::Delete,
                    row,
                });
            }
        }

        Ok(ChangeSet { changes, unchanged })
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn inserts(&self) -> u64 {
        self.count(ChangeOp::Insert)
    }

    pub fn updates(&self) -> u64 {
        self.count(ChangeOp::Update)
    }

    pub fn deletes(&self) -> u64 {
        self.count(ChangeOp::Delete)
    }

    /// Number of keys present on both sides with identical values.
    pub fn unchanged(&self) -> u64 {
        self.unchanged
    }

    /// Rows to write into the target: inserted and updated images in staging order.
    pub fn upserts(&self) -> impl Iterator<Item = &TableRow> {
        self.changes
            .iter()
            .filter(|change| change.op != ChangeOp::Delete)
            .map(|change| &change.row)
    }

    /// Keys whose current target row must be removed: updated and deleted keys.
    pub fn replaced_keys(&self) -> impl Iterator<Item = &TableRow> {
        self.changes
            .iter()
            .filter(|change| change.op != ChangeOp::Insert)
            .map(|change| &change.row)
    }

    /// Change log entries for every change, all stamped with `changed_at`.
    pub fn log_entries(&self, changed_at: DateTime<Utc>) -> Vec<ChangeLogEntry> {
        self.changes
            .iter()
            .map(|change| ChangeLogEntry {
                op: change.op,
                row: change.row.clone(),
                changed_at,
            })
            .collect()
    }

    fn count(&self, op: ChangeOp) -> u64 {
        self.changes.iter().filter(|change| change.op == op).count() as u64
    }
}
