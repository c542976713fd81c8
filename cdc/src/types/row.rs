use std::hash::{Hash, Hasher};

use crate::types::Cell;

/// Identity of a row, wrapping the value of its key column.
///
/// Hashing and equality follow [`Cell::same_value`]: floats by bit pattern, JSON by its
/// serialized text.
#[derive(Debug, Clone)]
pub struct RowKey(Cell);

impl RowKey {
    pub fn new(cell: Cell) -> Self {
        Self(cell)
    }

}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_value(&other.0)
    }
}

// `same_value` is reflexive for every variant, floats included.
impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        cell_hash(&self.0, state);
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

fn cell_hash<H: Hasher>(cell: &Cell, state: &mut H) {
    std::mem::discriminant(cell).hash(state);

    match cell {
        Cell::Null => {}
        Cell::Bool(v) => v.hash(state),
        Cell::String(v) | Cell::Numeric(v) => v.hash(state),
        Cell::I16(v) => v.hash(state),
        Cell::I32(v) => v.hash(state),
        Cell::I64(v) => v.hash(state),
        Cell::F32(v) => v.to_bits().hash(state),
        Cell::F64(v) => v.to_bits().hash(state),
        Cell::Date(v) => v.hash(state),
        Cell::Time(v) => v.hash(state),
        Cell::Timestamp(v) => v.hash(state),
        Cell::TimestampTz(v) => v.hash(state),
        Cell::Uuid(v) => v.hash(state),
        Cell::Json(v) => v.to_string().hash(state),
        Cell::Bytes(v) => v.hash(state),
    }
}

/// A keyed row: the key column value followed by the value columns in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    key: Cell,
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(key: Cell, values: Vec<Cell>) -> Self {
        Self { key, values }
    }

    pub fn key(&self) -> &Cell {
        &self.key
    }

    /// Returns the hashable identity of this row.
    pub fn row_key(&self) -> RowKey {
        RowKey::new(self.key.clone())
    }

    /// Non-key column values in table column order.
    pub fn values(&self) -> &[Cell] {
        &self.values
    }
}
