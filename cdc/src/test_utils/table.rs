use crate::types::{Cell, TableRow};

/// Builds a row keyed by `id` with a text and an integer value column.
pub fn row(id: i64, name: &str, version: i64) -> TableRow {
    TableRow::new(Cell::I64(id), vec![Cell::from(name), Cell::I64(version)])
}

/// Builds one [`row`] per tuple, in order.
pub fn rows(values: &[(i64, &str, i64)]) -> Vec<TableRow> {
    values
        .iter()
        .map(|(id, name, version)| row(*id, name, *version))
        .collect()
}
