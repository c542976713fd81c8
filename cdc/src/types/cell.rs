use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// A single typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    String(String),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Arbitrary precision numbers, kept in their canonical text form.
    Numeric(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Cell {
    /// Compares two cells for reconciliation.
    ///
    /// Unlike `==`, floats compare by bit pattern so `NaN` equals itself, and `Null` equals
    /// `Null`. Cells of different variants are never equal.
    pub fn same_value(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::F32(a), Cell::F32(b)) => a.to_bits() == b.to_bits(),
            (Cell::F64(a), Cell::F64(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(v) => write!(f, "{v}"),
            Cell::String(v) | Cell::Numeric(v) => f.write_str(v),
            Cell::I16(v) => write!(f, "{v}"),
            Cell::I32(v) => write!(f, "{v}"),
            Cell::I64(v) => write!(f, "{v}"),
            Cell::F32(v) => write!(f, "{v}"),
            Cell::F64(v) => write!(f, "{v}"),
            Cell::Date(v) => write!(f, "{v}"),
            Cell::Time(v) => write!(f, "{v}"),
            Cell::Timestamp(v) => write!(f, "{v}"),
            Cell::TimestampTz(v) => write!(f, "{}", v.to_rfc3339()),
            Cell::Uuid(v) => write!(f, "{v}"),
            Cell::Json(v) => write!(f, "{v}"),
            Cell::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I32(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::F64(value)
    }
}

impl<T> From<Option<T>> for Cell
where
    T: Into<Cell>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_the_same_value_as_itself() {
        assert!(Cell::F64(f64::NAN).same_value(&Cell::F64(f64::NAN)));
        assert_ne!(Cell::F64(f64::NAN), Cell::F64(f64::NAN));
    }

    #[test]
    fn null_is_the_same_value_as_null_only() {
        assert!(Cell::Null.same_value(&Cell::Null));
        assert!(!Cell::Null.same_value(&Cell::String(String::new())));
    }

    #[test]
    fn different_variants_never_match() {
        assert!(!Cell::I32(1).same_value(&Cell::I64(1)));
    }

    #[test]
    fn optional_values_convert_to_null() {
        assert_eq!(Cell::from(None::<i64>), Cell::Null);
        assert_eq!(Cell::from(Some("a")), Cell::String("a".to_string()));
    }
}
