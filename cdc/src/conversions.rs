//! Mapping between Postgres and MySQL column values and [`Cell`]s.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::types::BigDecimal;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use crate::types::Cell;

/// Column types decoded natively; everything else is handled as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PgColumnType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    Bytea,
    Other(String),
}

impl PgColumnType {
    /// Parses a catalog `udt_name` or a driver type name such as `INT8`.
    pub(crate) fn from_name(name: &str) -> PgColumnType {
        match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => PgColumnType::Bool,
            "int2" | "smallint" => PgColumnType::Int2,
            "int4" | "integer" => PgColumnType::Int4,
            "int8" | "bigint" => PgColumnType::Int8,
            "float4" | "real" => PgColumnType::Float4,
            "float8" | "double precision" => PgColumnType::Float8,
            "numeric" => PgColumnType::Numeric,
            "text" | "varchar" | "bpchar" | "name" | "character varying" => PgColumnType::Text,
            "date" => PgColumnType::Date,
            "time" => PgColumnType::Time,
            "timestamp" => PgColumnType::Timestamp,
            "timestamptz" => PgColumnType::TimestampTz,
            "uuid" => PgColumnType::Uuid,
            "json" | "jsonb" => PgColumnType::Json,
            "bytea" => PgColumnType::Bytea,
            other => PgColumnType::Other(other.to_string()),
        }
    }

    /// Returns `true` when values of this type must be selected as `::text` to be decoded.
    pub(crate) fn needs_text_cast(&self) -> bool {
        matches!(self, PgColumnType::Other(_))
    }
}

/// Decodes column `index` of `row` as a [`Cell`] of type `column_type`.
pub(crate) fn decode_cell(
    row: &PgRow,
    index: usize,
    column_type: &PgColumnType,
) -> Result<Cell, sqlx::Error> {
    let cell = match column_type {
        PgColumnType::Bool => row.try_get::<Option<bool>, _>(index)?.map(Cell::Bool),
        PgColumnType::Int2 => row.try_get::<Option<i16>, _>(index)?.map(Cell::I16),
        PgColumnType::Int4 => row.try_get::<Option<i32>, _>(index)?.map(Cell::I32),
        PgColumnType::Int8 => row.try_get::<Option<i64>, _>(index)?.map(Cell::I64),
        PgColumnType::Float4 => row.try_get::<Option<f32>, _>(index)?.map(Cell::F32),
        PgColumnType::Float8 => row.try_get::<Option<f64>, _>(index)?.map(Cell::F64),
        PgColumnType::Numeric => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(|value| Cell::Numeric(value.to_string())),
        PgColumnType::Text | PgColumnType::Other(_) => {
            row.try_get::<Option<String>, _>(index)?.map(Cell::String)
        }
        PgColumnType::Date => row.try_get::<Option<NaiveDate>, _>(index)?.map(Cell::Date),
        PgColumnType::Time => row.try_get::<Option<NaiveTime>, _>(index)?.map(Cell::Time),
        PgColumnType::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(Cell::Timestamp),
        PgColumnType::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Cell::TimestampTz),
        PgColumnType::Uuid => row.try_get::<Option<Uuid>, _>(index)?.map(Cell::Uuid),
        PgColumnType::Json => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(Cell::Json),
        PgColumnType::Bytea => row.try_get::<Option<Vec<u8>>, _>(index)?.map(Cell::Bytes),
    };

    Ok(cell.unwrap_or(Cell::Null))
}

/// Decodes every column of `row` using the driver reported column types.
///
/// The first column becomes the row key.
pub(crate) fn decode_row_by_driver_types(row: &PgRow) -> Result<Vec<Cell>, sqlx::Error> {
    use sqlx::{Column, TypeInfo};

    let mut cells = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let column_type = PgColumnType::from_name(column.type_info().name());
        cells.push(decode_cell(row, index, &column_type)?);
    }

    Ok(cells)
}

/// Decodes every column of a MySQL `row` using the driver reported column types.
///
/// Unsigned integers widen to the next signed width; `BIGINT UNSIGNED` values beyond `i64` are
/// kept as numerics. Types without a native mapping are read as text.
pub(crate) fn decode_mysql_row(row: &MySqlRow) -> Result<Vec<Cell>, sqlx::Error> {
    use sqlx::{Column, TypeInfo};

    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| decode_mysql_cell(row, index, column.type_info().name()))
        .collect()
}

fn decode_mysql_cell(row: &MySqlRow, index: usize, type_name: &str) -> Result<Cell, sqlx::Error> {
    let cell = match type_name {
        "NULL" => None,
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map(Cell::Bool),
        "TINYINT" => row
            .try_get::<Option<i8>, _>(index)?
            .map(|value| Cell::I16(value.into())),
        "SMALLINT" => row.try_get::<Option<i16>, _>(index)?.map(Cell::I16),
        "MEDIUMINT" | "INT" => row.try_get::<Option<i32>, _>(index)?.map(Cell::I32),
        "BIGINT" => row.try_get::<Option<i64>, _>(index)?.map(Cell::I64),
        "TINYINT UNSIGNED" => row
            .try_get::<Option<u8>, _>(index)?
            .map(|value| Cell::I16(value.into())),
        "SMALLINT UNSIGNED" | "YEAR" => row
            .try_get::<Option<u16>, _>(index)?
            .map(|value| Cell::I32(value.into())),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => row
            .try_get::<Option<u32>, _>(index)?
            .map(|value| Cell::I64(value.into())),
        "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(index)?
            .map(|value| match i64::try_from(value) {
                Ok(value) => Cell::I64(value),
                Err(_) => Cell::Numeric(value.to_string()),
            }),
        "FLOAT" => row.try_get::<Option<f32>, _>(index)?.map(Cell::F32),
        "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.map(Cell::F64),
        "DECIMAL" => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(|value| Cell::Numeric(value.to_string())),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(index)?.map(Cell::Date),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(index)?.map(Cell::Time),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(Cell::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Cell::TimestampTz),
        "JSON" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(Cell::Json),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            row.try_get::<Option<Vec<u8>>, _>(index)?.map(Cell::Bytes)
        }
        _ => row.try_get::<Option<String>, _>(index)?.map(Cell::String),
    };

    Ok(cell.unwrap_or(Cell::Null))
}

/// Pushes `cell` as a bind parameter followed by a cast to `type_name`.
///
/// The cast lets text encoded values (numerics and types without a native mapping) and typed
/// nulls land in columns of any type.
pub(crate) fn push_cell_bind(
    separated: &mut Separated<'_, '_, Postgres, &'static str>,
    cell: &Cell,
    type_name: &str,
) {
    match cell.clone() {
        Cell::Null => separated.push_bind(None::<String>),
        Cell::Bool(v) => separated.push_bind(v),
        Cell::String(v) | Cell::Numeric(v) => separated.push_bind(v),
        Cell::I16(v) => separated.push_bind(v),
        Cell::I32(v) => separated.push_bind(v),
        Cell::I64(v) => separated.push_bind(v),
        Cell::F32(v) => separated.push_bind(v),
        Cell::F64(v) => separated.push_bind(v),
        Cell::Date(v) => separated.push_bind(v),
        Cell::Time(v) => separated.push_bind(v),
        Cell::Timestamp(v) => separated.push_bind(v),
        Cell::TimestampTz(v) => separated.push_bind(v),
        Cell::Uuid(v) => separated.push_bind(v),
        Cell::Json(v) => separated.push_bind(sqlx::types::Json(v)),
        Cell::Bytes(v) => separated.push_bind(v),
    };

    separated.push_unseparated(format!("::{}", pg_escape::quote_identifier(type_name)));
}
