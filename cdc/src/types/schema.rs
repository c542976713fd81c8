use std::fmt;

use config::shared::TableRef;

/// A schema qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the name quoted for use in SQL statements.
    pub fn as_quoted_identifier(&self) -> String {
        format!(
            "{}.{}",
            pg_escape::quote_identifier(&self.schema),
            pg_escape::quote_identifier(&self.name)
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl From<&TableRef> for TableName {
    fn from(value: &TableRef) -> Self {
        TableName::new(value.schema.clone(), value.name.clone())
    }
}

/// A column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    /// Catalog type name, e.g. `int8` or `varchar`.
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// Shape of a reconciled table: the key column and the value columns in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub key_column: ColumnSchema,
    pub value_columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Splits `columns` into the key column named `key_column` and the remaining value columns.
    ///
    /// Returns `None` when no column is named `key_column`.
    pub fn from_columns(columns: Vec<ColumnSchema>, key_column: &str) -> Option<TableSchema> {
        let mut key = None;
        let mut value_columns = Vec::with_capacity(columns.len().saturating_sub(1));
        for column in columns {
            if key.is_none() && column.name == key_column {
                key = Some(column);
            } else {
                value_columns.push(column);
            }
        }

        key.map(|key_column| TableSchema {
            key_column,
            value_columns,
        })
    }

    /// Column names, key first.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key_column.name.as_str())
            .chain(self.value_columns.iter().map(|column| column.name.as_str()))
    }

    /// Number of columns including the key.
    pub fn column_count(&self) -> usize {
        self.value_columns.len() + 1
    }
}
