use std::fmt;

use serde::Deserialize;

use crate::shared::ValidationError;

/// A schema qualified table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash)]
pub struct TableRef {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// The warehouse tables a run touches and the names of its bookkeeping columns.
#[derive(Clone, Debug, Deserialize)]
pub struct TablesConfig {
    /// Durable table reconciled to match staging.
    pub target: TableRef,
    /// Transient table fully replaced on every run.
    pub staging: TableRef,
    /// Append-only change log.
    pub changelog: TableRef,
    /// Unique row identifier shared by all three tables.
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Change log column holding `I`, `U` or `D`.
    #[serde(default = "default_op_column")]
    pub op_column: String,
    /// Change log column holding the change timestamp.
    #[serde(default = "default_change_time_column")]
    pub change_time_column: String,
}

impl TablesConfig {
    pub const DEFAULT_KEY_COLUMN: &'static str = "id";
    pub const DEFAULT_OP_COLUMN: &'static str = "op";
    pub const DEFAULT_CHANGE_TIME_COLUMN: &'static str = "changetime";

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, table) in [
            ("tables.target", &self.target),
            ("tables.staging", &self.staging),
            ("tables.changelog", &self.changelog),
        ] {
            if table.name.trim().is_empty() {
                return Err(ValidationError::invalid(
                    &format!("{field}.name"),
                    "must not be empty",
                ));
            }
        }

        if self.target == self.staging {
            return Err(ValidationError::StagingIsTarget(self.target.to_string()));
        }

        if self.changelog == self.target || self.changelog == self.staging {
            return Err(ValidationError::invalid(
                "tables.changelog",
                "must differ from the target and staging tables",
            ));
        }

        let columns = [
            ("tables.key_column", &self.key_column),
            ("tables.op_column", &self.op_column),
            ("tables.change_time_column", &self.change_time_column),
        ];
        for (field, column) in columns {
            if column.trim().is_empty() {
                return Err(ValidationError::invalid(field, "must not be empty"));
            }
        }
        for (i, (_, column)) in columns.iter().enumerate() {
            if columns[i + 1..].iter().any(|(_, other)| other == column) {
                return Err(ValidationError::DuplicateColumnRole(column.to_string()));
            }
        }

        Ok(())
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_key_column() -> String {
    TablesConfig::DEFAULT_KEY_COLUMN.to_string()
}

fn default_op_column() -> String {
    TablesConfig::DEFAULT_OP_COLUMN.to_string()
}

fn default_change_time_column() -> String {
    TablesConfig::DEFAULT_CHANGE_TIME_COLUMN.to_string()
}
