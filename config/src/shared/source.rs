use std::fmt;

use serde::Deserialize;

use crate::shared::{MySqlConnectionConfig, PgConnectionConfig, ValidationError};

/// The relational database the change set is bulk copied from.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    pub connection: SourceConnectionConfig,
    /// Query whose result set becomes the staging table, key column first.
    pub query: String,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;

        if self.query.trim().is_empty() {
            return Err(ValidationError::invalid("source.query", "must not be empty"));
        }

        Ok(())
    }
}

/// Database engine of the source, with its connection parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConnectionConfig {
    Postgres(PgConnectionConfig),
    Mysql(MySqlConnectionConfig),
}

impl SourceConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SourceConnectionConfig::Postgres(config) => {
                config.validate("source.connection.postgres")
            }
            SourceConnectionConfig::Mysql(config) => config.validate("source.connection.mysql"),
        }
    }

    pub fn host(&self) -> &str {
        match self {
            SourceConnectionConfig::Postgres(config) => &config.host,
            SourceConnectionConfig::Mysql(config) => &config.host,
        }
    }

    pub fn database(&self) -> &str {
        match self {
            SourceConnectionConfig::Postgres(config) => &config.name,
            SourceConnectionConfig::Mysql(config) => &config.name,
        }
    }
}

impl fmt::Display for SourceConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConnectionConfig::Postgres(_) => write!(f, "postgres"),
            SourceConnectionConfig::Mysql(_) => write!(f, "mysql"),
        }
    }
}
