use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A field holds a value outside of its allowed range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// The staging and target tables resolve to the same table.
    #[error("`tables.staging` and `tables.target` must be different tables, both are `{0}`")]
    StagingIsTarget(String),
    /// Two of the configured column names collide.
    #[error("column name `{0}` is used for more than one role")]
    DuplicateColumnRole(String),
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, constraint: &str) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.to_string(),
            constraint: constraint.to_string(),
        }
    }
}
