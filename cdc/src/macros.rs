//! Error construction shorthands used by the stores, loaders and the pipeline.
//!
//! The description is a static sentence naming what failed ("Staging row count does not match
//! the rows loaded"); the detail carries run specific values such as row counts or table names.

/// Creates a [`crate::error::CdcError`] from an [`crate::error::ErrorKind`] and static description.
///
/// Detail can be given positionally (formatted with `to_string`) or as `detail = <owned string>`,
/// and a source error as `source: <error>`. Stores use the source form to keep the driver error
/// reachable through the cause chain:
///
/// ```
/// use cdc::cdc_error;
/// use cdc::error::ErrorKind;
///
/// let io = std::io::Error::other("connection reset");
/// let err = cdc_error!(
///     ErrorKind::SourceConnectionFailed,
///     "Source connection dropped during the copy",
///     "after 1000 rows",
///     source: io
/// );
///
/// assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
/// assert_eq!(err.detail(), Some("after 1000 rows"));
/// ```
#[macro_export]
macro_rules! cdc_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::CdcError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::CdcError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::CdcError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::CdcError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::CdcError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::CdcError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with a [`crate::error::CdcError`], accepting the same arguments as [`cdc_error!`].
///
/// ```
/// use cdc::bail;
/// use cdc::error::{CdcResult, ErrorKind};
///
/// fn check_staging(loaded: u64, staged: u64) -> CdcResult<u64> {
///     if staged != loaded {
///         bail!(
///             ErrorKind::StagingIncomplete,
///             "Staging row count does not match the rows loaded",
///             format!("loaded {loaded} rows but staging holds {staged}")
///         );
///     }
///
///     Ok(staged)
/// }
///
/// assert_eq!(check_staging(3, 3).unwrap(), 3);
/// assert_eq!(check_staging(3, 2).unwrap_err().kind(), ErrorKind::StagingIncomplete);
/// ```
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::cdc_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::cdc_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::cdc_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::cdc_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::cdc_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
