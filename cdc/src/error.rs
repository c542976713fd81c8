//! Error types and result definitions for reconciliation runs.
//!
//! Every fallible operation returns [`CdcResult`]. A [`CdcError`] carries an [`ErrorKind`], a
//! static description, optional dynamic detail, an optional source error and the location where
//! it was raised. Run level failures wrap the underlying error as their source, so the full
//! cause chain survives up to the scheduler.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type of fallible reconciliation operations.
pub type CdcResult<T> = Result<T, CdcError>;

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct CdcError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of errors raised while staging, reconciling and notifying.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Run level failures
    LoadFailure,
    ApplyFailure,

    // Connection errors
    SourceConnectionFailed,
    WarehouseConnectionFailed,

    // Query errors
    SourceQueryFailed,
    WarehouseQueryFailed,

    // Schema and data errors
    SchemaMismatch,
    DuplicateRowKey,
    StagingIncomplete,
    ConversionError,
    InvalidData,

    // Coordination errors
    ConcurrentRun,
    RunTimedOut,

    // Configuration errors
    ConfigError,

    // Notification errors
    NotificationFailed,

    // IO and serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    Unknown,

    // Raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

/// The two ways a whole run can fail.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum RunFailure {
    /// Staging could not be populated; nothing was classified.
    Load,
    /// Changes were classified but could not be applied; the target is unchanged.
    Apply,
}

impl RunFailure {
    /// The [`ErrorKind`] a run failure is reported with.
    pub fn kind(self) -> ErrorKind {
        match self {
            RunFailure::Load => ErrorKind::LoadFailure,
            RunFailure::Apply => ErrorKind::ApplyFailure,
        }
    }

    fn description(self) -> &'static str {
        match self {
            RunFailure::Load => "Staging load failed, the run was aborted before classification",
            RunFailure::Apply => "Applying changes failed, the target table was left unchanged",
        }
    }
}

impl CdcError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the kinds of this error and of every [`CdcError`] in its source chain,
    /// outermost first.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        let mut kinds = vec![self.kind];
        let mut current: Option<&(dyn error::Error + 'static)> = error::Error::source(self);
        while let Some(err) = current {
            if let Some(cdc_error) = err.downcast_ref::<CdcError>() {
                kinds.push(cdc_error.kind);
            }
            current = err.source();
        }

        kinds
    }

    /// Returns `true` if this error or any error in its source chain has `kind`.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Returns the callsite location where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Wraps this error into a run level failure.
    ///
    /// Errors that already are run level failures are returned unchanged, so wrapping is
    /// idempotent as errors travel outwards.
    #[track_caller]
    pub fn into_run_failure(self, failure: RunFailure) -> CdcError {
        if matches!(self.kind, ErrorKind::LoadFailure | ErrorKind::ApplyFailure) {
            return self;
        }

        let detail = match &self.detail {
            Some(detail) => format!("{}: {detail}", self.description),
            None => self.description.to_string(),
        };

        CdcError::from_components(
            failure.kind(),
            Cow::Borrowed(failure.description()),
            Some(Cow::Owned(detail)),
            Some(Arc::new(self)),
        )
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CdcError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for CdcError {
    fn eq(&self, other: &CdcError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for CdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        let backtrace = self.backtrace.to_string();
        if !backtrace.trim().is_empty() && !backtrace.contains("disabled backtrace") {
            write!(f, "\n  Backtrace:")?;
            for line in backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for CdcError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates a [`CdcError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for CdcError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`CdcError`] from an error kind, static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for CdcError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for CdcError {
    #[track_caller]
    fn from(err: std::io::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for CdcError {
    #[track_caller]
    fn from(err: serde_json::Error) -> CdcError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts warehouse side [`sqlx::Error`]s.
///
/// Source side errors are classified by the loader, see [`source_sqlx_error`].
impl From<sqlx::Error> for CdcError {
    #[track_caller]
    fn from(err: sqlx::Error) -> CdcError {
        let (kind, description) = classify_sqlx_error(
            &err,
            ErrorKind::WarehouseConnectionFailed,
            ErrorKind::WarehouseQueryFailed,
        );

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts an [`sqlx::Error`] raised while reading from the relational source.
#[track_caller]
pub fn source_sqlx_error(err: sqlx::Error) -> CdcError {
    let (kind, description) = classify_sqlx_error(
        &err,
        ErrorKind::SourceConnectionFailed,
        ErrorKind::SourceQueryFailed,
    );

    let detail = err.to_string();
    CdcError::from_components(
        kind,
        Cow::Borrowed(description),
        Some(Cow::Owned(detail)),
        Some(Arc::new(err)),
    )
}

fn classify_sqlx_error(
    err: &sqlx::Error,
    connection_kind: ErrorKind,
    query_kind: ErrorKind,
) -> (ErrorKind, &'static str) {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => (connection_kind, "Database connection failed"),
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            (connection_kind, "Database connection pool unavailable")
        }
        sqlx::Error::Configuration(_) => (ErrorKind::ConfigError, "Database configuration invalid"),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            (ErrorKind::ConversionError, "Database value could not be decoded")
        }
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // Class 08: connection exception.
            Some(code) if code.starts_with("08") => (connection_kind, "Database connection failed"),
            // Class 42: undefined table or column.
            Some("42P01") | Some("42703") => {
                (ErrorKind::SchemaMismatch, "Database object does not exist")
            }
            _ => (query_kind, "Database query failed"),
        },
        _ => (query_kind, "Database operation failed"),
    }
}

impl From<reqwest::Error> for CdcError {
    #[track_caller]
    fn from(err: reqwest::Error) -> CdcError {
        let description = if err.is_timeout() {
            "Notification request timed out"
        } else if err.is_status() {
            "Notification endpoint returned an error status"
        } else {
            "Notification request failed"
        };

        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::NotificationFailed,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<uuid::Error> for CdcError {
    #[track_caller]
    fn from(err: uuid::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::InvalidData,
            Cow::Borrowed("UUID parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
