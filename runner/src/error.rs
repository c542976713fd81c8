use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use cdc::error::CdcError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Backtrace captured when an infrastructure error is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the runner binary.
///
/// Wraps [`CdcError`] for failed runs and adds variants for setup errors.
#[derive(Debug)]
pub enum RunnerError {
    /// A run failed after exhausting its attempts, or the pipeline could not be built.
    Cdc(CdcError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error, e.g. while building the runtime.
    Io(std::io::Error, CapturedBacktrace),
}

impl RunnerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            RunnerError::Cdc(_) => "run error",
            RunnerError::Config(_, _) => "configuration error",
            RunnerError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            RunnerError::Cdc(err) => Some(err.backtrace()),
            RunnerError::Config(_, captured) => Some(&captured.0),
            RunnerError::Io(_, captured) => Some(&captured.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RunnerError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report for terminal output, listing the chain of causes.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("runner failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::Cdc(err) => write!(f, "{err}"),
            RunnerError::Config(source, _) => write!(f, "configuration error: {source}"),
            RunnerError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for RunnerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunnerError::Cdc(err) => err.source(),
            RunnerError::Config(source, _) => Some(source.as_ref()),
            RunnerError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<CdcError> for RunnerError {
    fn from(err: CdcError) -> Self {
        RunnerError::Cdc(err)
    }
}
