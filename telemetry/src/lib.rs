//! Tracing setup for the runner binary and for tests.

use std::sync::Once;

use config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter directive used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Set this environment variable to see logs emitted by tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine the environment: {0}")]
    Environment(#[source] std::io::Error),

    #[error("failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Flushes buffered log lines when dropped.
///
/// Keep it alive for the lifetime of the process; dropping it early loses log output.
#[must_use = "dropping the flusher stops log output"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global tracing subscriber for `app_name`.
///
/// Logs are written to stdout through a non-blocking writer, as JSON in production and in human
/// readable form otherwise. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load().map_err(TracingError::Environment)?;

    tracing_log::LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if environment.is_prod() {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .try_init()?;
    }

    tracing::info!(app = app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Output goes through the test harness writer so it is captured per test.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
