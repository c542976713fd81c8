//! Runner binary for staged change data capture reconciliation.
//!
//! Loads configuration, initializes tracing and runs the pipeline either once or on a fixed
//! cadence, retrying failed runs according to the schedule.

use std::process::ExitCode;

use ::config::shared::RunnerConfig;
use telemetry::init_tracing;
use tracing::error;

use crate::config::load_runner_config;
use crate::core::start_runner_with_config;
use crate::error::{RunnerError, RunnerResult};

mod config;
mod core;
mod error;
mod scheduler;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> RunnerResult<()> {
    let runner_config = load_runner_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(RunnerError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(runner_config))
}

async fn async_main(runner_config: RunnerConfig) -> RunnerResult<()> {
    if let Err(err) = start_runner_with_config(runner_config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
