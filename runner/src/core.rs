use cdc::notification::Notifier;
use cdc::notification::email::EmailNotifier;
use cdc::notification::noop::NoopNotifier;
use cdc::pipeline::Pipeline;
use cdc::staging::StagingLoader;
use cdc::staging::mysql::MySqlQueryLoader;
use cdc::staging::postgres::PostgresQueryLoader;
use cdc::store::postgres::PostgresTableStore;
use config::shared::{
    PgConnectionConfig, PipelineConfig, RunnerConfig, ScheduleConfig, SourceConnectionConfig,
    TablesConfig,
};
use tracing::{debug, info, warn};

use crate::error::RunnerResult;
use crate::scheduler::Scheduler;

/// Builds the pipeline described by `config` and hands it to the scheduler.
pub async fn start_runner_with_config(config: RunnerConfig) -> RunnerResult<()> {
    info!("starting runner service");

    log_config(&config);

    let store = PostgresTableStore::connect(&config.warehouse, &config.tables).await?;
    let batch = &config.pipeline.batch;

    // One branch per source and notifier keeps the pipeline statically dispatched.
    match &config.source.connection {
        SourceConnectionConfig::Postgres(connection) => {
            let loader = PostgresQueryLoader::connect_lazy(connection, &config.source.query, batch);
            start_with_loader(&config, store, loader).await?;
        }
        SourceConnectionConfig::Mysql(connection) => {
            let loader = MySqlQueryLoader::connect_lazy(connection, &config.source.query, batch);
            start_with_loader(&config, store, loader).await?;
        }
    }

    info!("runner service completed");

    Ok(())
}

async fn start_with_loader<L>(
    config: &RunnerConfig,
    store: PostgresTableStore,
    loader: L,
) -> RunnerResult<()>
where
    L: StagingLoader,
{
    let scheduler = Scheduler::new(config.schedule.clone());
    let name = config.pipeline.name.clone();

    match &config.notifications {
        Some(notifications) => {
            let notifier = EmailNotifier::new(&notifications.email)?;
            start_pipeline(&scheduler, Pipeline::new(name, store, loader, notifier)).await
        }
        None => {
            info!("no notifications configured, runs will finish silently");
            start_pipeline(&scheduler, Pipeline::new(name, store, loader, NoopNotifier)).await
        }
    }
}

#[tracing::instrument(skip_all, fields(pipeline = pipeline.name()))]
async fn start_pipeline<L, N>(
    scheduler: &Scheduler,
    pipeline: Pipeline<PostgresTableStore, L, N>,
) -> RunnerResult<()>
where
    L: StagingLoader,
    N: Notifier,
{
    scheduler.run(&pipeline, shutdown_signal()).await?;

    Ok(())
}

/// Resolves on Ctrl+C or, on unix, on SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler, listening for ctrl+c only");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("sigterm received, stopping after the current run");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("sigint (ctrl+c) received, stopping after the current run"),
        Err(err) => {
            warn!(error = %err, "failed to listen for ctrl+c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn log_config(config: &RunnerConfig) {
    log_pipeline_config(&config.pipeline);
    log_pg_connection_config("warehouse", &config.warehouse);
    log_source_config(&config.source.connection);
    log_tables_config(&config.tables);
    log_schedule_config(&config.schedule);
    debug!(
        email_notifications = config.notifications.is_some(),
        "notifications config"
    );
}

fn log_pipeline_config(config: &PipelineConfig) {
    debug!(
        name = config.name,
        batch_max_size = config.batch.max_size,
        "pipeline config"
    );
}

fn log_pg_connection_config(role: &str, config: &PgConnectionConfig) {
    debug!(
        role,
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "postgres connection config",
    );
}

fn log_source_config(config: &SourceConnectionConfig) {
    match config {
        SourceConnectionConfig::Postgres(connection) => {
            log_pg_connection_config("source", connection);
        }
        SourceConnectionConfig::Mysql(connection) => {
            debug!(
                host = connection.host,
                port = connection.port,
                dbname = connection.name,
                username = connection.username,
                tls_enabled = connection.tls.enabled,
                "mysql source connection config",
            );
        }
    }
}

fn log_tables_config(config: &TablesConfig) {
    debug!(
        target_table = %config.target,
        staging_table = %config.staging,
        changelog_table = %config.changelog,
        key_column = config.key_column,
        "tables config"
    );
}

fn log_schedule_config(config: &ScheduleConfig) {
    debug!(
        interval_secs = config.interval_secs,
        align_to_interval = config.align_to_interval,
        max_attempts = config.max_attempts,
        retry_delay_ms = config.retry_delay_ms,
        run_timeout_secs = config.run_timeout_secs,
        "schedule config"
    );
}
