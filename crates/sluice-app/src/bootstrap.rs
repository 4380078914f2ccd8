//! Process bootstrap: configuration, telemetry, store, engine session,
//! scheduling loop and dashboard API.

use std::future::Future;
use std::sync::Arc;

use sluice_api::{ApiServer, ApiState};
use sluice_config::{LogStyle, SluiceConfig};
use sluice_data::{RetryPolicy, StateStore};
use sluice_fsops::{HostSpaceProbe, RcloneTransfer, SpaceProbe, TransferSettings, TransferTool};
use sluice_qbit::{QbitClient, QbitSettings};
use sluice_telemetry::{GlobalContextGuard, LogFormat, Metrics};
use sluice_torrent_core::{DownloadEngine, EnginePreferences};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::orchestrator::{Scheduler, SchedulerDeps};

/// Capabilities the relay runs against; production builds them from
/// configuration, tests inject scripted doubles.
pub(crate) struct BootstrapDependencies {
    engine: Arc<dyn DownloadEngine>,
    store: StateStore,
    probe: Arc<dyn SpaceProbe>,
    transfer: Arc<dyn TransferTool>,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from validated configuration.
    pub(crate) async fn from_config(config: &SluiceConfig) -> AppResult<Self> {
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let store = StateStore::open(
            &config.store.database_path,
            RetryPolicy::new(config.store.retry_attempts, config.store.retry_backoff),
        )
        .await
        .map_err(|err| AppError::data("state_store.open", err))?;
        let engine = QbitClient::new(QbitSettings {
            base_url: config.engine.url.clone(),
            username: config.engine.username.clone(),
            password: config.engine.password.clone(),
            request_timeout: config.engine.request_timeout,
            save_path: config.engine.download_dir.clone(),
        })
        .map_err(|err| AppError::engine("qbit_client.new", err))?;
        let transfer = RcloneTransfer::new(TransferSettings {
            binary: config.transfer.binary.clone(),
            remote: config.transfer.remote.clone(),
            destination: config.transfer.destination.clone(),
            flags: config.transfer.flags.clone(),
            timeout: config.transfer.timeout,
        });

        Ok(Self {
            engine: Arc::new(engine),
            store,
            probe: Arc::new(HostSpaceProbe),
            transfer: Arc::new(transfer),
            telemetry,
        })
    }
}

/// Entry point for the Sluice boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, telemetry, the state store or the
/// engine session cannot be established, or if the API listener fails.
pub async fn run_app() -> AppResult<()> {
    let config =
        SluiceConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
    sluice_telemetry::init_logging(&sluice_telemetry::LoggingConfig {
        level: &config.logging.level,
        format: log_format(config.logging.style),
        ..sluice_telemetry::LoggingConfig::default()
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("relay");

    info!("Sluice relay bootstrap starting");
    let dependencies = BootstrapDependencies::from_config(&config).await?;
    Box::pin(run_app_with(config, dependencies, shutdown_signal())).await
}

/// Boot sequence over injected dependencies; returns once `shutdown`
/// resolves and the loop has stopped.
pub(crate) async fn run_app_with<F>(
    config: SluiceConfig,
    dependencies: BootstrapDependencies,
    shutdown: F,
) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let BootstrapDependencies {
        engine,
        store,
        probe,
        transfer,
        telemetry,
    } = dependencies;

    let requeued = store
        .requeue_interrupted_uploads()
        .await
        .map_err(|err| AppError::data("state_store.requeue_interrupted_uploads", err))?;
    if requeued > 0 {
        info!(requeued, "interrupted uploads returned to ready");
    }

    establish_session(engine.as_ref(), &config).await?;
    if let Err(err) = engine
        .apply_preferences(&EnginePreferences::default())
        .await
    {
        warn!(error = %format!("{err:#}"), "engine preferences not applied");
    }

    let (scheduler, applier) = Scheduler::new(
        SchedulerDeps {
            engine: Arc::clone(&engine),
            store: store.clone(),
            probe: Arc::clone(&probe),
            transfer,
            metrics: telemetry.clone(),
        },
        &config,
    );
    let applier_task = applier.spawn();
    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(stop_rx));

    let api = ApiServer::new(ApiState::new(
        engine,
        store,
        probe,
        telemetry,
        config.engine.download_dir.clone(),
    ));
    info!(addr = %config.api.bind_addr, "Launching API listener");
    let serve_result = api.serve(config.api.bind_addr, shutdown).await;

    let _ = stop_tx.send(true);
    let scheduler_result = scheduler_task.await;
    // Transfers still in flight are abandoned with the process; their rows
    // are requeued on the next start.
    applier_task.abort();

    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    scheduler_result.map_err(|source| AppError::Task {
        name: "scheduler",
        source,
    })?;
    info!("Sluice relay shutdown complete");
    Ok(())
}

async fn establish_session(engine: &dyn DownloadEngine, config: &SluiceConfig) -> AppResult<()> {
    match engine.login().await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::EngineLoginRejected {
            url: config.engine.url.clone(),
            username: config.engine.username.clone(),
        }),
        Err(err) => Err(AppError::EngineUnreachable {
            url: config.engine.url.clone(),
            detail: format!("{err:#}"),
        }),
    }
}

const fn log_format(style: Option<LogStyle>) -> LogFormat {
    match style {
        Some(LogStyle::Json) => LogFormat::Json,
        Some(LogStyle::Pretty) => LogFormat::Pretty,
        None => LogFormat::infer(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
