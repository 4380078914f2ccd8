//! The scheduling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sluice_config::SluiceConfig;
use sluice_data::{DataError, StateStore};
use sluice_fsops::{SpaceProbe, TransferTool};
use sluice_telemetry::Metrics;
use sluice_torrent_core::DownloadEngine;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::budget::DiskBudgetScheduler;
use super::completion::CompletionDetector;
use super::sync::MetadataSync;
use super::upload::{UploadApplier, UploadDispatcher};
use super::zombie::{ZombieMonitor, ZombiePolicy};

/// Capabilities shared by the scheduling phases.
#[derive(Clone)]
pub struct SchedulerDeps {
    /// Download engine client.
    pub engine: Arc<dyn DownloadEngine>,
    /// State store.
    pub store: StateStore,
    /// Disk space probe.
    pub probe: Arc<dyn SpaceProbe>,
    /// Transfer tool.
    pub transfer: Arc<dyn TransferTool>,
    /// Metrics registry.
    pub metrics: Metrics,
}

/// Runs the five phases in order every scan interval.
pub struct Scheduler {
    sync: MetadataSync,
    completion: CompletionDetector,
    zombie: ZombieMonitor,
    budget: DiskBudgetScheduler,
    uploads: UploadDispatcher,
    store: StateStore,
    metrics: Metrics,
    interval: Duration,
}

impl Scheduler {
    /// Wire every phase from `deps` and `config`, returning the applier that
    /// must be spawned to consume upload results.
    #[must_use]
    pub fn new(deps: SchedulerDeps, config: &SluiceConfig) -> (Self, UploadApplier) {
        let SchedulerDeps {
            engine,
            store,
            probe,
            transfer,
            metrics,
        } = deps;
        let download_dir = config.engine.download_dir.clone();

        let sync = MetadataSync::new(
            Arc::clone(&engine),
            store.clone(),
            metrics.clone(),
            download_dir.clone(),
            config.disk.min_file_size,
        );
        let completion =
            CompletionDetector::new(Arc::clone(&engine), store.clone(), metrics.clone());
        let zombie = ZombieMonitor::new(
            Arc::clone(&engine),
            store.clone(),
            metrics.clone(),
            ZombiePolicy::from(&config.zombie),
        );
        let budget = DiskBudgetScheduler::new(
            Arc::clone(&engine),
            store.clone(),
            probe,
            metrics.clone(),
            download_dir,
            &config.disk,
        );
        let (uploads, applier) = UploadDispatcher::new(
            store.clone(),
            transfer,
            engine,
            metrics.clone(),
            config.transfer.max_concurrent,
        );

        let scheduler = Self {
            sync,
            completion,
            zombie,
            budget,
            uploads,
            store,
            metrics,
            interval: config.scheduler.scan_interval,
        };
        (scheduler, applier)
    }

    /// Run one tick of every phase as of `now`. Phase failures are logged and
    /// counted; later phases still run.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let result = self.sync.run().await;
        self.observe("sync", result);
        let result = self.completion.run().await;
        self.observe("completion", result);
        let result = self.zombie.run(now).await;
        self.observe("zombie", result);
        let result = self.budget.run().await;
        self.observe("budget", result);
        let result = self.uploads.run().await;
        self.observe("uploads", result);
        self.refresh_status_gauges().await;
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs_f64(), "scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick(Utc::now()).await;
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    fn observe<T>(&self, phase: &'static str, result: anyhow::Result<T>) {
        if let Err(err) = result {
            if let Some(DataError::RetriesExhausted { .. }) = err.downcast_ref::<DataError>() {
                self.metrics.inc_retries_exhausted();
            }
            self.metrics.inc_phase_failure(phase);
            error!(phase, error = %format!("{err:#}"), "scheduling phase failed");
        }
    }

    async fn refresh_status_gauges(&self) {
        match self.store.status_counts().await {
            Ok(counts) => {
                for (status, count) in counts {
                    self.metrics.set_files_by_status(status.label(), count);
                }
            }
            Err(err) => debug!(error = %err, "status gauges not refreshed"),
        }
    }
}
