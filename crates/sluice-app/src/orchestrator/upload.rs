//! Bounded-concurrency upload dispatch.
//!
//! # Design
//! - A semaphore sized to the transfer limit gates dispatch; acquisition never
//!   waits, so a full gate defers to the next tick.
//! - Workers only run the transfer tool and send an [`UploadReport`] back.
//!   A single [`UploadApplier`] applies results to the store and engine.
//! - The slot permit travels inside the report and is dropped after the
//!   result is applied, whether or not applying succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use sluice_data::{FileItem, FileStatus, StateStore};
use sluice_fsops::{TransferOutcome, TransferRequest, TransferTool, purge_local};
use sluice_telemetry::Metrics;
use sluice_torrent_core::{DownloadEngine, FilePriority};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::record_store_failure;

/// Result of one transfer, carrying the slot it occupied.
#[derive(Debug)]
pub struct UploadReport {
    /// File that was transferred.
    pub file: FileItem,
    /// Outcome reported by the transfer tool.
    pub outcome: TransferOutcome,
    permit: OwnedSemaphorePermit,
}

/// Phase dispatching ready files to transfer workers.
pub struct UploadDispatcher {
    store: StateStore,
    transfer: Arc<dyn TransferTool>,
    metrics: Metrics,
    slots: Arc<Semaphore>,
    reports: mpsc::UnboundedSender<UploadReport>,
}

impl UploadDispatcher {
    /// Build a dispatcher allowing `max_concurrent` transfers and the applier
    /// that consumes its reports.
    #[must_use]
    pub fn new(
        store: StateStore,
        transfer: Arc<dyn TransferTool>,
        engine: Arc<dyn DownloadEngine>,
        metrics: Metrics,
        max_concurrent: usize,
    ) -> (Self, UploadApplier) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            store: store.clone(),
            transfer,
            metrics: metrics.clone(),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            reports: tx,
        };
        let applier = UploadApplier {
            store,
            engine,
            metrics,
            reports: rx,
        };
        (dispatcher, applier)
    }

    /// Slots not currently held by a transfer.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Launch a worker for each ready file while slots remain.
    ///
    /// Returns the ids dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error when the ready set cannot be read.
    pub async fn run(&self) -> Result<Vec<i64>> {
        let ready = self.store.files_with_status(FileStatus::Ready).await?;
        let mut dispatched = Vec::new();
        for file in ready {
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                debug!("upload slots exhausted; deferring to next tick");
                break;
            };
            match self
                .store
                .transition(file.id, FileStatus::Ready, FileStatus::Uploading, None)
                .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    record_store_failure(&self.metrics, "dispatch", file.id, &err);
                    continue;
                }
            }

            dispatched.push(file.id);
            self.metrics.upload_started();
            self.spawn_worker(file, permit);
        }
        Ok(dispatched)
    }

    fn spawn_worker(&self, file: FileItem, permit: OwnedSemaphorePermit) {
        let transfer = Arc::clone(&self.transfer);
        let reports = self.reports.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let request = TransferRequest {
                local_path: PathBuf::from(&file.path),
                rel_path: file.rel_path.clone(),
            };
            info!(
                hash = %file.torrent_hash,
                file_index = file.file_index,
                rel_path = %file.rel_path,
                "upload started"
            );
            let outcome = transfer.transfer(&request).await;
            let report = UploadReport {
                file,
                outcome,
                permit,
            };
            if let Err(unsent) = reports.send(report) {
                warn!(
                    file_id = unsent.0.file.id,
                    "upload applier stopped; result discarded"
                );
                metrics.upload_finished();
            }
        });
    }
}

/// Consumer applying upload results to the store and engine.
pub struct UploadApplier {
    store: StateStore,
    engine: Arc<dyn DownloadEngine>,
    metrics: Metrics,
    reports: mpsc::UnboundedReceiver<UploadReport>,
}

impl UploadApplier {
    /// Apply reports on a background task until every dispatcher is dropped.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Apply reports until every dispatcher is dropped.
    pub async fn run(mut self) {
        while let Some(report) = self.reports.recv().await {
            self.apply(report).await;
        }
        debug!("upload applier stopped");
    }

    /// Apply one report and release its slot.
    pub async fn apply(&self, report: UploadReport) {
        let UploadReport {
            file,
            outcome,
            permit,
        } = report;
        match outcome {
            TransferOutcome::Succeeded => self.apply_success(&file).await,
            TransferOutcome::Failed { reason } => self.apply_failure(&file, &reason).await,
        }
        self.metrics.upload_finished();
        drop(permit);
    }

    async fn apply_success(&self, file: &FileItem) {
        self.metrics.inc_upload("success");
        match self
            .store
            .transition(file.id, FileStatus::Uploading, FileStatus::Done, None)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(file_id = file.id, "uploaded file already left uploading");
                return;
            }
            Err(err) => {
                record_store_failure(&self.metrics, "upload_done", file.id, &err);
                return;
            }
        }

        info!(
            hash = %file.torrent_hash,
            file_index = file.file_index,
            rel_path = %file.rel_path,
            "upload finished"
        );
        if let Err(err) = self
            .engine
            .set_priority(&file.torrent_hash, &[file.file_index], FilePriority::Skip)
            .await
        {
            warn!(hash = %file.torrent_hash, error = %err, "failed to release uploaded file");
        }
        purge_local(Path::new(&file.path)).await;
    }

    async fn apply_failure(&self, file: &FileItem, reason: &str) {
        self.metrics.inc_upload("failure");
        warn!(
            hash = %file.torrent_hash,
            file_index = file.file_index,
            rel_path = %file.rel_path,
            reason,
            "upload failed; file requeued"
        );
        if let Err(err) = self
            .store
            .transition(file.id, FileStatus::Uploading, FileStatus::Ready, Some(reason))
            .await
        {
            record_store_failure(&self.metrics, "upload_failed", file.id, &err);
        }
    }
}
