//! Promotion of finished downloads to upload-ready.

use std::sync::Arc;

use anyhow::Result;
use sluice_data::{FileStatus, StateStore};
use sluice_telemetry::Metrics;
use sluice_torrent_core::DownloadEngine;
use tracing::info;

use super::{fetch_live_files, live_file, record_store_failure};

/// Progress at which a file counts as fully downloaded.
pub const COMPLETE_PROGRESS: f64 = 0.9999;

/// Phase moving completed downloads to `Ready`.
///
/// File priority is left untouched so the engine can finish verifying data.
pub struct CompletionDetector {
    engine: Arc<dyn DownloadEngine>,
    store: StateStore,
    metrics: Metrics,
}

impl CompletionDetector {
    /// Build the phase.
    #[must_use]
    pub const fn new(engine: Arc<dyn DownloadEngine>, store: StateStore, metrics: Metrics) -> Self {
        Self {
            engine,
            store,
            metrics,
        }
    }

    /// Promote every downloading file the engine reports complete.
    ///
    /// Returns the ids that moved.
    ///
    /// # Errors
    ///
    /// Returns an error when the downloading set cannot be read.
    pub async fn run(&self) -> Result<Vec<i64>> {
        let downloading = self.store.files_with_status(FileStatus::Downloading).await?;
        if downloading.is_empty() {
            return Ok(Vec::new());
        }

        let live = fetch_live_files(self.engine.as_ref(), &downloading).await;
        let mut completed = Vec::new();
        for file in &downloading {
            let Some(engine_file) = live_file(&live, file) else {
                continue;
            };
            if engine_file.progress < COMPLETE_PROGRESS {
                continue;
            }
            match self
                .store
                .transition(file.id, FileStatus::Downloading, FileStatus::Ready, None)
                .await
            {
                Ok(true) => {
                    info!(
                        hash = %file.torrent_hash,
                        file_index = file.file_index,
                        rel_path = %file.rel_path,
                        "download complete"
                    );
                    self.metrics.inc_file_completed();
                    completed.push(file.id);
                }
                Ok(false) => {}
                Err(err) => record_store_failure(&self.metrics, "complete", file.id, &err),
            }
        }
        Ok(completed)
    }
}
