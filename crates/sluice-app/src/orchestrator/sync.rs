//! Reconciliation of engine tasks with the store.
//!
//! # Design
//! - Paused tasks whose metadata never resolved get escalating nudges:
//!   resume, then reannounce, then periodic force-start.
//! - Tasks with resolved metadata are captured once: every file is set to
//!   skip and the task resumed, so admission later only flips priorities.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use sluice_data::{NewFileItem, NewTorrent, StateStore};
use sluice_telemetry::Metrics;
use sluice_torrent_core::{DownloadEngine, EngineFile, EngineTask, FilePriority};
use tracing::{debug, info, warn};

use super::record_store_failure;

/// Declared size under which a paused task is assumed to lack metadata.
const STUCK_SIZE_THRESHOLD: u64 = 10 * 1024;

/// Smallest declared size a task needs before it is captured.
const MIN_INGEST_SIZE: u64 = 1024;

/// Nudge sent to a stuck task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescueAction {
    /// Plain resume.
    Resume,
    /// Tracker re-announce followed by resume.
    Reannounce,
    /// Force-start, bypassing queue limits.
    ForceStart,
}

impl RescueAction {
    /// Stable label used in metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::Reannounce => "reannounce",
            Self::ForceStart => "force_start",
        }
    }
}

/// Action for the `attempt`-th consecutive tick a task was seen stuck.
#[must_use]
pub const fn rescue_action(attempt: u32) -> Option<RescueAction> {
    match attempt {
        1 => Some(RescueAction::Resume),
        3 => Some(RescueAction::Reannounce),
        n if n >= 5 && n % 5 == 0 => Some(RescueAction::ForceStart),
        _ => None,
    }
}

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tasks captured into the store.
    pub ingested: usize,
    /// Rescue commands issued.
    pub rescues: usize,
}

/// Phase reconciling engine tasks with stored torrents.
pub struct MetadataSync {
    engine: Arc<dyn DownloadEngine>,
    store: StateStore,
    metrics: Metrics,
    download_dir: PathBuf,
    min_file_size: u64,
    rescue_attempts: HashMap<String, u32>,
}

impl MetadataSync {
    /// Build the phase; files smaller than `min_file_size` are never tracked.
    #[must_use]
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        store: StateStore,
        metrics: Metrics,
        download_dir: PathBuf,
        min_file_size: u64,
    ) -> Self {
        Self {
            engine,
            store,
            metrics,
            download_dir,
            min_file_size,
            rescue_attempts: HashMap::new(),
        }
    }

    /// Current rescue attempt count for `hash`.
    #[must_use]
    pub fn rescue_attempts(&self, hash: &str) -> u32 {
        self.rescue_attempts.get(hash).copied().unwrap_or_default()
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns an error when stored torrents cannot be read.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let tasks = self.engine.list_tasks().await;
        self.rescue_attempts
            .retain(|hash, _| tasks.iter().any(|task| &task.hash == hash));
        if tasks.is_empty() {
            return Ok(SyncReport::default());
        }
        let stored = self.store.torrent_hashes().await?;

        let mut report = SyncReport::default();
        for task in &tasks {
            let known = stored.contains(&task.hash);
            if !known && is_stuck(task) {
                if self.rescue(task).await {
                    report.rescues += 1;
                }
                continue;
            }
            if task.state.is_preparing() {
                self.rescue_attempts.remove(&task.hash);
                continue;
            }
            if known || task.total_size < MIN_INGEST_SIZE {
                continue;
            }

            let files = self.engine.list_files(&task.hash).await;
            if files.is_empty() {
                continue;
            }
            if self.ingest(task, &files).await {
                report.ingested += 1;
            }
        }
        Ok(report)
    }

    async fn rescue(&mut self, task: &EngineTask) -> bool {
        let attempt = self.rescue_attempts.entry(task.hash.clone()).or_insert(0);
        *attempt += 1;
        let attempt = *attempt;
        let Some(action) = rescue_action(attempt) else {
            return false;
        };

        info!(hash = %task.hash, attempt, action = action.label(), "nudging stuck task");
        let outcome = match action {
            RescueAction::Resume => self.engine.resume(&task.hash).await,
            RescueAction::Reannounce => match self.engine.reannounce(&task.hash).await {
                Ok(()) => self.engine.resume(&task.hash).await,
                Err(err) => Err(err),
            },
            RescueAction::ForceStart => self.engine.force_start(&task.hash, true).await,
        };
        if let Err(err) = outcome {
            debug!(hash = %task.hash, error = %err, "rescue command failed");
        }
        self.metrics.inc_magnet_rescue(action.label());
        true
    }

    async fn ingest(&mut self, task: &EngineTask, files: &[EngineFile]) -> bool {
        let all_indices: Vec<u32> = files.iter().map(|f| f.index).collect();
        let tracked: Vec<NewFileItem> = files
            .iter()
            .filter(|f| f.size >= self.min_file_size)
            .map(|f| NewFileItem {
                file_index: f.index,
                path: self.download_dir.join(&f.name).to_string_lossy().into_owned(),
                rel_path: f.name.clone(),
                size: f.size,
            })
            .collect();
        let tracked_count = tracked.len();
        let torrent = NewTorrent {
            hash: task.hash.clone(),
            name: task.name.clone(),
            total_size: task.total_size,
            files: tracked,
        };

        let inserted = match self.store.insert_torrent(&torrent).await {
            Ok(inserted) => inserted,
            Err(err) => {
                record_store_failure(&self.metrics, "insert_torrent", 0, &err);
                return false;
            }
        };
        if inserted {
            info!(
                hash = %task.hash,
                name = %task.name,
                files = files.len(),
                tracked = tracked_count,
                "captured new task"
            );
            self.metrics.inc_torrent_ingested();
        }

        if let Err(err) = self
            .engine
            .set_priority(&task.hash, &all_indices, FilePriority::Skip)
            .await
        {
            warn!(hash = %task.hash, error = %err, "failed to park task files");
        }
        if let Err(err) = self.engine.resume(&task.hash).await {
            warn!(hash = %task.hash, error = %err, "failed to resume captured task");
        }
        self.rescue_attempts.remove(&task.hash);
        inserted
    }
}

fn is_stuck(task: &EngineTask) -> bool {
    task.state.is_paused_download()
        && (task.metadata_pending() || task.total_size < STUCK_SIZE_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_torrent_core::EngineState;

    #[test]
    fn rescue_escalates_on_fixed_attempts() {
        let actions: Vec<_> = (1..=15).map(rescue_action).collect();
        assert_eq!(actions[0], Some(RescueAction::Resume));
        assert_eq!(actions[1], None);
        assert_eq!(actions[2], Some(RescueAction::Reannounce));
        assert_eq!(actions[3], None);
        assert_eq!(actions[4], Some(RescueAction::ForceStart));
        assert_eq!(actions[5..9], [None, None, None, None]);
        assert_eq!(actions[9], Some(RescueAction::ForceStart));
        assert_eq!(actions[14], Some(RescueAction::ForceStart));
    }

    #[test]
    fn stuck_requires_paused_download_and_missing_metadata() {
        let mut task = EngineTask {
            hash: "abc".into(),
            name: "abc".into(),
            total_size: 0,
            state: EngineState::PausedDownload,
        };
        assert!(is_stuck(&task));

        task.name = "Resolved".into();
        task.total_size = 4 * 1024;
        assert!(is_stuck(&task), "tiny size still counts as unresolved");

        task.total_size = 1 << 20;
        assert!(!is_stuck(&task));

        task.name = "abc".into();
        task.state = EngineState::FetchingMetadata;
        assert!(!is_stuck(&task));
    }
}
