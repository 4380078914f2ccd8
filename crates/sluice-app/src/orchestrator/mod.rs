//! Scheduling phases and the loop that drives them.
//!
//! Each phase holds only the capabilities it needs and is run strictly in
//! order by [`Scheduler`]: sync, completion, zombie, budget, uploads.

pub mod budget;
pub mod completion;
pub mod scheduler;
pub mod sync;
pub mod upload;
pub mod zombie;

use std::collections::{BTreeSet, HashMap};

use sluice_data::{DataError, FileItem};
use sluice_telemetry::Metrics;
use sluice_torrent_core::{DownloadEngine, EngineFile};
use tracing::warn;

pub use budget::{
    AdmissionPolicy, BudgetReport, Candidate, DiskBudgetScheduler, compute_budget, pending_debt,
    plan_admissions, priority_score,
};
pub use completion::{COMPLETE_PROGRESS, CompletionDetector};
pub use scheduler::{Scheduler, SchedulerDeps};
pub use sync::{MetadataSync, RescueAction, SyncReport, rescue_action};
pub use upload::{UploadApplier, UploadDispatcher, UploadReport};
pub use zombie::{EvictionReason, ZombieMonitor, ZombiePolicy, evaluate_zombie};

/// Live engine files keyed by torrent hash, then by engine file index.
pub(crate) type LiveFiles = HashMap<String, HashMap<u32, EngineFile>>;

/// Fetch engine file listings once per distinct torrent among `files`.
pub(crate) async fn fetch_live_files(engine: &dyn DownloadEngine, files: &[FileItem]) -> LiveFiles {
    let hashes: BTreeSet<&str> = files.iter().map(|f| f.torrent_hash.as_str()).collect();
    let mut live = LiveFiles::with_capacity(hashes.len());
    for hash in hashes {
        let listing = engine.list_files(hash).await;
        live.insert(
            hash.to_string(),
            listing.into_iter().map(|f| (f.index, f)).collect(),
        );
    }
    live
}

pub(crate) fn live_file<'a>(live: &'a LiveFiles, file: &FileItem) -> Option<&'a EngineFile> {
    live.get(&file.torrent_hash)
        .and_then(|files| files.get(&file.file_index))
}

/// Log a dropped mutation and count it when retries ran out.
pub(crate) fn record_store_failure(
    metrics: &Metrics,
    operation: &'static str,
    file_id: i64,
    error: &DataError,
) {
    if matches!(error, DataError::RetriesExhausted { .. }) {
        metrics.inc_retries_exhausted();
    }
    warn!(operation, file_id, error = %error, "state mutation dropped");
}
