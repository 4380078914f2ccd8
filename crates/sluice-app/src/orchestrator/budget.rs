//! Disk budget admission.
//!
//! # Design
//! - Budget is free space minus the safety margin minus the pending debt of
//!   files already admitted but not yet allocated on disk.
//! - Waiting files are ranked by availability first, size second, and admitted
//!   greedily while they fit.
//! - Ranking and admission are pure so the ordering rules can be tested without
//!   an engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use sluice_config::{DiskConfig, GIB};
use sluice_data::{FileItem, FileStatus, StateStore};
use sluice_fsops::SpaceProbe;
use sluice_telemetry::Metrics;
use sluice_torrent_core::{DownloadEngine, FilePriority, normalize_availability};
use tracing::{debug, info, warn};

use super::{fetch_live_files, live_file};

/// Admission thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionPolicy {
    /// Below this remaining budget, unhealthy files are skipped.
    pub low_space_threshold: u64,
    /// Availability at or above which a file counts as healthy.
    pub healthy_availability: f64,
}

impl From<&DiskConfig> for AdmissionPolicy {
    fn from(value: &DiskConfig) -> Self {
        Self {
            low_space_threshold: value.low_space_threshold,
            healthy_availability: value.healthy_availability,
        }
    }
}

/// Waiting file considered for admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Stored file id.
    pub id: i64,
    /// Owning torrent hash.
    pub torrent_hash: String,
    /// Engine file index.
    pub file_index: u32,
    /// Declared size in bytes.
    pub size: u64,
    /// Normalised live availability.
    pub availability: f64,
}

/// Figures computed by one budget pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetReport {
    /// Free bytes reported for the download directory.
    pub free_bytes: u64,
    /// Declared bytes of active downloads not yet allocated.
    pub pending_debt: u64,
    /// Admittable bytes at the start of the pass.
    pub budget: i64,
    /// Ids moved to `Downloading`.
    pub admitted: Vec<i64>,
}

/// Bytes the active downloads will still claim on disk.
///
/// A missing file owes its full size; a partially allocated one owes the gap.
#[must_use]
pub fn pending_debt(downloading: &[FileItem], probe: &dyn SpaceProbe) -> u64 {
    downloading
        .iter()
        .map(|file| match probe.allocated_bytes(Path::new(&file.path)) {
            Some(allocated) => file.size.saturating_sub(allocated),
            None => file.size,
        })
        .fold(0_u64, u64::saturating_add)
}

/// `free - safety_margin - pending_debt`, negative when oversubscribed.
#[must_use]
pub fn compute_budget(free: u64, safety_margin: u64, pending_debt: u64) -> i64 {
    let as_signed = |value: u64| i64::try_from(value).unwrap_or(i64::MAX);
    as_signed(free)
        .saturating_sub(as_signed(safety_margin))
        .saturating_sub(as_signed(pending_debt))
}

/// Ranking score: fully available files always outrank partial ones, and
/// among them more replicas and smaller sizes rank higher.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn priority_score(availability: f64, size: u64) -> f64 {
    if availability >= 1.0 {
        10_000.0 + availability * 10.0 - size as f64 / GIB as f64
    } else {
        availability * 100.0
    }
}

/// Rank `candidates` and greedily pick those that fit in `budget`.
///
/// Candidates with equal scores keep their input order.
#[must_use]
pub fn plan_admissions(
    mut candidates: Vec<Candidate>,
    budget: i64,
    policy: &AdmissionPolicy,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        priority_score(b.availability, b.size).total_cmp(&priority_score(a.availability, a.size))
    });

    let low_space = i64::try_from(policy.low_space_threshold).unwrap_or(i64::MAX);
    let mut remaining = budget;
    let mut admitted = Vec::new();
    for candidate in candidates {
        if remaining <= 0 {
            break;
        }
        if candidate.availability < policy.healthy_availability && remaining < low_space {
            continue;
        }
        let size = i64::try_from(candidate.size).unwrap_or(i64::MAX);
        if size <= remaining {
            remaining -= size;
            admitted.push(candidate);
        }
    }
    admitted
}

/// Phase admitting waiting files within the disk budget.
pub struct DiskBudgetScheduler {
    engine: Arc<dyn DownloadEngine>,
    store: StateStore,
    probe: Arc<dyn SpaceProbe>,
    metrics: Metrics,
    download_dir: PathBuf,
    safety_margin: u64,
    policy: AdmissionPolicy,
}

impl DiskBudgetScheduler {
    /// Build the phase for the given download directory and disk settings.
    #[must_use]
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        store: StateStore,
        probe: Arc<dyn SpaceProbe>,
        metrics: Metrics,
        download_dir: PathBuf,
        disk: &DiskConfig,
    ) -> Self {
        Self {
            engine,
            store,
            probe,
            metrics,
            download_dir,
            safety_margin: disk.safety_margin,
            policy: AdmissionPolicy::from(disk),
        }
    }

    /// Run one admission pass.
    ///
    /// # Errors
    ///
    /// Returns an error when free space cannot be measured or the store
    /// cannot be read or updated.
    pub async fn run(&self) -> Result<BudgetReport> {
        let free_bytes = self.probe.free_bytes(&self.download_dir)?;
        let downloading = self.store.files_with_status(FileStatus::Downloading).await?;
        let debt = pending_debt(&downloading, self.probe.as_ref());
        let budget = compute_budget(free_bytes, self.safety_margin, debt);
        self.metrics.set_disk_budget(budget);
        self.metrics.set_pending_debt(debt);

        let mut report = BudgetReport {
            free_bytes,
            pending_debt: debt,
            budget,
            admitted: Vec::new(),
        };
        if budget <= 0 {
            debug!(free_bytes, pending_debt = debt, budget, "no disk budget this tick");
            return Ok(report);
        }

        let waiting = self.store.files_with_status(FileStatus::Waiting).await?;
        if waiting.is_empty() {
            return Ok(report);
        }

        let live = fetch_live_files(self.engine.as_ref(), &waiting).await;
        let candidates = waiting
            .iter()
            .map(|file| Candidate {
                id: file.id,
                torrent_hash: file.torrent_hash.clone(),
                file_index: file.file_index,
                size: file.size,
                availability: live_file(&live, file)
                    .map_or(0.0, |f| normalize_availability(f.availability)),
            })
            .collect();
        let plan = plan_admissions(candidates, budget, &self.policy);
        if plan.is_empty() {
            return Ok(report);
        }

        let ids: Vec<i64> = plan.iter().map(|c| c.id).collect();
        let moved = self
            .store
            .transition_many(&ids, FileStatus::Waiting, FileStatus::Downloading)
            .await?;

        let mut batches: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for candidate in plan.iter().filter(|c| moved.contains(&c.id)) {
            info!(
                hash = %candidate.torrent_hash,
                file_index = candidate.file_index,
                size = candidate.size,
                availability = candidate.availability,
                "admitted file for download"
            );
            batches
                .entry(candidate.torrent_hash.as_str())
                .or_default()
                .push(candidate.file_index);
        }
        for (hash, indices) in batches {
            if let Err(err) = self
                .engine
                .set_priority(hash, &indices, FilePriority::Normal)
                .await
            {
                warn!(hash, error = %err, "failed to raise file priority");
            }
            if let Err(err) = self.engine.resume(hash).await {
                warn!(hash, error = %err, "failed to resume task");
            }
        }

        self.metrics
            .add_files_admitted(u64::try_from(moved.len()).unwrap_or(u64::MAX));
        report.admitted = moved;
        Ok(report)
    }
}
