//! Eviction of stalled or crawling downloads.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sluice_config::ZombieConfig;
use sluice_data::{FileItem, FileStatus, StateStore};
use sluice_fsops::purge_local;
use sluice_telemetry::Metrics;
use sluice_torrent_core::{DownloadEngine, FilePriority};
use tracing::{debug, warn};

use super::{fetch_live_files, live_file, record_store_failure};

/// Thresholds of the eviction policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZombiePolicy {
    /// Hard cap on time spent downloading.
    pub max_lifetime: Duration,
    /// Grace period during which speed is not judged.
    pub warmup: Duration,
    /// Minimum average throughput after warmup, in bytes per second.
    pub min_speed_bps: f64,
}

impl From<&ZombieConfig> for ZombiePolicy {
    fn from(value: &ZombieConfig) -> Self {
        Self {
            max_lifetime: value.max_lifetime,
            warmup: value.warmup,
            min_speed_bps: value.min_speed_bps,
        }
    }
}

/// Why a download was evicted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvictionReason {
    /// Exceeded the maximum lifetime.
    Timeout,
    /// Average throughput stayed below the minimum after warmup.
    Slow {
        /// Measured average throughput in bytes per second.
        speed_bps: f64,
    },
}

impl EvictionReason {
    /// Stable label used in metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Slow { .. } => "slow",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => formatter.write_str("timeout"),
            Self::Slow { speed_bps } => {
                write!(formatter, "slow: {:.1} KiB/s", speed_bps / 1024.0)
            }
        }
    }
}

/// Decide whether a download that has run for `elapsed` should be evicted.
///
/// Nothing is evicted while `elapsed <= warmup`, except by the lifetime cap.
/// Without `progress` only the lifetime cap applies.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn evaluate_zombie(
    elapsed: Duration,
    progress: Option<f64>,
    size: u64,
    policy: &ZombiePolicy,
) -> Option<EvictionReason> {
    if elapsed > policy.max_lifetime {
        return Some(EvictionReason::Timeout);
    }
    if elapsed <= policy.warmup {
        return None;
    }
    let progress = progress?;
    let seconds = elapsed.as_secs_f64();
    let speed_bps = if seconds > 0.0 {
        progress.clamp(0.0, 1.0) * size as f64 / seconds
    } else {
        0.0
    };
    (speed_bps < policy.min_speed_bps).then_some(EvictionReason::Slow { speed_bps })
}

/// Phase evicting zombie downloads.
pub struct ZombieMonitor {
    engine: Arc<dyn DownloadEngine>,
    store: StateStore,
    metrics: Metrics,
    policy: ZombiePolicy,
}

impl ZombieMonitor {
    /// Build the phase with the given policy.
    #[must_use]
    pub const fn new(
        engine: Arc<dyn DownloadEngine>,
        store: StateStore,
        metrics: Metrics,
        policy: ZombiePolicy,
    ) -> Self {
        Self {
            engine,
            store,
            metrics,
            policy,
        }
    }

    /// Stamp first observations and evict zombies as of `now`.
    ///
    /// Returns the ids of evicted files.
    ///
    /// # Errors
    ///
    /// Returns an error when the downloading set cannot be read.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let downloading = self.store.files_with_status(FileStatus::Downloading).await?;
        if downloading.is_empty() {
            return Ok(Vec::new());
        }

        let live = fetch_live_files(self.engine.as_ref(), &downloading).await;
        let mut evicted = Vec::new();
        for file in &downloading {
            let Some(started_at) = file.started_at else {
                if let Err(err) = self.store.mark_started(file.id, now).await {
                    record_store_failure(&self.metrics, "mark_started", file.id, &err);
                }
                continue;
            };

            let elapsed = (now - started_at).to_std().unwrap_or_default();
            let progress = live_file(&live, file).map(|engine_file| engine_file.progress);
            if progress.is_none() {
                debug!(file_id = file.id, "file missing from engine listing");
            }
            if let Some(reason) = evaluate_zombie(elapsed, progress, file.size, &self.policy)
                && self.evict(file, reason, elapsed).await
            {
                evicted.push(file.id);
            }
        }
        Ok(evicted)
    }

    async fn evict(&self, file: &FileItem, reason: EvictionReason, elapsed: Duration) -> bool {
        let recorded = reason.to_string();
        match self
            .store
            .transition(
                file.id,
                FileStatus::Downloading,
                FileStatus::Killed,
                Some(&recorded),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(file_id = file.id, "file left downloading before eviction");
                return false;
            }
            Err(err) => {
                record_store_failure(&self.metrics, "evict", file.id, &err);
                return false;
            }
        }

        warn!(
            hash = %file.torrent_hash,
            file_index = file.file_index,
            rel_path = %file.rel_path,
            elapsed_secs = elapsed.as_secs(),
            reason = %recorded,
            "evicted zombie download"
        );
        self.metrics.inc_file_evicted(reason.label());
        if let Err(err) = self
            .engine
            .set_priority(&file.torrent_hash, &[file.file_index], FilePriority::Skip)
            .await
        {
            warn!(hash = %file.torrent_hash, error = %err, "failed to stop evicted file");
        }
        purge_local(Path::new(&file.path)).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3_600);

    fn policy() -> ZombiePolicy {
        ZombiePolicy {
            max_lifetime: 24 * HOUR,
            warmup: 4 * HOUR,
            min_speed_bps: 10.0 * 1024.0,
        }
    }

    #[test]
    fn nothing_is_evicted_within_warmup_even_at_zero_speed() {
        assert_eq!(evaluate_zombie(4 * HOUR, Some(0.0), 1 << 30, &policy()), None);
        assert_eq!(evaluate_zombie(Duration::ZERO, Some(0.0), 1 << 30, &policy()), None);
    }

    #[test]
    fn slow_download_is_evicted_after_warmup() {
        let verdict = evaluate_zombie(4 * HOUR + Duration::from_secs(1), Some(0.0), 1 << 30, &policy());
        assert!(matches!(verdict, Some(EvictionReason::Slow { .. })));
        assert_eq!(verdict.map(|r| r.label()), Some("slow"));
    }

    #[test]
    fn fast_download_survives_warmup() {
        // 1 GiB fully fetched in ~5h is roughly 58 KiB/s.
        let elapsed = 5 * HOUR;
        assert_eq!(evaluate_zombie(elapsed, Some(1.0), 1 << 30, &policy()), None);
    }

    #[test]
    fn lifetime_cap_applies_even_at_full_speed() {
        let verdict = evaluate_zombie(24 * HOUR + Duration::from_secs(1), Some(1.0), u64::MAX, &policy());
        assert_eq!(verdict, Some(EvictionReason::Timeout));
    }

    #[test]
    fn unknown_progress_only_trips_the_lifetime_cap() {
        assert_eq!(evaluate_zombie(5 * HOUR, None, 1 << 30, &policy()), None);
        assert_eq!(
            evaluate_zombie(24 * HOUR + Duration::from_secs(1), None, 1 << 30, &policy()),
            Some(EvictionReason::Timeout)
        );
    }

    #[test]
    fn reasons_render_for_operators() {
        assert_eq!(EvictionReason::Timeout.to_string(), "timeout");
        let slow = EvictionReason::Slow { speed_bps: 2048.0 };
        assert_eq!(slow.to_string(), "slow: 2.0 KiB/s");
    }
}
