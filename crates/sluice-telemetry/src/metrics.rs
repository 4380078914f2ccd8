//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the scheduler's admission, eviction, upload, and budget signals.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across components.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    torrents_ingested_total: IntCounter,
    magnet_rescues_total: IntCounterVec,
    files_admitted_total: IntCounter,
    files_evicted_total: IntCounterVec,
    files_completed_total: IntCounter,
    uploads_total: IntCounterVec,
    uploads_in_flight: IntGauge,
    disk_budget_bytes: IntGauge,
    pending_debt_bytes: IntGauge,
    files_by_status: IntGaugeVec,
    scheduler_phase_failures_total: IntCounterVec,
    persistence_retries_exhausted_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Files admitted for download since start.
    pub files_admitted_total: u64,
    /// Files promoted to upload-ready since start.
    pub files_completed_total: u64,
    /// Transfers currently running.
    pub uploads_in_flight: i64,
    /// Budget computed on the latest tick.
    pub disk_budget_bytes: i64,
    /// Pending debt computed on the latest tick.
    pub pending_debt_bytes: i64,
    /// Mutations dropped after exhausting persistence retries.
    pub persistence_retries_exhausted_total: u64,
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Metric { name, source })?;
    Ok(collector)
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::Metric { name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::Metric { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::Metric { name, source })
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = register(
            &registry,
            "http_requests_total",
            counter_vec(
                "http_requests_total",
                "Total HTTP requests received",
                &["route", "code"],
            )?,
        )?;
        let torrents_ingested_total = register(
            &registry,
            "torrents_ingested_total",
            counter("torrents_ingested_total", "Torrents captured into the store")?,
        )?;
        let magnet_rescues_total = register(
            &registry,
            "magnet_rescues_total",
            counter_vec(
                "magnet_rescues_total",
                "Commands issued to unstick paused metadata-less tasks",
                &["action"],
            )?,
        )?;
        let files_admitted_total = register(
            &registry,
            "files_admitted_total",
            counter("files_admitted_total", "Files admitted for download")?,
        )?;
        let files_evicted_total = register(
            &registry,
            "files_evicted_total",
            counter_vec(
                "files_evicted_total",
                "Downloads evicted by the zombie policy",
                &["reason"],
            )?,
        )?;
        let files_completed_total = register(
            &registry,
            "files_completed_total",
            counter("files_completed_total", "Downloads promoted to upload-ready")?,
        )?;
        let uploads_total = register(
            &registry,
            "uploads_total",
            counter_vec("uploads_total", "Finished transfers by outcome", &["outcome"])?,
        )?;
        let uploads_in_flight = register(
            &registry,
            "uploads_in_flight",
            gauge("uploads_in_flight", "Transfers currently running")?,
        )?;
        let disk_budget_bytes = register(
            &registry,
            "disk_budget_bytes",
            gauge("disk_budget_bytes", "Admittable bytes computed on the latest tick")?,
        )?;
        let pending_debt_bytes = register(
            &registry,
            "pending_debt_bytes",
            gauge(
                "pending_debt_bytes",
                "Declared bytes of active downloads not yet allocated on disk",
            )?,
        )?;
        let files_by_status = register(
            &registry,
            "files_by_status",
            IntGaugeVec::new(
                Opts::new("files_by_status", "Tracked files per lifecycle status"),
                &["status"],
            )
            .map_err(|source| TelemetryError::Metric {
                name: "files_by_status",
                source,
            })?,
        )?;
        let scheduler_phase_failures_total = register(
            &registry,
            "scheduler_phase_failures_total",
            counter_vec(
                "scheduler_phase_failures_total",
                "Scheduling phases that ended in an error",
                &["phase"],
            )?,
        )?;
        let persistence_retries_exhausted_total = register(
            &registry,
            "persistence_retries_exhausted_total",
            counter(
                "persistence_retries_exhausted_total",
                "Mutations dropped after exhausting contention retries",
            )?,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                torrents_ingested_total,
                magnet_rescues_total,
                files_admitted_total,
                files_evicted_total,
                files_completed_total,
                uploads_total,
                uploads_in_flight,
                disk_budget_bytes,
                pending_debt_bytes,
                files_by_status,
                scheduler_phase_failures_total,
                persistence_retries_exhausted_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Count a newly captured torrent.
    pub fn inc_torrent_ingested(&self) {
        self.inner.torrents_ingested_total.inc();
    }

    /// Count a rescue command (`resume`, `reannounce`, `force_start`).
    pub fn inc_magnet_rescue(&self, action: &str) {
        self.inner
            .magnet_rescues_total
            .with_label_values(&[action])
            .inc();
    }

    /// Count admitted files.
    pub fn add_files_admitted(&self, count: u64) {
        self.inner.files_admitted_total.inc_by(count);
    }

    /// Count an eviction with its reason (`timeout` or `slow`).
    pub fn inc_file_evicted(&self, reason: &str) {
        self.inner
            .files_evicted_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Count a download promoted to upload-ready.
    pub fn inc_file_completed(&self) {
        self.inner.files_completed_total.inc();
    }

    /// Count a finished transfer (`success` or `failure`).
    pub fn inc_upload(&self, outcome: &str) {
        self.inner
            .uploads_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Track a transfer entering flight.
    pub fn upload_started(&self) {
        self.inner.uploads_in_flight.inc();
    }

    /// Track a transfer leaving flight.
    pub fn upload_finished(&self) {
        self.inner.uploads_in_flight.dec();
    }

    /// Record the budget computed on the latest tick.
    pub fn set_disk_budget(&self, bytes: i64) {
        self.inner.disk_budget_bytes.set(bytes);
    }

    /// Record the pending debt computed on the latest tick.
    pub fn set_pending_debt(&self, bytes: u64) {
        self.inner
            .pending_debt_bytes
            .set(i64::try_from(bytes).unwrap_or(i64::MAX));
    }

    /// Record how many files currently hold `status`.
    pub fn set_files_by_status(&self, status: &str, count: u64) {
        self.inner
            .files_by_status
            .with_label_values(&[status])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Count a failed scheduling phase.
    pub fn inc_phase_failure(&self, phase: &str) {
        self.inner
            .scheduler_phase_failures_total
            .with_label_values(&[phase])
            .inc();
    }

    /// Count a mutation dropped after exhausting retries.
    pub fn inc_retries_exhausted(&self) {
        self.inner.persistence_retries_exhausted_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded.
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.inner.registry.gather())
            .map_err(|source| TelemetryError::Render { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_admitted_total: self.inner.files_admitted_total.get(),
            files_completed_total: self.inner.files_completed_total.get(),
            uploads_in_flight: self.inner.uploads_in_flight.get(),
            disk_budget_bytes: self.inner.disk_budget_bytes.get(),
            pending_debt_bytes: self.inner.pending_debt_bytes.get(),
            persistence_retries_exhausted_total: self
                .inner
                .persistence_retries_exhausted_total
                .get(),
        }
    }
}
