//! Default values for every configuration field.
//!
//! # Design
//! - Keep deployment defaults in one place so the loader and tests agree.
//! - Sizes are bytes, durations are seconds unless the name says otherwise.

/// One gibibyte in bytes.
pub const GIB: u64 = 1024 * 1024 * 1024;

pub(crate) const ENGINE_URL: &str = "http://localhost:8080";
pub(crate) const ENGINE_USERNAME: &str = "admin";
pub(crate) const ENGINE_PASSWORD: &str = "adminadmin";
pub(crate) const ENGINE_TIMEOUT_SECS: u64 = 30;
pub(crate) const DOWNLOAD_DIR: &str = "/root/downloads";

pub(crate) const TRANSFER_BINARY: &str = "rclone";
pub(crate) const TRANSFER_REMOTE: &str = "remote:";
pub(crate) const TRANSFER_DESTINATION: &str = "BT_Uploads";
pub(crate) const MAX_UPLOADS: usize = 12;
pub(crate) const TRANSFER_TIMEOUT_SECS: u64 = 6 * 3600;
pub(crate) const TRANSFER_FLAGS: &[&str] = &[
    "--transfers=4",
    "--multi-thread-streams=8",
    "--multi-thread-cutoff=64M",
    "--buffer-size=64M",
    "--use-mmap",
    "--drive-chunk-size=128M",
    "--onedrive-chunk-size=125M",
    "--onedrive-no-versions",
    "--timeout=10m",
    "--retries=10",
    "--low-level-retries=20",
    "--stats-one-line",
    "--ignore-errors",
    "--no-check-certificate",
    "--no-traverse",
];

pub(crate) const SAFETY_MARGIN_BYTES: u64 = 20 * GIB;
pub(crate) const MIN_FILE_SIZE_BYTES: u64 = 10 * 1024;
pub(crate) const LOW_SPACE_THRESHOLD_BYTES: u64 = 10 * GIB;
pub(crate) const HEALTHY_AVAILABILITY: f64 = 0.9;

pub(crate) const SCAN_INTERVAL_SECS: u64 = 3;

pub(crate) const ZOMBIE_MAX_LIFETIME_SECS: u64 = 24 * 3600;
pub(crate) const ZOMBIE_MIN_SPEED_BPS: f64 = 10.0 * 1024.0;
pub(crate) const ZOMBIE_WARMUP_SECS: u64 = 240 * 60;

pub(crate) const DATABASE_PATH: &str = "sluice.db";
pub(crate) const STORE_RETRY_ATTEMPTS: u32 = 5;
pub(crate) const STORE_RETRY_BACKOFF_MS: u64 = 500;

pub(crate) const API_HOST: [u8; 4] = [0, 0, 0, 0];
pub(crate) const API_PORT: u16 = 5000;
pub(crate) const LOG_LEVEL: &str = "info";
