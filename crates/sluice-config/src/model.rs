//! Typed configuration sections.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Complete runtime configuration, built once at startup and passed to each
/// component by value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SluiceConfig {
    /// Download engine connection.
    pub engine: EngineConfig,
    /// External transfer tool.
    pub transfer: TransferConfig,
    /// Disk budget policy.
    pub disk: DiskConfig,
    /// Scheduling loop cadence.
    pub scheduler: SchedulerConfig,
    /// Stall and slow-download eviction policy.
    pub zombie: ZombieConfig,
    /// State database.
    pub store: StoreConfig,
    /// Dashboard HTTP server.
    pub api: ApiConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Download engine connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the engine's web API (http or https).
    pub url: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Directory the engine saves payloads into; also the budgeted filesystem.
    pub download_dir: PathBuf,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EngineConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("download_dir", &self.download_dir)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: defaults::ENGINE_URL.to_string(),
            username: defaults::ENGINE_USERNAME.to_string(),
            password: defaults::ENGINE_PASSWORD.to_string(),
            request_timeout: Duration::from_secs(defaults::ENGINE_TIMEOUT_SECS),
            download_dir: PathBuf::from(defaults::DOWNLOAD_DIR),
        }
    }
}

/// External transfer tool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Program to execute.
    pub binary: String,
    /// Remote name including its trailing colon.
    pub remote: String,
    /// Folder inside the remote receiving uploads.
    pub destination: String,
    /// Maximum transfers in flight.
    pub max_concurrent: usize,
    /// Upper bound for one invocation.
    pub timeout: Duration,
    /// Flags appended to every invocation.
    pub flags: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            binary: defaults::TRANSFER_BINARY.to_string(),
            remote: defaults::TRANSFER_REMOTE.to_string(),
            destination: defaults::TRANSFER_DESTINATION.to_string(),
            max_concurrent: defaults::MAX_UPLOADS,
            timeout: Duration::from_secs(defaults::TRANSFER_TIMEOUT_SECS),
            flags: defaults::TRANSFER_FLAGS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Disk budget policy. Sizes are bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskConfig {
    /// Free space admitted downloads may never encroach on.
    pub safety_margin: u64,
    /// Files below this size are never tracked.
    pub min_file_size: u64,
    /// Remaining budget under which unhealthy files are skipped.
    pub low_space_threshold: u64,
    /// Availability at or above which a file counts as healthy.
    pub healthy_availability: f64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            safety_margin: defaults::SAFETY_MARGIN_BYTES,
            min_file_size: defaults::MIN_FILE_SIZE_BYTES,
            low_space_threshold: defaults::LOW_SPACE_THRESHOLD_BYTES,
            healthy_availability: defaults::HEALTHY_AVAILABILITY,
        }
    }
}

/// Scheduling loop cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Idle time between ticks.
    pub scan_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(defaults::SCAN_INTERVAL_SECS),
        }
    }
}

/// Eviction policy for stalled or crawling downloads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZombieConfig {
    /// Downloads running longer than this are evicted regardless of speed.
    pub max_lifetime: Duration,
    /// Minimum average throughput after warmup, in bytes per second.
    pub min_speed_bps: f64,
    /// Grace period during which no eviction happens.
    pub warmup: Duration,
}

impl Default for ZombieConfig {
    fn default() -> Self {
        Self {
            max_lifetime: Duration::from_secs(defaults::ZOMBIE_MAX_LIFETIME_SECS),
            min_speed_bps: defaults::ZOMBIE_MIN_SPEED_BPS,
            warmup: Duration::from_secs(defaults::ZOMBIE_WARMUP_SECS),
        }
    }
}

/// State database settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Attempts per contended mutation.
    pub retry_attempts: u32,
    /// Pause between attempts.
    pub retry_backoff: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(defaults::DATABASE_PATH),
            retry_attempts: defaults::STORE_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(defaults::STORE_RETRY_BACKOFF_MS),
        }
    }
}

/// Dashboard HTTP server settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((defaults::API_HOST, defaults::API_PORT)),
        }
    }
}

/// Output style for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStyle {
    /// Structured JSON lines.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output style; inferred from the build profile when unset.
    pub style: Option<LogStyle>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            style: None,
        }
    }
}
