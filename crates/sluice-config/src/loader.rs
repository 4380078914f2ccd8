//! Environment-driven configuration loader.
//!
//! # Design
//! - Start from defaults and overlay every `SLUICE_*` variable that is set.
//! - Parse failures surface as `InvalidField` with reason `parse`; range checks
//!   live in `validate.rs`.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::defaults::GIB;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{LogStyle, SluiceConfig};

/// Environment variable names read by [`SluiceConfig::from_env`].
pub mod keys {
    /// Engine web API base URL.
    pub const ENGINE_URL: &str = "SLUICE_ENGINE_URL";
    /// Engine login user.
    pub const ENGINE_USERNAME: &str = "SLUICE_ENGINE_USERNAME";
    /// Engine login password.
    pub const ENGINE_PASSWORD: &str = "SLUICE_ENGINE_PASSWORD";
    /// Engine request timeout in seconds.
    pub const ENGINE_TIMEOUT_SECS: &str = "SLUICE_ENGINE_TIMEOUT_SECS";
    /// Engine save directory.
    pub const DOWNLOAD_DIR: &str = "SLUICE_DOWNLOAD_DIR";
    /// Transfer program.
    pub const TRANSFER_BINARY: &str = "SLUICE_TRANSFER_BINARY";
    /// Transfer remote name.
    pub const TRANSFER_REMOTE: &str = "SLUICE_TRANSFER_REMOTE";
    /// Transfer destination folder.
    pub const TRANSFER_DESTINATION: &str = "SLUICE_TRANSFER_DESTINATION";
    /// Maximum concurrent transfers.
    pub const MAX_UPLOADS: &str = "SLUICE_MAX_UPLOADS";
    /// Transfer timeout in seconds.
    pub const TRANSFER_TIMEOUT_SECS: &str = "SLUICE_TRANSFER_TIMEOUT_SECS";
    /// Space-separated transfer flags.
    pub const TRANSFER_FLAGS: &str = "SLUICE_TRANSFER_FLAGS";
    /// Safety margin in GiB.
    pub const SAFETY_MARGIN_GB: &str = "SLUICE_DISK_SAFETY_MARGIN_GB";
    /// Minimum tracked file size in bytes.
    pub const MIN_FILE_SIZE_BYTES: &str = "SLUICE_MIN_FILE_SIZE_BYTES";
    /// Low-space threshold in GiB.
    pub const LOW_SPACE_THRESHOLD_GB: &str = "SLUICE_LOW_SPACE_THRESHOLD_GB";
    /// Healthy availability cutoff.
    pub const HEALTHY_AVAILABILITY: &str = "SLUICE_HEALTHY_AVAILABILITY";
    /// Scan interval in seconds.
    pub const SCAN_INTERVAL_SECS: &str = "SLUICE_SCAN_INTERVAL_SECS";
    /// Zombie maximum lifetime in seconds.
    pub const ZOMBIE_MAX_LIFETIME_SECS: &str = "SLUICE_ZOMBIE_MAX_LIFETIME_SECS";
    /// Zombie minimum speed in bytes per second.
    pub const ZOMBIE_MIN_SPEED_BPS: &str = "SLUICE_ZOMBIE_MIN_SPEED_BPS";
    /// Zombie warmup in seconds.
    pub const ZOMBIE_WARMUP_SECS: &str = "SLUICE_ZOMBIE_WARMUP_SECS";
    /// State database path.
    pub const DATABASE_PATH: &str = "SLUICE_DATABASE_PATH";
    /// Attempts per contended mutation.
    pub const STORE_RETRY_ATTEMPTS: &str = "SLUICE_STORE_RETRY_ATTEMPTS";
    /// Backoff between attempts in milliseconds.
    pub const STORE_RETRY_BACKOFF_MS: &str = "SLUICE_STORE_RETRY_BACKOFF_MS";
    /// Dashboard listen address.
    pub const API_BIND: &str = "SLUICE_API_BIND";
    /// Default log filter.
    pub const LOG_LEVEL: &str = "SLUICE_LOG_LEVEL";
    /// Log output style (`json` or `pretty`).
    pub const LOG_FORMAT: &str = "SLUICE_LOG_FORMAT";
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, section: &str, field: &str) -> ConfigResult<Option<T>> {
        self.text(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| ConfigError::invalid(section, field, Some(raw.clone()), "parse"))
            })
            .transpose()
    }

    fn seconds(&self, key: &str, section: &str, field: &str) -> ConfigResult<Option<Duration>> {
        Ok(self.parse::<u64>(key, section, field)?.map(Duration::from_secs))
    }

    fn millis(&self, key: &str, section: &str, field: &str) -> ConfigResult<Option<Duration>> {
        Ok(self.parse::<u64>(key, section, field)?.map(Duration::from_millis))
    }

    fn gib(&self, key: &str, section: &str, field: &str) -> ConfigResult<Option<u64>> {
        let Some(raw) = self.text(key) else {
            return Ok(None);
        };
        let gib = raw
            .parse::<f64>()
            .map_err(|_| ConfigError::invalid(section, field, Some(raw.clone()), "parse"))?;
        gib_to_bytes(gib)
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(section, field, Some(raw), "range"))
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn gib_to_bytes(gib: f64) -> Option<u64> {
    if !gib.is_finite() || gib < 0.0 {
        return None;
    }
    let bytes = gib * GIB as f64;
    (bytes <= u64::MAX as f64).then(|| bytes.round() as u64)
}

fn parse_style(raw: &str) -> Option<LogStyle> {
    match raw.to_ascii_lowercase().as_str() {
        "json" => Some(LogStyle::Json),
        "pretty" | "text" => Some(LogStyle::Pretty),
        _ => None,
    }
}

impl SluiceConfig {
    /// Build and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for unparseable or out-of-range values.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build and validate configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for unparseable or out-of-range values.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Source { lookup };
        let mut config = Self::default();

        if let Some(url) = env.text(keys::ENGINE_URL) {
            config.engine.url = url;
        }
        if let Some(username) = env.text(keys::ENGINE_USERNAME) {
            config.engine.username = username;
        }
        if let Some(password) = env.text(keys::ENGINE_PASSWORD) {
            config.engine.password = password;
        }
        if let Some(timeout) = env.seconds(keys::ENGINE_TIMEOUT_SECS, "engine", "request_timeout")? {
            config.engine.request_timeout = timeout;
        }
        if let Some(dir) = env.text(keys::DOWNLOAD_DIR) {
            config.engine.download_dir = dir.into();
        }

        if let Some(binary) = env.text(keys::TRANSFER_BINARY) {
            config.transfer.binary = binary;
        }
        if let Some(remote) = env.text(keys::TRANSFER_REMOTE) {
            config.transfer.remote = remote;
        }
        if let Some(destination) = (env.lookup)(keys::TRANSFER_DESTINATION) {
            config.transfer.destination = destination.trim().to_string();
        }
        if let Some(max) = env.parse(keys::MAX_UPLOADS, "transfer", "max_concurrent")? {
            config.transfer.max_concurrent = max;
        }
        if let Some(timeout) = env.seconds(keys::TRANSFER_TIMEOUT_SECS, "transfer", "timeout")? {
            config.transfer.timeout = timeout;
        }
        if let Some(flags) = (env.lookup)(keys::TRANSFER_FLAGS) {
            config.transfer.flags = flags.split_whitespace().map(ToString::to_string).collect();
        }

        if let Some(margin) = env.gib(keys::SAFETY_MARGIN_GB, "disk", "safety_margin")? {
            config.disk.safety_margin = margin;
        }
        if let Some(min) = env.parse(keys::MIN_FILE_SIZE_BYTES, "disk", "min_file_size")? {
            config.disk.min_file_size = min;
        }
        if let Some(low) = env.gib(keys::LOW_SPACE_THRESHOLD_GB, "disk", "low_space_threshold")? {
            config.disk.low_space_threshold = low;
        }
        if let Some(cutoff) =
            env.parse(keys::HEALTHY_AVAILABILITY, "disk", "healthy_availability")?
        {
            config.disk.healthy_availability = cutoff;
        }

        if let Some(interval) =
            env.seconds(keys::SCAN_INTERVAL_SECS, "scheduler", "scan_interval")?
        {
            config.scheduler.scan_interval = interval;
        }

        if let Some(lifetime) =
            env.seconds(keys::ZOMBIE_MAX_LIFETIME_SECS, "zombie", "max_lifetime")?
        {
            config.zombie.max_lifetime = lifetime;
        }
        if let Some(speed) = env.parse(keys::ZOMBIE_MIN_SPEED_BPS, "zombie", "min_speed_bps")? {
            config.zombie.min_speed_bps = speed;
        }
        if let Some(warmup) = env.seconds(keys::ZOMBIE_WARMUP_SECS, "zombie", "warmup")? {
            config.zombie.warmup = warmup;
        }

        if let Some(path) = env.text(keys::DATABASE_PATH) {
            config.store.database_path = path.into();
        }
        if let Some(attempts) = env.parse(keys::STORE_RETRY_ATTEMPTS, "store", "retry_attempts")? {
            config.store.retry_attempts = attempts;
        }
        if let Some(backoff) = env.millis(keys::STORE_RETRY_BACKOFF_MS, "store", "retry_backoff")? {
            config.store.retry_backoff = backoff;
        }

        if let Some(bind) = env.parse(keys::API_BIND, "api", "bind_addr")? {
            config.api.bind_addr = bind;
        }

        if let Some(level) = env.text(keys::LOG_LEVEL) {
            config.logging.level = level;
        }
        if let Some(raw) = env.text(keys::LOG_FORMAT) {
            config.logging.style = Some(
                parse_style(&raw)
                    .ok_or_else(|| ConfigError::invalid("logging", "format", Some(raw), "parse"))?,
            );
        }

        config.validate()?;
        debug!(config = ?config, "configuration loaded");
        Ok(config)
    }
}
