//! Range and consistency checks applied after loading.

use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::SluiceConfig;

impl SluiceConfig {
    /// Check cross-field and range constraints.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::InvalidField`] encountered.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_engine_url(&self.engine.url)?;
        non_zero(self.engine.request_timeout, "engine", "request_timeout")?;

        if self.transfer.binary.trim().is_empty() {
            return Err(ConfigError::invalid("transfer", "binary", None, "empty"));
        }
        if self.transfer.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "transfer",
                "max_concurrent",
                Some(self.transfer.max_concurrent.to_string()),
                "range",
            ));
        }
        non_zero(self.transfer.timeout, "transfer", "timeout")?;

        let cutoff = self.disk.healthy_availability;
        if !cutoff.is_finite() || !(0.0..=1.0).contains(&cutoff) {
            return Err(ConfigError::invalid(
                "disk",
                "healthy_availability",
                Some(cutoff.to_string()),
                "range",
            ));
        }

        non_zero(self.scheduler.scan_interval, "scheduler", "scan_interval")?;

        if self.zombie.warmup >= self.zombie.max_lifetime {
            return Err(ConfigError::invalid(
                "zombie",
                "warmup",
                Some(self.zombie.warmup.as_secs().to_string()),
                "order",
            ));
        }
        let speed = self.zombie.min_speed_bps;
        if !speed.is_finite() || speed < 0.0 {
            return Err(ConfigError::invalid(
                "zombie",
                "min_speed_bps",
                Some(speed.to_string()),
                "range",
            ));
        }

        if self.store.retry_attempts == 0 {
            return Err(ConfigError::invalid(
                "store",
                "retry_attempts",
                Some("0".to_string()),
                "range",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging", "level", None, "empty"));
        }
        Ok(())
    }
}

fn validate_engine_url(raw: &str) -> ConfigResult<()> {
    let url =
        Url::parse(raw).map_err(|_| ConfigError::invalid("engine", "url", Some(raw.into()), "parse"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "engine",
            "url",
            Some(raw.to_string()),
            "scheme",
        ));
    }
    Ok(())
}

fn non_zero(value: Duration, section: &str, field: &str) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::invalid(section, field, Some("0".into()), "range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(config: &SluiceConfig) -> (String, &'static str) {
        match config.validate() {
            Err(ConfigError::InvalidField { field, reason, .. }) => (field, reason),
            Ok(()) => (String::new(), "ok"),
        }
    }

    #[test]
    fn defaults_pass() {
        assert!(SluiceConfig::default().validate().is_ok());
    }

    #[test]
    fn engine_url_must_be_http() {
        let mut config = SluiceConfig::default();
        config.engine.url = "ftp://engine".into();
        assert_eq!(reason(&config), ("url".into(), "scheme"));
        config.engine.url = "not a url".into();
        assert_eq!(reason(&config), ("url".into(), "parse"));
    }

    #[test]
    fn warmup_must_precede_lifetime() {
        let mut config = SluiceConfig::default();
        config.zombie.warmup = config.zombie.max_lifetime;
        assert_eq!(reason(&config), ("warmup".into(), "order"));
    }

    #[test]
    fn ranges_are_enforced() {
        let mut config = SluiceConfig::default();
        config.transfer.max_concurrent = 0;
        assert_eq!(reason(&config), ("max_concurrent".into(), "range"));

        let mut config = SluiceConfig::default();
        config.disk.healthy_availability = 1.5;
        assert_eq!(reason(&config), ("healthy_availability".into(), "range"));

        let mut config = SluiceConfig::default();
        config.scheduler.scan_interval = Duration::ZERO;
        assert_eq!(reason(&config), ("scan_interval".into(), "range"));

        let mut config = SluiceConfig::default();
        config.store.retry_attempts = 0;
        assert_eq!(reason(&config), ("retry_attempts".into(), "range"));
    }
}
