//! Errors raised while wiring logging and metrics.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Failures from the subscriber or the metrics registry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed.
    #[error("tracing subscriber could not be installed")]
    SubscriberInstall {
        /// Subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// A collector was malformed or clashed with one already registered.
    #[error("metric `{name}` could not be registered")]
    Metric {
        /// Metric name.
        name: &'static str,
        /// Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// The registry could not be rendered in the text exposition format.
    #[error("metrics could not be rendered")]
    Render {
        /// Prometheus error.
        #[source]
        source: prometheus::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn metric_errors_name_the_collector() {
        let err = TelemetryError::Metric {
            name: "uploads_total",
            source: prometheus::Error::AlreadyReg,
        };
        assert_eq!(err.to_string(), "metric `uploads_total` could not be registered");
        assert!(err.source().is_some());
    }

    #[test]
    fn render_errors_keep_their_source() {
        let err = TelemetryError::Render {
            source: prometheus::Error::Msg("broken family".into()),
        };
        assert_eq!(err.to_string(), "metrics could not be rendered");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("broken family")
        );
    }
}
