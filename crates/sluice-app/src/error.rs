//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: sluice_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: sluice_telemetry::TelemetryError,
    },
    /// State store operations failed.
    #[error("state store operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: sluice_data::DataError,
    },
    /// The engine client could not be constructed.
    #[error("engine client operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Source adapter error.
        source: sluice_qbit::EngineError,
    },
    /// The engine could not be reached during login.
    #[error("download engine unreachable")]
    EngineUnreachable {
        /// Configured engine URL.
        url: String,
        /// Rendered error chain.
        detail: String,
    },
    /// The engine rejected the configured credentials.
    #[error("download engine rejected credentials")]
    EngineLoginRejected {
        /// Configured engine URL.
        url: String,
        /// User name presented.
        username: String,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: sluice_api::ApiServerError,
    },
    /// A background task panicked or was cancelled.
    #[error("background task failed")]
    Task {
        /// Task name.
        name: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: sluice_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: sluice_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: sluice_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn engine(operation: &'static str, source: sluice_qbit::EngineError) -> Self {
        Self::Engine { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: sluice_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }
}
