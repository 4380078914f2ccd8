//! Error types for the qBittorrent adapter.

use thiserror::Error;

/// Result alias for adapter operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while talking to the qBittorrent Web API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configured base URL could not be combined with an API path.
    #[error("invalid engine endpoint")]
    InvalidEndpoint {
        /// API path that failed to resolve.
        endpoint: &'static str,
        /// Underlying URL parse error.
        source: url::ParseError,
    },
    /// Building the HTTP client failed.
    #[error("failed to build engine http client")]
    ClientBuild {
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The request could not be sent or the response body not read.
    #[error("engine request failed")]
    Transport {
        /// API path targeted by the request.
        endpoint: &'static str,
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The engine answered with a non-success status.
    #[error("engine rejected request")]
    Status {
        /// API path targeted by the request.
        endpoint: &'static str,
        /// HTTP status code returned.
        status: u16,
    },
    /// The response body did not match the expected shape.
    #[error("failed to decode engine response")]
    Decode {
        /// API path targeted by the request.
        endpoint: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Engine preferences could not be serialised.
    #[error("failed to encode engine preferences")]
    EncodePreferences {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl EngineError {
    /// HTTP status carried by the error, when the engine answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_only_reported_for_rejections() {
        let rejected = EngineError::Status {
            endpoint: "torrents/resume",
            status: 404,
        };
        assert_eq!(rejected.status(), Some(404));
        assert_eq!(rejected.to_string(), "engine rejected request");

        let decode = EngineError::Decode {
            endpoint: "torrents/info",
            source: serde_json::from_str::<u8>("x").expect_err("invalid json"),
        };
        assert_eq!(decode.status(), None);
    }
}
