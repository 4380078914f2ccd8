//! Health and diagnostics endpoints.

use std::sync::Arc;

use axum::{Json, body::Body, extract::State, http::StatusCode, response::Response};
use serde::Serialize;
use sluice_telemetry::{MetricsSnapshot, build_sha};
use tracing::{error, warn};

use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) build: String,
    pub(crate) degraded: Vec<String>,
    pub(crate) metrics: MetricsSnapshot,
}

pub(crate) async fn health(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    match state.store.ping().await {
        Ok(()) => {
            state.remove_degraded_component("database");
            let degraded = state.current_degraded();
            let status = if degraded.is_empty() { "ok" } else { "degraded" };
            Ok(Json(HealthResponse {
                status,
                build: build_sha().to_string(),
                degraded,
                metrics: state.telemetry.snapshot(),
            }))
        }
        Err(err) => {
            state.add_degraded_component("database");
            warn!(error = %err, "health check failed to reach database");
            Err(ApiError::service_unavailable(
                "database is currently unavailable",
            ))
        }
    }
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use sluice_telemetry::Metrics;
    use sluice_test_support::{FixedSpaceProbe, ScriptedEngine, temp_store};

    async fn state() -> anyhow::Result<(tempfile::TempDir, Arc<ApiState>)> {
        let (dir, store) = temp_store().await?;
        let state = ApiState::new(
            Arc::new(ScriptedEngine::new()),
            store,
            Arc::new(FixedSpaceProbe::new(0)),
            Metrics::new()?,
            PathBuf::from("/downloads"),
        );
        Ok((dir, Arc::new(state)))
    }

    #[tokio::test]
    async fn health_reports_ok_when_store_answers() -> anyhow::Result<()> {
        let (_dir, state) = state().await?;
        state.add_degraded_component("database");

        let Json(body) = health(State(Arc::clone(&state)))
            .await
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(body.status, "ok");
        assert!(body.degraded.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn health_fails_once_store_is_closed() -> anyhow::Result<()> {
        let (_dir, state) = state().await?;
        state.store.pool().close().await;

        let err = health(State(Arc::clone(&state)))
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("closed store still healthy"))?;
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.current_degraded(), vec!["database".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text_exposition() -> anyhow::Result<()> {
        let (_dir, state) = state().await?;
        state.telemetry.inc_http_request("/api/stats", 200);

        let response = metrics(State(state))
            .await
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
        Ok(())
    }
}
