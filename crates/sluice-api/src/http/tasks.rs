//! Task listing, add and delete endpoints.

use std::sync::Arc;

use axum::{Json, extract::State};
use sluice_data::DataError;
use tracing::{info, warn};

use crate::http::errors::ApiError;
use crate::models::{
    AddTaskRequest, DeleteTaskRequest, StatsResponse, StatusResponse, TaskView, gib_rounded,
};
use crate::state::ApiState;

fn store_error(operation: &str, err: &DataError) -> ApiError {
    warn!(operation, error = %err, "state store request failed");
    if matches!(err, DataError::RetriesExhausted { .. }) {
        ApiError::service_unavailable("state store is busy; retry shortly")
    } else {
        ApiError::internal("state store request failed")
    }
}

pub(crate) async fn stats(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let torrents = state
        .store
        .list_torrents()
        .await
        .map_err(|err| store_error("list_torrents", &err))?;

    let mut tasks = Vec::with_capacity(torrents.len());
    for record in torrents {
        let files = state
            .store
            .files_for_torrent(&record.hash)
            .await
            .map_err(|err| store_error("files_for_torrent", &err))?;
        tasks.push(TaskView::new(record, files));
    }

    let free = match state.probe.free_bytes(&state.download_dir) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "free space unavailable; reporting zero");
            0
        }
    };
    Ok(Json(StatsResponse {
        tasks,
        free: gib_rounded(free),
    }))
}

pub(crate) async fn add_task(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AddTaskRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("url must not be blank"));
    }
    state.engine.add_task(url).await.map_err(|err| {
        warn!(error = %format!("{err:#}"), "engine refused new task");
        ApiError::engine_unavailable("download engine did not accept the task")
    })?;
    info!("task submitted to engine");
    Ok(Json(StatusResponse::ok()))
}

pub(crate) async fn delete_task(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<DeleteTaskRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let hash = request.hash.trim();
    if hash.is_empty() {
        return Err(ApiError::bad_request("hash must not be blank"));
    }
    if let Err(err) = state.engine.delete(hash, true).await {
        warn!(hash, error = %format!("{err:#}"), "engine delete failed; removing stored rows anyway");
    }
    let removed = state
        .store
        .delete_torrent(hash)
        .await
        .map_err(|err| store_error("delete_torrent", &err))?;
    info!(hash, removed, "task deleted");
    Ok(Json(StatusResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use axum::http::StatusCode;
    use sluice_config::GIB;
    use sluice_data::{FileStatus, NewFileItem, NewTorrent};
    use sluice_telemetry::Metrics;
    use sluice_test_support::{EngineCommand, FixedSpaceProbe, ScriptedEngine, temp_store};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        engine: Arc<ScriptedEngine>,
        state: Arc<ApiState>,
    }

    async fn harness(free: u64) -> anyhow::Result<Harness> {
        let (dir, store) = temp_store().await?;
        let engine = Arc::new(ScriptedEngine::new());
        let state = ApiState::new(
            engine.clone(),
            store,
            Arc::new(FixedSpaceProbe::new(free)),
            Metrics::new()?,
            PathBuf::from("/downloads"),
        );
        Ok(Harness {
            _dir: dir,
            engine,
            state: Arc::new(state),
        })
    }

    fn torrent(hash: &str) -> NewTorrent {
        NewTorrent {
            hash: hash.to_string(),
            name: format!("{hash}-name"),
            total_size: 3 * GIB,
            files: vec![
                NewFileItem {
                    file_index: 0,
                    path: format!("/downloads/{hash}/a.mkv"),
                    rel_path: format!("{hash}/a.mkv"),
                    size: 2 * GIB,
                },
                NewFileItem {
                    file_index: 1,
                    path: format!("/downloads/{hash}/b.mkv"),
                    rel_path: format!("{hash}/b.mkv"),
                    size: GIB,
                },
            ],
        }
    }

    #[tokio::test]
    async fn stats_lists_tasks_files_and_free_space() -> anyhow::Result<()> {
        let h = harness(30 * GIB + GIB / 2).await?;
        h.state.store.insert_torrent(&torrent("aaa")).await?;

        let Json(body) = stats(State(Arc::clone(&h.state)))
            .await
            .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert!((body.free - 30.5).abs() < f64::EPSILON);
        assert_eq!(body.tasks.len(), 1);
        let task = &body.tasks[0];
        assert_eq!(task.hash, "aaa");
        assert_eq!(task.status, "PROCESSING");
        assert_eq!(task.files.len(), 2);
        assert!(
            task.files
                .iter()
                .all(|file| file.status == FileStatus::Waiting.code()
                    && file.status_label == "WAITING")
        );
        Ok(())
    }

    #[tokio::test]
    async fn add_rejects_blank_url() -> anyhow::Result<()> {
        let h = harness(0).await?;
        let err = add_task(
            State(Arc::clone(&h.state)),
            Json(AddTaskRequest { url: "   ".into() }),
        )
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("blank url accepted"))?;
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(h.engine.commands().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn add_forwards_trimmed_url_to_engine() -> anyhow::Result<()> {
        let h = harness(0).await?;
        let Json(body) = add_task(
            State(Arc::clone(&h.state)),
            Json(AddTaskRequest {
                url: " magnet:?xt=urn:btih:abc ".into(),
            }),
        )
        .await
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(body, StatusResponse::ok());
        assert_eq!(
            h.engine.commands(),
            vec![EngineCommand::AddTask("magnet:?xt=urn:btih:abc".into())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn add_reports_engine_failure_as_bad_gateway() -> anyhow::Result<()> {
        let h = harness(0).await?;
        h.engine.fail_commands(true);
        let err = add_task(
            State(Arc::clone(&h.state)),
            Json(AddTaskRequest {
                url: "magnet:?xt=urn:btih:abc".into(),
            }),
        )
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("engine failure hidden"))?;
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_engine_task_and_stored_rows() -> anyhow::Result<()> {
        let h = harness(0).await?;
        h.state.store.insert_torrent(&torrent("aaa")).await?;
        h.state.store.insert_torrent(&torrent("bbb")).await?;

        delete_task(
            State(Arc::clone(&h.state)),
            Json(DeleteTaskRequest { hash: "aaa".into() }),
        )
        .await
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;

        assert_eq!(
            h.engine.commands(),
            vec![EngineCommand::Delete {
                hash: "aaa".into(),
                delete_files: true,
            }]
        );
        assert!(!h.state.store.torrent_exists("aaa").await?);
        assert!(h.state.store.files_for_torrent("aaa").await?.is_empty());
        assert!(h.state.store.torrent_exists("bbb").await?);
        Ok(())
    }

    #[tokio::test]
    async fn delete_still_clears_store_when_engine_fails() -> anyhow::Result<()> {
        let h = harness(0).await?;
        h.state.store.insert_torrent(&torrent("aaa")).await?;
        h.engine.fail_commands(true);

        delete_task(
            State(Arc::clone(&h.state)),
            Json(DeleteTaskRequest { hash: "aaa".into() }),
        )
        .await
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert!(!h.state.store.torrent_exists("aaa").await?);
        Ok(())
    }
}
