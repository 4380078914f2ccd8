//! Engine capability trait implemented by adapters (e.g. qBittorrent).

use crate::model::{EngineFile, EnginePreferences, EngineTask, FilePriority};
use async_trait::async_trait;

/// Control and query surface of the download engine consumed by the scheduler.
///
/// Read operations are infallible by contract: adapters degrade transport or
/// decode failures to an empty result so the calling phase simply retries on
/// the next tick. Implementations must tolerate concurrent calls from the
/// scheduling loop and upload workers.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Authenticate against the engine; `Ok(false)` means credentials were rejected.
    async fn login(&self) -> anyhow::Result<bool>;

    /// List every task known to the engine.
    async fn list_tasks(&self) -> Vec<EngineTask>;

    /// List the files of a task with live progress and availability.
    async fn list_files(&self, hash: &str) -> Vec<EngineFile>;

    /// Set the download priority of the given file indices.
    async fn set_priority(
        &self,
        hash: &str,
        indices: &[u32],
        priority: FilePriority,
    ) -> anyhow::Result<()>;

    /// Resume a task. Adapters also ask the engine to re-announce.
    async fn resume(&self, hash: &str) -> anyhow::Result<()>;

    /// Force a re-announce to all trackers.
    async fn reannounce(&self, hash: &str) -> anyhow::Result<()>;

    /// Toggle force-start, bypassing the engine's queueing limits.
    async fn force_start(&self, hash: &str, enabled: bool) -> anyhow::Result<()>;

    /// Remove a task, optionally deleting downloaded data.
    async fn delete(&self, hash: &str, delete_files: bool) -> anyhow::Result<()>;

    /// Add a task by URL (magnet or HTTP); the task is admitted paused.
    async fn add_task(&self, url: &str) -> anyhow::Result<()>;

    /// Apply engine-wide preferences; the default implementation does nothing.
    async fn apply_preferences(&self, preferences: &EnginePreferences) -> anyhow::Result<()> {
        let _ = preferences;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngineState;

    struct StaticEngine;

    #[async_trait]
    impl DownloadEngine for StaticEngine {
        async fn login(&self) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn list_tasks(&self) -> Vec<EngineTask> {
            vec![EngineTask {
                hash: "h".into(),
                name: "demo".into(),
                total_size: 1,
                state: EngineState::Downloading,
            }]
        }

        async fn list_files(&self, _hash: &str) -> Vec<EngineFile> {
            Vec::new()
        }

        async fn set_priority(
            &self,
            _hash: &str,
            _indices: &[u32],
            _priority: FilePriority,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn resume(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn reannounce(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn force_start(&self, _hash: &str, _enabled: bool) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete(&self, _hash: &str, _delete_files: bool) -> anyhow::Result<()> {
            Ok(())
        }

        async fn add_task(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn engine_is_object_safe_and_preferences_default_to_noop() {
        let engine: Box<dyn DownloadEngine> = Box::new(StaticEngine);
        assert!(engine.login().await.expect("login"));
        assert_eq!(engine.list_tasks().await.len(), 1);
        assert!(
            engine
                .apply_preferences(&EnginePreferences::default())
                .await
                .is_ok()
        );
    }
}
