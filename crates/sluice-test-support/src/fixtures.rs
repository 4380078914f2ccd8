//! Store fixtures and engine DTO builders.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use sluice_data::{RetryPolicy, StateStore};
use sluice_torrent_core::{EngineFile, EngineState, EngineTask};
use tempfile::TempDir;

/// Open a file-backed store inside a fresh temporary directory.
///
/// The directory must outlive the store, so both are returned. Retries use a
/// short backoff to keep contention tests fast.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created.
pub async fn temp_store() -> Result<(TempDir, StateStore)> {
    let dir = tempfile::tempdir()?;
    let store = StateStore::open(
        dir.path().join("sluice.db"),
        RetryPolicy::new(3, Duration::from_millis(10)),
    )
    .await?;
    Ok((dir, store))
}

/// Build an engine task snapshot.
#[must_use]
pub fn engine_task(hash: &str, name: &str, total_size: u64, state: EngineState) -> EngineTask {
    EngineTask {
        hash: hash.to_string(),
        name: name.to_string(),
        total_size,
        state,
    }
}

/// Build an engine file snapshot.
#[must_use]
pub fn engine_file(
    index: u32,
    name: &str,
    size: u64,
    progress: f64,
    availability: f64,
) -> EngineFile {
    EngineFile {
        index,
        name: name.to_string(),
        size,
        progress,
        availability,
    }
}

/// Poll `check` every few milliseconds until it returns `true` or `timeout` elapses.
///
/// Returns the last value observed.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_store_is_usable() -> Result<()> {
        let (_dir, store) = temp_store().await?;
        store.ping().await?;
        assert!(store.list_torrents().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn eventually_reports_timeouts() {
        assert!(eventually(Duration::from_millis(50), || async { true }).await);
        assert!(!eventually(Duration::from_millis(30), || async { false }).await);
    }

    #[test]
    fn builders_copy_fields() {
        let task = engine_task("h", "n", 5, EngineState::Downloading);
        assert_eq!(task.total_size, 5);
        let file = engine_file(2, "a.bin", 9, 0.5, 1.0);
        assert_eq!(file.index, 2);
        assert_eq!(file.size, 9);
    }
}
