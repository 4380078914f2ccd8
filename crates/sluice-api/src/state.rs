//! API application state and degraded-component tracking.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sluice_data::StateStore;
use sluice_fsops::SpaceProbe;
use sluice_telemetry::Metrics;
use sluice_torrent_core::DownloadEngine;

/// Shared handles the dashboard handlers read from.
pub struct ApiState {
    pub(crate) engine: Arc<dyn DownloadEngine>,
    pub(crate) store: StateStore,
    pub(crate) probe: Arc<dyn SpaceProbe>,
    pub(crate) telemetry: Metrics,
    pub(crate) download_dir: PathBuf,
    degraded: Mutex<Vec<String>>,
}

impl ApiState {
    /// Bundle the handles served by the API.
    #[must_use]
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        store: StateStore,
        probe: Arc<dyn SpaceProbe>,
        telemetry: Metrics,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            store,
            probe,
            telemetry,
            download_dir,
            degraded: Mutex::new(Vec::new()),
        }
    }

    /// Record `component` as degraded; returns `true` when it was newly added.
    pub(crate) fn add_degraded_component(&self, component: &str) -> bool {
        let mut guard = self.lock_degraded();
        if guard.iter().any(|entry| entry == component) {
            return false;
        }
        guard.push(component.to_string());
        guard.sort();
        true
    }

    /// Clear `component`; returns `true` when it was previously degraded.
    pub(crate) fn remove_degraded_component(&self, component: &str) -> bool {
        let mut guard = self.lock_degraded();
        let previous = guard.len();
        guard.retain(|entry| entry != component);
        guard.len() != previous
    }

    /// Components currently reported degraded.
    pub(crate) fn current_degraded(&self) -> Vec<String> {
        self.lock_degraded().clone()
    }

    fn lock_degraded(&self) -> MutexGuard<'_, Vec<String>> {
        self.degraded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_test_support::{FixedSpaceProbe, ScriptedEngine, temp_store};

    #[tokio::test]
    async fn degraded_components_are_tracked_once() -> anyhow::Result<()> {
        let (_dir, store) = temp_store().await?;
        let state = ApiState::new(
            Arc::new(ScriptedEngine::new()),
            store,
            Arc::new(FixedSpaceProbe::new(0)),
            Metrics::new()?,
            PathBuf::from("/downloads"),
        );

        assert!(state.add_degraded_component("database"));
        assert!(!state.add_degraded_component("database"));
        assert_eq!(state.current_degraded(), vec!["database".to_string()]);
        assert!(state.remove_degraded_component("database"));
        assert!(!state.remove_degraded_component("database"));
        assert!(state.current_degraded().is_empty());
        Ok(())
    }
}
