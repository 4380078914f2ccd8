//! In-memory download engine driven by the test.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sluice_torrent_core::{
    DownloadEngine, EngineFile, EnginePreferences, EngineState, EngineTask, FilePriority,
};

/// Command issued against a [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// `set_priority` call.
    SetPriority {
        /// Task hash.
        hash: String,
        /// File indices in call order.
        indices: Vec<u32>,
        /// Requested priority.
        priority: FilePriority,
    },
    /// `resume` call.
    Resume(String),
    /// `reannounce` call.
    Reannounce(String),
    /// `force_start` call.
    ForceStart {
        /// Task hash.
        hash: String,
        /// Requested flag.
        enabled: bool,
    },
    /// `delete` call.
    Delete {
        /// Task hash.
        hash: String,
        /// Whether data was removed too.
        delete_files: bool,
    },
    /// `add_task` call.
    AddTask(String),
    /// `apply_preferences` call.
    ApplyPreferences(EnginePreferences),
}

#[derive(Debug)]
struct Script {
    accept_login: bool,
    fail_commands: bool,
    tasks: Vec<EngineTask>,
    files: HashMap<String, Vec<EngineFile>>,
    commands: Vec<EngineCommand>,
}

/// [`DownloadEngine`] whose tasks and files are set by the test and whose
/// commands are recorded for assertions.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: Mutex<Script>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    /// Engine that accepts logins and knows no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                accept_login: true,
                fail_commands: false,
                tasks: Vec::new(),
                files: HashMap::new(),
                commands: Vec::new(),
            }),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `login` report rejected credentials.
    pub fn reject_login(&self) {
        self.script().accept_login = false;
    }

    /// Make every mutating command fail (reads keep working).
    pub fn fail_commands(&self, fail: bool) {
        self.script().fail_commands = fail;
    }

    /// Insert or replace a task snapshot.
    pub fn upsert_task(&self, task: EngineTask) {
        let mut script = self.script();
        if let Some(existing) = script.tasks.iter_mut().find(|t| t.hash == task.hash) {
            *existing = task;
        } else {
            script.tasks.push(task);
        }
    }

    /// Drop a task and its file listing, as if it were removed in the engine's own UI.
    pub fn remove_task(&self, hash: &str) {
        let mut script = self.script();
        script.tasks.retain(|t| t.hash != hash);
        script.files.remove(hash);
    }

    /// Change the reported state of a task.
    pub fn set_state(&self, hash: &str, state: EngineState) {
        if let Some(task) = self.script().tasks.iter_mut().find(|t| t.hash == hash) {
            task.state = state;
        }
    }

    /// Replace the file listing of a task.
    pub fn set_files(&self, hash: &str, files: Vec<EngineFile>) {
        self.script().files.insert(hash.to_string(), files);
    }

    /// Update the progress of one file.
    pub fn set_progress(&self, hash: &str, index: u32, progress: f64) {
        self.update_file(hash, index, |file| file.progress = progress);
    }

    /// Update the availability of one file.
    pub fn set_availability(&self, hash: &str, index: u32, availability: f64) {
        self.update_file(hash, index, |file| file.availability = availability);
    }

    fn update_file(&self, hash: &str, index: u32, apply: impl FnOnce(&mut EngineFile)) {
        let mut script = self.script();
        if let Some(file) = script
            .files
            .get_mut(hash)
            .and_then(|files| files.iter_mut().find(|f| f.index == index))
        {
            apply(file);
        }
    }

    /// Commands recorded so far.
    #[must_use]
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.script().commands.clone()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        self.script().commands.clear();
    }

    fn record(&self, command: EngineCommand) -> anyhow::Result<()> {
        let mut script = self.script();
        script.commands.push(command);
        if script.fail_commands {
            anyhow::bail!("scripted engine rejected command");
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadEngine for ScriptedEngine {
    async fn login(&self) -> anyhow::Result<bool> {
        Ok(self.script().accept_login)
    }

    async fn list_tasks(&self) -> Vec<EngineTask> {
        self.script().tasks.clone()
    }

    async fn list_files(&self, hash: &str) -> Vec<EngineFile> {
        self.script().files.get(hash).cloned().unwrap_or_default()
    }

    async fn set_priority(
        &self,
        hash: &str,
        indices: &[u32],
        priority: FilePriority,
    ) -> anyhow::Result<()> {
        self.record(EngineCommand::SetPriority {
            hash: hash.to_string(),
            indices: indices.to_vec(),
            priority,
        })
    }

    async fn resume(&self, hash: &str) -> anyhow::Result<()> {
        self.record(EngineCommand::Resume(hash.to_string()))
    }

    async fn reannounce(&self, hash: &str) -> anyhow::Result<()> {
        self.record(EngineCommand::Reannounce(hash.to_string()))
    }

    async fn force_start(&self, hash: &str, enabled: bool) -> anyhow::Result<()> {
        self.record(EngineCommand::ForceStart {
            hash: hash.to_string(),
            enabled,
        })
    }

    async fn delete(&self, hash: &str, delete_files: bool) -> anyhow::Result<()> {
        self.record(EngineCommand::Delete {
            hash: hash.to_string(),
            delete_files,
        })?;
        let mut script = self.script();
        script.tasks.retain(|task| task.hash != hash);
        script.files.remove(hash);
        Ok(())
    }

    async fn add_task(&self, url: &str) -> anyhow::Result<()> {
        self.record(EngineCommand::AddTask(url.to_string()))
    }

    async fn apply_preferences(&self, preferences: &EnginePreferences) -> anyhow::Result<()> {
        self.record(EngineCommand::ApplyPreferences(preferences.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{engine_file, engine_task};

    #[tokio::test]
    async fn records_commands_and_mutates_listing() -> anyhow::Result<()> {
        let engine = ScriptedEngine::new();
        engine.upsert_task(engine_task("h1", "demo", 10, EngineState::Downloading));
        engine.set_files("h1", vec![engine_file(0, "a", 10, 0.0, 1.0)]);
        engine.set_progress("h1", 0, 0.5);

        assert!((engine.list_files("h1").await[0].progress - 0.5).abs() < f64::EPSILON);
        engine.resume("h1").await?;
        engine.delete("h1", true).await?;

        assert!(engine.list_tasks().await.is_empty());
        assert_eq!(
            engine.commands(),
            vec![
                EngineCommand::Resume("h1".into()),
                EngineCommand::Delete {
                    hash: "h1".into(),
                    delete_files: true
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn failing_commands_are_still_recorded() {
        let engine = ScriptedEngine::new();
        engine.fail_commands(true);
        assert!(engine.reannounce("h").await.is_err());
        assert_eq!(engine.commands().len(), 1);
    }
}
