//! Core download-engine types shared across the workspace.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Lifecycle label reported by the download engine for a task.
///
/// Labels follow the qBittorrent vocabulary; unknown labels are preserved
/// verbatim so they can still be logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineState {
    /// Task is downloading payload data.
    Downloading,
    /// Task is fetching metadata (magnet resolution).
    FetchingMetadata,
    /// Task is forced to fetch metadata regardless of queue limits.
    ForcedFetchingMetadata,
    /// Engine is allocating disk space for the task.
    Allocating,
    /// Task was paused or stopped while still downloading.
    PausedDownload,
    /// Task is queued for download.
    QueuedDownload,
    /// Task is downloading but no peers are serving data.
    StalledDownload,
    /// Task is forced to download regardless of queue limits.
    ForcedDownload,
    /// Task finished and is seeding.
    Uploading,
    /// Task finished and was paused or stopped.
    PausedUpload,
    /// Task finished and is idle.
    StalledUpload,
    /// Engine is verifying data of a finished task.
    CheckingUpload,
    /// Engine is verifying data of an unfinished task.
    CheckingDownload,
    /// Engine is verifying resume data on startup.
    CheckingResumeData,
    /// Engine is moving the task's storage.
    Moving,
    /// Task payload files are missing.
    MissingFiles,
    /// Task is in an error state.
    Error,
    /// Any label this crate does not model explicitly.
    Other(String),
}

impl EngineState {
    /// Parse an engine label, tolerating both legacy (`pausedDL`) and current
    /// (`stoppedDL`) naming.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "downloading" => Self::Downloading,
            "metaDL" => Self::FetchingMetadata,
            "forcedMetaDL" => Self::ForcedFetchingMetadata,
            "allocating" => Self::Allocating,
            "pausedDL" | "stoppedDL" => Self::PausedDownload,
            "queuedDL" => Self::QueuedDownload,
            "stalledDL" => Self::StalledDownload,
            "forcedDL" => Self::ForcedDownload,
            "uploading" | "forcedUP" | "queuedUP" => Self::Uploading,
            "pausedUP" | "stoppedUP" => Self::PausedUpload,
            "stalledUP" => Self::StalledUpload,
            "checkingUP" => Self::CheckingUpload,
            "checkingDL" => Self::CheckingDownload,
            "checkingResumeData" => Self::CheckingResumeData,
            "moving" => Self::Moving,
            "missingFiles" => Self::MissingFiles,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// Canonical engine label for this state.
    #[must_use]
    pub fn as_label(&self) -> &str {
        match self {
            Self::Downloading => "downloading",
            Self::FetchingMetadata => "metaDL",
            Self::ForcedFetchingMetadata => "forcedMetaDL",
            Self::Allocating => "allocating",
            Self::PausedDownload => "pausedDL",
            Self::QueuedDownload => "queuedDL",
            Self::StalledDownload => "stalledDL",
            Self::ForcedDownload => "forcedDL",
            Self::Uploading => "uploading",
            Self::PausedUpload => "pausedUP",
            Self::StalledUpload => "stalledUP",
            Self::CheckingUpload => "checkingUP",
            Self::CheckingDownload => "checkingDL",
            Self::CheckingResumeData => "checkingResumeData",
            Self::Moving => "moving",
            Self::MissingFiles => "missingFiles",
            Self::Error => "error",
            Self::Other(label) => label,
        }
    }

    /// Whether the task sits paused before its download finished.
    #[must_use]
    pub const fn is_paused_download(&self) -> bool {
        matches!(self, Self::PausedDownload)
    }

    /// Whether the engine is busy resolving metadata, allocating or verifying
    /// the task, in which case it should be left alone.
    #[must_use]
    pub const fn is_preparing(&self) -> bool {
        matches!(
            self,
            Self::FetchingMetadata
                | Self::ForcedFetchingMetadata
                | Self::Allocating
                | Self::CheckingUpload
                | Self::CheckingDownload
                | Self::CheckingResumeData
        )
    }
}

impl From<String> for EngineState {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<EngineState> for String {
    fn from(value: EngineState) -> Self {
        value.as_label().to_string()
    }
}

impl Display for EngineState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_label())
    }
}

/// Snapshot of a task as listed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineTask {
    /// Content hash identifying the task.
    pub hash: String,
    /// Display name; equals the hash until metadata resolves.
    pub name: String,
    /// Total declared size in bytes.
    pub total_size: u64,
    /// Engine lifecycle state.
    pub state: EngineState,
}

impl EngineTask {
    /// Whether the engine still reports the hash as the task name, meaning
    /// metadata has not been resolved.
    #[must_use]
    pub fn metadata_pending(&self) -> bool {
        self.name.eq_ignore_ascii_case(&self.hash)
    }
}

/// Live per-file view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFile {
    /// Position of the file inside the task, stable for the task's lifetime.
    pub index: u32,
    /// Path relative to the task's save directory.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Completion fraction in `0.0..=1.0`.
    pub progress: f64,
    /// Swarm availability: fractional completeness below 1, redundant copies above.
    pub availability: f64,
}

/// Download priority applied to individual files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    /// Do not fetch the file.
    Skip,
    /// Fetch the file at normal priority.
    Normal,
}

impl FilePriority {
    /// Numeric level understood by the engine.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Skip => 0,
            Self::Normal => 1,
        }
    }
}

/// Engine-wide preferences applied once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePreferences {
    /// Global connection cap.
    pub max_connections: u32,
    /// Whether the engine may use the OS page cache.
    pub os_cache: bool,
    /// Whether the engine preallocates full file sizes.
    pub preallocate_all: bool,
    /// Whether the engine applies its own queueing limits.
    pub queueing: bool,
    /// Whether the engine runs external programs on task addition.
    pub autorun: bool,
}

impl Default for EnginePreferences {
    fn default() -> Self {
        Self {
            max_connections: 500,
            os_cache: false,
            preallocate_all: true,
            queueing: false,
            autorun: false,
        }
    }
}

/// Clamp an engine-reported availability into a usable score; unknown values
/// (negative or non-finite) count as zero.
#[must_use]
pub fn normalize_availability(raw: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}
