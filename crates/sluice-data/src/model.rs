//! Persisted record types and the file lifecycle.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Informational status assigned to every torrent at creation.
pub const TORRENT_STATUS_PROCESSING: &str = "PROCESSING";

/// Lifecycle of a tracked file.
///
/// Legal moves: `Waiting -> Downloading`, `Downloading -> Ready | Killed`,
/// `Ready -> Uploading`, `Uploading -> Done | Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Known but not yet admitted.
    Waiting,
    /// Admitted; the engine was asked to fetch it.
    Downloading,
    /// Download confirmed complete, awaiting upload.
    Ready,
    /// Transfer in flight.
    Uploading,
    /// Transferred and purged locally.
    Done,
    /// Evicted by the zombie policy.
    Killed,
}

impl FileStatus {
    /// Every status in code order.
    pub const ALL: [Self; 6] = [
        Self::Waiting,
        Self::Downloading,
        Self::Ready,
        Self::Uploading,
        Self::Done,
        Self::Killed,
    ];

    /// Integer code persisted in the `files.status` column.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Waiting => 0,
            Self::Downloading => 1,
            Self::Ready => 2,
            Self::Uploading => 3,
            Self::Done => 4,
            Self::Killed => 5,
        }
    }

    /// Decode a persisted status code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Waiting),
            1 => Some(Self::Downloading),
            2 => Some(Self::Ready),
            3 => Some(Self::Uploading),
            4 => Some(Self::Done),
            5 => Some(Self::Killed),
            _ => None,
        }
    }

    /// Upper-case label shown to operators.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Downloading => "DOWNLOADING",
            Self::Ready => "READY",
            Self::Uploading => "UPLOADING",
            Self::Done => "DONE",
            Self::Killed => "KILLED",
        }
    }

    /// Whether moving from `self` to `next` is part of the lifecycle.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Downloading)
                | (Self::Downloading, Self::Ready | Self::Killed)
                | (Self::Ready, Self::Uploading)
                | (Self::Uploading, Self::Done | Self::Ready)
        )
    }
}

impl Display for FileStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Stored torrent row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentRecord {
    /// Content hash.
    pub hash: String,
    /// Display name captured at ingestion.
    pub name: String,
    /// Informational status label.
    pub status: String,
    /// Declared total size in bytes.
    pub total_size: u64,
    /// Ingestion timestamp.
    pub created_at: DateTime<Utc>,
}

/// Stored file row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileItem {
    /// Row identifier.
    pub id: i64,
    /// Owning torrent hash.
    pub torrent_hash: String,
    /// Engine-assigned position inside the torrent.
    pub file_index: u32,
    /// Absolute local path.
    pub path: String,
    /// Path relative to the torrent save directory.
    pub rel_path: String,
    /// Declared size in bytes; never changes after creation.
    pub size: u64,
    /// Lifecycle status.
    pub status: FileStatus,
    /// First tick the file was observed downloading.
    pub started_at: Option<DateTime<Utc>>,
    /// Last failure reason; empty when none was recorded.
    pub failed_reason: String,
}

/// Torrent plus its trackable files, inserted atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTorrent {
    /// Content hash.
    pub hash: String,
    /// Display name.
    pub name: String,
    /// Declared total size in bytes.
    pub total_size: u64,
    /// Files at or above the tracking threshold.
    pub files: Vec<NewFileItem>,
}

/// File captured at ingestion; always starts `Waiting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileItem {
    /// Engine-assigned index.
    pub file_index: u32,
    /// Absolute local path.
    pub path: String,
    /// Path relative to the torrent save directory.
    pub rel_path: String,
    /// Declared size in bytes.
    pub size: u64,
}
