//! Request and response payloads of the dashboard API.

use serde::{Deserialize, Serialize};
use sluice_config::GIB;
use sluice_data::{FileItem, TorrentRecord};

/// RFC 9457 problem document returned for every error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// Problem type URI.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short human-readable summary.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Occurrence-specific explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Body of `GET /api/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsResponse {
    /// Every stored task with its tracked files.
    pub tasks: Vec<TaskView>,
    /// Free space on the download filesystem in GiB, two decimals.
    pub free: f64,
}

/// One stored task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskView {
    /// Content hash.
    pub hash: String,
    /// Display name.
    pub name: String,
    /// Informational status label.
    pub status: String,
    /// Declared total size in bytes.
    pub total_size: u64,
    /// Tracked files.
    pub files: Vec<FileView>,
}

impl TaskView {
    /// Combine a stored torrent with its file rows.
    #[must_use]
    pub fn new(record: TorrentRecord, files: Vec<FileItem>) -> Self {
        Self {
            hash: record.hash,
            name: record.name,
            status: record.status,
            total_size: record.total_size,
            files: files.into_iter().map(FileView::from).collect(),
        }
    }
}

/// One tracked file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileView {
    /// Engine-assigned index.
    pub index: u32,
    /// Path relative to the save directory.
    pub rel_path: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Persisted status code.
    pub status: i64,
    /// Status name, e.g. `DOWNLOADING`.
    pub status_label: String,
    /// Last failure reason; empty when none.
    pub failed_reason: String,
}

impl From<FileItem> for FileView {
    fn from(value: FileItem) -> Self {
        Self {
            index: value.file_index,
            rel_path: value.rel_path,
            size: value.size,
            status: value.status.code(),
            status_label: value.status.label().to_string(),
            failed_reason: value.failed_reason,
        }
    }
}

/// Body of `POST /api/add`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddTaskRequest {
    /// Magnet link or torrent URL.
    pub url: String,
}

/// Body of `POST /api/del`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteTaskRequest {
    /// Content hash of the task to remove.
    pub hash: String,
}

/// Acknowledgement returned by write endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    /// Always `ok`.
    pub status: String,
}

impl StatusResponse {
    /// Successful acknowledgement.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Convert a byte count to GiB rounded to two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gib_rounded(bytes: u64) -> f64 {
    (bytes as f64 / GIB as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_data::FileStatus;
    use serde_json::json;

    #[test]
    fn free_space_rounds_to_two_decimals() {
        assert!((gib_rounded(0) - 0.0).abs() < f64::EPSILON);
        assert!((gib_rounded(GIB) - 1.0).abs() < f64::EPSILON);
        assert!((gib_rounded(GIB + GIB / 3) - 1.33).abs() < f64::EPSILON);
        assert!((gib_rounded(30 * GIB) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn file_view_carries_code_and_label() {
        let item = FileItem {
            id: 7,
            torrent_hash: "abc".into(),
            file_index: 2,
            path: "/downloads/show/e01.mkv".into(),
            rel_path: "show/e01.mkv".into(),
            size: 4096,
            status: FileStatus::Killed,
            started_at: None,
            failed_reason: "timeout".into(),
        };
        let view = FileView::from(item);
        assert_eq!(
            serde_json::to_value(&view).ok(),
            Some(json!({
                "index": 2,
                "rel_path": "show/e01.mkv",
                "size": 4096,
                "status": 5,
                "status_label": "KILLED",
                "failed_reason": "timeout",
            }))
        );
    }

    #[test]
    fn problem_details_renames_kind() {
        let problem = ProblemDetails {
            kind: "about:blank".into(),
            title: "bad request".into(),
            status: 400,
            detail: None,
        };
        assert_eq!(
            serde_json::to_value(&problem).ok(),
            Some(json!({"type": "about:blank", "title": "bad request", "status": 400}))
        );
    }
}
