//! Request and response shapes of the qBittorrent Web API.

use serde::{Deserialize, Serialize};
use sluice_torrent_core::{
    EngineFile, EnginePreferences, EngineState, EngineTask, normalize_availability,
};

/// Entry of `GET /api/v2/torrents/info`.
#[derive(Debug, Deserialize)]
pub(crate) struct QbTorrent {
    pub(crate) hash: String,
    #[serde(default)]
    pub(crate) name: String,
    /// Selected size; `-1` or absent until metadata resolves.
    #[serde(default)]
    pub(crate) total_size: i64,
    pub(crate) state: EngineState,
}

impl From<QbTorrent> for EngineTask {
    fn from(value: QbTorrent) -> Self {
        Self {
            hash: value.hash,
            name: value.name,
            total_size: u64::try_from(value.total_size).unwrap_or(0),
            state: value.state,
        }
    }
}

/// Entry of `GET /api/v2/torrents/files`.
#[derive(Debug, Deserialize)]
pub(crate) struct QbFile {
    /// Only reported by newer servers; list position otherwise.
    #[serde(default)]
    pub(crate) index: Option<u32>,
    pub(crate) name: String,
    pub(crate) size: u64,
    #[serde(default)]
    pub(crate) progress: f64,
    #[serde(default)]
    pub(crate) availability: f64,
}

pub(crate) fn into_engine_files(files: Vec<QbFile>) -> Vec<EngineFile> {
    files
        .into_iter()
        .zip(0_u32..)
        .map(|(file, position)| EngineFile {
            index: file.index.unwrap_or(position),
            name: file.name,
            size: file.size,
            progress: file.progress.clamp(0.0, 1.0),
            availability: normalize_availability(file.availability),
        })
        .collect()
}

/// Payload of `POST /api/v2/app/setPreferences` (sent as the `json` form field).
#[derive(Debug, Serialize)]
pub(crate) struct QbPreferences {
    max_connec: u32,
    enable_os_cache: bool,
    preallocate_all: bool,
    queueing_enabled: bool,
    autorun_enabled: bool,
}

impl From<&EnginePreferences> for QbPreferences {
    fn from(value: &EnginePreferences) -> Self {
        Self {
            max_connec: value.max_connections,
            enable_os_cache: value.os_cache,
            preallocate_all: value.preallocate_all,
            queueing_enabled: value.queueing,
            autorun_enabled: value.autorun,
        }
    }
}

/// Join file indices the way `torrents/filePrio` expects them.
pub(crate) fn join_indices(indices: &[u32]) -> String {
    indices
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrent_entries_decode_with_unresolved_metadata() {
        let payload = r#"[
            {"hash":"abc","name":"abc","total_size":-1,"state":"stoppedDL","progress":0},
            {"hash":"def","name":"Show S01","total_size":4096,"state":"downloading"}
        ]"#;
        let tasks: Vec<EngineTask> = serde_json::from_str::<Vec<QbTorrent>>(payload)
            .expect("decode")
            .into_iter()
            .map(EngineTask::from)
            .collect();
        assert_eq!(tasks[0].total_size, 0);
        assert!(tasks[0].state.is_paused_download());
        assert!(tasks[0].metadata_pending());
        assert_eq!(tasks[1].total_size, 4096);
        assert_eq!(tasks[1].state, EngineState::Downloading);
    }

    #[test]
    fn files_fall_back_to_list_position_and_floor_availability() {
        let payload = r#"[
            {"name":"a/one.mkv","size":10,"progress":0.5,"availability":-1},
            {"index":7,"name":"a/two.mkv","size":20,"progress":1.0,"availability":2.5}
        ]"#;
        let files = into_engine_files(serde_json::from_str(payload).expect("decode"));
        assert_eq!(files[0].index, 0);
        assert!(files[0].availability.abs() < f64::EPSILON);
        assert_eq!(files[1].index, 7);
        assert!((files[1].availability - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn preferences_use_engine_field_names() {
        let encoded =
            serde_json::to_value(QbPreferences::from(&EnginePreferences::default())).expect("json");
        assert_eq!(encoded["max_connec"], 500);
        assert_eq!(encoded["enable_os_cache"], false);
        assert_eq!(encoded["preallocate_all"], true);
        assert_eq!(encoded["queueing_enabled"], false);
        assert_eq!(encoded["autorun_enabled"], false);
    }

    #[test]
    fn indices_are_pipe_separated() {
        assert_eq!(join_indices(&[0, 3, 12]), "0|3|12");
        assert_eq!(join_indices(&[]), "");
    }
}
