//! Best-effort removal of local payload files.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Suffix the engine uses for partial-piece sidecar files.
pub const PARTS_SUFFIX: &str = ".parts";

/// Sidecar path holding partial pieces for `path`.
#[must_use]
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(PARTS_SUFFIX);
    PathBuf::from(raw)
}

/// Delete `path` and its sidecar, ignoring failures.
///
/// Returns the number of files actually removed.
pub async fn purge_local(path: &Path) -> usize {
    let mut removed = 0;
    for target in [path.to_path_buf(), sidecar_path(path)] {
        match tokio::fs::remove_file(&target).await {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                debug!(path = %target.display(), error = %err, "local purge failed");
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/d/show/ep1.mkv")),
            PathBuf::from("/d/show/ep1.mkv.parts")
        );
    }

    #[tokio::test]
    async fn purge_removes_file_and_sidecar() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let path = root.path().join("movie.mkv");
        std::fs::write(&path, b"payload")?;
        std::fs::write(sidecar_path(&path), b"parts")?;

        assert_eq!(purge_local(&path).await, 2);
        assert!(!path.exists());
        assert!(!sidecar_path(&path).exists());
        assert_eq!(purge_local(&path).await, 0);
        Ok(())
    }
}
