//! Free-space and physical-allocation probes.

use std::fs;
use std::io;
use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::error::{FsOpsError, FsOpsResult};

/// Size of the unit `st_blocks` is reported in.
const STAT_BLOCK_SIZE: u64 = 512;

/// Measures disk space for the budget scheduler.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to unprivileged writers on the filesystem holding `dir`.
    /// The directory is created first when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or statted.
    fn free_bytes(&self, dir: &Path) -> FsOpsResult<u64>;

    /// Bytes physically allocated to `path`, or `None` when the file does not exist.
    fn allocated_bytes(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by the host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSpaceProbe;

impl SpaceProbe for HostSpaceProbe {
    #[allow(clippy::useless_conversion)]
    fn free_bytes(&self, dir: &Path) -> FsOpsResult<u64> {
        fs::create_dir_all(dir).map_err(|source| FsOpsError::Io {
            operation: "create_dir",
            path: dir.to_path_buf(),
            source,
        })?;
        let stats = statvfs(dir).map_err(|source| FsOpsError::Statvfs {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(u64::from(stats.blocks_available()).saturating_mul(u64::from(stats.fragment_size())))
    }

    fn allocated_bytes(&self, path: &Path) -> Option<u64> {
        match fs::metadata(path) {
            Ok(metadata) => Some(physical_size(&metadata)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "allocation probe failed");
                None
            }
        }
    }
}

#[cfg(unix)]
fn physical_size(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.blocks().saturating_mul(STAT_BLOCK_SIZE)
}

#[cfg(not(unix))]
fn physical_size(metadata: &fs::Metadata) -> u64 {
    let _ = STAT_BLOCK_SIZE;
    metadata.len()
}
