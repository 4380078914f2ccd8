//! Deterministic disk-space probe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sluice_fsops::{FsOpsResult, SpaceProbe};

/// [`SpaceProbe`] answering from a fixed free-space figure and an allocation table.
///
/// Paths without an entry are reported as missing from disk.
#[derive(Debug, Default)]
pub struct FixedSpaceProbe {
    free: Mutex<u64>,
    allocations: Mutex<HashMap<PathBuf, u64>>,
}

impl FixedSpaceProbe {
    /// Probe reporting `free` available bytes.
    #[must_use]
    pub fn new(free: u64) -> Self {
        Self {
            free: Mutex::new(free),
            allocations: Mutex::new(HashMap::new()),
        }
    }

    /// Change the reported free space.
    pub fn set_free(&self, free: u64) {
        *self.free.lock().unwrap_or_else(PoisonError::into_inner) = free;
    }

    /// Record that `path` exists with `bytes` physically allocated.
    pub fn set_allocated(&self, path: impl Into<PathBuf>, bytes: u64) {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), bytes);
    }
}

impl SpaceProbe for FixedSpaceProbe {
    fn free_bytes(&self, _dir: &Path) -> FsOpsResult<u64> {
        Ok(*self.free.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn allocated_bytes(&self, path: &Path) -> Option<u64> {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }
}
