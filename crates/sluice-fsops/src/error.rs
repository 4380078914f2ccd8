//! # Design
//!
//! - Structured, constant-message errors for space probing and transfers.
//! - Capture operation context (paths, programs) without interpolating it into messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by filesystem helpers.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Filesystem statistics could not be read.
    #[error("fsops statvfs failure")]
    Statvfs {
        /// Path that was probed.
        path: PathBuf,
        /// Underlying errno.
        source: nix::errno::Errno,
    },
}
