//! Filesystem helpers for the scheduler: space accounting, local purge, and
//! the external transfer tool.
#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod purge;
pub mod space;
pub mod transfer;

pub use error::{FsOpsError, FsOpsResult};
pub use purge::{PARTS_SUFFIX, purge_local, sidecar_path};
pub use space::{HostSpaceProbe, SpaceProbe};
pub use transfer::{
    RcloneTransfer, TransferOutcome, TransferRequest, TransferSettings, TransferTool,
    remote_destination,
};
