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

//! Persistence layer for Sluice: torrent and file lifecycle records on SQLite.
//!
//! Every mutation goes through [`RetryPolicy`] so that lock contention on the
//! shared database file is retried with a fixed backoff instead of failing the
//! calling phase outright.

pub mod error;
pub mod model;
pub mod retry;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use model::{FileItem, FileStatus, NewFileItem, NewTorrent, TorrentRecord};
pub use retry::{RetryError, RetryPolicy};
pub use store::StateStore;
