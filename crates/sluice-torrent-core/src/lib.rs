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

//! Engine-agnostic download interfaces and DTOs.
//!
//! Layout: `model` (tasks, files, states, priorities), `service` (the
//! [`DownloadEngine`] capability trait consumed by the scheduler).

pub mod model;
pub mod service;

pub use model::{
    EnginePreferences, EngineFile, EngineState, EngineTask, FilePriority, normalize_availability,
};
pub use service::DownloadEngine;
