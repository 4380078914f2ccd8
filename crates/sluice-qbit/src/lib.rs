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

//! qBittorrent Web API (v2) adapter for the [`DownloadEngine`] contract.
//!
//! [`DownloadEngine`]: sluice_torrent_core::DownloadEngine

pub mod client;
pub mod error;
mod wire;

pub use client::{QbitClient, QbitSettings};
pub use error::{EngineError, EngineResult};
