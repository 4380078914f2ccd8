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

//! Dashboard HTTP API for Sluice.
//!
//! A thin read/write view over the state store and the download engine:
//! task listing with per-file lifecycle, adding and deleting tasks, plus
//! health and Prometheus endpoints. No scheduling decisions are made here.

pub mod error;
pub(crate) mod http;
pub mod models;
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use state::ApiState;
