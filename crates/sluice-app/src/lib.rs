#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Sluice relay wiring: the scheduling phases and the process bootstrap.
//!
//! Layout: `bootstrap.rs` (service wiring), `orchestrator/` (scheduling phases and loop).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level errors.
pub mod error;
/// Scheduling phases and the loop that drives them.
pub mod orchestrator;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
