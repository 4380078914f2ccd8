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

//! Typed runtime configuration assembled from `SLUICE_*` environment variables.
//!
//! Layout: `model.rs` (sections), `defaults.rs` (deployment defaults),
//! `loader.rs` (environment overlay), `validate.rs` (range checks).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::GIB;
pub use error::{ConfigError, ConfigResult};
pub use loader::keys;
pub use model::{
    ApiConfig, DiskConfig, EngineConfig, LogStyle, LoggingConfig, SchedulerConfig, SluiceConfig,
    StoreConfig, TransferConfig, ZombieConfig,
};
