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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (store and DTO builders), engine.rs (scripted download
//! engine), transfer.rs (scripted transfer tool), space.rs (fixed disk probe).

pub mod engine;
pub mod fixtures;
pub mod space;
pub mod transfer;

pub use engine::{EngineCommand, ScriptedEngine};
pub use fixtures::{engine_file, engine_task, eventually, temp_store};
pub use space::FixedSpaceProbe;
pub use transfer::ScriptedTransfer;
