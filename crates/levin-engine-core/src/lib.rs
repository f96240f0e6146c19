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

//! Engine-agnostic contract for the native seeding engine and its DTOs.
//!
//! Layout: `error.rs` (engine error taxonomy), `model.rs` (configuration,
//! settings and status snapshots), `gateway.rs` (connector and handle traits).

pub mod error;
pub mod gateway;
pub mod model;

pub use error::{EngineError, EngineResult};
pub use gateway::{EngineConnector, EngineGateway};
pub use levin_events::EngineState;
pub use model::{
    DEFAULT_DISK_CHECK_INTERVAL_SECS, DEFAULT_MIN_FREE_PERCENTAGE, DEFAULT_STUN_SERVER,
    EngineConfig, EngineSettings, ItemSnapshot, StatusSnapshot,
};
