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

//! File-backed configuration for the Levin daemon.
//!
//! Layout: `defaults.rs` (default values), `model.rs` (typed sections and
//! engine conversions), `loader.rs` (TOML discovery, parsing and path
//! expansion), `validate.rs` (field validation), `service.rs`
//! (`SettingsHandle` read accessor and change stream).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod service;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{default_config_path, expand_path, load, to_toml};
pub use model::{FetchConfig, LevinConfig, LoggingSection, PathsConfig, Settings};
pub use service::{SettingsHandle, SettingsStream};
pub use validate::validate;
