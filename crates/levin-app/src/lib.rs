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

//! Levin daemon wiring.
//!
//! Layout: `service.rs` (engine host, environment observers, settings and
//! population wired in start/stop order), `bootstrap.rs` (daemon entry
//! points and signal handling), `error.rs`.

/// Daemon entry points and signal handling.
pub mod bootstrap;
pub mod error;
/// Running service composition.
pub mod service;

pub use bootstrap::{DaemonOptions, render_config, run_daemon, run_populate};
pub use error::{AppError, AppResult};
pub use service::{EnvironmentSources, LevinService, ServiceDeps, build_fetcher, populate};
