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

//! Resilient bulk acquisition of item files listed in a remote manifest.
//!
//! Layout: `fetcher.rs` (run orchestration, downloads, run guard),
//! `manifest.rs` (manifest parsing and file naming), `retry.rs` (backoff
//! policy and injectable sleeper), `cancel.rs` (run cancellation),
//! `progress.rs` (progress notifications and run summary), `error.rs`.

pub mod cancel;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod progress;
pub mod retry;

pub use cancel::FetchCancel;
pub use error::{FetchError, FetchResult};
pub use fetcher::{Fetcher, FetcherBuilder, FetcherConfig};
pub use manifest::{file_name_for, parse_manifest};
pub use progress::{FetchProgress, FetchStep, FetchSummary};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
