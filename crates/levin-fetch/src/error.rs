//! Error types for bulk acquisition.
//!
//! # Design
//! - Transport failures and non-success statuses are retryable; local IO
//!   failures and cancellation are not.
//! - Per-item failures are reported through progress; only run-level
//!   failures surface as `Err` from [`crate::Fetcher::run`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("http client construction failed")]
    Client {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The manifest URL is not a valid absolute URL.
    #[error("manifest url is invalid")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// The request failed at the transport layer.
    #[error("http request failed")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("http request returned a non-success status")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// A local filesystem operation failed.
    #[error("fetch filesystem operation failed")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Every manifest attempt failed.
    #[error("manifest unavailable after retries")]
    ManifestUnavailable {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        #[source]
        source: Box<FetchError>,
    },
    /// The manifest listed no items.
    #[error("manifest is empty")]
    EmptyManifest,
    /// Another run is in progress.
    #[error("a fetch run is already in progress")]
    AlreadyRunning,
    /// The run was cancelled.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

/// Convenience alias for fetch results.
pub type FetchResult<T> = Result<T, FetchError>;
