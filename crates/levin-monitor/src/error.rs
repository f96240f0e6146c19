//! Error types for environment signal sources.
//!
//! # Design
//! - Errors never escape the observer loop; they are logged and treated as
//!   "no change".
//! - Variants carry the signal name so the log line identifies the source.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to read an environment signal.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Reading from the filesystem failed.
    #[error("environment signal read failed")]
    Io {
        /// Signal being read.
        signal: &'static str,
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The platform exposes no data for the signal.
    #[error("environment signal unavailable")]
    Unavailable {
        /// Signal being read.
        signal: &'static str,
        /// Additional context.
        detail: String,
    },
}

/// Convenience alias for monitor results.
pub type MonitorResult<T> = Result<T, MonitorError>;
