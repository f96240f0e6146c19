//! # Design
//!
//! - Centralize service-level errors for startup, settings and population.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for service operations.
pub type AppResult<T> = Result<T, AppError>;

/// Service-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: levin_config::ConfigError,
    },
    /// Engine operations failed.
    #[error("engine operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Source engine error.
        source: levin_engine_core::EngineError,
    },
    /// Bulk acquisition failed.
    #[error("fetch operation failed")]
    Fetch {
        /// Operation identifier.
        operation: &'static str,
        /// Source fetch error.
        source: levin_fetch::FetchError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: Box<dyn StdError + Send + Sync>,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: levin_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn engine(
        operation: &'static str,
        source: levin_engine_core::EngineError,
    ) -> Self {
        Self::Engine { operation, source }
    }

    pub(crate) const fn fetch(operation: &'static str, source: levin_fetch::FetchError) -> Self {
        Self::Fetch { operation, source }
    }

    pub(crate) fn telemetry(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Telemetry {
            operation,
            source: source.into(),
        }
    }

    /// Process exit code for this failure: `1` for a failed fetch run, `2`
    /// for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Fetch { .. } => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_variants() {
        let engine = AppError::engine(
            "engine.start",
            levin_engine_core::EngineError::StartFailed { code: -1 },
        );
        assert!(matches!(
            engine,
            AppError::Engine {
                operation: "engine.start",
                ..
            }
        ));
        assert_eq!(engine.to_string(), "engine operation failed");

        let fetch = AppError::fetch("fetch.run", levin_fetch::FetchError::EmptyManifest);
        assert!(matches!(fetch, AppError::Fetch { .. }));

        let telemetry = AppError::telemetry("telemetry.init", anyhow::anyhow!("already set"));
        assert!(telemetry.source().is_some());
    }

    #[test]
    fn failed_fetch_runs_exit_with_one() {
        let manifest = AppError::fetch(
            "fetch.run",
            levin_fetch::FetchError::ManifestUnavailable {
                attempts: 3,
                source: Box::new(levin_fetch::FetchError::Status {
                    url: "http://x/manifest".to_string(),
                    status: 500,
                }),
            },
        );
        assert_eq!(manifest.exit_code(), 1);
        assert_eq!(
            AppError::fetch("fetch.run", levin_fetch::FetchError::EmptyManifest).exit_code(),
            1
        );

        let config = AppError::config(
            "settings.load",
            levin_config::ConfigError::HomeUnavailable {
                raw: "~/levin".to_string(),
            },
        );
        assert_eq!(config.exit_code(), 2);
    }
}
