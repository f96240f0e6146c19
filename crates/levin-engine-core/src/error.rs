//! # Design
//!
//! - Keep error messages constant; store operational context in fields.
//! - Engine-call failures (null handle, non-zero start code) are fatal to the
//!   session and surface unchanged to the caller that requested the operation.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The connector could not produce an engine handle.
    #[error("engine handle could not be created")]
    CreateFailed {
        /// Connector that failed.
        connector: &'static str,
    },
    /// The engine refused to start.
    #[error("engine failed to start")]
    StartFailed {
        /// Status code returned by the engine.
        code: i32,
    },
    /// The engine rejected an item path.
    #[error("engine rejected item")]
    ItemRejected {
        /// Item path handed to the engine.
        path: PathBuf,
        /// Status code returned by the engine.
        code: i32,
    },
    /// A configuration value could not be passed across to the engine.
    #[error("engine configuration invalid")]
    InvalidConfig {
        /// Field that could not be converted.
        field: &'static str,
        /// Static reason describing the problem.
        reason: &'static str,
    },
    /// The command queue no longer accepts work.
    #[error("engine command queue closed")]
    QueueClosed {
        /// Operation that could not be submitted.
        operation: &'static str,
    },
    /// A queued command panicked or was dropped before replying.
    #[error("engine command aborted")]
    CommandAborted {
        /// Operation that was aborted.
        operation: &'static str,
    },
    /// No engine is running.
    #[error("engine not running")]
    NotRunning {
        /// Operation that required a running engine.
        operation: &'static str,
    },
}

/// Convenience alias for engine operation results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_constant() {
        let err = EngineError::StartFailed { code: -3 };
        assert_eq!(err.to_string(), "engine failed to start");
        let err = EngineError::QueueClosed {
            operation: "add_item",
        };
        assert_eq!(err.to_string(), "engine command queue closed");
    }
}
