//! Commands accepted by the engine worker and the queue used to submit them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use levin_engine_core::{EngineError, EngineGateway, EngineResult, EngineSettings};
use levin_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Closure executed against the engine handle on the worker.
pub type EngineJob = Box<dyn FnOnce(&mut dyn EngineGateway) + Send>;

/// Unit of work executed by the worker, strictly in submission order.
pub enum EngineCommand {
    /// Advance the engine and refresh the status cache.
    Tick,
    /// Enable or disable engine activity.
    SetEnabled(bool),
    /// Forward a power source change.
    UpdateBattery {
        /// Whether the host is on AC power.
        on_ac_power: bool,
    },
    /// Forward a connectivity change.
    UpdateNetwork {
        /// Wi-Fi (or wired) connectivity present.
        has_wifi: bool,
        /// Cellular connectivity present.
        has_cellular: bool,
    },
    /// Forward filesystem statistics for the data directory.
    UpdateStorage {
        /// Filesystem size in bytes.
        fs_total: u64,
        /// Free bytes on the filesystem.
        fs_free: u64,
    },
    /// Register an item file with the engine.
    AddItem {
        /// Path of the item file.
        path: PathBuf,
        /// Optional reply channel for the engine's verdict.
        respond_to: Option<oneshot::Sender<EngineResult<()>>>,
    },
    /// Remove an item by info hash.
    RemoveItem {
        /// Info hash of the item.
        id: String,
    },
    /// Apply runtime settings without restarting the engine.
    ApplySettings {
        /// Settings to apply.
        settings: Box<EngineSettings>,
        /// Optional completion signal.
        respond_to: Option<oneshot::Sender<()>>,
    },
    /// Run an arbitrary closure against the engine handle.
    Exec {
        /// Operation name used in logs.
        operation: &'static str,
        /// Closure to run.
        job: EngineJob,
    },
    /// Stop and destroy the engine, then terminate the worker.
    Shutdown {
        /// Completion signal sent once the handle is destroyed.
        respond_to: oneshot::Sender<()>,
    },
}

impl EngineCommand {
    /// Operation name used in logs and failure accounting.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::SetEnabled(_) => "set_enabled",
            Self::UpdateBattery { .. } => "update_battery",
            Self::UpdateNetwork { .. } => "update_network",
            Self::UpdateStorage { .. } => "update_storage",
            Self::AddItem { .. } => "add_item",
            Self::RemoveItem { .. } => "remove_item",
            Self::ApplySettings { .. } => "apply_settings",
            Self::Exec { operation, .. } => *operation,
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

impl fmt::Debug for EngineCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EngineCommand")
            .field("operation", &self.operation())
            .finish_non_exhaustive()
    }
}

/// Handle used by every other component to reach the engine.
///
/// Submission never blocks. Once shutdown begins the queue is closed and any
/// further submission is dropped without effect.
#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<EngineCommand>,
    closed: Arc<AtomicBool>,
    metrics: Metrics,
}

impl CommandQueue {
    pub(crate) fn new(metrics: Metrics) -> (Self, mpsc::UnboundedReceiver<EngineCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
            metrics,
        };
        (queue, receiver)
    }

    /// Enqueue a command and return immediately.
    pub fn submit(&self, command: EngineCommand) {
        if self.is_closed() {
            self.drop_command(&command);
            return;
        }
        self.send(command);
    }

    /// Enqueue a closure and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::QueueClosed`] once shutdown has begun and
    /// [`EngineError::CommandAborted`] if the closure panicked or the worker
    /// exited before running it.
    pub async fn submit_and_await<T, F>(&self, operation: &'static str, job: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn EngineGateway) -> T + Send + 'static,
    {
        if self.is_closed() {
            return Err(EngineError::QueueClosed { operation });
        }
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Exec {
            operation,
            job: Box::new(move |engine| {
                let _ = tx.send(job(engine));
            }),
        });
        rx.await
            .map_err(|_| EngineError::CommandAborted { operation })
    }

    /// Register an item file and wait for the engine's verdict.
    ///
    /// # Errors
    ///
    /// Propagates the engine's rejection, or a queue error as for
    /// [`CommandQueue::submit_and_await`].
    pub async fn add_item(&self, path: PathBuf) -> EngineResult<()> {
        const OPERATION: &str = "add_item";
        if self.is_closed() {
            return Err(EngineError::QueueClosed {
                operation: OPERATION,
            });
        }
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::AddItem {
            path,
            respond_to: Some(tx),
        });
        rx.await.map_err(|_| EngineError::CommandAborted {
            operation: OPERATION,
        })?
    }

    /// Apply runtime settings and wait until the worker has applied them.
    ///
    /// # Errors
    ///
    /// Returns a queue error as for [`CommandQueue::submit_and_await`].
    pub async fn apply_settings(&self, settings: EngineSettings) -> EngineResult<()> {
        const OPERATION: &str = "apply_settings";
        if self.is_closed() {
            return Err(EngineError::QueueClosed {
                operation: OPERATION,
            });
        }
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::ApplySettings {
            settings: Box::new(settings),
            respond_to: Some(tx),
        });
        rx.await.map_err(|_| EngineError::CommandAborted {
            operation: OPERATION,
        })
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the queue and enqueue the terminal shutdown command.
    ///
    /// Returns `None` if the queue was already closed.
    pub(crate) fn close(&self) -> Option<oneshot::Receiver<()>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown { respond_to: tx });
        Some(rx)
    }

    fn send(&self, command: EngineCommand) {
        match self.sender.send(command) {
            Ok(()) => self.metrics.add_queue_depth(1),
            Err(mpsc::error::SendError(command)) => self.drop_command(&command),
        }
    }

    fn drop_command(&self, command: &EngineCommand) {
        self.metrics.inc_command_dropped();
        debug!(
            operation = command.operation(),
            "engine command dropped after shutdown"
        );
    }
}
