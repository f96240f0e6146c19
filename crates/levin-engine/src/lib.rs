#![deny(unsafe_code)]
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

//! Single-owner execution of the seeding engine.
//!
//! Layout: `command.rs` (commands and the submission queue), `worker.rs`
//! (the task that owns the engine handle), `scheduler.rs` (1 Hz tick
//! producer), `status.rs` (atomically replaced status snapshot),
//! `simulated.rs` (in-process engine), `ffi.rs`/`native.rs` (`liblevin`
//! binding behind the `native` feature).

/// Engine command definitions and the submission queue.
pub mod command;
#[cfg(feature = "native")]
#[allow(unsafe_code, missing_docs)]
pub mod ffi;
#[cfg(feature = "native")]
#[allow(unsafe_code)]
pub mod native;
/// Periodic tick producer.
pub mod scheduler;
pub mod simulated;
pub mod status;
mod worker;

pub use command::{CommandQueue, EngineCommand, EngineJob};
pub use scheduler::{DEFAULT_TICK_INTERVAL, TickScheduler};
pub use simulated::{SimulatedConnector, SimulatedEngine};
pub use status::StatusCache;

use std::sync::Arc;
use std::time::Duration;

use levin_engine_core::{EngineConfig, EngineConnector, EngineError, EngineResult};
use levin_events::EventBus;
use levin_telemetry::Metrics;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use worker::WorkerContext;

/// Connector used when the caller does not choose one: `liblevin` when the
/// `native` feature is enabled, the simulated engine otherwise.
#[must_use]
pub fn default_connector() -> Arc<dyn EngineConnector> {
    #[cfg(feature = "native")]
    {
        Arc::new(native::NativeConnector)
    }
    #[cfg(not(feature = "native"))]
    {
        Arc::new(SimulatedConnector)
    }
}

/// Running engine: the worker that owns the handle, its queue, the tick
/// scheduler and the status cache.
pub struct EngineHost {
    queue: CommandQueue,
    status: StatusCache,
    worker: JoinHandle<()>,
    scheduler: TickScheduler,
}

impl EngineHost {
    /// Create and start the engine on a fresh worker, then start ticking.
    ///
    /// # Errors
    ///
    /// Returns the connector's or engine's error when the handle cannot be
    /// created or started; no worker or scheduler is left running.
    pub async fn start(
        connector: Arc<dyn EngineConnector>,
        config: EngineConfig,
        tick_interval: Duration,
        events: EventBus,
        metrics: Metrics,
    ) -> EngineResult<Self> {
        let status = StatusCache::new();
        let (queue, receiver) = CommandQueue::new(metrics.clone());
        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = worker::spawn(
            connector,
            config,
            WorkerContext {
                events,
                metrics,
                status: status.clone(),
            },
            receiver,
            ready_tx,
        );

        let ready = ready_rx.await.map_err(|_| EngineError::CommandAborted {
            operation: "start",
        });
        if let Err(err) = ready.and_then(|result| result) {
            let _ = worker.await;
            return Err(err);
        }

        let scheduler = TickScheduler::spawn(queue.clone(), tick_interval);
        Ok(Self {
            queue,
            status,
            worker,
            scheduler,
        })
    }

    /// Queue used to reach the engine.
    #[must_use]
    pub fn queue(&self) -> CommandQueue {
        self.queue.clone()
    }

    /// Status cache written by the worker after each tick.
    #[must_use]
    pub fn status(&self) -> StatusCache {
        self.status.clone()
    }

    /// Stop ticking, destroy the engine on the worker, and wait for the worker
    /// to exit. Commands submitted from now on are dropped.
    pub async fn shutdown(self) {
        self.scheduler.cancel().await;
        if let Some(done) = self.queue.close() {
            let _ = done.await;
        }
        if let Err(err) = self.worker.await {
            warn!(error = %err, "engine worker terminated abnormally");
        }
        info!("engine host shut down");
    }
}
