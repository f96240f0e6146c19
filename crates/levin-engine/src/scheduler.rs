//! Periodic tick producer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::command::{CommandQueue, EngineCommand};

/// Default cadence at which ticks are submitted.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Background task that enqueues [`EngineCommand::Tick`] at a fixed cadence.
///
/// A tick is submitted on every period even while earlier ticks are still
/// queued; the worker serialises them.
pub struct TickScheduler {
    handle: JoinHandle<()>,
}

impl TickScheduler {
    /// Spawn the scheduler. The first tick is submitted one period from now,
    /// after the initial environment updates queued by the caller.
    #[must_use]
    pub fn spawn(queue: CommandQueue, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if queue.is_closed() {
                    break;
                }
                queue.submit(EngineCommand::Tick);
            }
            debug!("tick scheduler exited");
        });
        Self { handle }
    }

    /// Stop the scheduler and wait until it can no longer submit ticks.
    pub async fn cancel(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}
