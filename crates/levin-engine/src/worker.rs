#![allow(clippy::redundant_pub_crate)]

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use levin_engine_core::{
    EngineConfig, EngineConnector, EngineError, EngineGateway, EngineResult, EngineSettings,
    EngineState, StatusSnapshot,
};
use levin_events::{Event, EventBus};
use levin_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::command::EngineCommand;
use crate::status::StatusCache;

pub(crate) struct WorkerContext {
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
    pub(crate) status: StatusCache,
}

/// Spawn the worker task. The engine is created and started on the worker;
/// `ready` reports the outcome before any queued command runs.
pub(crate) fn spawn(
    connector: Arc<dyn EngineConnector>,
    config: EngineConfig,
    context: WorkerContext,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    ready: oneshot::Sender<EngineResult<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let engine = match create_and_start(connector.as_ref(), &config) {
            Ok(engine) => engine,
            Err(err) => {
                warn!(connector = connector.name(), error = %err, "engine startup failed");
                let _ = ready.send(Err(err));
                return;
            }
        };
        info!(connector = connector.name(), "engine started");
        let _ = ready.send(Ok(()));

        let mut worker = Worker::new(engine, context);
        while let Some(command) = commands.recv().await {
            worker.metrics.add_queue_depth(-1);
            if worker.dispatch(command) == Flow::Stop {
                break;
            }
        }

        commands.close();
        while let Ok(command) = commands.try_recv() {
            worker.metrics.add_queue_depth(-1);
            worker.metrics.inc_command_dropped();
            debug!(
                operation = command.operation(),
                "engine command dropped after shutdown"
            );
        }
        worker.teardown();
    })
}

fn create_and_start(
    connector: &dyn EngineConnector,
    config: &EngineConfig,
) -> EngineResult<Box<dyn EngineGateway>> {
    let mut engine = connector.create(config)?;
    if let Err(err) = engine.start() {
        engine.destroy();
        return Err(err);
    }
    Ok(engine)
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Worker {
    engine: Option<Box<dyn EngineGateway>>,
    events: EventBus,
    metrics: Metrics,
    status: StatusCache,
    last_state: EngineState,
    health: BTreeSet<String>,
}

impl Worker {
    fn new(engine: Box<dyn EngineGateway>, context: WorkerContext) -> Self {
        Self {
            engine: Some(engine),
            events: context.events,
            metrics: context.metrics,
            status: context.status,
            last_state: EngineState::Off,
            health: BTreeSet::new(),
        }
    }

    fn dispatch(&mut self, command: EngineCommand) -> Flow {
        let operation = command.operation();
        if let EngineCommand::Shutdown { respond_to } = command {
            self.teardown();
            let _ = respond_to.send(());
            return Flow::Stop;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.handle(command))) {
            Ok(Ok(())) => self.mark_recovered("worker"),
            Ok(Err(err)) => {
                self.metrics.inc_command_failure();
                warn!(operation, error = %err, "engine command failed");
            }
            Err(_) => {
                self.metrics.inc_command_failure();
                self.mark_degraded("worker", Some(operation));
            }
        }
        Flow::Continue
    }

    fn handle(&mut self, command: EngineCommand) -> EngineResult<()> {
        let operation = command.operation();
        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(EngineError::NotRunning { operation });
        };

        match command {
            EngineCommand::Tick => {
                engine.tick();
                let snapshot = engine.status();
                self.publish_status(snapshot);
            }
            EngineCommand::SetEnabled(enabled) => {
                engine.set_enabled(enabled);
                info!(enabled, "engine enablement changed");
            }
            EngineCommand::UpdateBattery { on_ac_power } => {
                engine.update_battery(on_ac_power);
                debug!(on_ac_power, "battery state forwarded");
            }
            EngineCommand::UpdateNetwork {
                has_wifi,
                has_cellular,
            } => {
                engine.update_network(has_wifi, has_cellular);
                debug!(has_wifi, has_cellular, "network state forwarded");
            }
            EngineCommand::UpdateStorage { fs_total, fs_free } => {
                engine.update_storage(fs_total, fs_free);
                debug!(fs_total, fs_free, "storage state forwarded");
            }
            EngineCommand::AddItem { path, respond_to } => {
                let result = engine.add_item(&path);
                let rejected = result.is_err();
                match &result {
                    Ok(()) => self.publish_item_registered(&path),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "engine rejected item");
                    }
                }
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(result);
                }
                if rejected {
                    self.metrics.inc_command_failure();
                }
            }
            EngineCommand::RemoveItem { id } => {
                engine.remove_item(&id);
                info!(item = %id, "item removed");
            }
            EngineCommand::ApplySettings {
                settings,
                respond_to,
            } => {
                apply_settings(engine, &settings);
                let description = settings.describe();
                info!(settings = %description, "settings applied");
                let _ = self.events.publish(Event::SettingsApplied { description });
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(());
                }
            }
            EngineCommand::Exec { job, .. } => job(engine),
            EngineCommand::Shutdown { .. } => {}
        }
        Ok(())
    }

    fn publish_status(&mut self, snapshot: StatusSnapshot) {
        self.metrics.inc_tick();
        self.metrics.set_engine_peers(i64::from(snapshot.peer_count));
        trace!(
            state = %snapshot.state,
            peers = snapshot.peer_count,
            items = snapshot.item_count,
            "engine ticked"
        );
        self.transition(snapshot.state);
        self.status.publish(snapshot);
    }

    fn publish_item_registered(&self, path: &Path) {
        info!(path = %path.display(), "item registered");
        let _ = self.events.publish(Event::ItemRegistered {
            path: path.display().to_string(),
        });
    }

    fn transition(&mut self, next: EngineState) {
        if next == self.last_state {
            return;
        }
        let from = self.last_state;
        self.last_state = next;
        info!(from = %from, to = %next, "engine state changed");
        let _ = self
            .events
            .publish(Event::EngineStateChanged { from, to: next });
    }

    /// Stop and destroy the engine if it is still live. Idempotent.
    fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
            engine.destroy();
            self.status.clear();
            self.transition(EngineState::Off);
            info!("engine stopped and destroyed");
        }
    }

    fn mark_degraded(&mut self, component: &str, detail: Option<&str>) {
        let inserted = self.health.insert(component.to_string());
        if inserted {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            let _ = self.events.publish(Event::HealthChanged { degraded });
            if let Some(detail) = detail {
                warn!(component, detail = %detail, "engine component degraded");
            } else {
                warn!(component, "engine component degraded");
            }
        } else if let Some(detail) = detail {
            warn!(component, detail = %detail, "engine component still degraded");
        }
    }

    fn mark_recovered(&mut self, component: &str) {
        if self.health.remove(component) {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            let _ = self.events.publish(Event::HealthChanged { degraded });
            info!(component, "engine component recovered");
        }
    }
}

fn apply_settings(engine: &mut dyn EngineGateway, settings: &EngineSettings) {
    engine.set_download_limit(settings.download_limit_kbps);
    engine.set_upload_limit(settings.upload_limit_kbps);
    engine.set_run_on_battery(settings.run_on_battery);
    engine.set_run_on_cellular(settings.run_on_cellular);
    engine.set_disk_limits(
        settings.min_free_bytes,
        settings.min_free_percentage,
        settings.max_storage_bytes,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use levin_test_support::{GatewayCall, RecordingGateway};
    use std::path::PathBuf;

    fn worker_with(gateway: RecordingGateway) -> anyhow::Result<(Worker, EventBus, StatusCache)> {
        let events = EventBus::with_capacity(32);
        let status = StatusCache::new();
        let worker = Worker::new(
            Box::new(gateway),
            WorkerContext {
                events: events.clone(),
                metrics: Metrics::new()?,
                status: status.clone(),
            },
        );
        Ok((worker, events, status))
    }

    #[tokio::test]
    async fn tick_publishes_snapshot_and_state_change() -> anyhow::Result<()> {
        let gateway = RecordingGateway::new();
        gateway.set_state(EngineState::Idle);
        let (mut worker, events, status) = worker_with(gateway.clone())?;
        let mut stream = events.subscribe(None);

        assert_eq!(worker.dispatch(EngineCommand::Tick), Flow::Continue);
        assert_eq!(
            status.latest().map(|snapshot| snapshot.state),
            Some(EngineState::Idle)
        );
        let envelope = stream.next().await.expect("state change event");
        assert_eq!(
            envelope.event,
            Event::EngineStateChanged {
                from: EngineState::Off,
                to: EngineState::Idle,
            }
        );

        // Same state again publishes no further transition.
        worker.dispatch(EngineCommand::Tick);
        assert_eq!(events.last_event_id(), Some(envelope.id));
        assert_eq!(gateway.calls(), vec![
            GatewayCall::Tick,
            GatewayCall::Status,
            GatewayCall::Tick,
            GatewayCall::Status,
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn panicking_job_is_contained_and_flagged() -> anyhow::Result<()> {
        let gateway = RecordingGateway::new();
        let (mut worker, events, _status) = worker_with(gateway.clone())?;
        let mut stream = events.subscribe(None);

        let flow = worker.dispatch(EngineCommand::Exec {
            operation: "explode",
            job: Box::new(|_| panic!("job failure")),
        });
        assert_eq!(flow, Flow::Continue);
        match stream.next().await.map(|envelope| envelope.event) {
            Some(Event::HealthChanged { degraded }) => assert_eq!(degraded, vec!["worker"]),
            other => panic!("expected health event, got {other:?}"),
        }

        worker.dispatch(EngineCommand::SetEnabled(true));
        match stream.next().await.map(|envelope| envelope.event) {
            Some(Event::HealthChanged { degraded }) => assert!(degraded.is_empty()),
            other => panic!("expected recovery event, got {other:?}"),
        }
        assert_eq!(worker.metrics.snapshot().commands_failed_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_item_is_reported_to_caller() -> anyhow::Result<()> {
        let gateway = RecordingGateway::new();
        gateway.reject_items(-1);
        let (mut worker, _events, _status) = worker_with(gateway)?;
        let (tx, rx) = oneshot::channel();
        worker.dispatch(EngineCommand::AddItem {
            path: PathBuf::from("/watch/a.torrent"),
            respond_to: Some(tx),
        });
        let result = rx.await?;
        assert!(matches!(result, Err(EngineError::ItemRejected { code: -1, .. })));
        assert_eq!(worker.metrics.snapshot().commands_failed_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_stops_destroys_and_clears_status() -> anyhow::Result<()> {
        let gateway = RecordingGateway::new();
        gateway.set_state(EngineState::Seeding);
        let (mut worker, _events, status) = worker_with(gateway.clone())?;
        worker.dispatch(EngineCommand::Tick);
        assert!(status.latest().is_some());

        let (tx, rx) = oneshot::channel();
        assert_eq!(
            worker.dispatch(EngineCommand::Shutdown { respond_to: tx }),
            Flow::Stop
        );
        rx.await?;
        assert!(status.latest().is_none());
        let calls = gateway.calls();
        assert_eq!(
            calls[calls.len() - 2..].to_vec(),
            vec![GatewayCall::Stop, GatewayCall::Destroy]
        );

        let (tx, _rx) = oneshot::channel();
        worker.dispatch(EngineCommand::AddItem {
            path: PathBuf::from("/watch/late.torrent"),
            respond_to: Some(tx),
        });
        assert_eq!(gateway.calls().len(), calls.len());
        Ok(())
    }

    #[tokio::test]
    async fn settings_apply_calls_every_setter() -> anyhow::Result<()> {
        let gateway = RecordingGateway::new();
        let (mut worker, _events, _status) = worker_with(gateway.clone())?;
        let settings = EngineSettings {
            download_limit_kbps: 100,
            upload_limit_kbps: 50,
            run_on_battery: true,
            run_on_cellular: false,
            min_free_bytes: 1_024,
            min_free_percentage: 0.05,
            max_storage_bytes: 0,
        };
        let (tx, rx) = oneshot::channel();
        worker.dispatch(EngineCommand::ApplySettings {
            settings: Box::new(settings),
            respond_to: Some(tx),
        });
        rx.await?;
        assert_eq!(gateway.calls(), vec![
            GatewayCall::SetDownloadLimit(100),
            GatewayCall::SetUploadLimit(50),
            GatewayCall::SetRunOnBattery(true),
            GatewayCall::SetRunOnCellular(false),
            GatewayCall::SetDiskLimits {
                min_free_bytes: 1_024,
                max_storage_bytes: 0,
            },
        ]);
        Ok(())
    }
}
