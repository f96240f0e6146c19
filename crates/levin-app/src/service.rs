//! Service orchestration: engine host, environment observers, settings and
//! bulk acquisition wired together in a fixed start/stop order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use levin_config::{LevinConfig, SettingsHandle};
use levin_engine::{CommandQueue, DEFAULT_TICK_INTERVAL, EngineCommand, EngineHost, StatusCache};
use levin_engine_core::{EngineConnector, ItemSnapshot, StatusSnapshot};
use levin_events::{Event, EventBus};
use levin_fetch::{
    FetchCancel, FetchProgress, FetchSummary, Fetcher, FetcherConfig, RetryPolicy,
};
use levin_monitor::{
    DiskStorage, NETWORK_POLL_INTERVAL, NetworkState, Observer, POWER_POLL_INTERVAL, PowerState,
    STORAGE_POLL_INTERVAL, StorageState, SysfsNetwork, SysfsPower,
};
use levin_telemetry::Metrics;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Environment sources and their poll periods.
#[derive(Debug)]
pub struct EnvironmentSources {
    /// Power-supply source.
    pub power: SysfsPower,
    /// Connectivity source.
    pub network: SysfsNetwork,
    /// Capacity source for the data directory.
    pub storage: DiskStorage,
    /// Power poll period.
    pub power_interval: Duration,
    /// Network poll period.
    pub network_interval: Duration,
    /// Storage poll period.
    pub storage_interval: Duration,
}

impl EnvironmentSources {
    /// System sources, with storage measured at `data_dir`.
    #[must_use]
    pub fn system(data_dir: &Path) -> Self {
        Self {
            power: SysfsPower::default(),
            network: SysfsNetwork::default(),
            storage: DiskStorage::new(data_dir),
            power_interval: POWER_POLL_INTERVAL,
            network_interval: NETWORK_POLL_INTERVAL,
            storage_interval: STORAGE_POLL_INTERVAL,
        }
    }
}

/// Collaborators injected into [`LevinService::start`].
pub struct ServiceDeps {
    /// Produces the engine handle.
    pub connector: Arc<dyn EngineConnector>,
    /// Environment signal sources.
    pub sources: EnvironmentSources,
    /// Tick cadence.
    pub tick_interval: Duration,
    /// Event bus shared with every component.
    pub events: EventBus,
    /// Metrics shared with every component.
    pub metrics: Metrics,
}

impl ServiceDeps {
    /// Production collaborators for `config`.
    #[must_use]
    pub fn system(config: &LevinConfig, events: EventBus, metrics: Metrics) -> Self {
        Self {
            connector: levin_engine::default_connector(),
            sources: EnvironmentSources::system(&config.paths.data_dir),
            tick_interval: DEFAULT_TICK_INTERVAL,
            events,
            metrics,
        }
    }
}

struct Observers {
    power: Observer<SysfsPower>,
    network: Observer<SysfsNetwork>,
    storage: Observer<DiskStorage>,
}

/// The running daemon.
pub struct LevinService {
    settings: SettingsHandle,
    host: EngineHost,
    observers: Observers,
    fetcher: Fetcher,
    events: EventBus,
}

impl LevinService {
    /// Start the engine, feed it the current environment, then enable it.
    ///
    /// Order: directories created, engine created and started (destroyed
    /// again if start fails), power, network and storage state delivered,
    /// engine enabled, ticking begins.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when a directory cannot be created,
    /// [`AppError::Engine`] when the engine cannot be created or started, and
    /// [`AppError::Fetch`] when the fetcher cannot be built.
    pub async fn start(settings: SettingsHandle, deps: ServiceDeps) -> AppResult<Self> {
        let config = settings.current();
        for dir in [
            &config.paths.watch_dir,
            &config.paths.data_dir,
            &config.paths.state_dir,
        ] {
            create_dir(dir).await?;
        }

        let fetcher = build_fetcher(&config, &deps.events, &deps.metrics)?;
        let host = EngineHost::start(
            deps.connector,
            config.engine_config(),
            deps.tick_interval,
            deps.events.clone(),
            deps.metrics.clone(),
        )
        .await
        .map_err(|err| AppError::engine("engine.start", err))?;
        let queue = host.queue();

        let sources = deps.sources;
        let mut observers = Observers {
            power: Observer::new(sources.power, sources.power_interval),
            network: Observer::new(sources.network, sources.network_interval),
            storage: Observer::new(sources.storage, sources.storage_interval),
        };
        observers
            .power
            .register(power_sink(queue.clone(), deps.events.clone(), deps.metrics.clone()));
        observers.network.register(network_sink(
            queue.clone(),
            deps.events.clone(),
            deps.metrics.clone(),
        ));
        observers.storage.register(storage_sink(
            queue.clone(),
            deps.events.clone(),
            deps.metrics.clone(),
        ));
        queue.submit(EngineCommand::SetEnabled(true));

        info!(
            watch_dir = %config.paths.watch_dir.display(),
            data_dir = %config.paths.data_dir.display(),
            settings = %config.settings.engine_settings().describe(),
            "levin service started"
        );
        Ok(Self {
            settings,
            host,
            observers,
            fetcher,
            events: deps.events,
        })
    }

    /// Queue reaching the engine.
    #[must_use]
    pub fn queue(&self) -> CommandQueue {
        self.host.queue()
    }

    /// Status cache refreshed every tick.
    #[must_use]
    pub fn status_cache(&self) -> StatusCache {
        self.host.status()
    }

    /// Latest status snapshot, if a tick has completed.
    #[must_use]
    pub fn status(&self) -> Option<Arc<StatusSnapshot>> {
        self.host.status().latest()
    }

    /// Event bus shared by the service's components.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> Arc<LevinConfig> {
        self.settings.current()
    }

    /// Per-item detail, read on the worker.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] when the engine is no longer reachable.
    pub async fn items(&self) -> AppResult<Vec<ItemSnapshot>> {
        self.queue()
            .submit_and_await("items", |engine| engine.items())
            .await
            .map_err(|err| AppError::engine("engine.items", err))
    }

    /// Replace the active settings and apply them to the running engine.
    ///
    /// Returns `false` when `config` equals the active settings.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] when the engine can no longer be reached.
    pub async fn apply_settings(&self, config: LevinConfig) -> AppResult<bool> {
        let previous = self.settings.current();
        if !self.settings.replace(config) {
            return Ok(false);
        }
        self.push_settings(&previous).await?;
        Ok(true)
    }

    /// Re-read the settings file and apply it when it changed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] for an unreadable or invalid file (the
    /// active settings are kept), or [`AppError::Engine`] when the engine can
    /// no longer be reached.
    pub async fn reload_settings(&self) -> AppResult<bool> {
        let previous = self.settings.current();
        let changed = self
            .settings
            .reload()
            .map_err(|err| AppError::config("settings.reload", err))?;
        if changed {
            self.push_settings(&previous).await?;
        }
        Ok(changed)
    }

    async fn push_settings(&self, previous: &LevinConfig) -> AppResult<()> {
        let config = self.settings.current();
        if config.paths != previous.paths {
            warn!("path changes take effect after a restart");
        }
        self.queue()
            .apply_settings(config.settings.engine_settings())
            .await
            .map_err(|err| AppError::engine("engine.apply_settings", err))
    }

    /// Re-read every environment signal now.
    pub fn refresh_environment(&self) {
        self.observers.power.trigger().fire();
        self.observers.network.trigger().fire();
        self.observers.storage.trigger().fire();
    }

    /// Run the fetcher in the background and register each new file with
    /// the engine.
    #[must_use]
    pub fn spawn_populate(&self, cancel: FetchCancel) -> JoinHandle<AppResult<FetchSummary>> {
        let fetcher = self.fetcher.clone();
        let queue = self.queue();
        tokio::spawn(async move {
            populate(&fetcher, &queue, &cancel, |progress: &FetchProgress| {
                info!(progress = %progress, "populate progress");
            })
            .await
        })
    }

    /// Stop observers, then stop ticking, destroy the engine and join the
    /// worker.
    pub async fn stop(mut self) {
        self.observers.power.unregister().await;
        self.observers.network.unregister().await;
        self.observers.storage.unregister().await;
        self.host.shutdown().await;
        info!("levin service stopped");
    }
}

/// Fetch missing items and hand every new file to the engine.
///
/// Files the engine rejects are logged; they stay in the watch directory for
/// the engine's own scan.
///
/// # Errors
///
/// Returns [`AppError::Fetch`] when the run fails as a whole.
pub async fn populate<L>(
    fetcher: &Fetcher,
    queue: &CommandQueue,
    cancel: &FetchCancel,
    listener: L,
) -> AppResult<FetchSummary>
where
    L: Fn(&FetchProgress) + Send + Sync,
{
    let summary = fetcher
        .run(cancel, listener)
        .await
        .map_err(|err| AppError::fetch("fetch.run", err))?;
    for file in &summary.files {
        if let Err(err) = queue.add_item(file.clone()).await {
            warn!(path = %file.display(), error = %err, "downloaded item not registered");
        }
    }
    Ok(summary)
}

/// Fetcher configured from the `[fetch]` section and the watch directory.
///
/// # Errors
///
/// Returns [`AppError::Fetch`] when the manifest URL or client settings are
/// unusable.
pub fn build_fetcher(
    config: &LevinConfig,
    events: &EventBus,
    metrics: &Metrics,
) -> AppResult<Fetcher> {
    Fetcher::builder(FetcherConfig {
        manifest_url: config.fetch.manifest_url.clone(),
        watch_dir: config.paths.watch_dir.clone(),
        user_agent: config.fetch.user_agent.clone(),
        timeout: config.fetch.timeout(),
        retry: RetryPolicy {
            max_attempts: config.fetch.max_attempts,
            ..RetryPolicy::default()
        },
    })
    .events(events.clone())
    .metrics(metrics.clone())
    .build()
    .map_err(|err| AppError::fetch("fetch.build", err))
}

async fn create_dir(dir: &Path) -> AppResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| AppError::Io {
            operation: "create_dir",
            path: Some(dir.to_path_buf()),
            source,
        })
}

fn power_sink(
    queue: CommandQueue,
    events: EventBus,
    metrics: Metrics,
) -> impl Fn(PowerState) + Send + 'static {
    move |state| {
        metrics.inc_environment_change("power");
        queue.submit(EngineCommand::UpdateBattery {
            on_ac_power: state.on_ac_power,
        });
        events.publish(Event::PowerChanged {
            on_ac_power: state.on_ac_power,
        });
    }
}

fn network_sink(
    queue: CommandQueue,
    events: EventBus,
    metrics: Metrics,
) -> impl Fn(NetworkState) + Send + 'static {
    move |state| {
        metrics.inc_environment_change("network");
        queue.submit(EngineCommand::UpdateNetwork {
            has_wifi: state.has_wifi,
            has_cellular: state.has_cellular,
        });
        events.publish(Event::NetworkChanged {
            has_wifi: state.has_wifi,
            has_cellular: state.has_cellular,
        });
    }
}

fn storage_sink(
    queue: CommandQueue,
    events: EventBus,
    metrics: Metrics,
) -> impl Fn(StorageState) + Send + 'static {
    move |state| {
        metrics.inc_environment_change("storage");
        queue.submit(EngineCommand::UpdateStorage {
            fs_total: state.fs_total,
            fs_free: state.fs_free,
        });
        events.publish(Event::StorageChanged {
            fs_total: state.fs_total,
            fs_free: state.fs_free,
        });
    }
}
