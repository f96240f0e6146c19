use std::path::{Path, PathBuf};

use levin_config::{LevinConfig, SettingsHandle};
use levin_events::EventBus;
use levin_fetch::{FetchCancel, FetchProgress, FetchSummary};
use levin_telemetry::{LogFormat, LoggingConfig, Metrics};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::service::{LevinService, ServiceDeps, build_fetcher};

const BUILD_ID: &str = match option_env!("LEVIN_BUILD_ID") {
    Some(id) => id,
    None => env!("CARGO_PKG_VERSION"),
};

/// Options accepted by [`run_daemon`].
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Settings file; the per-user default when absent.
    pub config_path: Option<PathBuf>,
    /// Fetch the manifest in the background once the engine is running.
    pub populate: bool,
}

/// Run the daemon until SIGINT or SIGTERM.
///
/// SIGHUP reloads the settings file and re-reads the environment; SIGUSR1
/// logs the engine status and item list.
///
/// # Errors
///
/// Returns an error when settings cannot be loaded, logging cannot be
/// installed, the engine cannot be started, or signal handlers cannot be
/// registered.
pub async fn run_daemon(options: DaemonOptions) -> AppResult<()> {
    let settings = SettingsHandle::load(options.config_path.as_deref())
        .map_err(|err| AppError::config("settings.load", err))?;
    let config = settings.current();
    levin_telemetry::init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_config(config.logging.format.as_deref()),
        build_id: BUILD_ID,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!(build = BUILD_ID, "levin daemon starting");

    let metrics =
        Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let deps = ServiceDeps::system(&config, EventBus::new(), metrics);
    let service = LevinService::start(settings, deps).await?;

    let cancel = FetchCancel::new();
    let populate = options
        .populate
        .then(|| service.spawn_populate(cancel.clone()));

    let result = serve_signals(&service).await;

    cancel.cancel();
    if let Some(task) = populate {
        match task.await {
            Ok(Ok(summary)) => info!(
                downloaded = summary.downloaded,
                skipped = summary.skipped,
                failed = summary.failed,
                cancelled = summary.cancelled,
                "populate finished"
            ),
            Ok(Err(err)) => warn!(error = ?err, "populate failed"),
            Err(err) => warn!(error = %err, "populate task join failed"),
        }
    }
    service.stop().await;
    result
}

async fn serve_signals(service: &LevinService) -> AppResult<()> {
    let mut interrupt = listen(SignalKind::interrupt())?;
    let mut terminate = listen(SignalKind::terminate())?;
    let mut hangup = listen(SignalKind::hangup())?;
    let mut dump = listen(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => {
                info!("interrupt received; shutting down");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("terminate received; shutting down");
                return Ok(());
            }
            _ = hangup.recv() => reload(service).await,
            _ = dump.recv() => log_status(service).await,
        }
    }
}

fn listen(kind: SignalKind) -> AppResult<tokio::signal::unix::Signal> {
    signal(kind).map_err(|source| AppError::Io {
        operation: "signal.register",
        path: None,
        source,
    })
}

async fn reload(service: &LevinService) {
    match service.reload_settings().await {
        Ok(true) => info!("settings reloaded"),
        Ok(false) => debug!("settings unchanged"),
        Err(err) => warn!(error = ?err, "settings reload failed; keeping active settings"),
    }
    service.refresh_environment();
}

async fn log_status(service: &LevinService) {
    match service.status() {
        Some(status) => info!(
            state = ?status.state,
            items = status.item_count,
            peers = status.peer_count,
            download_rate = status.download_rate,
            upload_rate = status.upload_rate,
            disk_usage = status.disk_usage,
            disk_budget = status.disk_budget,
            over_budget = status.over_budget,
            "engine status"
        ),
        None => info!("engine status not yet available"),
    }
    match service.items().await {
        Ok(items) => {
            for item in items {
                info!(
                    id = %item.id,
                    name = %item.name,
                    progress = item.progress,
                    peers = item.peers,
                    seed = item.is_seed,
                    "engine item"
                );
            }
        }
        Err(err) => warn!(error = ?err, "item listing failed"),
    }
}

/// Fetch the manifest into the watch directory without starting the engine.
///
/// SIGINT cancels the run after the current file; files already written are
/// kept.
///
/// # Errors
///
/// Returns an error when settings cannot be loaded or the run fails as a
/// whole.
pub async fn run_populate<L>(config_path: Option<&Path>, listener: L) -> AppResult<FetchSummary>
where
    L: Fn(&FetchProgress) + Send + Sync,
{
    let config = load_config(config_path)?;
    let metrics =
        Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let fetcher = build_fetcher(&config, &EventBus::new(), &metrics)?;

    let cancel = FetchCancel::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = fetcher.run(&cancel, listener).await;
    interrupt.abort();
    result.map_err(|err| AppError::fetch("fetch.run", err))
}

/// Effective settings rendered as TOML.
///
/// # Errors
///
/// Returns an error when the settings file cannot be loaded or rendered.
pub fn render_config(config_path: Option<&Path>) -> AppResult<String> {
    let config = load_config(config_path)?;
    levin_config::to_toml(&config).map_err(|err| AppError::config("settings.render", err))
}

fn load_config(config_path: Option<&Path>) -> AppResult<LevinConfig> {
    levin_config::load(config_path).map_err(|err| AppError::config("settings.load", err))
}
