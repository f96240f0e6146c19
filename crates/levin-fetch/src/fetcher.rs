//! Manifest-driven bulk acquisition.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use levin_events::{Event, EventBus};
use levin_telemetry::Metrics;
use reqwest::Client;
use reqwest::redirect::Policy;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::cancel::FetchCancel;
use crate::error::{FetchError, FetchResult};
use crate::manifest::{file_name_for, parse_manifest};
use crate::progress::{FetchProgress, FetchStep, FetchSummary};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, with_retry};

const MAX_REDIRECTS: usize = 10;

/// Parameters for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Endpoint returning the newline-delimited manifest.
    pub manifest_url: String,
    /// Directory receiving downloaded files.
    pub watch_dir: PathBuf,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Connect and read timeout.
    pub timeout: Duration,
    /// Attempt cap and backoff for every request.
    pub retry: RetryPolicy,
}

/// Builder for [`Fetcher`].
pub struct FetcherBuilder {
    config: FetcherConfig,
    sleeper: Arc<dyn Sleeper>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl FetcherBuilder {
    /// Replace the backoff clock.
    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Publish progress and outcomes on `events`.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Count item outcomes in `metrics`.
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] for a malformed manifest URL and
    /// [`FetchError::Client`] when the HTTP client cannot be constructed.
    pub fn build(self) -> FetchResult<Fetcher> {
        let manifest_url =
            Url::parse(&self.config.manifest_url).map_err(|source| FetchError::InvalidUrl {
                url: self.config.manifest_url.clone(),
                source,
            })?;
        let client = Client::builder()
            .user_agent(self.config.user_agent.clone())
            .connect_timeout(self.config.timeout)
            .read_timeout(self.config.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|source| FetchError::Client { source })?;

        Ok(Fetcher {
            inner: Arc::new(Inner {
                client,
                manifest_url,
                watch_dir: self.config.watch_dir,
                retry: self.config.retry,
                sleeper: self.sleeper,
                running: AtomicBool::new(false),
                events: self.events,
                metrics: self.metrics,
            }),
        })
    }
}

/// Downloads manifest items into the watch directory.
///
/// Cloning is cheap; clones share the run guard, so at most one run is
/// active across all of them.
#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    manifest_url: Url,
    watch_dir: PathBuf,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    running: AtomicBool,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("manifest_url", &self.inner.manifest_url.as_str())
            .field("watch_dir", &self.inner.watch_dir)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Start building a fetcher.
    #[must_use]
    pub fn builder(config: FetcherConfig) -> FetcherBuilder {
        FetcherBuilder {
            config,
            sleeper: Arc::new(TokioSleeper),
            events: None,
            metrics: None,
        }
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Directory receiving downloaded files.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.inner.watch_dir
    }

    /// Fetch the manifest and download every missing item.
    ///
    /// `listener` receives one notification per processed item. Per-item
    /// failures do not abort the run; they are counted in the summary.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::AlreadyRunning`] when another run is active,
    /// [`FetchError::ManifestUnavailable`] or [`FetchError::EmptyManifest`]
    /// when there is nothing to do, [`FetchError::Cancelled`] when cancelled
    /// before the manifest arrived, and [`FetchError::Io`] when the watch
    /// directory cannot be created.
    pub async fn run<L>(&self, cancel: &FetchCancel, listener: L) -> FetchResult<FetchSummary>
    where
        L: Fn(&FetchProgress) + Send + Sync,
    {
        let _guard = RunGuard::acquire(&self.inner.running)?;
        info!(manifest = %self.inner.manifest_url, "fetch run started");

        let result = self.execute(cancel, &listener).await;
        match &result {
            Ok(summary) => {
                info!(
                    downloaded = summary.downloaded,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    cancelled = summary.cancelled,
                    "fetch run finished"
                );
                self.publish(Event::FetchCompleted {
                    downloaded: summary.downloaded,
                    skipped: summary.skipped,
                    failed: summary.failed,
                });
            }
            Err(err) => {
                warn!(error = %err, "fetch run failed");
                self.publish(Event::FetchFailed {
                    message: err.to_string(),
                });
            }
        }
        result
    }

    async fn execute(
        &self,
        cancel: &FetchCancel,
        listener: &(dyn Fn(&FetchProgress) + Send + Sync),
    ) -> FetchResult<FetchSummary> {
        let watch_dir = &self.inner.watch_dir;
        fs::create_dir_all(watch_dir)
            .await
            .map_err(|source| FetchError::Io {
                operation: "create_watch_dir",
                path: watch_dir.clone(),
                source,
            })?;

        let items = parse_manifest(&self.fetch_manifest(cancel).await?);
        if items.is_empty() {
            return Err(FetchError::EmptyManifest);
        }
        let total = items.len();
        debug!(total, "manifest fetched");

        let mut summary = FetchSummary::default();
        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let Some(name) = file_name_for(item) else {
                debug!(url = %item, "manifest entry has no usable file name");
                continue;
            };
            let current = index + 1;
            let report = |step| {
                self.report(
                    listener,
                    FetchProgress {
                        current,
                        total,
                        step,
                        name: name.clone(),
                    },
                );
            };

            let dest = watch_dir.join(&name);
            if fs::try_exists(&dest).await.unwrap_or(false) {
                summary.skipped += 1;
                report(FetchStep::Skipped);
                continue;
            }

            report(FetchStep::Downloading);
            match self.download(item, &name, &dest, cancel).await {
                Ok(()) => {
                    summary.downloaded += 1;
                    summary.files.push(dest);
                    report(FetchStep::Downloaded);
                }
                Err(FetchError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(err) => {
                    warn!(item = %name, error = %err, "item download failed");
                    summary.failed += 1;
                    report(FetchStep::Failed);
                }
            }
        }
        Ok(summary)
    }

    async fn fetch_manifest(&self, cancel: &FetchCancel) -> FetchResult<String> {
        let url = self.inner.manifest_url.as_str();
        with_retry(
            self.inner.retry,
            self.inner.sleeper.as_ref(),
            cancel,
            "manifest",
            |_| self.get_text(url),
        )
        .await
        .map_err(|err| match err {
            FetchError::Cancelled => FetchError::Cancelled,
            other => FetchError::ManifestUnavailable {
                attempts: self.inner.retry.max_attempts,
                source: Box::new(other),
            },
        })
    }

    async fn get_text(&self, url: &str) -> FetchResult<String> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })
    }

    async fn get(&self, url: &str) -> FetchResult<reqwest::Response> {
        let response = self
            .inner
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn download(
        &self,
        url: &str,
        name: &str,
        dest: &Path,
        cancel: &FetchCancel,
    ) -> FetchResult<()> {
        let partial = dest.with_file_name(format!("{name}.part"));
        with_retry(
            self.inner.retry,
            self.inner.sleeper.as_ref(),
            cancel,
            name,
            |_| self.download_once(url, &partial, dest, cancel),
        )
        .await
    }

    async fn download_once(
        &self,
        url: &str,
        partial: &Path,
        dest: &Path,
        cancel: &FetchCancel,
    ) -> FetchResult<()> {
        remove_partial(partial).await?;
        if let Err(err) = self.stream_to(url, partial, cancel).await {
            if let Err(cleanup) = remove_partial(partial).await {
                warn!(path = %partial.display(), error = %cleanup, "partial download cleanup failed");
            }
            return Err(err);
        }
        fs::rename(partial, dest)
            .await
            .map_err(|source| FetchError::Io {
                operation: "rename_download",
                path: dest.to_path_buf(),
                source,
            })
    }

    async fn stream_to(&self, url: &str, partial: &Path, cancel: &FetchCancel) -> FetchResult<()> {
        let mut response = self.get(url).await?;
        let io_error = |operation, source| FetchError::Io {
            operation,
            path: partial.to_path_buf(),
            source,
        };
        let mut file = File::create(partial)
            .await
            .map_err(|source| io_error("create_partial", source))?;
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = response.chunk() => chunk.map_err(|source| FetchError::Transport {
                    url: url.to_string(),
                    source,
                })?,
            };
            let Some(bytes) = chunk else {
                break;
            };
            file.write_all(&bytes)
                .await
                .map_err(|source| io_error("write_partial", source))?;
        }
        file.sync_all()
            .await
            .map_err(|source| io_error("sync_partial", source))
    }

    fn report(&self, listener: &(dyn Fn(&FetchProgress) + Send + Sync), progress: FetchProgress) {
        let message = progress.message();
        debug!(current = progress.current, total = progress.total, %message, "fetch progress");
        if let Some(metrics) = &self.inner.metrics {
            match progress.step {
                FetchStep::Skipped => metrics.inc_fetch_item("skipped"),
                FetchStep::Downloaded => metrics.inc_fetch_item("downloaded"),
                FetchStep::Failed => metrics.inc_fetch_item("failed"),
                FetchStep::Downloading => {}
            }
        }
        listener(&progress);
        self.publish(Event::FetchProgress {
            current: progress.current,
            total: progress.total,
            step: progress.step,
            message,
        });
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.inner.events {
            let _ = events.publish(event);
        }
    }
}

async fn remove_partial(path: &Path) -> FetchResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FetchError::Io {
            operation: "remove_partial",
            path: path.to_path_buf(),
            source,
        }),
    }
}

struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> FetchResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FetchError::AlreadyRunning)?;
        Ok(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_guard_rejects_reentry_until_dropped() {
        let flag = AtomicBool::new(false);
        let guard = RunGuard::acquire(&flag).expect("first acquire");
        assert!(matches!(
            RunGuard::acquire(&flag),
            Err(FetchError::AlreadyRunning)
        ));
        drop(guard);
        assert!(RunGuard::acquire(&flag).is_ok());
    }

    #[tokio::test]
    async fn invalid_manifest_url_is_rejected_at_build() {
        let result = Fetcher::builder(FetcherConfig {
            manifest_url: "not a url".to_string(),
            watch_dir: PathBuf::from("/tmp/levin-watch"),
            user_agent: "levin/test".to_string(),
            timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        })
        .build();
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }
}
