//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the daemon actually drives: worker ticks,
//!   command outcomes, environment changes and bulk acquisition outcomes.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    ticks_total: IntCounter,
    commands_failed_total: IntCounter,
    commands_dropped_total: IntCounter,
    environment_changes_total: IntCounterVec,
    fetch_items_total: IntCounterVec,
    engine_peers: IntGauge,
    queue_depth: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Engine ticks executed by the worker.
    pub ticks_total: u64,
    /// Worker commands that returned an error or panicked.
    pub commands_failed_total: u64,
    /// Commands submitted after shutdown began.
    pub commands_dropped_total: u64,
    /// Peer count reported by the most recent status snapshot.
    pub engine_peers: i64,
    /// Commands waiting for the worker.
    pub queue_depth: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let ticks_total =
            IntCounter::with_opts(Opts::new("ticks_total", "Engine ticks executed"))?;
        let commands_failed_total = IntCounter::with_opts(Opts::new(
            "commands_failed_total",
            "Worker commands that failed or panicked",
        ))?;
        let commands_dropped_total = IntCounter::with_opts(Opts::new(
            "commands_dropped_total",
            "Commands discarded because the worker was shutting down",
        ))?;
        let environment_changes_total = IntCounterVec::new(
            Opts::new(
                "environment_changes_total",
                "Environment changes forwarded to the engine by signal",
            ),
            &["signal"],
        )?;
        let fetch_items_total = IntCounterVec::new(
            Opts::new(
                "fetch_items_total",
                "Bulk acquisition items processed by outcome",
            ),
            &["outcome"],
        )?;
        let engine_peers =
            IntGauge::with_opts(Opts::new("engine_peers", "Peers connected to the engine"))?;
        let queue_depth =
            IntGauge::with_opts(Opts::new("queue_depth", "Commands waiting for the worker"))?;

        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(commands_failed_total.clone()))?;
        registry.register(Box::new(commands_dropped_total.clone()))?;
        registry.register(Box::new(environment_changes_total.clone()))?;
        registry.register(Box::new(fetch_items_total.clone()))?;
        registry.register(Box::new(engine_peers.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                ticks_total,
                commands_failed_total,
                commands_dropped_total,
                environment_changes_total,
                fetch_items_total,
                engine_peers,
                queue_depth,
            }),
        })
    }

    /// Increment the executed tick counter.
    pub fn inc_tick(&self) {
        self.inner.ticks_total.inc();
    }

    /// Increment the failed command counter.
    pub fn inc_command_failure(&self) {
        self.inner.commands_failed_total.inc();
    }

    /// Increment the dropped command counter.
    pub fn inc_command_dropped(&self) {
        self.inner.commands_dropped_total.inc();
    }

    /// Count an environment change for the given signal (`power`, `network`, `storage`).
    pub fn inc_environment_change(&self, signal: &str) {
        self.inner
            .environment_changes_total
            .with_label_values(&[signal])
            .inc();
    }

    /// Count a processed bulk acquisition item by outcome.
    pub fn inc_fetch_item(&self, outcome: &str) {
        self.inner
            .fetch_items_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record the peer count from the latest status snapshot.
    pub fn set_engine_peers(&self, peers: i64) {
        self.inner.engine_peers.set(peers);
    }

    /// Adjust the queue depth gauge.
    pub fn add_queue_depth(&self, delta: i64) {
        self.inner.queue_depth.add(delta);
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_total: self.inner.ticks_total.get(),
            commands_failed_total: self.inner.commands_failed_total.get(),
            commands_dropped_total: self.inner.commands_dropped_total.get(),
            engine_peers: self.inner.engine_peers.get(),
            queue_depth: self.inner.queue_depth.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_tick();
        metrics.inc_tick();
        metrics.inc_command_failure();
        metrics.inc_command_dropped();
        metrics.inc_environment_change("power");
        metrics.inc_fetch_item("downloaded");
        metrics.set_engine_peers(7);
        metrics.add_queue_depth(3);
        metrics.add_queue_depth(-1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks_total, 2);
        assert_eq!(snapshot.commands_failed_total, 1);
        assert_eq!(snapshot.commands_dropped_total, 1);
        assert_eq!(snapshot.engine_peers, 7);
        assert_eq!(snapshot.queue_depth, 2);

        let rendered = metrics.render()?;
        assert!(rendered.contains("ticks_total"));
        assert!(rendered.contains("environment_changes_total"));
        assert!(rendered.contains("fetch_items_total"));
        Ok(())
    }

    #[test]
    fn registries_are_independent_per_instance() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_tick();
        assert_eq!(second.snapshot().ticks_total, 0);
        Ok(())
    }
}
