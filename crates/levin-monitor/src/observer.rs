//! Observer lifecycle shared by every environment signal.
//!
//! # Design
//! - A registered observer owns a background task that reads its source on
//!   a fixed period and whenever its [`ObserverTrigger`] fires.
//! - Registration reads the source on the caller's task and delivers the
//!   current state before returning; each registration starts with a fresh
//!   [`ChangeGate`].
//! - Read failures are logged and count as "no change".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::MonitorResult;
use crate::gate::ChangeGate;

/// A readable environment signal.
pub trait SignalSource: Send + 'static {
    /// Derived value compared between reads.
    type Signal: Clone + PartialEq + fmt::Debug + Send + 'static;

    /// Short name used in logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Read the current value.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying platform state cannot be read.
    fn read(&mut self) -> MonitorResult<Self::Signal>;
}

/// Handle used by push sources to request an immediate re-read.
#[derive(Clone, Debug, Default)]
pub struct ObserverTrigger {
    notify: Arc<Notify>,
}

impl ObserverTrigger {
    /// Request a re-read. Multiple requests before the read coalesce.
    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

struct Running<S> {
    stop: oneshot::Sender<()>,
    task: JoinHandle<S>,
}

/// Register/unregister wrapper around a [`SignalSource`].
pub struct Observer<S: SignalSource> {
    name: &'static str,
    source: Option<S>,
    running: Option<Running<S>>,
    period: Duration,
    trigger: ObserverTrigger,
}

impl<S: SignalSource> fmt::Debug for Observer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("name", &self.name)
            .field("registered", &self.running.is_some())
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl<S: SignalSource> Observer<S> {
    /// Wrap `source`, polling it every `period` once registered.
    #[must_use]
    pub fn new(source: S, period: Duration) -> Self {
        Self {
            name: source.name(),
            source: Some(source),
            running: None,
            period,
            trigger: ObserverTrigger::default(),
        }
    }

    /// Signal name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a listening task is active.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.running.is_some()
    }

    /// Handle that forces an immediate re-read while registered.
    #[must_use]
    pub fn trigger(&self) -> ObserverTrigger {
        self.trigger.clone()
    }

    /// Start listening, delivering changed values to `sink`.
    ///
    /// The current value is read and delivered before this returns.
    /// Registering an observer that is already registered does nothing.
    pub fn register<F>(&mut self, sink: F)
    where
        F: Fn(S::Signal) + Send + 'static,
    {
        if self.running.is_some() {
            debug!(signal = self.name, "observer already registered");
            return;
        }
        let Some(mut source) = self.source.take() else {
            warn!(signal = self.name, "observer source lost; not registering");
            return;
        };
        let mut gate = ChangeGate::new();
        poll(&mut source, &mut gate, &sink);

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            source,
            gate,
            self.period,
            self.trigger.clone(),
            sink,
            stop_rx,
        ));
        self.running = Some(Running { stop, task });
        info!(signal = self.name, "observer registered");
    }

    /// Stop listening. Safe to call when not registered.
    pub async fn unregister(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop.send(());
        match running.task.await {
            Ok(source) => self.source = Some(source),
            Err(err) => warn!(signal = self.name, error = %err, "observer task ended abnormally"),
        }
        info!(signal = self.name, "observer unregistered");
    }
}

async fn run<S, F>(
    mut source: S,
    mut gate: ChangeGate<S::Signal>,
    period: Duration,
    trigger: ObserverTrigger,
    sink: F,
    mut stop: oneshot::Receiver<()>,
) -> S
where
    S: SignalSource,
    F: Fn(S::Signal),
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {}
            () = trigger.notify.notified() => {}
        }
        poll(&mut source, &mut gate, &sink);
    }
    source
}

fn poll<S, F>(source: &mut S, gate: &mut ChangeGate<S::Signal>, sink: &F)
where
    S: SignalSource,
    F: Fn(S::Signal),
{
    match source.read() {
        Ok(value) => {
            if gate.offer(&value) {
                debug!(signal = source.name(), value = ?value, "environment signal changed");
                sink(value);
            }
        }
        Err(err) => {
            warn!(signal = source.name(), error = %err, "environment signal read failed");
        }
    }
}
