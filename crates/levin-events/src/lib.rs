//! Core event bus for the Levin daemon.
//!
//! The bus carries typed notifications about environment changes, engine
//! lifecycle transitions, settings application and bulk acquisition progress.
//! Internally it uses `tokio::broadcast` with a bounded buffer plus a small
//! replay ring so late subscribers (a status view opened after startup) can
//! catch up. When the channel overflows the oldest events are dropped.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};

/// Identifier assigned to each event emitted by the daemon.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Lifecycle state reported by the seeding engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Disabled, or no engine running.
    #[default]
    Off,
    /// Enabled but blocked by power or network policy.
    Paused,
    /// Running with nothing to seed.
    Idle,
    /// Seeding only; storage does not allow further downloads.
    Seeding,
    /// Seeding and downloading.
    Downloading,
}

impl EngineState {
    /// Lowercase name used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Paused => "paused",
            Self::Idle => "idle",
            Self::Seeding => "seeding",
            Self::Downloading => "downloading",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Outcome attached to a single bulk acquisition progress notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchStep {
    /// A file with the derived name already exists locally.
    Skipped,
    /// The download for the item is starting.
    Downloading,
    /// The item was downloaded and moved into place.
    Downloaded,
    /// Every attempt for the item failed.
    Failed,
}

/// Typed domain events surfaced across the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    EngineStateChanged {
        from: EngineState,
        to: EngineState,
    },
    PowerChanged {
        on_ac_power: bool,
    },
    NetworkChanged {
        has_wifi: bool,
        has_cellular: bool,
    },
    StorageChanged {
        fs_total: u64,
        fs_free: u64,
    },
    SettingsApplied {
        description: String,
    },
    ItemRegistered {
        path: String,
    },
    FetchProgress {
        current: usize,
        total: usize,
        step: FetchStep,
        message: String,
    },
    FetchCompleted {
        downloaded: usize,
        skipped: usize,
        failed: usize,
    },
    FetchFailed {
        message: String,
    },
    HealthChanged {
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator used for metrics labels and filtering.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EngineStateChanged { .. } => "engine_state_changed",
            Self::PowerChanged { .. } => "power_changed",
            Self::NetworkChanged { .. } => "network_changed",
            Self::StorageChanged { .. } => "storage_changed",
            Self::SettingsApplied { .. } => "settings_applied",
            Self::ItemRegistered { .. } => "item_registered",
            Self::FetchProgress { .. } => "fetch_progress",
            Self::FetchCompleted { .. } => "fetch_completed",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the replay buffer so
    /// dropped events impact both structures consistently. A zero capacity is
    /// raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// Publishing never blocks and succeeds even when nobody is subscribed.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
