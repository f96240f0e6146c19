#![forbid(unsafe_code)]
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

//! Environment observers feeding power, network and storage changes to the
//! engine host.
//!
//! Layout: `gate.rs` (change deduplication), `observer.rs` (register/unregister
//! lifecycle and polling loop), `power.rs`, `network.rs`, `storage.rs`
//! (Linux signal sources), `error.rs` (shared error type).

pub mod error;
pub mod gate;
pub mod network;
pub mod observer;
pub mod power;
pub mod storage;

pub use error::{MonitorError, MonitorResult};
pub use gate::ChangeGate;
pub use network::{NETWORK_POLL_INTERVAL, NetworkState, SysfsNetwork};
pub use observer::{Observer, ObserverTrigger, SignalSource};
pub use power::{POWER_POLL_INTERVAL, PowerState, SysfsPower};
pub use storage::{DiskStorage, STORAGE_POLL_INTERVAL, StorageState};
