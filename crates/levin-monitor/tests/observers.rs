use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use levin_monitor::{
    NETWORK_POLL_INTERVAL, NetworkState, Observer, POWER_POLL_INTERVAL, PowerState, SysfsNetwork,
    SysfsPower,
};

fn write_attr(dir: &Path, name: &str, value: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(name), format!("{value}\n"))?;
    Ok(())
}

fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value| sink.lock().expect("recorder lock").push(value))
}

#[tokio::test(start_paused = true)]
async fn power_observer_reports_unplug_once() -> Result<()> {
    let root = tempfile::tempdir()?;
    let mains = root.path().join("AC");
    write_attr(&mains, "type", "Mains")?;
    write_attr(&mains, "online", "1")?;

    let mut observer = Observer::new(SysfsPower::new(root.path()), POWER_POLL_INTERVAL);
    let (seen, sink) = recorder();
    observer.register(sink);
    tokio::time::sleep(Duration::from_millis(1)).await;

    write_attr(&mains, "online", "0")?;
    tokio::time::sleep(POWER_POLL_INTERVAL * 3).await;
    observer.unregister().await;

    assert_eq!(
        *seen.lock().expect("recorder lock"),
        vec![
            PowerState { on_ac_power: true },
            PowerState { on_ac_power: false }
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn network_observer_stops_after_unregister() -> Result<()> {
    let root = tempfile::tempdir()?;
    let wlan = root.path().join("wlan0");
    write_attr(&wlan, "operstate", "up")?;
    fs::create_dir_all(wlan.join("wireless"))?;

    let mut observer = Observer::new(SysfsNetwork::new(root.path()), NETWORK_POLL_INTERVAL);
    let (seen, sink) = recorder();
    observer.register(sink);
    tokio::time::sleep(Duration::from_millis(1)).await;
    observer.unregister().await;

    write_attr(&wlan, "operstate", "down")?;
    tokio::time::sleep(NETWORK_POLL_INTERVAL * 3).await;

    assert_eq!(
        *seen.lock().expect("recorder lock"),
        vec![NetworkState {
            has_wifi: true,
            has_cellular: false
        }]
    );
    Ok(())
}
