use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use levin_engine::{EngineCommand, EngineHost, SimulatedConnector};
use levin_engine_core::{EngineError, EngineState};
use levin_events::{Event, EventBus};
use levin_telemetry::Metrics;
use levin_test_support::{GatewayCall, RecordingConnector, RecordingGateway, TempLayout};

const TICK: Duration = Duration::from_secs(1);

async fn start_recording(
    gateway: &RecordingGateway,
    tick: Duration,
) -> Result<(EngineHost, EventBus, Metrics, TempLayout)> {
    let layout = TempLayout::new()?;
    let events = EventBus::with_capacity(64);
    let metrics = Metrics::new()?;
    let host = EngineHost::start(
        Arc::new(RecordingConnector::new(gateway.clone())),
        layout.engine_config(),
        tick,
        events.clone(),
        metrics.clone(),
    )
    .await?;
    Ok((host, events, metrics, layout))
}

#[tokio::test(start_paused = true)]
async fn ticks_refresh_status_until_shutdown() -> Result<()> {
    let gateway = RecordingGateway::new();
    gateway.set_state(EngineState::Idle);
    let (host, _events, metrics, _layout) = start_recording(&gateway, TICK).await?;
    let status = host.status();
    let queue = host.queue();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(
        status.latest().map(|snapshot| snapshot.state),
        Some(EngineState::Idle)
    );
    assert_eq!(metrics.snapshot().ticks_total, 2);

    host.shutdown().await;
    assert!(status.latest().is_none());
    assert_eq!(gateway.live_handles(), 0);

    let calls = gateway.calls();
    assert_eq!(calls.first(), Some(&GatewayCall::Start));
    assert_eq!(
        calls[calls.len() - 2..].to_vec(),
        vec![GatewayCall::Stop, GatewayCall::Destroy]
    );

    queue.submit(EngineCommand::SetEnabled(true));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.calls(), calls);
    assert!(matches!(
        queue.add_item("/late.torrent".into()).await,
        Err(EngineError::QueueClosed { .. })
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_are_serialised_in_fifo_order() -> Result<()> {
    let gateway = RecordingGateway::new();
    gateway.set_call_delay(Duration::from_micros(50));
    let (host, _events, _metrics, _layout) =
        start_recording(&gateway, Duration::from_millis(5)).await?;

    let mut producers = Vec::new();
    for producer in 0..4u64 {
        let queue = host.queue();
        producers.push(tokio::spawn(async move {
            for sequence in 0..50u64 {
                queue.submit(EngineCommand::UpdateStorage {
                    fs_total: producer,
                    fs_free: sequence,
                });
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await?;
    }
    host.queue()
        .submit_and_await("barrier", |engine| engine.status())
        .await?;
    host.shutdown().await;

    assert_eq!(gateway.overlaps(), 0);
    let calls = gateway.calls();
    for producer in 0..4u64 {
        let sequence = calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::UpdateStorage { fs_total, fs_free } if *fs_total == producer => {
                    Some(*fs_free)
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(sequence, (0..50).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::test]
async fn start_failure_destroys_handle_and_reports_code() -> Result<()> {
    let gateway = RecordingGateway::new();
    let layout = TempLayout::new()?;
    let result = EngineHost::start(
        Arc::new(RecordingConnector::new(gateway.clone()).failing_start(-1)),
        layout.engine_config(),
        TICK,
        EventBus::new(),
        Metrics::new()?,
    )
    .await;

    assert!(matches!(result, Err(EngineError::StartFailed { code: -1 })));
    assert_eq!(gateway.calls(), vec![GatewayCall::Start, GatewayCall::Destroy]);
    assert_eq!(gateway.live_handles(), 0);
    Ok(())
}

#[tokio::test]
async fn null_handle_is_a_startup_failure() -> Result<()> {
    let layout = TempLayout::new()?;
    let result = EngineHost::start(
        Arc::new(RecordingConnector::default().failing_create()),
        layout.engine_config(),
        TICK,
        EventBus::new(),
        Metrics::new()?,
    )
    .await;
    assert!(matches!(result, Err(EngineError::CreateFailed { .. })));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn simulated_engine_runs_end_to_end() -> Result<()> {
    let layout = TempLayout::new()?;
    let events = EventBus::with_capacity(64);
    let mut stream = events.subscribe(None);
    let host = EngineHost::start(
        Arc::new(SimulatedConnector),
        layout.engine_config(),
        TICK,
        events.clone(),
        Metrics::new()?,
    )
    .await?;
    let queue = host.queue();

    queue.submit(EngineCommand::UpdateBattery { on_ac_power: true });
    queue.submit(EngineCommand::UpdateNetwork {
        has_wifi: true,
        has_cellular: false,
    });
    queue.submit(EngineCommand::SetEnabled(true));
    let item = layout.write_item("a.torrent", b"d4:infod4:name1:aee")?;
    queue.add_item(item).await?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let snapshot = host.status().latest().expect("status after tick");
    assert_eq!(snapshot.item_count, 1);
    assert_eq!(snapshot.state, EngineState::Seeding);

    let items = queue
        .submit_and_await("items", |engine| engine.items())
        .await?;
    assert_eq!(items.len(), 1);

    host.shutdown().await;

    let mut saw_seeding = false;
    let mut saw_off = false;
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_millis(10), stream.next()).await
    {
        if let Event::EngineStateChanged { to, .. } = envelope.event {
            saw_seeding |= to == EngineState::Seeding;
            saw_off |= to == EngineState::Off;
        }
    }
    assert!(saw_seeding && saw_off);
    Ok(())
}
