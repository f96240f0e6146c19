use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use httpmock::MockServer;
use httpmock::prelude::*;
use levin_events::{Event, EventBus};
use levin_fetch::{
    FetchCancel, FetchError, FetchProgress, FetchStep, Fetcher, FetcherConfig, RetryPolicy,
    Sleeper,
};
use levin_telemetry::Metrics;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().expect("delay lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().expect("delay lock").push(delay);
    }
}

fn fetcher(server: &MockServer, watch_dir: &Path, sleeper: &RecordingSleeper) -> Result<Fetcher> {
    Ok(Fetcher::builder(FetcherConfig {
        manifest_url: server.url("/manifest"),
        watch_dir: watch_dir.to_path_buf(),
        user_agent: "levin/test".to_string(),
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::default(),
    })
    .sleeper(Arc::new(sleeper.clone()))
    .build()?)
}

fn collect() -> (
    Arc<Mutex<Vec<FetchProgress>>>,
    impl Fn(&FetchProgress) + Send + Sync,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |progress: &FetchProgress| {
        sink.lock().expect("progress lock").push(progress.clone());
    })
}

#[tokio::test]
async fn downloads_missing_items_and_skips_existing() -> Result<()> {
    let server = MockServer::start_async().await;
    let manifest = format!(
        "{}\n{}\n\n{}\n",
        server.url("/a.torrent"),
        server.url("/b.torrent"),
        server.url("/c.torrent")
    );
    let manifest_mock = server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(200).body(manifest.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/a.torrent");
        then.status(200).body("payload-a");
    });
    server.mock(|when, then| {
        when.method(GET).path("/c.torrent");
        then.status(200).body("payload-c");
    });

    let watch = tempfile::tempdir()?;
    std::fs::write(watch.path().join("b.torrent"), "local-b")?;
    let events = EventBus::with_capacity(32);
    let metrics = Metrics::new()?;
    let sleeper = RecordingSleeper::default();
    let fetcher = Fetcher::builder(FetcherConfig {
        manifest_url: server.url("/manifest"),
        watch_dir: watch.path().to_path_buf(),
        user_agent: "levin/test".to_string(),
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::default(),
    })
    .sleeper(Arc::new(sleeper.clone()))
    .events(events.clone())
    .metrics(metrics.clone())
    .build()?;

    let (progress, listener) = collect();
    let summary = fetcher.run(&FetchCancel::new(), listener).await?;
    manifest_mock.assert();

    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        summary.files,
        vec![watch.path().join("a.torrent"), watch.path().join("c.torrent")]
    );
    assert_eq!(std::fs::read_to_string(watch.path().join("a.torrent"))?, "payload-a");
    assert_eq!(std::fs::read_to_string(watch.path().join("b.torrent"))?, "local-b");
    assert!(!watch.path().join("a.torrent.part").exists());
    assert!(sleeper.delays().is_empty());

    let messages = progress
        .lock()
        .expect("progress lock")
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    assert_eq!(
        messages,
        vec![
            "[1/3] downloading: a.torrent",
            "[1/3] downloaded: a.torrent",
            "[2/3] skipped (exists): b.torrent",
            "[3/3] downloading: c.torrent",
            "[3/3] downloaded: c.torrent",
        ]
    );

    let mut stream = events.subscribe(Some(0));
    let mut completed = None;
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_millis(20), stream.next()).await
    {
        if let Event::FetchCompleted {
            downloaded,
            skipped,
            failed,
        } = envelope.event
        {
            completed = Some((downloaded, skipped, failed));
        }
    }
    assert_eq!(completed, Some((2, 1, 0)));
    Ok(())
}

#[tokio::test]
async fn failing_item_leaves_no_file_and_is_retried_on_rerun() -> Result<()> {
    let server = MockServer::start_async().await;
    let manifest = format!("{}\n{}\n", server.url("/ok.torrent"), server.url("/bad.torrent"));
    server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(200).body(manifest.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/ok.torrent");
        then.status(200).body("ok");
    });
    let mut bad = server.mock(|when, then| {
        when.method(GET).path("/bad.torrent");
        then.status(503);
    });

    let watch = tempfile::tempdir()?;
    let sleeper = RecordingSleeper::default();
    let fetcher = fetcher(&server, watch.path(), &sleeper)?;

    let (progress, listener) = collect();
    let summary = fetcher.run(&FetchCancel::new(), listener).await?;
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!watch.path().join("bad.torrent").exists());
    assert!(!watch.path().join("bad.torrent.part").exists());
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(
        progress
            .lock()
            .expect("progress lock")
            .last()
            .map(|p| (p.step, p.name.clone())),
        Some((FetchStep::Failed, "bad.torrent".to_string()))
    );

    bad.delete();
    server.mock(|when, then| {
        when.method(GET).path("/bad.torrent");
        then.status(200).body("fixed");
    });
    let summary = fetcher.run(&FetchCancel::new(), |_: &FetchProgress| {}).await?;
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(std::fs::read_to_string(watch.path().join("bad.torrent"))?, "fixed");
    Ok(())
}

/// Serve every request with a 200 whose body stops well short of its
/// declared length, then close the connection.
async fn truncating_server() -> Result<(String, Arc<AtomicUsize>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buf[..read]),
                }
            }
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\npartial-bytes",
                )
                .await;
            let _ = socket.shutdown().await;
        }
    });
    Ok((format!("http://{addr}/x.torrent"), hits))
}

#[tokio::test]
async fn truncated_downloads_never_leave_partial_bytes() -> Result<()> {
    let (item_url, hits) = truncating_server().await?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(200).body(format!("{item_url}\n"));
    });

    let watch = tempfile::tempdir()?;
    let sleeper = RecordingSleeper::default();
    let fetcher = fetcher(&server, watch.path(), &sleeper)?;
    let summary = fetcher.run(&FetchCancel::new(), |_: &FetchProgress| {}).await?;

    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.failed, 1);
    assert!(summary.files.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert!(!watch.path().join("x.torrent").exists());
    assert!(!watch.path().join("x.torrent.part").exists());
    assert_eq!(std::fs::read_dir(watch.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn manifest_failures_fail_the_run() -> Result<()> {
    let server = MockServer::start_async().await;
    let mut manifest = server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(500);
    });
    let watch = tempfile::tempdir()?;
    let sleeper = RecordingSleeper::default();
    let fetcher = fetcher(&server, watch.path(), &sleeper)?;

    let result = fetcher.run(&FetchCancel::new(), |_: &FetchProgress| {}).await;
    assert!(matches!(
        result,
        Err(FetchError::ManifestUnavailable { attempts: 3, .. })
    ));
    assert_eq!(sleeper.delays().len(), 2);

    manifest.delete();
    server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(200).body("\n\n");
    });
    let result = fetcher.run(&FetchCancel::new(), |_: &FetchProgress| {}).await;
    assert!(matches!(result, Err(FetchError::EmptyManifest)));
    assert!(!fetcher.is_running());
    Ok(())
}

#[tokio::test]
async fn concurrent_runs_are_rejected() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(200)
            .body("http://127.0.0.1:9/unused.torrent\n")
            .delay(Duration::from_millis(300));
    });
    let watch = tempfile::tempdir()?;
    std::fs::write(watch.path().join("unused.torrent"), "present")?;
    let sleeper = RecordingSleeper::default();
    let fetcher = fetcher(&server, watch.path(), &sleeper)?;

    let first = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move { fetcher.run(&FetchCancel::new(), |_: &FetchProgress| {}).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fetcher.is_running());
    let second = fetcher.run(&FetchCancel::new(), |_: &FetchProgress| {}).await;
    assert!(matches!(second, Err(FetchError::AlreadyRunning)));

    let summary = first.await??;
    assert_eq!(summary.skipped, 1);
    assert!(!fetcher.is_running());
    Ok(())
}

#[tokio::test]
async fn cancellation_keeps_finished_items() -> Result<()> {
    let server = MockServer::start_async().await;
    let manifest = format!("{}\n{}\n", server.url("/one.torrent"), server.url("/two.torrent"));
    server.mock(|when, then| {
        when.method(GET).path("/manifest");
        then.status(200).body(manifest.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/one.torrent");
        then.status(200).body("one");
    });
    server.mock(|when, then| {
        when.method(GET).path("/two.torrent");
        then.status(200).body("two");
    });

    let watch = tempfile::tempdir()?;
    let sleeper = RecordingSleeper::default();
    let fetcher = fetcher(&server, watch.path(), &sleeper)?;
    let cancel = FetchCancel::new();
    let trip = cancel.clone();
    let summary = fetcher
        .run(&cancel, move |progress: &FetchProgress| {
            if progress.step == FetchStep::Downloaded {
                trip.cancel();
            }
        })
        .await?;

    assert!(summary.cancelled);
    assert_eq!(summary.downloaded, 1);
    assert!(watch.path().join("one.torrent").exists());
    assert!(!watch.path().join("two.torrent").exists());
    Ok(())
}
