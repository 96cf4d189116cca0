//! Integration tests for the worker pool.
//!
//! These tests verify batch behavior (completion barrier, bounded
//! concurrency, failure isolation, rerun idempotence) through the public API.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bulkfetch_core::download::NoProgress;
use bulkfetch_core::{
    DownloadEngine, DownloadStats, DownloadWorker, Extractor, ResumeScanner, TaskStatus,
    TransferClient, TransferSession,
};
use support::socket_guard::start_mock_server_or_skip;
use support::{Workspace, gzip_bytes};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

fn engine(ws: &Workspace, concurrency: usize) -> DownloadEngine {
    let session = TransferSession {
        request_delay: Duration::ZERO,
        ..TransferSession::default()
    };
    let client = TransferClient::new(Arc::new(session)).expect("client should build");
    let worker = DownloadWorker::new(client, Extractor::new(&ws.extracted), &ws.downloads)
        .with_observer(Arc::new(NoProgress));
    DownloadEngine::new(concurrency, worker).expect("valid concurrency")
}

/// Tracks how many requests are being served at the same time.
struct ConcurrencyProbe {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Respond for ConcurrencyProbe {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Counted as in flight for most of the response delay.
        let active = Arc::clone(&self.active);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            active.fetch_sub(1, Ordering::SeqCst);
        });
        let id = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "download")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200)
            .insert_header(
                "Content-Disposition",
                format!("attachment; filename=part_{id}.txt.gz").as_str(),
            )
            .set_body_bytes(gzip_bytes(format!("part {id}\n").as_bytes()))
            .set_delay(Duration::from_millis(150))
    }
}

#[tokio::test]
async fn test_pool_completes_all_tasks_with_bounded_concurrency() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let ws = Workspace::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .respond_with(ConcurrencyProbe {
            active: Arc::clone(&active),
            peak: Arc::clone(&peak),
        })
        .mount(&mock_server)
        .await;

    let urls: Vec<String> = (1..=6)
        .map(|i| format!("{}/?download={i}", mock_server.uri()))
        .collect();
    let stats = Arc::new(DownloadStats::new());

    let summary = engine(&ws, 2)
        .run_with_stats(urls.clone(), Arc::clone(&stats))
        .await
        .expect("run should complete");

    assert_eq!(summary.total(), 6);
    assert_eq!(summary.downloaded(), 6);
    assert!(summary.tasks.iter().all(|t| t.status.is_terminal()));
    assert_eq!(
        summary.tasks.iter().map(|t| t.url.clone()).collect::<Vec<_>>(),
        urls
    );
    assert_eq!(stats.finished(), 6);
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "at most two transfers may be in flight, saw {}",
        peak.load(Ordering::SeqCst)
    );
    for i in 1..=6 {
        assert!(ws.extracted.join(format!("part_{i}.txt")).exists());
    }
}

#[tokio::test]
async fn test_pool_isolates_failures_from_siblings() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let ws = Workspace::new();
    Mock::given(method("GET"))
        .and(path("/good.txt.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_bytes(b"good")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/corrupt.txt.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not gzip at all"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.txt.gz"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&mock_server)
        .await;

    let urls = vec![
        format!("{}/corrupt.txt.gz", mock_server.uri()),
        format!("{}/missing.txt.gz", mock_server.uri()),
        "::not a url::".to_string(),
        format!("{}/good.txt.gz", mock_server.uri()),
    ];

    let summary = engine(&ws, 2).run(urls).await.expect("run should complete");

    assert!(matches!(summary.tasks[0].status, TaskStatus::ExtractFailed(_)));
    assert!(matches!(summary.tasks[1].status, TaskStatus::Failed(_)));
    assert!(matches!(summary.tasks[2].status, TaskStatus::Failed(_)));
    assert_eq!(summary.tasks[3].status, TaskStatus::Downloaded);
    assert_eq!(summary.failures().count(), 3);

    assert!(ws.downloads.join("corrupt.txt.gz").exists());
    assert!(ws.downloads.join("missing.txt.gz_error_404.html").exists());
    assert_eq!(std::fs::read(ws.extracted.join("good.txt")).unwrap(), b"good");
}

#[tokio::test]
async fn test_second_run_skips_every_task_without_transfers() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let ws = Workspace::new();
    Mock::given(method("GET"))
        .and(query_param("download", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_bytes(b"one")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two.txt.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_bytes(b"two")))
        .expect(1)
        .mount(&mock_server)
        .await;
    let urls = vec![
        format!("{}/?download=1", mock_server.uri()),
        format!("{}/two.txt.gz", mock_server.uri()),
    ];

    let first = engine(&ws, 2).run(urls.clone()).await.unwrap();
    assert_eq!(first.downloaded(), 2);

    let second = engine(&ws, 2).run(urls).await.unwrap();
    assert_eq!(second.skipped(), 2);
    assert_eq!(second.downloaded(), 0);
    assert_eq!(std::fs::read(ws.extracted.join("download_1")).unwrap(), b"one");
    assert_eq!(std::fs::read(ws.extracted.join("two.txt")).unwrap(), b"two");
    // `expect(1)` on each mock is verified when the server drops.
}

#[tokio::test]
async fn test_resume_then_run_extracts_leftovers_first() {
    let ws = Workspace::new();
    std::fs::write(ws.downloads.join("left_over.txt.gz"), gzip_bytes(b"previous run")).unwrap();

    let extractor = Extractor::new(&ws.extracted);
    let report = ResumeScanner::new(extractor)
        .scan_and_extract(&ws.downloads)
        .await;
    assert_eq!(report.extracted.len(), 1);

    let summary = engine(&ws, 1).run(Vec::new()).await.unwrap();
    assert_eq!(summary.total(), 0);
    assert_eq!(
        std::fs::read(ws.extracted.join("left_over.txt")).unwrap(),
        b"previous run"
    );
}
