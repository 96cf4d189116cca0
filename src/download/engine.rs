//! Worker pool that fans a link list out across a bounded number of workers.
//!
//! The [`DownloadEngine`] submits links in input order, limits how many run
//! at once with a semaphore, and waits for every one of them to reach a
//! terminal state before returning a [`RunSummary`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkfetch_core::{DownloadEngine, DownloadWorker, Extractor, TransferClient, TransferSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TransferClient::new(Arc::new(TransferSession::default()))?;
//! let worker = DownloadWorker::new(client, Extractor::new("./extracted"), "./downloads");
//! let engine = DownloadEngine::new(2, worker)?;
//! let summary = engine
//!     .run(vec!["https://example.org/?download=1".to_string()])
//!     .await?;
//! println!("downloaded: {}, failed: {}", summary.downloaded(), summary.failed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::task::{DownloadTask, TaskStatus};
use super::worker::DownloadWorker;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 16;

/// Default concurrency; kept low so remote services do not throttle the run.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Live counters for a batch run.
///
/// Updated by worker tasks as they finish; safe to read from another task
/// (e.g. a progress display) while the run is in flight.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    extract_failed: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks downloaded and extracted.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Tasks skipped because the artifact already existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Tasks downloaded whose extraction failed.
    #[must_use]
    pub fn extract_failed(&self) -> usize {
        self.extract_failed.load(Ordering::SeqCst)
    }

    /// Tasks that failed outright.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Tasks that reached a terminal state.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.downloaded() + self.skipped() + self.extract_failed() + self.failed()
    }

    fn record(&self, status: &TaskStatus) {
        let counter = match status {
            TaskStatus::Downloaded => &self.downloaded,
            TaskStatus::Skipped => &self.skipped,
            TaskStatus::ExtractFailed(_) => &self.extract_failed,
            TaskStatus::Failed(_) | TaskStatus::Pending | TaskStatus::InProgress => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Outcome of a batch run: every task, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// One entry per input link, in input order.
    pub tasks: Vec<DownloadTask>,
    /// Wall time of the whole run.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, predicate: impl Fn(&TaskStatus) -> bool) -> usize {
        self.tasks.iter().filter(|task| predicate(&task.status)).count()
    }

    /// Tasks downloaded and extracted.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.count(|s| *s == TaskStatus::Downloaded)
    }

    /// Tasks skipped because the artifact already existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| *s == TaskStatus::Skipped)
    }

    /// Tasks downloaded whose extraction failed.
    #[must_use]
    pub fn extract_failed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::ExtractFailed(_)))
    }

    /// Tasks that failed outright.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Failed(_)))
    }

    /// Number of tasks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks that ended `Failed` or `ExtractFailed`.
    pub fn failures(&self) -> impl Iterator<Item = &DownloadTask> {
        self.tasks.iter().filter(|task| task.status.is_failure())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

/// Bounded pool of download workers.
///
/// # Concurrency Model
///
/// - Each link runs in its own Tokio task executing the full worker pipeline
/// - A semaphore permit is acquired before a task is spawned, so at most
///   `concurrency` transfers are in flight and links start in input order
/// - Permits are released automatically when a task completes (RAII)
/// - A panicking task is recorded as `Failed`; it never aborts the run
#[derive(Debug)]
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    worker: DownloadWorker,
}

impl DownloadEngine {
    /// Creates a pool of `concurrency` workers sharing `worker`'s configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-16).
    #[instrument(level = "debug", skip(worker))]
    pub fn new(concurrency: usize, worker: DownloadWorker) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating download engine");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            worker,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every link and returns once all of them are finished.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    /// Individual download failures do NOT cause this method to error.
    pub async fn run(&self, urls: Vec<String>) -> Result<RunSummary, EngineError> {
        self.run_with_stats(urls, Arc::new(DownloadStats::new()))
            .await
    }

    /// Like [`run`](Self::run), updating `stats` as each task finishes.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    #[instrument(skip_all, fields(links = urls.len(), concurrency = self.concurrency))]
    pub async fn run_with_stats(
        &self,
        urls: Vec<String>,
        stats: Arc<DownloadStats>,
    ) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        let mut handles = Vec::with_capacity(urls.len());

        info!(links = urls.len(), "starting batch download");

        for url in urls {
            // Blocks while `concurrency` tasks are in flight
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let worker = self.worker.clone();
            let stats = Arc::clone(&stats);
            let task_url = url.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let task = worker.process(&task_url).await;
                stats.record(&task.status);
                task
            });
            handles.push((url, handle));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut tasks = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            match handle.await {
                Ok(task) => tasks.push(task),
                Err(join_error) => {
                    warn!(url = %url, error = %join_error, "download task panicked");
                    let mut task = DownloadTask::new(url);
                    task.fail_with(format!("task panic: {join_error}"));
                    stats.record(&task.status);
                    tasks.push(task);
                }
            }
        }

        let summary = RunSummary {
            tasks,
            elapsed: started.elapsed(),
        };
        info!(
            downloaded = summary.downloaded(),
            skipped = summary.skipped(),
            extract_failed = summary.extract_failed(),
            failed = summary.failed(),
            total = summary.total(),
            "batch download complete"
        );
        Ok(summary)
    }
}
