//! Per-URL pipeline: dedup check, transfer, decompression, report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};
use url::Url;

use super::client::{FetchOutcome, TransferClient, existing_size};
use super::error::DownloadError;
use super::filename::{FilenameSource, ResolvedFilename};
use super::progress::{LogProgress, ProgressObserver};
use super::task::{DownloadTask, FileArtifact};
use crate::extract::Extractor;

/// Drives one URL through its whole lifecycle.
///
/// Every failure is contained here: [`DownloadWorker::process`] always
/// returns a task in a terminal state and never an error.
#[derive(Clone)]
pub struct DownloadWorker {
    client: TransferClient,
    extractor: Extractor,
    download_dir: PathBuf,
    observer: Arc<dyn ProgressObserver>,
}

impl std::fmt::Debug for DownloadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadWorker")
            .field("download_dir", &self.download_dir)
            .field("extract_dir", &self.extractor.extract_dir())
            .finish_non_exhaustive()
    }
}

impl DownloadWorker {
    /// Creates a worker saving into `download_dir` and extracting with `extractor`.
    #[must_use]
    pub fn new(
        client: TransferClient,
        extractor: Extractor,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            extractor,
            download_dir: download_dir.into(),
            observer: Arc::new(LogProgress),
        }
    }

    /// Replaces the progress observer (defaults to logging).
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs the full pipeline for `url` and returns the finished task.
    #[instrument(skip(self))]
    pub async fn process(&self, url: &str) -> DownloadTask {
        let mut task = DownloadTask::new(url);
        task.start();
        if let Err(error) = self.run(&mut task).await {
            warn!(url, error = %error, "download failed");
            task.fail(&error);
        }
        task
    }

    async fn run(&self, task: &mut DownloadTask) -> Result<(), DownloadError> {
        let url = Url::parse(&task.url).map_err(|_| DownloadError::invalid_url(&task.url))?;
        let guess = self.client.resolver().from_url(&url);
        task.set_filename(&guess);

        let candidate = self.download_dir.join(guess.name());
        if let Some(size_bytes) = existing_size(&candidate).await {
            info!(filename = guess.name(), "file already exists, skipping download");
            task.skip(FileArtifact {
                path: candidate.clone(),
                size_bytes,
                origin: FilenameSource::FromUrl,
            });
            self.extract_into(task, &candidate, None).await;
            return Ok(());
        }

        info!(filename = guess.name(), "starting download");
        match self
            .client
            .fetch(&url, &guess, &self.download_dir, self.observer.as_ref())
            .await?
        {
            FetchOutcome::AlreadyPresent { artifact, filename } => {
                task.set_filename(&filename);
                let path = artifact.path.clone();
                task.skip(artifact);
                self.extract_into(task, &path, Some(&filename)).await;
            }
            FetchOutcome::Fetched(outcome) => {
                task.set_filename(&outcome.filename);
                let path = outcome.artifact.path.clone();
                let size_bytes = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| DownloadError::io(path.clone(), e))?
                    .len();
                if size_bytes == 0 {
                    // An empty artifact would satisfy the dedup check on the next run.
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(DownloadError::empty_body(url.as_str()));
                }
                task.downloaded(FileArtifact {
                    size_bytes,
                    ..outcome.artifact
                });
                self.extract_into(task, &path, Some(&outcome.filename)).await;
            }
        }
        Ok(())
    }

    async fn extract_into(
        &self,
        task: &mut DownloadTask,
        compressed: &Path,
        resolved: Option<&ResolvedFilename>,
    ) {
        match self.extractor.extract(compressed, resolved).await {
            Ok(artifact) => task.extracted(artifact),
            Err(error) => {
                warn!(url = %task.url, error = %error, "extraction failed");
                task.extract_failed(&error);
            }
        }
    }
}
