//! Per-URL task record and its status lifecycle.

use std::path::PathBuf;

use serde::Serialize;

use super::DownloadError;
use super::filename::{FilenameSource, ResolvedFilename};
use crate::extract::ExtractError;

/// Failure classification shared by transfer and extraction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection, TLS or timeout failure.
    Network,
    /// Non-200 response.
    Http,
    /// Corrupt or invalid compressed payload.
    Decompression,
    /// Read or write failure on local disk.
    Filesystem,
    /// The link could not be parsed as a URL.
    InvalidUrl,
}

impl ErrorKind {
    /// Classifies a transfer error.
    #[must_use]
    pub fn of_download(error: &DownloadError) -> Self {
        match error {
            DownloadError::Network { .. }
            | DownloadError::Timeout { .. }
            | DownloadError::EmptyBody { .. } => Self::Network,
            DownloadError::HttpStatus { .. } => Self::Http,
            DownloadError::Io { .. } => Self::Filesystem,
            DownloadError::InvalidUrl { .. } => Self::InvalidUrl,
        }
    }

    /// Classifies an extraction error.
    #[must_use]
    pub fn of_extract(error: &ExtractError) -> Self {
        match error {
            ExtractError::Decompress { .. } => Self::Decompression,
            ExtractError::Io { .. } | ExtractError::Worker { .. } => Self::Filesystem,
        }
    }
}

/// Lifecycle state of one download task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not started.
    Pending,
    /// Transfer or extraction running.
    InProgress,
    /// Compressed artifact already existed; no transfer was made.
    Skipped,
    /// Downloaded and extracted.
    Downloaded,
    /// Downloaded, but extraction failed; the compressed artifact is kept.
    ExtractFailed(String),
    /// Nothing usable was produced.
    Failed(String),
}

impl TaskStatus {
    /// Returns true for states a task cannot leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }

    /// Returns true for `Failed` and `ExtractFailed`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::ExtractFailed(_))
    }
}

/// A file produced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileArtifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Where the artifact's name came from.
    pub origin: FilenameSource,
}

/// Everything known about one URL over a run.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    /// The link as given in the link list.
    pub url: String,
    /// Final on-disk filename of the compressed artifact, once known.
    pub resolved_filename: Option<String>,
    /// Current state.
    pub status: TaskStatus,
    /// Classification of the failure, for failed states.
    pub error_kind: Option<ErrorKind>,
    /// The compressed artifact.
    pub artifact: Option<FileArtifact>,
    /// The decompressed sibling.
    pub extracted: Option<FileArtifact>,
    /// The compressed artifact was already on disk and no transfer was made.
    pub reused_existing: bool,
}

impl DownloadTask {
    /// Creates a pending task for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolved_filename: None,
            status: TaskStatus::Pending,
            error_kind: None,
            artifact: None,
            extracted: None,
            reused_existing: false,
        }
    }

    /// Records the filename the task resolved to.
    pub fn set_filename(&mut self, filename: &ResolvedFilename) {
        self.resolved_filename = Some(filename.name().to_string());
    }

    /// Marks the task as running.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Marks the task as skipped because the artifact was already present.
    pub fn skip(&mut self, artifact: FileArtifact) {
        self.artifact = Some(artifact);
        self.reused_existing = true;
        self.status = TaskStatus::Skipped;
    }

    /// Records the downloaded compressed artifact.
    pub fn downloaded(&mut self, artifact: FileArtifact) {
        self.artifact = Some(artifact);
    }

    /// Records a successful extraction; completes a downloaded task.
    pub fn extracted(&mut self, artifact: FileArtifact) {
        self.extracted = Some(artifact);
        if !self.reused_existing {
            self.status = TaskStatus::Downloaded;
        }
    }

    /// Records a failed extraction. The compressed artifact is kept.
    pub fn extract_failed(&mut self, error: &ExtractError) {
        self.error_kind = Some(ErrorKind::of_extract(error));
        self.status = TaskStatus::ExtractFailed(error.to_string());
    }

    /// Marks the task as failed with a transfer error.
    pub fn fail(&mut self, error: &DownloadError) {
        self.error_kind = Some(ErrorKind::of_download(error));
        self.status = TaskStatus::Failed(error.to_string());
    }

    /// Marks the task as failed for a reason outside the error taxonomy.
    pub fn fail_with(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed(reason.into());
    }
}
