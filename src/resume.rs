//! Startup pass over artifacts left by a previous run.
//!
//! Every compressed file already in the download directory is extracted
//! before the batch starts, independent of the link list. Extraction runs
//! even when the decompressed sibling already exists.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::extract::Extractor;

/// What the resume pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResumeReport {
    /// Compressed files extracted successfully.
    pub extracted: Vec<PathBuf>,
    /// Compressed files whose extraction failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl ResumeReport {
    /// Number of compressed files the pass looked at.
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.extracted.len() + self.failed.len()
    }
}

/// Extracts every compressed artifact found in a directory.
#[derive(Debug, Clone)]
pub struct ResumeScanner {
    extractor: Extractor,
}

impl ResumeScanner {
    /// Creates a scanner extracting with `extractor`.
    #[must_use]
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Extracts all compressed files directly inside `download_dir`.
    ///
    /// A missing directory yields an empty report. Failures are recorded per
    /// file and never stop the pass.
    #[instrument(skip(self), fields(dir = %download_dir.display()))]
    pub async fn scan_and_extract(&self, download_dir: &Path) -> ResumeReport {
        let mut report = ResumeReport::default();

        let mut entries = match tokio::fs::read_dir(download_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "download directory not readable, nothing to resume");
                return report;
            }
        };

        let mut candidates = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                    let compressed = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| self.extractor.resolver().is_compressed(name));
                    if is_file && compressed {
                        candidates.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stopped listing download directory");
                    break;
                }
            }
        }
        candidates.sort();

        for path in candidates {
            match self.extractor.extract(&path, None).await {
                Ok(_) => report.extracted.push(path),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "resume extraction failed");
                    report.failed.push((path, error.to_string()));
                }
            }
        }

        info!(
            extracted = report.extracted.len(),
            failed = report.failed.len(),
            "resume pass complete"
        );
        report
    }
}
