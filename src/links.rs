//! Link list intake.
//!
//! A link list is newline-delimited text: blank lines are ignored and every
//! other line is one URL, kept in input order. URL validity is not checked
//! here; a malformed line becomes a failed task downstream so that it shows
//! up in the run summary.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while reading a link list.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link file could not be read.
    #[error("failed to read link list {path}: {source}")]
    Read {
        /// The link file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Supplies the ordered list of URLs for a run.
///
/// Uses `async_trait` so sources can be held as `Box<dyn LinkSource>`.
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Returns every link, in order.
    async fn links(&self) -> Result<Vec<String>, LinkError>;
}

/// Reads links from a text file.
#[derive(Debug, Clone)]
pub struct FileLinkSource {
    path: PathBuf,
}

impl FileLinkSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LinkSource for FileLinkSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn links(&self) -> Result<Vec<String>, LinkError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| LinkError::Read {
                path: self.path.clone(),
                source,
            })?;
        let links = parse_link_list(&raw);
        debug!(count = links.len(), "link list loaded");
        Ok(links)
    }
}

/// A fixed, in-memory link list.
#[derive(Debug, Clone, Default)]
pub struct StaticLinkSource {
    links: Vec<String>,
}

impl StaticLinkSource {
    /// Creates a source yielding `links` as given.
    #[must_use]
    pub fn new<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            links: links.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl LinkSource for StaticLinkSource {
    async fn links(&self) -> Result<Vec<String>, LinkError> {
        Ok(self.links.clone())
    }
}

/// Splits link list text into trimmed, non-blank lines.
#[must_use]
pub fn parse_link_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
