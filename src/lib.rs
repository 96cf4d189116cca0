//! Bulkfetch Core Library
//!
//! This library provides the download orchestration engine behind the
//! `bulkfetch` tool: it takes a list of links to compressed data files,
//! fetches them concurrently, names them the way the server declares,
//! skips what is already on disk, and decompresses every artifact.
//!
//! # Architecture
//!
//! - [`links`] - Link list intake (newline-delimited URL lists)
//! - [`session`] - Immutable transfer configuration shared by all workers
//! - [`download`] - Filename resolution, streaming transfer, per-URL worker, worker pool
//! - [`extract`] - Decompression stage and codec capability
//! - [`resume`] - Startup pass that extracts artifacts left by a previous run

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod extract;
pub mod links;
pub mod resume;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadError, DownloadStats, DownloadTask,
    DownloadWorker, EngineError, ErrorKind, FileArtifact, FilenameResolver, FilenameSource,
    LogProgress, ProgressObserver, ProgressSample, RunSummary, TaskStatus, TransferClient,
};
pub use extract::{Decompressor, ExtractError, Extractor, GzipCodec};
pub use links::{FileLinkSource, LinkError, LinkSource, StaticLinkSource, parse_link_list};
pub use resume::{ResumeReport, ResumeScanner};
pub use session::{ProxyConfig, SessionError, TransferSession};
