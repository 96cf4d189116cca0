//! Download pipeline for compressed data files.
//!
//! This module turns links into decompressed artifacts on disk:
//! filename resolution, paced streaming transfer, the per-URL worker, and
//! the bounded worker pool that runs a whole link list.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Server-declared filenames from Content-Disposition headers
//! - Existence-based dedup so reruns never fetch twice
//! - Per-file failure isolation with a run summary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkfetch_core::download::{DownloadWorker, TransferClient};
//! use bulkfetch_core::{Extractor, TransferSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TransferClient::new(Arc::new(TransferSession::default()))?;
//! let worker = DownloadWorker::new(client, Extractor::new("./extracted"), "./downloads");
//! let task = worker.process("https://example.org/?download=7").await;
//! println!("{}: {:?}", task.url, task.status);
//! # Ok(())
//! # }
//! ```

mod client;
pub(crate) mod constants;
mod engine;
mod error;
pub(crate) mod filename;
pub(crate) mod progress;
pub(crate) mod task;
mod worker;

pub use client::{FetchOutcome, TransferClient, TransferOutcome};
pub use engine::{DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats, EngineError, RunSummary};
pub use error::DownloadError;
pub use filename::{FilenameResolver, FilenameSource, ResolvedFilename};
pub use progress::{
    LogProgress, NoProgress, ProgressObserver, ProgressSample, ThroughputMeter, average_speed,
    format_speed,
};
pub use task::{DownloadTask, ErrorKind, FileArtifact, TaskStatus};
pub use worker::DownloadWorker;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
