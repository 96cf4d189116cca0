//! HTTP transfer client for streaming compressed artifacts to disk.
//!
//! This module provides the [`TransferClient`] which performs one paced,
//! streaming GET per call with the shared [`TransferSession`] applied,
//! resolves the final filename from the response, and reports throughput.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Proxy, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CHUNK_SIZE, PARTIAL_SUFFIX};
use super::error::DownloadError;
use super::filename::{FilenameResolver, ResolvedFilename};
use super::progress::{ProgressObserver, ThroughputMeter, average_speed, format_speed};
use super::task::FileArtifact;
use crate::session::{SessionError, TransferSession};

/// Result of a successful transfer.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// The compressed artifact written to disk.
    pub artifact: FileArtifact,
    /// The filename the artifact was saved under.
    pub filename: ResolvedFilename,
    /// HTTP status of the response (always 200).
    pub status: u16,
    /// `Content-Type` of the response, if sent.
    pub content_type: Option<String>,
    /// Wall time spent streaming the body.
    pub elapsed: Duration,
    /// Average throughput in bytes per second; `None` when `elapsed` rounds to zero.
    pub average_speed: Option<f64>,
}

/// What [`TransferClient::fetch`] produced.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The body was streamed to disk.
    Fetched(TransferOutcome),
    /// The server-declared file already exists; the body was not read.
    AlreadyPresent {
        /// The existing artifact.
        artifact: FileArtifact,
        /// Its server-declared filename.
        filename: ResolvedFilename,
    },
}

/// HTTP client for paced, streaming transfers.
///
/// Created once per run and cloned into every worker; clones share the
/// connection pool and the read-only session.
#[derive(Debug, Clone)]
pub struct TransferClient {
    client: Client,
    session: Arc<TransferSession>,
    resolver: FilenameResolver,
}

impl TransferClient {
    /// Builds a client from the session's headers, cookies, proxy and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if a header, cookie or proxy is invalid, or
    /// the underlying client cannot be built.
    #[instrument(level = "debug", skip_all)]
    pub fn new(session: Arc<TransferSession>) -> Result<Self, SessionError> {
        let client = build_client(&session)?;
        debug!(
            timeout_secs = session.timeout.as_secs(),
            request_delay_ms = session.request_delay.as_millis(),
            trust_env = session.trust_env,
            cookies = session.cookies.len(),
            "created transfer client"
        );
        Ok(Self {
            client,
            session,
            resolver: FilenameResolver::default(),
        })
    }

    /// The naming policy used to refine filenames from responses.
    #[must_use]
    pub fn resolver(&self) -> &FilenameResolver {
        &self.resolver
    }

    /// Fetches `url` into `download_dir`.
    ///
    /// Waits the session's request delay, then sends the request. A
    /// `Content-Disposition` filename overrides `guess`. Non-200 bodies are
    /// saved as `<guess>_error_<status>.html` next to the downloads.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for connection failures and timeouts, non-200
    /// responses, and local write failures.
    ///
    /// The body is staged under `<name>.part` and only renamed to its final
    /// name once fully written, so an interrupted transfer never leaves a
    /// file that a later run would dedup-skip.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &Url,
        guess: &ResolvedFilename,
        download_dir: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<FetchOutcome, DownloadError> {
        if !self.session.request_delay.is_zero() {
            tokio::time::sleep(self.session.request_delay).await;
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        info!(status = status.as_u16(), "HTTP status");

        if status != StatusCode::OK {
            let error_path =
                download_dir.join(format!("{}_error_{}.html", guess.name(), status.as_u16()));
            let saved = save_error_body(response, &error_path).await;
            warn!(
                status = status.as_u16(),
                error_path = %error_path.display(),
                saved,
                "download failed"
            );
            return Err(DownloadError::http_status(
                url.as_str(),
                status.as_u16(),
                saved.then_some(error_path),
            ));
        }

        let content_type = header_str(&response, CONTENT_TYPE);
        let content_disposition = header_str(&response, CONTENT_DISPOSITION);
        info!(
            content_type = content_type.as_deref().unwrap_or(""),
            content_disposition = content_disposition.as_deref().unwrap_or(""),
            "response metadata"
        );

        let filename = self
            .resolver
            .refine_from_metadata(guess.clone(), content_disposition.as_deref());
        if filename.is_from_server() {
            info!(filename = filename.name(), "server filename");
        }
        let file_path = download_dir.join(filename.name());

        if filename.name() != guess.name()
            && let Some(size_bytes) = existing_size(&file_path).await
        {
            info!(path = %file_path.display(), "server file already present, not downloading");
            return Ok(FetchOutcome::AlreadyPresent {
                artifact: FileArtifact {
                    path: file_path,
                    size_bytes,
                    origin: filename.source(),
                },
                filename,
            });
        }

        let expected_bytes = response.content_length().filter(|&n| n > 0);
        info!(filename = filename.name(), "downloading");

        let part_path = partial_path(&file_path);
        let file = File::create(&part_path)
            .await
            .map_err(|e| DownloadError::io(part_path.clone(), e))?;

        let streamed = stream_to_file(
            file,
            response,
            url.as_str(),
            &part_path,
            filename.name(),
            expected_bytes,
            observer,
        )
        .await;

        let (bytes_written, elapsed) = match streamed {
            Ok(result) => result,
            Err(e) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part_path, &file_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::io(file_path, e));
        }

        let average_speed = average_speed(bytes_written, elapsed);
        match average_speed {
            Some(speed) => info!(
                path = %file_path.display(),
                bytes = bytes_written,
                average_speed = %format_speed(speed),
                "download complete"
            ),
            None => info!(path = %file_path.display(), bytes = bytes_written, "download complete"),
        }

        Ok(FetchOutcome::Fetched(TransferOutcome {
            artifact: FileArtifact {
                path: file_path,
                size_bytes: bytes_written,
                origin: filename.source(),
            },
            filename,
            status: status.as_u16(),
            content_type,
            elapsed,
            average_speed,
        }))
    }
}

/// Streams the response body to `file` in [`CHUNK_SIZE`] pieces, sampling
/// throughput after each piece. Returns bytes written and elapsed time.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    filename: &str,
    expected_bytes: Option<u64>,
    observer: &dyn ProgressObserver,
) -> Result<(u64, Duration), DownloadError> {
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut meter = ThroughputMeter::new(Instant::now(), expected_bytes);

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        for piece in chunk.chunks(CHUNK_SIZE) {
            writer
                .write_all(piece)
                .await
                .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;
            if let Some(sample) = meter.record(piece.len() as u64, Instant::now()) {
                observer.on_sample(filename, &sample);
            }
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok((meter.total_bytes(), meter.elapsed(Instant::now())))
}

/// Writes a non-200 body verbatim to `error_path`. Returns whether it was saved.
async fn save_error_body(response: reqwest::Response, error_path: &Path) -> bool {
    let body = match response.bytes().await {
        Ok(body) => body.to_vec(),
        Err(e) => {
            debug!(error = %e, "could not read error response body");
            Vec::new()
        }
    };
    match tokio::fs::write(error_path, &body).await {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %error_path.display(), error = %e, "could not save error response body");
            false
        }
    }
}

/// Staging path for a body still being streamed to `path`.
fn partial_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(PARTIAL_SUFFIX);
    PathBuf::from(staged)
}

/// Size of an existing non-empty regular file, or `None`.
pub(super) async fn existing_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn build_client(session: &TransferSession) -> Result<Client, SessionError> {
    let mut builder = Client::builder()
        .default_headers(session.header_map()?)
        .connect_timeout(session.timeout)
        .read_timeout(session.timeout)
        .gzip(true);

    if !session.trust_env {
        builder = builder.no_proxy();
    }
    if let Some(proxy) = &session.proxy {
        if let Some(address) = &proxy.http {
            builder = builder.proxy(Proxy::http(address).map_err(|source| {
                SessionError::InvalidProxy {
                    address: address.clone(),
                    source,
                }
            })?);
        }
        if let Some(address) = &proxy.https {
            builder = builder.proxy(Proxy::https(address).map_err(|source| {
                SessionError::InvalidProxy {
                    address: address.clone(),
                    source,
                }
            })?);
        }
    }

    builder.build().map_err(SessionError::Build)
}
