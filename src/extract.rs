//! Decompression stage: turns a compressed artifact into its plain sibling.
//!
//! The codec is a capability behind [`Decompressor`]; [`GzipCodec`] is the
//! one the tool ships with. [`Extractor`] owns the output directory and the
//! naming rule, streams the payload through the codec, and never lets one
//! file's failure touch another.

use std::fmt::Debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::download::constants::CHUNK_SIZE;
use crate::download::filename::{COMPRESSED_SUFFIX, FilenameResolver, ResolvedFilename};
use crate::download::{FileArtifact, FilenameSource};

/// Errors raised while extracting one artifact.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The compressed payload is corrupt or not in the codec's format.
    #[error("failed to decompress {path}: {source}")]
    Decompress {
        /// The compressed file.
        path: PathBuf,
        /// The decoder error.
        #[source]
        source: std::io::Error,
    },

    /// Opening the input or writing the output failed.
    #[error("IO error extracting to {path}: {source}")]
    Io {
        /// The file the operation failed on.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The blocking extraction task did not finish.
    #[error("extraction of {path} was aborted: {message}")]
    Worker {
        /// The compressed file.
        path: PathBuf,
        /// Why the task ended.
        message: String,
    },
}

impl ExtractError {
    /// Creates a decompression error.
    pub fn decompress(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Decompress {
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A streaming decompression codec.
pub trait Decompressor: Send + Sync + Debug {
    /// Filename suffix of this codec's compressed files (e.g. `.gz`).
    fn suffix(&self) -> &str;

    /// Wraps `input` in a reader yielding the decompressed bytes.
    fn decoder(&self, input: Box<dyn Read + Send>) -> Box<dyn Read + Send>;
}

/// Gzip codec. Concatenated gzip members are decoded as one stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl Decompressor for GzipCodec {
    fn suffix(&self) -> &str {
        COMPRESSED_SUFFIX
    }

    fn decoder(&self, input: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        Box::new(MultiGzDecoder::new(input))
    }
}

/// Extracts compressed artifacts into a fixed directory.
#[derive(Debug, Clone)]
pub struct Extractor {
    extract_dir: PathBuf,
    codec: Arc<dyn Decompressor>,
    resolver: FilenameResolver,
}

impl Extractor {
    /// Creates a gzip extractor writing into `extract_dir`.
    #[must_use]
    pub fn new(extract_dir: impl Into<PathBuf>) -> Self {
        Self::with_codec(extract_dir, Arc::new(GzipCodec))
    }

    /// Creates an extractor with a custom codec.
    #[must_use]
    pub fn with_codec(extract_dir: impl Into<PathBuf>, codec: Arc<dyn Decompressor>) -> Self {
        let resolver = FilenameResolver::new(codec.suffix());
        Self {
            extract_dir: extract_dir.into(),
            codec,
            resolver,
        }
    }

    /// Directory decompressed artifacts are written to.
    #[must_use]
    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// The naming policy matching this extractor's codec.
    #[must_use]
    pub fn resolver(&self) -> &FilenameResolver {
        &self.resolver
    }

    /// Where the decompressed sibling of `compressed` goes.
    ///
    /// Uses the resolved filename when given, else the compressed file's own name.
    #[must_use]
    pub fn output_path(&self, compressed: &Path, resolved: Option<&ResolvedFilename>) -> PathBuf {
        let source_name = resolved.map_or_else(
            || {
                compressed
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            },
            |resolved| resolved.name().to_string(),
        );
        self.extract_dir
            .join(self.resolver.decompressed_name(&source_name))
    }

    /// Extracts `compressed` on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the payload is corrupt or disk IO fails.
    /// The compressed file is never modified; partial output is removed.
    pub async fn extract(
        &self,
        compressed: &Path,
        resolved: Option<&ResolvedFilename>,
    ) -> Result<FileArtifact, ExtractError> {
        let extractor = self.clone();
        let compressed = compressed.to_path_buf();
        let resolved = resolved.cloned();
        let task_path = compressed.clone();
        tokio::task::spawn_blocking(move || {
            extractor.extract_blocking(&task_path, resolved.as_ref())
        })
        .await
        .map_err(|e| ExtractError::Worker {
            path: compressed,
            message: e.to_string(),
        })?
    }

    /// Extracts `compressed` on the current thread.
    ///
    /// # Errors
    ///
    /// Same as [`extract`](Self::extract).
    pub fn extract_blocking(
        &self,
        compressed: &Path,
        resolved: Option<&ResolvedFilename>,
    ) -> Result<FileArtifact, ExtractError> {
        let output = self.output_path(compressed, resolved);
        let origin = resolved.map_or(FilenameSource::FromUrl, ResolvedFilename::source);
        debug!(input = %compressed.display(), output = %output.display(), "extracting");

        let input = File::open(compressed).map_err(|e| ExtractError::io(compressed, e))?;
        let mut decoder = self
            .codec
            .decoder(Box::new(BufReader::with_capacity(CHUNK_SIZE, input)));
        let file = File::create(&output).map_err(|e| ExtractError::io(&output, e))?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        match copy_decoded(&mut decoder, &mut writer, compressed, &output) {
            Ok(size_bytes) => {
                info!(
                    output = %output.display(),
                    bytes = size_bytes,
                    "extracted"
                );
                Ok(FileArtifact {
                    path: output,
                    size_bytes,
                    origin,
                })
            }
            Err(error) => {
                drop(writer);
                if let Err(e) = std::fs::remove_file(&output) {
                    debug!(path = %output.display(), error = %e, "could not remove partial output");
                }
                warn!(input = %compressed.display(), error = %error, "extraction failed");
                Err(error)
            }
        }
    }
}

/// Streams decoded bytes to `writer`, classifying read failures as
/// decompression errors and write failures as IO errors.
fn copy_decoded(
    decoder: &mut dyn Read,
    writer: &mut BufWriter<File>,
    compressed: &Path,
    output: &Path,
) -> Result<u64, ExtractError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractError::decompress(compressed, e)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| ExtractError::io(output, e))?;
        written += n as u64;
    }
    writer.flush().map_err(|e| ExtractError::io(output, e))?;
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::gzip_bytes;
    use tempfile::TempDir;
    use url::Url;

    fn dirs() -> (TempDir, PathBuf, PathBuf) {
        let root = TempDir::new().unwrap();
        let downloads = root.path().join("downloads");
        let extracted = root.path().join("extracted");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::create_dir_all(&extracted).unwrap();
        (root, downloads, extracted)
    }

    #[test]
    fn test_extract_blocking_writes_decompressed_sibling() {
        let (_root, downloads, extracted) = dirs();
        let gz = downloads.join("station.txt.gz");
        std::fs::write(&gz, gzip_bytes(b"a,b,c\n1,2,3\n")).unwrap();

        let artifact = Extractor::new(&extracted).extract_blocking(&gz, None).unwrap();

        assert_eq!(artifact.path, extracted.join("station.txt"));
        assert_eq!(artifact.size_bytes, 12);
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"a,b,c\n1,2,3\n");
    }

    #[test]
    fn test_extract_uses_resolved_server_name() {
        let (_root, downloads, extracted) = dirs();
        let gz = downloads.join("download_42.gz");
        std::fs::write(&gz, gzip_bytes(b"payload")).unwrap();
        let resolver = FilenameResolver::default();
        let resolved = resolver.resolve(
            &Url::parse("https://example.org/?download=42").unwrap(),
            Some("attachment; filename=d07_day.txt.gz"),
        );

        let artifact = Extractor::new(&extracted)
            .extract_blocking(&gz, Some(&resolved))
            .unwrap();

        assert_eq!(artifact.path, extracted.join("d07_day.txt"));
        assert_eq!(artifact.origin, FilenameSource::FromServerMetadata);
    }

    #[test]
    fn test_extract_appends_txt_when_no_gz_suffix() {
        let (_root, downloads, extracted) = dirs();
        let input = downloads.join("archive.bin");
        std::fs::write(&input, gzip_bytes(b"x")).unwrap();

        let artifact = Extractor::new(&extracted)
            .extract_blocking(&input, None)
            .unwrap();
        assert_eq!(artifact.path, extracted.join("archive.bin.txt"));
    }

    #[test]
    fn test_extract_decodes_concatenated_members() {
        let (_root, downloads, extracted) = dirs();
        let gz = downloads.join("multi.txt.gz");
        let mut bytes = gzip_bytes(b"first\n");
        bytes.extend(gzip_bytes(b"second\n"));
        std::fs::write(&gz, bytes).unwrap();

        let artifact = Extractor::new(&extracted).extract_blocking(&gz, None).unwrap();
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"first\nsecond\n");
    }

    #[test]
    fn test_extract_corrupt_input_fails_and_keeps_compressed_file() {
        let (_root, downloads, extracted) = dirs();
        let gz = downloads.join("broken.txt.gz");
        std::fs::write(&gz, b"this is not gzip data").unwrap();

        let result = Extractor::new(&extracted).extract_blocking(&gz, None);

        assert!(
            matches!(result, Err(ExtractError::Decompress { .. })),
            "expected Decompress, got {result:?}"
        );
        assert!(gz.exists(), "compressed artifact must be retained");
        assert!(
            !extracted.join("broken.txt").exists(),
            "partial output must be removed"
        );
    }

    #[test]
    fn test_extract_missing_input_is_io_error() {
        let (_root, downloads, extracted) = dirs();
        let result =
            Extractor::new(&extracted).extract_blocking(&downloads.join("missing.gz"), None);
        assert!(matches!(result, Err(ExtractError::Io { .. })));
    }

    #[tokio::test]
    async fn test_extract_async_runs_on_blocking_pool() {
        let (_root, downloads, extracted) = dirs();
        let gz = downloads.join("async.txt.gz");
        std::fs::write(&gz, gzip_bytes(b"async body")).unwrap();

        let artifact = Extractor::new(&extracted).extract(&gz, None).await.unwrap();
        assert_eq!(std::fs::read(artifact.path).unwrap(), b"async body");
    }
}
