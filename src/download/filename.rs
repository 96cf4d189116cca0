//! Filename resolution for downloaded and decompressed artifacts.
//!
//! [`FilenameResolver`] is the single owner of naming policy:
//! - [`FilenameResolver::from_url`] makes the initial guess from the URL,
//! - [`FilenameResolver::refine_from_metadata`] lets a server-declared
//!   `Content-Disposition` filename override that guess,
//! - [`FilenameResolver::decompressed_name`] derives the extracted sibling's name.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

/// Suffix of the compressed artifacts this tool fetches.
pub const COMPRESSED_SUFFIX: &str = ".gz";

/// Suffix appended to a decompressed name when there is no compressed suffix to strip.
pub const PLAIN_TEXT_SUFFIX: &str = ".txt";

/// Query parameter carrying the file id on portal-style download links.
const DOWNLOAD_ID_PARAM: &str = "download";

#[allow(clippy::expect_used)]
static EXTENDED_FILENAME_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)filename\*=([^;]+)").expect("extended filename regex is valid")
});

#[allow(clippy::expect_used)]
static FILENAME_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)filename=([^;]+)").expect("filename regex is valid") // Static pattern, safe to panic
});

/// Where a resolved filename came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameSource {
    /// Derived from the URL path or its `download` query parameter.
    FromUrl,
    /// Declared by the server in `Content-Disposition`.
    FromServerMetadata,
}

/// An on-disk filename plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilename {
    name: String,
    source: FilenameSource,
}

impl ResolvedFilename {
    /// The filename itself.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the filename came from.
    #[must_use]
    pub fn source(&self) -> FilenameSource {
        self.source
    }

    /// Returns true when the server declared this name.
    #[must_use]
    pub fn is_from_server(&self) -> bool {
        self.source == FilenameSource::FromServerMetadata
    }
}

/// Naming policy for compressed and decompressed artifacts.
#[derive(Debug, Clone)]
pub struct FilenameResolver {
    compressed_suffix: String,
}

impl Default for FilenameResolver {
    fn default() -> Self {
        Self::new(COMPRESSED_SUFFIX)
    }
}

impl FilenameResolver {
    /// Creates a resolver for artifacts ending in `compressed_suffix` (e.g. `.gz`).
    #[must_use]
    pub fn new(compressed_suffix: impl Into<String>) -> Self {
        Self {
            compressed_suffix: compressed_suffix.into(),
        }
    }

    /// Resolves the final filename from the URL and, when available, the
    /// response's `Content-Disposition` header.
    #[must_use]
    pub fn resolve(&self, url: &Url, content_disposition: Option<&str>) -> ResolvedFilename {
        self.refine_from_metadata(self.from_url(url), content_disposition)
    }

    /// Initial guess from the URL alone.
    ///
    /// Uses the last path segment (query stripped). When the path has no
    /// basename, synthesizes `download_<id>.gz` from the `download` query
    /// parameter, or `download_unknown.gz` when that is absent.
    #[must_use]
    #[allow(clippy::wrong_self_convention)]
    pub fn from_url(&self, url: &Url) -> ResolvedFilename {
        let basename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned)
            })
            .map(|decoded| sanitize_filename(&decoded));

        let name = basename.unwrap_or_else(|| {
            let id = url
                .query_pairs()
                .find(|(key, value)| key == DOWNLOAD_ID_PARAM && !value.is_empty())
                .map_or_else(|| "unknown".to_string(), |(_, value)| value.into_owned());
            format!(
                "download_{}{}",
                sanitize_filename(&id),
                self.compressed_suffix
            )
        });

        ResolvedFilename {
            name,
            source: FilenameSource::FromUrl,
        }
    }

    /// Replaces `guess` with the server-declared filename when the
    /// `Content-Disposition` header carries one. The server name always wins.
    #[must_use]
    pub fn refine_from_metadata(
        &self,
        guess: ResolvedFilename,
        content_disposition: Option<&str>,
    ) -> ResolvedFilename {
        match content_disposition.and_then(parse_content_disposition) {
            Some(name) => ResolvedFilename {
                name: sanitize_filename(&name),
                source: FilenameSource::FromServerMetadata,
            },
            None => guess,
        }
    }

    /// Name of the decompressed sibling of `compressed_name`.
    ///
    /// Strips the trailing compressed suffix; if there is none (or nothing
    /// would be left), appends `.txt` instead.
    #[must_use]
    pub fn decompressed_name(&self, compressed_name: &str) -> String {
        match compressed_name.strip_suffix(self.compressed_suffix.as_str()) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => format!("{compressed_name}{PLAIN_TEXT_SUFFIX}"),
        }
    }

    /// Returns true when `name` looks like a compressed artifact.
    #[must_use]
    pub fn is_compressed(&self, name: &str) -> bool {
        name.ends_with(self.compressed_suffix.as_str())
    }
}

/// Parses a Content-Disposition header value to extract the filename.
///
/// Handles:
/// - `attachment; filename*=UTF-8''example.txt.gz` (RFC 5987, preferred)
/// - `attachment; filename="example.txt.gz"`
/// - `attachment; filename=example.txt.gz`
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(value) = EXTENDED_FILENAME_PARAM
        .captures(header)
        .and_then(|captures| captures.get(1))
    {
        let value = value.as_str().trim();
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find("''")
            && let Ok(decoded) = urlencoding::decode(value[quote_pos + 2..].trim())
        {
            let decoded = decoded.trim_matches(['"', '\'']).trim();
            if !decoded.is_empty() {
                return Some(decoded.to_string());
            }
        }
    }

    let captures = FILENAME_PARAM.captures(header)?;
    let name = captures
        .get(1)?
        .as_str()
        .trim()
        .trim_matches(['"', '\''])
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and rewrites `.`/`..` so the name can never
/// leave the directory it is joined onto.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
