//! Application configuration: config file loading and CLI layering.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bulkfetch_core::{DEFAULT_CONCURRENCY, ProxyConfig, TransferSession};

use crate::cli::Args;

const DEFAULT_LINKS_FILE: &str = "links.txt";
const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";
const DEFAULT_EXTRACT_DIR: &str = "./extracted";

/// File configuration for bulkfetch defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Default link list.
    pub links_file: Option<PathBuf>,
    /// Default directory for compressed downloads.
    pub download_dir: Option<PathBuf>,
    /// Default directory for decompressed files.
    pub extract_dir: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Per-transfer timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Delay before each request in seconds.
    pub request_delay_secs: Option<u64>,
    /// Honor proxy settings from the environment.
    pub trust_env: Option<bool>,
    /// Proxy for http:// links.
    pub proxy_http: Option<String>,
    /// Proxy for https:// links.
    pub proxy_https: Option<String>,
    /// `cookie.<name> = "value"` entries.
    pub cookies: BTreeMap<String, String>,
    /// `header.<name> = "value"` entries.
    pub headers: BTreeMap<String, String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=16).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=16");
        }
        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        if let Some(delay) = self.request_delay_secs
            && delay > 60
        {
            bail!("Invalid config value for `request_delay_secs`: {delay}. Expected range: 0..=60");
        }
        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path the config was looked up at, if any.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bulkfetch/config.toml`
/// 2. `$HOME/.config/bulkfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bulkfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bulkfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` if given (it must exist), else from the
/// default path if a file is present there.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "links_file" => {
                cfg.links_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "download_dir" => {
                cfg.download_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "extract_dir" => {
                cfg.extract_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "request_delay_secs" => {
                cfg.request_delay_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "trust_env" => {
                cfg.trust_env = Some(parse_boolean(value).with_context(invalid)?);
            }
            "proxy_http" => {
                cfg.proxy_http = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "proxy_https" => {
                cfg.proxy_https = Some(parse_string_literal(value).with_context(invalid)?);
            }
            other => {
                if let Some(name) = prefixed_name(other, "cookie.") {
                    let parsed = parse_string_literal(value).with_context(invalid)?;
                    cfg.cookies.insert(name.to_string(), parsed);
                } else if let Some(name) = prefixed_name(other, "header.") {
                    let parsed = parse_string_literal(value).with_context(invalid)?;
                    cfg.headers.insert(name.to_string(), parsed);
                } else {
                    bail!("Unknown configuration key: '{other}' on line {line_no}");
                }
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn prefixed_name<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|name| !name.is_empty())
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

/// Fully resolved settings for one run: CLI over config file over defaults.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub links_file: PathBuf,
    pub download_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub concurrency: usize,
    pub session: TransferSession,
}

/// Merges CLI arguments over the file config over built-in defaults.
///
/// Cookies and headers from both layers are combined; the CLI wins per name.
/// Configured headers replace the browser defaults of the same name.
pub fn resolve_settings(args: &Args, file: Option<&FileConfig>) -> RunSettings {
    let file = file.cloned().unwrap_or_default();
    let defaults = TransferSession::default();

    let mut cookies = file.cookies;
    cookies.extend(args.cookies.iter().cloned());

    let mut headers = defaults.headers;
    for (name, value) in file.headers.into_iter().chain(args.headers.iter().cloned()) {
        // Header names are case-insensitive; drop a default spelled differently.
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        headers.insert(name, value);
    }

    let proxy = ProxyConfig {
        http: args.proxy_http.clone().or(file.proxy_http),
        https: args.proxy_https.clone().or(file.proxy_https),
    };

    let session = TransferSession {
        cookies,
        headers,
        proxy: (!proxy.is_empty()).then_some(proxy),
        trust_env: args.trust_env || file.trust_env.unwrap_or(false),
        timeout: args
            .timeout
            .or(file.timeout_secs)
            .map_or(defaults.timeout, Duration::from_secs),
        request_delay: args
            .delay
            .or(file.request_delay_secs)
            .map_or(defaults.request_delay, Duration::from_secs),
    };

    RunSettings {
        links_file: args
            .links_file
            .clone()
            .or(file.links_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LINKS_FILE)),
        download_dir: args
            .download_dir
            .clone()
            .or(file.download_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
        extract_dir: args
            .extract_dir
            .clone()
            .or(file.extract_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXTRACT_DIR)),
        concurrency: args
            .concurrency
            .or(file.concurrency)
            .map_or(DEFAULT_CONCURRENCY, usize::from),
        session,
    }
}
