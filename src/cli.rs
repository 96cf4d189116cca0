//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Bulk-download compressed data files and decompress them.
///
/// Bulkfetch reads a list of links, downloads every file concurrently under
/// the name the server declares, skips files already on disk, and extracts
/// each artifact next to the others.
///
/// Options left unset fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Newline-delimited list of URLs [default: links.txt]
    #[arg(value_name = "LINKS_FILE")]
    pub links_file: Option<PathBuf>,

    /// Directory for compressed downloads [default: ./downloads]
    #[arg(short = 'd', long)]
    pub download_dir: Option<PathBuf>,

    /// Directory for decompressed files [default: ./extracted]
    #[arg(short = 'x', long)]
    pub extract_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-16) [default: 2]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Per-transfer timeout in seconds (1-3600) [default: 120]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Delay before each request in seconds (0-60) [default: 2]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(0..=60))]
    pub delay: Option<u64>,

    /// Session cookie sent with every request (repeatable)
    #[arg(long = "cookie", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub cookies: Vec<(String, String)>,

    /// Extra request header, overriding the browser defaults (repeatable)
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    /// Proxy for http:// links
    #[arg(long, value_name = "URL")]
    pub proxy_http: Option<String>,

    /// Proxy for https:// links
    #[arg(long, value_name = "URL")]
    pub proxy_https: Option<String>,

    /// Honor proxy settings from the environment
    #[arg(long)]
    pub trust_env: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
