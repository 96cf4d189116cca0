//! CLI entry point for the bulkfetch tool.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bulkfetch_core::{
    DownloadEngine, DownloadStats, DownloadWorker, Extractor, FileLinkSource, LinkSource,
    ResumeReport, ResumeScanner, RunSummary, TaskStatus, TransferClient,
};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

mod app_config;
mod cli;
mod progress_ui;

use app_config::{load_config, resolve_settings};
use cli::Args;
use progress_ui::{spawn_progress_ui, stop_progress_ui};

/// Process outcome, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// No task failed.
    Success,
    /// Some tasks failed, others succeeded.
    Partial,
    /// Every task failed.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(1),
            ProcessExit::Failure => ExitCode::from(2),
        }
    }
}

/// Determines the process exit outcome from completed and failed task counts.
fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Machine-readable run report written by `--summary-json`.
#[derive(Debug, Serialize)]
struct SummaryReport<'a> {
    downloaded: usize,
    skipped: usize,
    extract_failed: usize,
    failed: usize,
    total: usize,
    elapsed_secs: f64,
    download_dir: &'a Path,
    extract_dir: &'a Path,
    resume: &'a ResumeReport,
    run: &'a RunSummary,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let outcome = run(&args).await?;
    Ok(outcome.into())
}

async fn run(args: &Args) -> Result<ProcessExit> {
    let loaded = load_config(args.config.as_deref())?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        info!(path = %path.display(), "Loaded config file");
    }
    let mut settings = resolve_settings(args, loaded.config.as_ref());

    let links = FileLinkSource::new(&settings.links_file)
        .links()
        .await
        .context("Failed to load link list")?;
    info!(
        links = links.len(),
        file = %settings.links_file.display(),
        "Bulkfetch starting"
    );

    if let Some(first) = links.first()
        && settings.session.default_referer_from(first)
    {
        debug!(link = %first, "Referer derived from first link");
    }

    for dir in [&settings.download_dir, &settings.extract_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
    }

    let extractor = Extractor::new(&settings.extract_dir);
    let resume = ResumeScanner::new(extractor.clone())
        .scan_and_extract(&settings.download_dir)
        .await;
    if resume.scanned() > 0 {
        info!(
            extracted = resume.extracted.len(),
            failed = resume.failed.len(),
            "Extracted artifacts from a previous run"
        );
    }

    let client = TransferClient::new(Arc::new(settings.session.clone()))
        .context("Failed to configure HTTP client")?;
    let worker = DownloadWorker::new(client, extractor, &settings.download_dir);
    let engine = DownloadEngine::new(settings.concurrency, worker)?;

    let stats = Arc::new(DownloadStats::new());
    let use_spinner = !args.no_progress && !args.quiet && io::stderr().is_terminal();
    let (spinner, stop) = spawn_progress_ui(use_spinner, Arc::clone(&stats), links.len());
    let summary = engine.run_with_stats(links, stats).await;
    stop_progress_ui(spinner, &stop).await;
    let summary = summary?;

    print_summary(&summary, &settings.extract_dir);

    if let Some(path) = &args.summary_json {
        let report = SummaryReport {
            downloaded: summary.downloaded(),
            skipped: summary.skipped(),
            extract_failed: summary.extract_failed(),
            failed: summary.failed(),
            total: summary.total(),
            elapsed_secs: summary.elapsed.as_secs_f64(),
            download_dir: &settings.download_dir,
            extract_dir: &settings.extract_dir,
            resume: &resume,
            run: &summary,
        };
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write summary to '{}'", path.display()))?;
        info!(path = %path.display(), "Summary written");
    }

    let failed = summary.failed() + summary.extract_failed();
    let completed = summary.downloaded() + summary.skipped();
    Ok(determine_exit_outcome(completed, failed))
}

fn print_summary(summary: &RunSummary, extract_dir: &Path) {
    println!(
        "Done: {} downloaded, {} skipped, {} extract failed, {} failed ({} total) in {:.1}s",
        summary.downloaded(),
        summary.skipped(),
        summary.extract_failed(),
        summary.failed(),
        summary.total(),
        summary.elapsed.as_secs_f64(),
    );

    for task in summary.failures() {
        let reason = match &task.status {
            TaskStatus::Failed(reason) | TaskStatus::ExtractFailed(reason) => reason.as_str(),
            _ => "",
        };
        println!("  FAILED {}: {}", task.url, reason);
    }

    println!("Extracted files are in {}", extract_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        assert_eq!(determine_exit_outcome(3, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_success_when_zero_completed_zero_failed() {
        assert_eq!(determine_exit_outcome(0, 0), ProcessExit::Success);
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(determine_exit_outcome(2, 1), ProcessExit::Partial);
    }

    #[test]
    fn test_exit_outcome_failure_when_all_failed() {
        assert_eq!(determine_exit_outcome(0, 2), ProcessExit::Failure);
    }
}
