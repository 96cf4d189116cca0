//! End-to-end CLI tests for the bulkfetch binary.

#![allow(deprecated)]

mod support;

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use support::socket_guard::start_mock_server_or_skip;
use support::{Workspace, gzip_bytes};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A command isolated from the user's config and terminal.
fn bulkfetch(ws: &Workspace) -> Command {
    let config_home = ws.root.path().join("xdg-config");
    std::fs::create_dir_all(&config_home).unwrap();
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.current_dir(ws.root.path())
        .env("XDG_CONFIG_HOME", &config_home)
        .env_remove("RUST_LOG")
        .arg("--no-progress")
        .arg("--delay")
        .arg("0")
        .arg("-d")
        .arg(&ws.downloads)
        .arg("-x")
        .arg(&ws.extracted);
    cmd
}

fn write_links(ws: &Workspace, links: &[String]) -> PathBuf {
    let path = ws.root.path().join("links.txt");
    std::fs::write(&path, links.join("\n\n")).unwrap();
    path
}

async fn mount_gz(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_bytes(body)))
        .mount(server)
        .await;
}

fn exit_code(cmd: &mut Command) -> Option<i32> {
    cmd.output().unwrap().status.code()
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bulk-download compressed data files"))
        .stdout(predicate::str::contains("--concurrency"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bulkfetch"));
}

#[test]
fn test_binary_rejects_out_of_range_concurrency() {
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.args(["-c", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_missing_links_file_is_startup_error() {
    let ws = Workspace::new();
    bulkfetch(&ws)
        .arg(ws.root.path().join("absent.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load link list"));
}

#[test]
fn test_binary_invalid_config_file_is_startup_error() {
    let ws = Workspace::new();
    let config = ws.root.path().join("bad.toml");
    std::fs::write(&config, "concurrency = 99\n").unwrap();
    let links = write_links(&ws, &[]);
    bulkfetch(&ws)
        .arg("--config")
        .arg(&config)
        .arg(&links)
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_empty_link_list_succeeds_and_resumes_leftovers() {
    let ws = Workspace::new();
    std::fs::write(ws.downloads.join("old.txt.gz"), gzip_bytes(b"leftover")).unwrap();
    let links = write_links(&ws, &[]);

    bulkfetch(&ws)
        .arg(&links)
        .assert()
        .success()
        .stdout(predicate::str::contains("Extracted files are in"));

    assert_eq!(
        std::fs::read(ws.extracted.join("old.txt")).unwrap(),
        b"leftover"
    );
}

#[tokio::test]
async fn test_binary_all_success_exits_zero_and_writes_summary() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gz(&mock_server, "/a.txt.gz", b"alpha").await;
    mount_gz(&mock_server, "/b.txt.gz", b"beta").await;

    let ws = Workspace::new();
    let links = write_links(
        &ws,
        &[
            format!("{}/a.txt.gz", mock_server.uri()),
            format!("{}/b.txt.gz", mock_server.uri()),
        ],
    );
    let summary_path = ws.root.path().join("summary.json");

    bulkfetch(&ws)
        .arg(&links)
        .arg("--summary-json")
        .arg(&summary_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 downloaded"));

    assert_eq!(std::fs::read(ws.extracted.join("a.txt")).unwrap(), b"alpha");
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["downloaded"], 2);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["run"]["tasks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_binary_exit_code_partial_success_is_one() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gz(&mock_server, "/ok.txt.gz", b"ok").await;
    Mock::given(method("GET"))
        .and(path("/fail.txt.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let ws = Workspace::new();
    let links = write_links(
        &ws,
        &[
            format!("{}/ok.txt.gz", mock_server.uri()),
            format!("{}/fail.txt.gz", mock_server.uri()),
        ],
    );

    let mut cmd = bulkfetch(&ws);
    cmd.arg("-q").arg(&links);
    assert_eq!(exit_code(&mut cmd), Some(1), "partial success must yield exit code 1");
    assert!(ws.downloads.join("fail.txt.gz_error_404.html").exists());
}

#[tokio::test]
async fn test_binary_exit_code_all_failed_is_two() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let ws = Workspace::new();
    let links = write_links(&ws, &[format!("{}/x.txt.gz", mock_server.uri())]);

    let mut cmd = bulkfetch(&ws);
    cmd.arg(&links);
    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAILED"), "stdout should list failures: {stdout}");
}

#[tokio::test]
async fn test_binary_uses_links_txt_in_working_directory_by_default() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_gz(&mock_server, "/default.txt.gz", b"default").await;

    let ws = Workspace::new();
    write_links(&ws, &[format!("{}/default.txt.gz", mock_server.uri())]);

    bulkfetch(&ws).assert().success();
    assert!(ws.extracted.join("default.txt").exists());
}

#[test]
fn test_binary_corrupt_leftover_counts_as_failure() {
    let ws = Workspace::new();
    std::fs::write(ws.downloads.join("download_5.gz"), b"\x1f\x8b\x08truncated").unwrap();
    // Nothing listens on port 9; the task must never reach the network.
    let links = write_links(&ws, &["http://127.0.0.1:9/?download=5".to_string()]);

    let mut cmd = bulkfetch(&ws);
    cmd.arg(&links);
    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 extract failed"), "stdout: {stdout}");
    assert!(ws.downloads.join("download_5.gz").exists());
}
