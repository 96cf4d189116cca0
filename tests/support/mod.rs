//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::io::Write;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

/// Gzip-compresses `data` in memory.
pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// A temp root with `downloads/` and `extracted/` created inside it.
pub struct Workspace {
    pub root: TempDir,
    pub downloads: PathBuf,
    pub extracted: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let downloads = root.path().join("downloads");
        let extracted = root.path().join("extracted");
        std::fs::create_dir_all(&downloads).expect("create downloads dir");
        std::fs::create_dir_all(&extracted).expect("create extracted dir");
        Self {
            root,
            downloads,
            extracted,
        }
    }
}
