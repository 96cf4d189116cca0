//! Shared helpers for unit tests that need a local HTTP server or gzip fixtures.

#[path = "../../tests/support/socket_guard.rs"]
pub(crate) mod socket_guard;

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Gzip-compresses `data` in memory.
pub(crate) fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .unwrap_or_else(|e| panic!("gzip fixture write failed: {e}"));
    encoder
        .finish()
        .unwrap_or_else(|e| panic!("gzip fixture finish failed: {e}"))
}
