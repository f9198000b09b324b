//! CRC32 checksum computation for log records and snapshot blobs
//!
//! Every persisted record carries a checksum over its length prefix, index
//! and payload. Any mismatch is corruption.

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Formats a checksum the way manifests store it (`crc32:xxxxxxxx`).
pub fn format_checksum(checksum: u32) -> String {
    format!("crc32:{:08x}", checksum)
}

/// Parses a `crc32:xxxxxxxx` string back into a checksum value.
pub fn parse_checksum(s: &str) -> Option<u32> {
    let hex = s.strip_prefix("crc32:")?;
    u32::from_str_radix(hex, 16).ok()
}
