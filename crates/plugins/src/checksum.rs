//! SHA-256 digests and published checksum files.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use toolvm_core::Result;

/// Hex SHA-256 of a file, streamed.
///
/// # Errors
///
/// I/O errors reading the file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Find the digest for `file_name` in a checksum file.
///
/// Accepts `sha256sum` output (`<hex>  <name>` or `<hex> *<name>`, one per
/// line) and single-digest files containing only `<hex>`. The result is
/// lowercased.
#[must_use]
pub fn find_checksum(content: &str, file_name: &str) -> Option<String> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let lone: Vec<&str> = content.split_whitespace().collect();
    if let [digest] = lone.as_slice() {
        return is_sha256_hex(digest).then(|| digest.to_ascii_lowercase());
    }

    lines.find_map(|line| {
        let (digest, name) = line.split_once(char::is_whitespace)?;
        let name = name.trim_start().trim_start_matches('*');
        let name = name.strip_prefix("./").unwrap_or(name);
        (name == file_name && is_sha256_hex(digest)).then(|| digest.to_ascii_lowercase())
    })
}
