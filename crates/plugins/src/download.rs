//! Cached, optionally checksum-verified artifact downloads.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::HttpRequest;
use toolvm_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::checksum::{find_checksum, sha256_file};
use crate::context::PluginContext;

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Download `url` to `dest` unless a usable copy is already there.
///
/// An existing file is reused when it is larger than `min_size` bytes and,
/// if `expected_sha256` is given, matches it. New downloads land in a
/// `.part` sibling and are renamed into place only once complete and
/// verified. Returns whether a download happened.
///
/// # Errors
///
/// [`Error::DownloadFailed`], [`Error::Transport`],
/// [`Error::ChecksumMismatch`], [`Error::Cancelled`] or filesystem errors.
pub async fn fetch(
    ctx: &PluginContext,
    url: &str,
    dest: &Path,
    min_size: u64,
    expected_sha256: Option<&str>,
    cancel: &CancellationToken,
) -> Result<bool> {
    if let Some(size) = ctx.fs.file_size(dest).filter(|size| *size > min_size) {
        match expected_sha256 {
            None => {
                debug!(path = %dest.display(), size, "Using cached download");
                return Ok(false);
            }
            Some(expected) if sha256_file(dest)?.eq_ignore_ascii_case(expected) => {
                debug!(path = %dest.display(), size, "Using verified cached download");
                return Ok(false);
            }
            Some(_) => warn!(path = %dest.display(), "Cached download fails checksum, downloading again"),
        }
    }

    if let Some(parent) = dest.parent() {
        ctx.fs.create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    ctx.fs.remove_file(&partial)?;

    info!(%url, dest = %dest.display(), "Downloading");
    let bytes = ctx.http.download(url, &partial, cancel).await?;

    if let Some(expected) = expected_sha256 {
        let actual = sha256_file(&partial)?;
        if !actual.eq_ignore_ascii_case(expected) {
            ctx.fs.remove_file(&partial)?;
            return Err(Error::ChecksumMismatch {
                file: file_label(dest),
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }
        debug!(path = %dest.display(), "Checksum verified");
    }

    ctx.fs.rename(&partial, dest)?;
    debug!(path = %dest.display(), bytes, "Download complete");
    Ok(true)
}

/// Fetch a published checksum file and pick the digest for `file_name`.
///
/// # Errors
///
/// [`Error::DownloadFailed`] for non-success responses, transport errors,
/// or a configuration error when the file lists no digest for `file_name`.
pub async fn published_checksum(
    ctx: &PluginContext,
    checksum_url: &str,
    file_name: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let response = ctx.http.get(&HttpRequest::get(checksum_url), cancel).await?;
    if !response.is_success() {
        return Err(Error::DownloadFailed {
            url: checksum_url.to_string(),
            status: response.status,
        });
    }
    let content = String::from_utf8_lossy(&response.body);
    find_checksum(&content, file_name).ok_or_else(|| {
        Error::configuration(format!("{checksum_url} lists no SHA-256 digest for {file_name}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/dl/jq/1.7/jq.tar.gz")),
            PathBuf::from("/dl/jq/1.7/jq.tar.gz.part")
        );
    }
}
