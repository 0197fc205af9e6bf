//! Archive extraction.
//!
//! Supports tar+gzip, tar+xz, zip, single-file gzip and raw files. Every
//! entry name is checked with [`safe_join`] before anything touches the
//! disk, and every regular file goes through [`copy_limited`]. Nothing is
//! rolled back on error; callers clear the destination before retrying.

use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use toolvm_core::{ArchiveKind, Error, Result};
use tracing::{debug, trace, warn};

use crate::limits::{ByteBudget, ExtractLimits, copy_limited};
use crate::path::{ensure_no_symlink_ancestor, safe_join};

const DIR_MODE: u32 = 0o755;
const FILE_MODE_MASK: u32 = 0o755;
const OWNER_RW: u32 = 0o600;
const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;
/// Longest symlink target read from a zip entry (`PATH_MAX` on Linux).
const MAX_LINK_TARGET: u64 = 4096;

/// What an extraction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files written.
    pub files: usize,
    /// Directories created.
    pub directories: usize,
    /// Symbolic and hard links created.
    pub links: usize,
    /// Bytes decompressed across all files and zip symlink targets.
    pub bytes: u64,
}

/// Extract `archive_path` into `dest_dir`.
///
/// For [`ArchiveKind::Gzip`] the decompressed file is written to
/// `dest_dir/<archive name without .gz>`; for [`ArchiveKind::Raw`] the file
/// is copied to `dest_dir/<archive name>`.
///
/// # Errors
///
/// [`Error::InvalidArchiveLimits`] for zero ceilings, [`Error::InvalidFilePath`]
/// for entries escaping `dest_dir`, [`Error::ArchiveTooLarge`],
/// [`Error::Archive`] for undecodable input and [`Error::Cancelled`].
pub fn extract(
    kind: ArchiveKind,
    archive_path: &Path,
    dest_dir: &Path,
    limits: ExtractLimits,
    cancel: &CancellationToken,
) -> Result<ExtractSummary> {
    limits.validate()?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    debug!(
        archive = %archive_path.display(),
        dest = %dest_dir.display(),
        %kind,
        "Extracting archive"
    );
    create_dir(dest_dir)?;

    let mut summary = ExtractSummary::default();
    let mut budget = ByteBudget::default();

    match kind {
        ArchiveKind::TarGz => {
            let reader = MultiGzDecoder::new(BufReader::new(File::open(archive_path)?));
            extract_tar(reader, archive_path, dest_dir, limits, &mut budget, cancel, &mut summary)?;
        }
        ArchiveKind::TarXz => {
            let reader = xz2::read::XzDecoder::new(BufReader::new(File::open(archive_path)?));
            extract_tar(reader, archive_path, dest_dir, limits, &mut budget, cancel, &mut summary)?;
        }
        ArchiveKind::Zip => {
            extract_zip(archive_path, dest_dir, limits, &mut budget, cancel, &mut summary)?;
        }
        ArchiveKind::Gzip | ArchiveKind::Raw => {
            let name = single_file_name(kind, archive_path)?;
            let target = safe_join(dest_dir, Path::new(&name))?;
            let mut reader: Box<dyn Read> = if kind == ArchiveKind::Gzip {
                Box::new(MultiGzDecoder::new(BufReader::new(File::open(archive_path)?)))
            } else {
                Box::new(BufReader::new(File::open(archive_path)?))
            };
            write_file(&mut *reader, &target, &name, None, limits, &mut budget).map_err(
                |e| match e {
                    Error::Io(io) if kind == ArchiveKind::Gzip => {
                        Error::archive(archive_path, io.to_string())
                    }
                    other => other,
                },
            )?;
            summary.files = 1;
        }
    }

    summary.bytes = budget.written();
    debug!(
        files = summary.files,
        directories = summary.directories,
        links = summary.links,
        bytes = summary.bytes,
        "Extraction complete"
    );
    Ok(summary)
}

/// Run [`extract`] on the blocking thread pool.
///
/// # Errors
///
/// Everything [`extract`] returns, plus [`Error::Archive`] if the worker
/// task panics.
pub async fn extract_async(
    kind: ArchiveKind,
    archive_path: PathBuf,
    dest_dir: PathBuf,
    limits: ExtractLimits,
    cancel: CancellationToken,
) -> Result<ExtractSummary> {
    let path_for_error = archive_path.clone();
    tokio::task::spawn_blocking(move || extract(kind, &archive_path, &dest_dir, limits, &cancel))
        .await
        .map_err(|e| Error::archive(path_for_error, format!("extraction task failed: {e}")))?
}

fn single_file_name(kind: ArchiveKind, archive_path: &Path) -> Result<String> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::archive(archive_path, "archive path has no file name"))?;
    let stripped = kind.strip_extension(name);
    if stripped.is_empty() {
        return Err(Error::archive(archive_path, "cannot derive output file name"));
    }
    Ok(stripped.to_string())
}

fn extract_tar<R: Read>(
    reader: R,
    archive_path: &Path,
    dest_dir: &Path,
    limits: ExtractLimits,
    budget: &mut ByteBudget,
    cancel: &CancellationToken,
    summary: &mut ExtractSummary,
) -> Result<()> {
    let decode = |e: std::io::Error| Error::archive(archive_path, e.to_string());
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().map_err(decode)? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entry = entry.map_err(decode)?;
        let stored = entry.path().map_err(decode)?.into_owned();
        let name = stored.display().to_string();
        let target = safe_join(dest_dir, &stored)?;
        ensure_no_symlink_ancestor(dest_dir, &target, &name)?;

        let entry_type = entry.header().entry_type();
        trace!(entry = %name, ?entry_type, "Processing tar entry");

        if entry_type.is_dir() {
            create_dir(&target)?;
            summary.directories += 1;
        } else if entry_type.is_file() || entry_type.is_contiguous() {
            let mode = entry.header().mode().ok();
            write_file(&mut entry, &target, &name, mode, limits, budget).map_err(|e| match e {
                Error::Io(io) if io.kind() == std::io::ErrorKind::InvalidData => decode(io),
                other => other,
            })?;
            summary.files += 1;
        } else if entry_type.is_symlink() {
            let link = entry
                .link_name()
                .map_err(decode)?
                .ok_or_else(|| Error::archive(archive_path, format!("symlink {name} has no target")))?;
            create_symlink(&link, &target)?;
            summary.links += 1;
        } else if entry_type.is_hard_link() {
            let link = entry
                .link_name()
                .map_err(decode)?
                .ok_or_else(|| Error::archive(archive_path, format!("hard link {name} has no target")))?;
            let source = safe_join(dest_dir, &link)?;
            ensure_no_symlink_ancestor(dest_dir, &source, &link.display().to_string())?;
            create_parent(&target)?;
            remove_non_dir(&target)?;
            fs::hard_link(&source, &target)?;
            summary.links += 1;
        } else {
            debug!(entry = %name, ?entry_type, "Skipping unsupported tar entry");
        }
    }
    Ok(())
}

fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    limits: ExtractLimits,
    budget: &mut ByteBudget,
    cancel: &CancellationToken,
    summary: &mut ExtractSummary,
) -> Result<()> {
    let decode = |e: zip::result::ZipError| Error::archive(archive_path, e.to_string());
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_path)?)).map_err(decode)?;

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut file = archive.by_index(index).map_err(decode)?;
        let name = file.name().to_string();
        let target = safe_join(dest_dir, Path::new(&name))?;
        ensure_no_symlink_ancestor(dest_dir, &target, &name)?;
        let mode = file.unix_mode();
        trace!(entry = %name, ?mode, "Processing zip entry");

        if file.is_dir() {
            create_dir(&target)?;
            summary.directories += 1;
        } else if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let link_limits = ExtractLimits::new(
                limits.max_file_size.min(MAX_LINK_TARGET),
                limits.max_total_size,
            );
            let mut link = Vec::new();
            copy_limited(&mut file, &mut link, &name, link_limits, budget)?;
            let link = String::from_utf8(link).map_err(|_| {
                Error::archive(archive_path, format!("symlink {name} target is not UTF-8"))
            })?;
            create_symlink(Path::new(&link), &target)?;
            summary.links += 1;
        } else {
            write_file(&mut file, &target, &name, mode, limits, budget)?;
            summary.files += 1;
        }
    }
    Ok(())
}

fn write_file<R: Read + ?Sized>(
    reader: &mut R,
    target: &Path,
    entry: &str,
    mode: Option<u32>,
    limits: ExtractLimits,
    budget: &mut ByteBudget,
) -> Result<u64> {
    create_parent(target)?;
    remove_non_dir(target)?;
    let file = File::create(target)?;
    let written = copy_limited(reader, file, entry, limits, budget)?;
    if let Some(mode) = mode {
        set_mode(target, (mode & FILE_MODE_MASK) | OWNER_RW)?;
    }
    trace!(path = %target.display(), bytes = written, "Wrote file");
    Ok(written)
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => create_dir(parent),
        None => Ok(()),
    }
}

fn remove_non_dir(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => Ok(fs::remove_file(path)?),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if path.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> Result<()> {
    let _ = DIR_MODE;
    fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, at: &Path) -> Result<()> {
    create_parent(at)?;
    remove_non_dir(at)?;
    std::os::unix::fs::symlink(link_target, at)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_symlink(link_target: &Path, at: &Path) -> Result<()> {
    warn!(
        link = %at.display(),
        target = %link_target.display(),
        "Symlinks are not supported on this platform; skipping"
    );
    Ok(())
}

/// Mark a file executable (`0o755`).
///
/// # Errors
///
/// Underlying I/O errors.
pub fn make_executable(path: &Path) -> Result<()> {
    set_mode(path, 0o755).inspect_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to mark file executable");
    })
}
