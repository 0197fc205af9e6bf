//! Post-extraction layout fixes.

use std::fs;
use std::path::{Component, Path};
use toolvm_core::Result;
use tracing::debug;

/// If `dest` holds exactly one entry and it is a directory, move that
/// directory's children up into `dest` and remove it.
///
/// A lone directory named by the first component of any `keep` path
/// (for example `bin` from `bin` or `bin/linux`) stays where it is.
/// Returns whether anything was moved.
///
/// # Errors
///
/// Underlying I/O errors.
pub fn flatten_single_top_level_dir(dest: &Path, keep: &[String]) -> Result<bool> {
    let mut entries = fs::read_dir(dest)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.len() != 1 {
        return Ok(false);
    }
    let Some(top) = entries.pop() else {
        return Ok(false);
    };
    if !top.file_type()?.is_dir() {
        return Ok(false);
    }
    let name = top.file_name();
    let kept = keep.iter().any(|path| {
        Path::new(path)
            .components()
            .find(|c| !matches!(c, Component::CurDir))
            .is_some_and(|first| first.as_os_str() == name.as_os_str())
    });
    if kept {
        debug!(dest = %dest.display(), top = %name.to_string_lossy(), "Keeping top-level directory");
        return Ok(false);
    }

    // Rename first so a child sharing the directory's name can move up.
    let staging = dest.join(format!(
        ".flatten-{}",
        top.file_name().to_string_lossy()
    ));
    fs::rename(top.path(), &staging)?;
    for child in fs::read_dir(&staging)? {
        let child = child?;
        fs::rename(child.path(), dest.join(child.file_name()))?;
    }
    fs::remove_dir(&staging)?;
    debug!(
        dest = %dest.display(),
        top = %top.file_name().to_string_lossy(),
        "Flattened single top-level directory"
    );
    Ok(true)
}
