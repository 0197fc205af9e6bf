//! Lexical containment checks for archive entry names.

use std::path::{Component, Path, PathBuf};

use toolvm_core::{Error, Result};

/// Join an archive entry name onto `root`, refusing anything that resolves
/// outside it.
///
/// Resolution is purely lexical: `.` is dropped and `..` pops a component.
/// Absolute names and drive prefixes are rejected outright. The result is
/// `root` itself or a path below it.
///
/// # Errors
///
/// [`Error::InvalidFilePath`] naming the stored entry.
pub fn safe_join(root: &Path, entry: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in entry.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Error::invalid_file_path(entry.display().to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_file_path(entry.display().to_string()));
            }
        }
    }
    Ok(parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p)))
}

/// Refuse to write through a symlink created earlier in the same archive.
///
/// Walks every existing ancestor of `target` strictly below `root`.
///
/// # Errors
///
/// [`Error::InvalidFilePath`] if an ancestor is a symlink.
pub fn ensure_no_symlink_ancestor(root: &Path, target: &Path, entry: &str) -> Result<()> {
    let Ok(relative) = target.strip_prefix(root) else {
        return Err(Error::invalid_file_path(entry));
    };
    let mut current = root.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if std::fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(Error::invalid_file_path(entry));
        }
    }
    Ok(())
}
