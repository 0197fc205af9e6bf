//! Shallow git checkouts for source builds.

use std::path::Path;
use tokio_util::sync::CancellationToken;
use toolvm_core::Result;
use toolvm_core::ports::{CommandSpec, FileSystem, ProcessRunner, run_checked};
use tracing::info;

/// Check out `git_ref` of `url` into `dest`.
///
/// An existing clone is updated in place with a shallow fetch; otherwise a
/// fresh shallow clone is made.
///
/// # Errors
///
/// [`toolvm_core::Error::Command`] if git fails, or
/// [`toolvm_core::Error::Cancelled`].
pub async fn checkout(
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    url: &str,
    git_ref: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    if fs.exists(&dest.join(".git")) {
        info!(%url, %git_ref, dest = %dest.display(), "Updating git checkout");
        let fetch = CommandSpec::new("git")
            .args(["fetch", "--depth", "1", "origin", git_ref])
            .cwd(dest);
        run_checked(runner, &fetch, cancel).await?;
        let switch = CommandSpec::new("git")
            .args(["checkout", "--force", "FETCH_HEAD"])
            .cwd(dest);
        run_checked(runner, &switch, cancel).await?;
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs.create_dir_all(parent)?;
    }
    info!(%url, %git_ref, dest = %dest.display(), "Cloning");
    let clone = CommandSpec::new("git")
        .args(["clone", "--depth", "1", "--branch", git_ref, url])
        .arg(dest.to_string_lossy());
    run_checked(runner, &clone, cancel).await?;
    Ok(())
}
