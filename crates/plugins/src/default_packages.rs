//! Packages installed into a freshly installed tool.

use std::path::Path;
use tokio_util::sync::CancellationToken;
use toolvm_core::config::DefaultPackages;
use toolvm_core::ports::{CommandSpec, run_checked};
use toolvm_core::{Error, Result};
use tracing::{info, warn};

use crate::context::PluginContext;

/// Package names from a default-packages file.
///
/// One package per line; `#` starts a comment; blank lines are ignored.
#[must_use]
pub fn parse_package_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(before, _)| before).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Install every listed package with the tool's own installer program.
///
/// A missing file and individual package failures are logged and skipped.
/// Returns the number of packages installed.
///
/// # Errors
///
/// Only [`Error::Cancelled`].
pub async fn install_default_packages(
    tool: &str,
    packages: &DefaultPackages,
    install_path: &Path,
    ctx: &PluginContext,
    cancel: &CancellationToken,
) -> Result<usize> {
    let content = match ctx.fs.read_to_string(&packages.file) {
        Ok(content) => content,
        Err(e) => {
            warn!(%tool, file = %packages.file.display(), error = %e, "Skipping default packages");
            return Ok(0);
        }
    };

    let program = install_path.join(&packages.program);
    let mut installed = 0;
    for package in parse_package_list(&content) {
        let command = CommandSpec::new(program.to_string_lossy())
            .args(&packages.args)
            .arg(&package)
            .cwd(install_path);
        match run_checked(ctx.runner.as_ref(), &command, cancel).await {
            Ok(_) => {
                info!(%tool, %package, "Installed default package");
                installed += 1;
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => warn!(%tool, %package, error = %e, "Default package failed"),
        }
    }
    Ok(installed)
}
