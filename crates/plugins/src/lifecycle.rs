//! Install steps shared by both strategies.

use std::path::Path;
use tokio_util::sync::CancellationToken;
use toolvm_core::plugin::verify_expected_artifacts;
use toolvm_core::{PluginSpec, Result};
use tracing::{debug, info};

use crate::context::PluginContext;
use crate::default_packages::install_default_packages;
use crate::hooks::{Hook, HookContext, run_hook};

/// Whether `install_path` already holds a verified install.
pub(crate) fn already_installed(spec: &PluginSpec, ctx: &PluginContext, install_path: &Path) -> bool {
    let expected = &spec.config().expected_artifacts;
    let done = ctx.fs.exists(install_path)
        && verify_expected_artifacts(ctx.fs.as_ref(), install_path, expected).is_ok();
    if done {
        info!(tool = spec.name(), path = %install_path.display(), "Already installed");
    }
    done
}

/// Clear whatever a previous attempt left and create an empty install root.
pub(crate) fn reset_install_root(ctx: &PluginContext, install_path: &Path) -> Result<()> {
    if ctx.fs.exists(install_path) {
        debug!(path = %install_path.display(), "Clearing previous install");
        ctx.fs.remove_dir_all(install_path)?;
    }
    ctx.fs.create_dir_all(install_path)
}

/// Post-install hook, default packages, then verification.
pub(crate) struct Finish<'a> {
    pub spec: &'a PluginSpec,
    pub ctx: &'a PluginContext,
    pub post_install: Option<&'a Hook>,
    pub version: &'a str,
    pub source_dir: &'a Path,
    pub download_path: &'a Path,
    pub install_path: &'a Path,
}

impl Finish<'_> {
    pub(crate) fn hook_context(&self, cancel: &CancellationToken) -> HookContext {
        HookContext {
            tool: self.spec.name().to_string(),
            version: self.version.to_string(),
            source_dir: self.source_dir.to_path_buf(),
            install_path: self.install_path.to_path_buf(),
            download_path: self.download_path.to_path_buf(),
            runner: self.ctx.runner.clone(),
            cancel: cancel.clone(),
        }
    }

    pub(crate) async fn run(self, cancel: &CancellationToken) -> Result<()> {
        if let Some(hook) = self.post_install {
            run_hook("post-install", hook, self.hook_context(cancel)).await?;
        }
        if let Some(packages) = &self.spec.config().default_packages {
            install_default_packages(self.spec.name(), packages, self.install_path, self.ctx, cancel)
                .await?;
        }
        verify_expected_artifacts(
            self.ctx.fs.as_ref(),
            self.install_path,
            &self.spec.config().expected_artifacts,
        )?;
        info!(
            tool = self.spec.name(),
            version = self.version,
            path = %self.install_path.display(),
            "Installed"
        );
        Ok(())
    }
}
