//! Build and post-install hooks.
//!
//! A hook is an async callback receiving a [`HookContext`]. Source-build
//! plugins require a build hook; either strategy may run a post-install
//! hook after extraction or build and before verification.

use futures::future::BoxFuture;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{CommandSpec, ProcessRunner, run_checked};
use toolvm_core::{Error, Result};
use tracing::{debug, info};

/// Everything a hook may need.
#[derive(Clone)]
pub struct HookContext {
    /// Tool name.
    pub tool: String,
    /// Version being installed.
    pub version: String,
    /// Extracted or cloned source tree (the install path for binary plugins).
    pub source_dir: PathBuf,
    /// Install root.
    pub install_path: PathBuf,
    /// Download directory of this version.
    pub download_path: PathBuf,
    /// Subprocess runner.
    pub runner: Arc<dyn ProcessRunner>,
    /// Cancellation for the whole operation.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for HookContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("tool", &self.tool)
            .field("version", &self.version)
            .field("source_dir", &self.source_dir)
            .field("install_path", &self.install_path)
            .finish_non_exhaustive()
    }
}

impl HookContext {
    /// Run a command in the source directory, failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// [`Error::Command`] or [`Error::Cancelled`].
    pub async fn run(&self, command: CommandSpec) -> Result<()> {
        let command = if command.cwd.is_some() {
            command
        } else {
            command.cwd(&self.source_dir)
        };
        run_checked(self.runner.as_ref(), &command, &self.cancel).await?;
        Ok(())
    }
}

/// A hook callback.
pub type Hook = Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`Hook`].
pub fn hook_fn<F, Fut>(f: F) -> Hook
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: HookContext| -> BoxFuture<'static, Result<()>> { Box::pin(f(ctx)) })
}

/// The conventional `./configure --prefix=<install> && make && make install`
/// build.
#[must_use]
pub fn configure_make_hook() -> Hook {
    hook_fn(|ctx: HookContext| async move {
        let prefix = format!("--prefix={}", ctx.install_path.display());
        ctx.run(CommandSpec::new("./configure").arg(prefix)).await?;
        ctx.run(CommandSpec::new("make")).await?;
        ctx.run(CommandSpec::new("make").arg("install")).await
    })
}

/// Run `hook`, reporting failures as [`Error::Hook`].
///
/// Cancellation is passed through unchanged.
///
/// # Errors
///
/// [`Error::Cancelled`] or [`Error::Hook`] wrapping the hook's error.
pub async fn run_hook(kind: &'static str, hook: &Hook, ctx: HookContext) -> Result<()> {
    let tool = ctx.tool.clone();
    let cancel = ctx.cancel.clone();
    info!(%tool, version = %ctx.version, hook = kind, "Running hook");

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = hook(ctx) => result,
    };
    match result {
        Ok(()) => {
            debug!(%tool, hook = kind, "Hook finished");
            Ok(())
        }
        Err(e @ (Error::Cancelled | Error::Hook { .. })) => Err(e),
        Err(other) => Err(Error::hook(kind, tool, other.to_string())),
    }
}
