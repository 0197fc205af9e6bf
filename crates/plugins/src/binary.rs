//! Prebuilt-binary strategy.
//!
//! Downloads the release artifact the locator names for the host and
//! unpacks it into the install root. Multi-file archives are extracted
//! (optionally flattening a single top-level directory); compressed or raw
//! single binaries are placed at `binary_path` and marked executable.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use toolvm_archive::{extract_async, flatten_single_top_level_dir, make_executable};
use toolvm_core::plugin::{Strategy, probe_state, verify_expected_artifacts};
use toolvm_core::{ArtifactDescriptor, InstallState, Plugin, PluginInfo, PluginSpec, Result};
use tracing::{debug, info};

use crate::context::PluginContext;
use crate::download::{fetch, published_checksum};
use crate::hooks::Hook;
use crate::lifecycle::{Finish, already_installed, reset_install_root};
use crate::versions::{list_versions, resolve_latest};

/// A tool installed from prebuilt release artifacts.
#[derive(Clone)]
pub struct BinaryPlugin {
    spec: PluginSpec,
    ctx: PluginContext,
    post_install: Option<Hook>,
}

impl std::fmt::Debug for BinaryPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryPlugin")
            .field("name", &self.spec.name())
            .field("post_install", &self.post_install.is_some())
            .finish_non_exhaustive()
    }
}

impl BinaryPlugin {
    /// Create a plugin for `spec`.
    #[must_use]
    pub const fn new(spec: PluginSpec, ctx: PluginContext) -> Self {
        Self {
            spec,
            ctx,
            post_install: None,
        }
    }

    /// Run `hook` after extraction and before verification.
    #[must_use]
    pub fn with_post_install(mut self, hook: Hook) -> Self {
        self.post_install = Some(hook);
        self
    }

    /// The artifact for `version` on this plugin's host.
    ///
    /// # Errors
    ///
    /// Unsupported platform or unrenderable templates.
    pub fn artifact(&self, version: &str) -> Result<ArtifactDescriptor> {
        self.spec.artifact(version, &self.ctx.host)
    }

    /// Install-relative destination of a single-binary artifact.
    fn binary_destination(&self) -> PathBuf {
        self.spec.config().binary_path.as_ref().map_or_else(
            || Path::new("bin").join(self.spec.name()),
            PathBuf::from,
        )
    }

    async fn unpack(
        &self,
        artifact: &ArtifactDescriptor,
        archive: &Path,
        install_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let summary = extract_async(
            artifact.kind,
            archive.to_path_buf(),
            install_path.to_path_buf(),
            self.ctx.limits,
            cancel.clone(),
        )
        .await?;
        debug!(tool = self.spec.name(), files = summary.files, bytes = summary.bytes, "Unpacked");

        if artifact.kind.is_multi_file() {
            if self.spec.config().strip_top_level_dir {
                flatten_single_top_level_dir(install_path, &self.spec.config().bin_paths)?;
            }
            return Ok(());
        }

        let extracted = install_path.join(artifact.kind.strip_extension(&artifact.file_name));
        let destination = install_path.join(self.binary_destination());
        if extracted != destination {
            if let Some(parent) = destination.parent() {
                self.ctx.fs.create_dir_all(parent)?;
            }
            self.ctx.fs.rename(&extracted, &destination)?;
        }
        make_executable(&destination)?;
        debug!(path = %destination.display(), "Placed binary");
        Ok(())
    }
}

#[async_trait]
impl Plugin for BinaryPlugin {
    fn name(&self) -> &str {
        self.spec.name()
    }

    fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    fn describe(&self) -> PluginInfo {
        PluginInfo::from_spec(&self.spec, Strategy::Binary)
    }

    async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        list_versions(&self.spec, self.ctx.releases.as_ref(), cancel).await
    }

    async fn latest_stable(
        &self,
        cancel: &CancellationToken,
        query_prefix: &str,
    ) -> Result<String> {
        resolve_latest(&self.spec, self.ctx.releases.as_ref(), cancel, query_prefix).await
    }

    async fn download(
        &self,
        cancel: &CancellationToken,
        version: &str,
        download_path: &Path,
    ) -> Result<()> {
        let artifact = self.artifact(version)?;
        let expected = match (&artifact.checksum_url, self.ctx.verify_checksums) {
            (Some(url), true) => {
                Some(published_checksum(&self.ctx, url, &artifact.file_name, cancel).await?)
            }
            (None, true) => {
                debug!(tool = self.spec.name(), "No checksum published, skipping verification");
                None
            }
            (_, false) => None,
        };

        let dest = download_path.join(&artifact.file_name);
        let downloaded = fetch(
            &self.ctx,
            &artifact.url,
            &dest,
            self.spec.config().min_download_size,
            expected.as_deref(),
            cancel,
        )
        .await?;
        info!(
            tool = self.spec.name(),
            %version,
            file = %artifact.file_name,
            cached = !downloaded,
            "Artifact ready"
        );
        Ok(())
    }

    async fn install(
        &self,
        cancel: &CancellationToken,
        version: &str,
        download_path: &Path,
        install_path: &Path,
    ) -> Result<()> {
        if already_installed(&self.spec, &self.ctx, install_path) {
            return Ok(());
        }
        let artifact = self.artifact(version)?;
        let archive = download_path.join(&artifact.file_name);

        reset_install_root(&self.ctx, install_path)?;
        info!(
            tool = self.spec.name(),
            %version,
            kind = %artifact.kind,
            path = %install_path.display(),
            "Installing"
        );
        self.unpack(&artifact, &archive, install_path, cancel).await?;

        Finish {
            spec: &self.spec,
            ctx: &self.ctx,
            post_install: self.post_install.as_ref(),
            version,
            source_dir: install_path,
            download_path,
            install_path,
        }
        .run(cancel)
        .await
    }

    async fn uninstall(&self, cancel: &CancellationToken, install_path: &Path) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(toolvm_core::Error::Cancelled);
        }
        self.ctx.fs.remove_dir_all(install_path)?;
        info!(tool = self.spec.name(), path = %install_path.display(), "Uninstalled");
        Ok(())
    }

    fn verify(&self, install_path: &Path) -> Result<()> {
        verify_expected_artifacts(
            self.ctx.fs.as_ref(),
            install_path,
            &self.spec.config().expected_artifacts,
        )
    }

    fn state(&self, install_path: &Path) -> InstallState {
        probe_state(
            self.ctx.fs.as_ref(),
            install_path,
            &self.spec.config().expected_artifacts,
        )
    }
}
