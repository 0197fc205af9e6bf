//! Build-from-source strategy.
//!
//! `download` materializes a source tree in `<download_path>/src`, either
//! by extracting a source archive or through a shallow git checkout.
//! `install` hands that tree to the build hook, which is expected to put
//! the result under the install path.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use toolvm_archive::{extract_async, flatten_single_top_level_dir};
use toolvm_core::config::SourceFetch;
use toolvm_core::plugin::{Strategy, probe_state, verify_expected_artifacts};
use toolvm_core::template::{Template, render_download_url};
use toolvm_core::{
    ArchiveKind, Error, InstallState, Plugin, PluginInfo, PluginSpec, Result,
};
use tracing::{debug, info};

use crate::context::PluginContext;
use crate::download::fetch;
use crate::git;
use crate::hooks::{Hook, run_hook};
use crate::lifecycle::{Finish, already_installed, reset_install_root};
use crate::versions::{list_versions, resolve_latest};

/// Directory below the download path holding the source tree.
pub const SOURCE_DIR: &str = "src";

const STAGING_DIR: &str = "src.partial";

/// A tool compiled from source by a build hook.
#[derive(Clone)]
pub struct SourcePlugin {
    spec: PluginSpec,
    ctx: PluginContext,
    fetch: SourceFetch,
    build: Hook,
    post_install: Option<Hook>,
}

impl std::fmt::Debug for SourcePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePlugin")
            .field("name", &self.spec.name())
            .field("fetch", &self.fetch)
            .field("post_install", &self.post_install.is_some())
            .finish_non_exhaustive()
    }
}

impl SourcePlugin {
    /// Create a plugin building `spec` with `build`.
    ///
    /// # Errors
    ///
    /// A configuration error if `spec` describes no source to fetch.
    pub fn new(spec: PluginSpec, ctx: PluginContext, build: Hook) -> Result<Self> {
        let fetch = spec.config().source.clone().ok_or_else(|| {
            Error::configuration(format!("{}: source builds need a [source] section", spec.name()))
        })?;
        Ok(Self {
            spec,
            ctx,
            fetch,
            build,
            post_install: None,
        })
    }

    /// Run `hook` after the build and before verification.
    #[must_use]
    pub fn with_post_install(mut self, hook: Hook) -> Self {
        self.post_install = Some(hook);
        self
    }

    /// Where `download` leaves the source tree.
    #[must_use]
    pub fn source_dir(download_path: &Path) -> PathBuf {
        download_path.join(SOURCE_DIR)
    }

    async fn fetch_archive(
        &self,
        url_template: &str,
        file_name_template: Option<&str>,
        version: &str,
        download_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let config = self.spec.config();
        let default_name = format!("{}-{{{{.Version}}}}.tar.gz", config.name);
        let file_name = self
            .spec
            .render_with_version(file_name_template.unwrap_or(&default_name), version)?;
        let url = render_download_url(
            &Template::parse(url_template)?,
            &config.owner,
            &config.repo,
            version,
            &file_name,
        )?;

        let archive = download_path.join(&file_name);
        let src = Self::source_dir(download_path);
        let downloaded = fetch(&self.ctx, &url, &archive, config.min_download_size, None, cancel).await?;
        if !downloaded && self.ctx.fs.exists(&src) {
            debug!(tool = self.spec.name(), "Source tree already extracted");
            return Ok(());
        }

        // `src` only ever appears complete.
        let staging = download_path.join(STAGING_DIR);
        self.ctx.fs.remove_dir_all(&staging)?;
        extract_async(
            ArchiveKind::from_file_name(&file_name),
            archive,
            staging.clone(),
            self.ctx.limits,
            cancel.clone(),
        )
        .await?;
        flatten_single_top_level_dir(&staging, &[])?;
        self.ctx.fs.remove_dir_all(&src)?;
        self.ctx.fs.rename(&staging, &src)?;
        Ok(())
    }

    async fn fetch_git(
        &self,
        url: Option<&str>,
        ref_template: Option<&str>,
        version: &str,
        download_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let config = self.spec.config();
        let url = url.map_or_else(
            || format!("https://github.com/{}/{}.git", config.owner, config.repo),
            str::to_string,
        );
        let git_ref = match ref_template {
            Some(template) => self.spec.render_with_version(template, version)?,
            None => format!("{}{version}", config.version_prefix),
        };
        git::checkout(
            self.ctx.fs.as_ref(),
            self.ctx.runner.as_ref(),
            &url,
            &git_ref,
            &Self::source_dir(download_path),
            cancel,
        )
        .await
    }
}

#[async_trait]
impl Plugin for SourcePlugin {
    fn name(&self) -> &str {
        self.spec.name()
    }

    fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    fn describe(&self) -> PluginInfo {
        PluginInfo::from_spec(&self.spec, Strategy::Source)
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
        self.ctx.fs.create_dir_all(download_path)?;
        match &self.fetch {
            SourceFetch::Archive {
                url_template,
                file_name_template,
            } => {
                self.fetch_archive(
                    url_template,
                    file_name_template.as_deref(),
                    version,
                    download_path,
                    cancel,
                )
                .await?;
            }
            SourceFetch::Git { url, ref_template } => {
                self.fetch_git(
                    url.as_deref(),
                    ref_template.as_deref(),
                    version,
                    download_path,
                    cancel,
                )
                .await?;
            }
        }
        info!(tool = self.spec.name(), %version, "Source ready");
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
        let source_dir = Self::source_dir(download_path);
        if !self.ctx.fs.exists(&source_dir) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source tree {} is missing; download first", source_dir.display()),
            )));
        }

        reset_install_root(&self.ctx, install_path)?;
        let finish = Finish {
            spec: &self.spec,
            ctx: &self.ctx,
            post_install: self.post_install.as_ref(),
            version,
            source_dir: &source_dir,
            download_path,
            install_path,
        };
        info!(tool = self.spec.name(), %version, path = %install_path.display(), "Building");
        run_hook("build", &self.build, finish.hook_context(cancel)).await?;
        finish.run(cancel).await
    }

    async fn uninstall(&self, cancel: &CancellationToken, install_path: &Path) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
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
