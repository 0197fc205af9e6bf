//! Sequential install orchestration over a [`PluginRegistry`].
//!
//! The installer owns the on-disk layout:
//!
//! ```text
//! <data_dir>/downloads/<tool>/<version>/   artifacts and source trees
//! <data_dir>/installs/<tool>/<version>/    installed tools
//! ```
//!
//! Every failure is tagged with the tool and the [`Stage`] it happened in.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{FileSystem, OsFileSystem};
use toolvm_core::version::{ensure_path_component, sort_ascending};
use toolvm_core::{Error, InstallState, Plugin, Result, Stage};
use tracing::{debug, info};

use crate::registry::PluginRegistry;
use crate::settings::{EngineSettings, layout_path};

/// Which version of a tool to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionQuery {
    /// This exact version.
    Exact(String),
    /// The greatest stable version starting with the prefix (empty for any).
    Latest(String),
}

impl VersionQuery {
    /// The latest stable version.
    #[must_use]
    pub fn latest() -> Self {
        Self::Latest(String::new())
    }
}

impl FromStr for VersionQuery {
    type Err = Error;

    /// Parses `latest`, `latest:<prefix>` or an exact version.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "latest" {
            return Ok(Self::latest());
        }
        if let Some(prefix) = s.strip_prefix("latest:") {
            return Ok(Self::Latest(prefix.to_string()));
        }
        ensure_path_component(s)?;
        Ok(Self::Exact(s.to_string()))
    }
}

impl std::fmt::Display for VersionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(version) => f.write_str(version),
            Self::Latest(prefix) if prefix.is_empty() => f.write_str("latest"),
            Self::Latest(prefix) => write!(f, "latest:{prefix}"),
        }
    }
}

/// Result of installing one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Tool name.
    pub tool: String,
    /// Resolved version.
    pub version: String,
    /// Install root.
    pub install_path: PathBuf,
    /// The tool was already installed and verified; nothing was done.
    pub already_installed: bool,
}

/// Installs tools, and their dependencies, one at a time.
#[derive(Clone)]
pub struct Installer {
    registry: Arc<PluginRegistry>,
    fs: Arc<dyn FileSystem>,
    data_dir: PathBuf,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("registry", &self.registry)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// Create an installer rooted at `data_dir`.
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            fs: Arc::new(OsFileSystem),
            data_dir: data_dir.into(),
        }
    }

    /// Create an installer using the settings' data directory.
    #[must_use]
    pub fn from_settings(registry: Arc<PluginRegistry>, settings: &EngineSettings) -> Self {
        Self::new(registry, settings.data_dir.clone())
    }

    /// Override the filesystem.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// The registry plugins are looked up in.
    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// `<data_dir>/downloads/<tool>/<version>`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidVersion`] if `version` is not a plain path component.
    pub fn download_path(&self, tool: &str, version: &str) -> Result<PathBuf> {
        layout_path(&self.data_dir, "downloads", tool, version)
    }

    /// `<data_dir>/installs/<tool>/<version>`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidVersion`] if `version` is not a plain path component.
    pub fn install_path(&self, tool: &str, version: &str) -> Result<PathBuf> {
        layout_path(&self.data_dir, "installs", tool, version)
    }

    /// Turn a query into a concrete version.
    ///
    /// # Errors
    ///
    /// [`Error::PluginNotFound`], or a [`Stage::Resolve`] error.
    pub async fn resolve(
        &self,
        tool: &str,
        query: &VersionQuery,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let plugin = self.registry.require(tool)?;
        match query {
            VersionQuery::Exact(version) => Ok(version.clone()),
            VersionQuery::Latest(prefix) => plugin
                .latest_stable(cancel, prefix)
                .await
                .map_err(|e| e.at_stage(tool, Stage::Resolve)),
        }
    }

    /// Tools to install for `tool`, dependencies first, `tool` last.
    ///
    /// # Errors
    ///
    /// [`Error::PluginNotFound`] for unknown tools or dependencies and
    /// [`Error::DependencyCycle`] naming the cycle.
    pub fn install_order(&self, tool: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut path = Vec::new();
        self.visit(tool, &mut path, &mut order)?;
        Ok(order)
    }

    fn visit(&self, tool: &str, path: &mut Vec<String>, order: &mut Vec<String>) -> Result<()> {
        if let Some(start) = path.iter().position(|t| t == tool) {
            let mut chain = path[start..].to_vec();
            chain.push(tool.to_string());
            return Err(Error::DependencyCycle { chain });
        }
        if order.iter().any(|t| t == tool) {
            return Ok(());
        }
        let plugin = self.registry.require(tool)?;
        path.push(tool.to_string());
        for dependency in plugin.dependencies() {
            self.visit(dependency, path, order)?;
        }
        path.pop();
        order.push(tool.to_string());
        Ok(())
    }

    /// Install `tool`, installing missing dependencies first.
    ///
    /// A dependency with any version in the [`InstallState::Installed`]
    /// state is left alone; otherwise its latest stable version is installed.
    ///
    /// # Errors
    ///
    /// Lookup and cycle errors, or the first failing stage wrapped in
    /// [`Error::Stage`].
    pub async fn install(
        &self,
        tool: &str,
        query: &VersionQuery,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome> {
        let order = self.install_order(tool)?;
        for dependency in order.iter().filter(|t| *t != tool) {
            if !self.has_verified_install(dependency)? {
                info!(%tool, %dependency, "Installing dependency");
                self.install_one(dependency, &VersionQuery::latest(), cancel)
                    .await?;
            } else {
                debug!(%tool, %dependency, "Dependency already installed");
            }
        }
        self.install_one(tool, query, cancel).await
    }

    /// Install several tools in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first failure, as [`Installer::install`] reports it.
    pub async fn install_all(
        &self,
        requests: &[(String, VersionQuery)],
        cancel: &CancellationToken,
    ) -> Result<Vec<InstallOutcome>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for (tool, query) in requests {
            outcomes.push(self.install(tool, query, cancel).await?);
        }
        Ok(outcomes)
    }

    async fn install_one(
        &self,
        tool: &str,
        query: &VersionQuery,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome> {
        let plugin = self.registry.require(tool)?;
        let version = self.resolve(tool, query, cancel).await?;
        let download_path = self
            .download_path(tool, &version)
            .map_err(|e| e.at_stage(tool, Stage::Resolve))?;
        let install_path = self
            .install_path(tool, &version)
            .map_err(|e| e.at_stage(tool, Stage::Resolve))?;

        let mut outcome = InstallOutcome {
            tool: tool.to_string(),
            version: version.clone(),
            install_path: install_path.clone(),
            already_installed: false,
        };
        if plugin.state(&install_path) == InstallState::Installed {
            info!(%tool, %version, "Already installed");
            outcome.already_installed = true;
            return Ok(outcome);
        }

        info!(%tool, %version, %query, "Installing");
        plugin
            .download(cancel, &version, &download_path)
            .await
            .map_err(|e| e.at_stage(tool, Stage::Download))?;
        plugin
            .install(cancel, &version, &download_path, &install_path)
            .await
            .map_err(|e| e.at_stage(tool, Stage::Install))?;
        plugin
            .verify(&install_path)
            .map_err(|e| e.at_stage(tool, Stage::Verify))?;
        Ok(outcome)
    }

    /// Remove one installed version.
    ///
    /// # Errors
    ///
    /// [`Error::PluginNotFound`] or a [`Stage::Uninstall`] error.
    pub async fn uninstall(
        &self,
        tool: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let plugin = self.registry.require(tool)?;
        let install_path = self
            .install_path(tool, version)
            .map_err(|e| e.at_stage(tool, Stage::Uninstall))?;
        plugin
            .uninstall(cancel, &install_path)
            .await
            .map_err(|e| e.at_stage(tool, Stage::Uninstall))
    }

    /// Lifecycle state of one version.
    ///
    /// # Errors
    ///
    /// [`Error::PluginNotFound`] or [`Error::InvalidVersion`].
    pub fn state(&self, tool: &str, version: &str) -> Result<InstallState> {
        let plugin = self.registry.require(tool)?;
        Ok(plugin.state(&self.install_path(tool, version)?))
    }

    /// Versions with an install directory, ascending.
    ///
    /// # Errors
    ///
    /// Filesystem errors other than a missing directory.
    pub fn installed_versions(&self, tool: &str) -> Result<Vec<String>> {
        let mut versions = self.fs.list_dir(&self.data_dir.join("installs").join(tool))?;
        sort_ascending(&mut versions);
        Ok(versions)
    }

    fn has_verified_install(&self, tool: &str) -> Result<bool> {
        let plugin = self.registry.require(tool)?;
        for version in self.installed_versions(tool)? {
            if plugin.state(&self.install_path(tool, &version)?) == InstallState::Installed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Plugin for `tool`.
    ///
    /// # Errors
    ///
    /// [`Error::PluginNotFound`].
    pub fn plugin(&self, tool: &str) -> Result<Arc<dyn Plugin>> {
        self.registry.require(tool).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_query() {
        assert_eq!("latest".parse::<VersionQuery>().unwrap(), VersionQuery::latest());
        assert_eq!(
            "latest:1.7".parse::<VersionQuery>().unwrap(),
            VersionQuery::Latest("1.7".into())
        );
        assert_eq!(
            " 1.7.1 ".parse::<VersionQuery>().unwrap(),
            VersionQuery::Exact("1.7.1".into())
        );
        for bad in ["", "..", "../../../victim", "/etc", "a/b"] {
            assert!(
                matches!(bad.parse::<VersionQuery>(), Err(Error::InvalidVersion { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_version_query_display() {
        assert_eq!(VersionQuery::latest().to_string(), "latest");
        assert_eq!(VersionQuery::Latest("3".into()).to_string(), "latest:3");
        assert_eq!(VersionQuery::Exact("3.3.0".into()).to_string(), "3.3.0");
    }

    #[test]
    fn test_layout() {
        let installer = Installer::new(Arc::new(PluginRegistry::new()), "/data");
        assert_eq!(
            installer.install_path("ruby", "3.3.0").unwrap(),
            PathBuf::from("/data/installs/ruby/3.3.0")
        );
        assert_eq!(
            installer.download_path("ruby", "3.3.0").unwrap(),
            PathBuf::from("/data/downloads/ruby/3.3.0")
        );
        assert!(installer.installed_versions("ruby").unwrap().is_empty());
    }
}
