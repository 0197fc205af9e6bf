//! The plugin lifecycle contract.
//!
//! Every tool is driven through the same operations: list, resolve,
//! download, install, uninstall, introspect. Concrete strategies live in
//! `toolvm-plugins`; this module defines the trait and the pieces every
//! strategy shares (artifact verification and on-disk state probing).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PluginSpec;
use crate::ports::FileSystem;
use crate::{Error, Result};

/// Observable lifecycle state of one tool version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    /// No install directory.
    Absent,
    /// A download or install is in progress (only seen in-process).
    Downloading,
    /// Install directory present with every expected artifact.
    Installed,
    /// Install directory present but incomplete, or a step failed.
    Failed,
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Downloading => "downloading",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Installation strategy of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Unpacks a prebuilt release artifact.
    Binary,
    /// Builds from a source tree.
    Source,
}

/// Static facts about a plugin, for help output and shim generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Tool name.
    pub name: String,
    /// `owner/repo` of the source repository.
    pub repository: String,
    /// Installation strategy.
    pub strategy: Strategy,
    /// Tools installed first.
    pub dependencies: Vec<String>,
    /// Paths checked after install.
    pub expected_artifacts: Vec<String>,
    /// Directories containing executables.
    pub bin_paths: Vec<String>,
}

impl PluginInfo {
    /// Build the info record from a compiled spec.
    #[must_use]
    pub fn from_spec(spec: &PluginSpec, strategy: Strategy) -> Self {
        let config = spec.config();
        Self {
            name: config.name.clone(),
            repository: format!("{}/{}", config.owner, config.repo),
            strategy,
            dependencies: config.dependencies.clone(),
            expected_artifacts: config.expected_artifacts.clone(),
            bin_paths: config.bin_paths.clone(),
        }
    }
}

/// Lifecycle operations of one tool.
///
/// Operations re-derive state from disk every time; a plugin keeps no
/// state between calls.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Tool name.
    fn name(&self) -> &str;

    /// Validated configuration.
    fn spec(&self) -> &PluginSpec;

    /// Introspection record.
    fn describe(&self) -> PluginInfo;

    /// All installable versions, ascending.
    ///
    /// # Errors
    ///
    /// Release source failures.
    async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<String>>;

    /// Greatest stable version starting with `query_prefix`.
    ///
    /// # Errors
    ///
    /// [`Error::NoVersionsFound`], [`Error::NoVersionsMatching`] or release
    /// source failures.
    async fn latest_stable(&self, cancel: &CancellationToken, query_prefix: &str)
    -> Result<String>;

    /// Fetch whatever `install` needs into `download_path`.
    ///
    /// Skips work when a previous download is still present.
    ///
    /// # Errors
    ///
    /// Transport, checksum and filesystem failures.
    async fn download(
        &self,
        cancel: &CancellationToken,
        version: &str,
        download_path: &Path,
    ) -> Result<()>;

    /// Materialize the tool under `install_path` and verify it.
    ///
    /// Safe to re-run.
    ///
    /// # Errors
    ///
    /// Extraction, build and verification failures.
    async fn install(
        &self,
        cancel: &CancellationToken,
        version: &str,
        download_path: &Path,
        install_path: &Path,
    ) -> Result<()>;

    /// Remove `install_path`; succeeds if it does not exist.
    ///
    /// # Errors
    ///
    /// Filesystem failures.
    async fn uninstall(&self, cancel: &CancellationToken, install_path: &Path) -> Result<()>;

    /// Check every expected artifact exists under `install_path`.
    ///
    /// # Errors
    ///
    /// [`Error::ExpectedArtifactMissing`] naming the first missing path.
    fn verify(&self, install_path: &Path) -> Result<()>;

    /// Derive the lifecycle state of `install_path` from disk.
    fn state(&self, install_path: &Path) -> InstallState;

    /// Tools to install before this one.
    fn dependencies(&self) -> &[String] {
        &self.spec().config().dependencies
    }

    /// Install-relative directories containing executables.
    fn bin_paths(&self) -> &[String] {
        &self.spec().config().bin_paths
    }
}

/// Check that every expected artifact exists below `install_path`.
///
/// # Errors
///
/// [`Error::ExpectedArtifactMissing`] naming the first missing path.
pub fn verify_expected_artifacts(
    fs: &dyn FileSystem,
    install_path: &Path,
    expected: &[String],
) -> Result<()> {
    for artifact in expected {
        let path = install_path.join(artifact);
        if !fs.exists(&path) {
            return Err(Error::ExpectedArtifactMissing { path });
        }
        debug!(path = %path.display(), "Expected artifact present");
    }
    Ok(())
}

/// Derive an [`InstallState`] from what is on disk.
#[must_use]
pub fn probe_state(fs: &dyn FileSystem, install_path: &Path, expected: &[String]) -> InstallState {
    if !fs.exists(install_path) {
        return InstallState::Absent;
    }
    match verify_expected_artifacts(fs, install_path, expected) {
        Ok(()) => InstallState::Installed,
        Err(_) => InstallState::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::ports::OsFileSystem;

    #[test]
    fn test_verify_and_probe() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("install");
        let expected = vec!["bin/tool".to_string(), "share/man".to_string()];

        assert_eq!(probe_state(&OsFileSystem, &root, &expected), InstallState::Absent);

        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin/tool"), b"#!/bin/sh").unwrap();
        assert_eq!(probe_state(&OsFileSystem, &root, &expected), InstallState::Failed);

        let err = verify_expected_artifacts(&OsFileSystem, &root, &expected).unwrap_err();
        match err {
            Error::ExpectedArtifactMissing { path } => assert!(path.ends_with("share/man")),
            other => panic!("unexpected error {other:?}"),
        }

        std::fs::create_dir_all(root.join("share/man")).unwrap();
        assert_eq!(probe_state(&OsFileSystem, &root, &expected), InstallState::Installed);
        assert!(verify_expected_artifacts(&OsFileSystem, &root, &[]).is_ok());
    }

    #[test]
    fn test_plugin_info_from_spec() {
        let spec = PluginConfig::new("tool", "acme", "tool")
            .with_expected_artifacts(["bin/tool"])
            .with_dependencies(["base"])
            .compile()
            .unwrap();
        let info = PluginInfo::from_spec(&spec, Strategy::Binary);
        assert_eq!(info.repository, "acme/tool");
        assert_eq!(info.dependencies, vec!["base".to_string()]);
        assert_eq!(info.bin_paths, vec!["bin".to_string()]);
        assert_eq!(
            serde_json::to_value(&info).unwrap()["strategy"],
            serde_json::json!("binary")
        );
    }
}
