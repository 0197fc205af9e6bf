//! Collaborators shared by every plugin instance.

use std::sync::Arc;
use toolvm_archive::ExtractLimits;
use toolvm_core::ports::{FileSystem, HttpClient, OsFileSystem, ProcessRunner, ReleaseSource};
use toolvm_core::{HostPlatform, Result};
use toolvm_tools_github::{GitHubReleaseSource, ReqwestHttpClient};

use crate::exec::TokioProcessRunner;
use crate::settings::EngineSettings;

/// Ports and host facts a plugin works through.
///
/// Cloning is cheap; every collaborator is reference counted.
#[derive(Clone)]
pub struct PluginContext {
    /// HTTP transport for artifact downloads.
    pub http: Arc<dyn HttpClient>,
    /// Tag and release listing.
    pub releases: Arc<dyn ReleaseSource>,
    /// Filesystem access.
    pub fs: Arc<dyn FileSystem>,
    /// Subprocess execution (git, build hooks, default packages).
    pub runner: Arc<dyn ProcessRunner>,
    /// Host the artifacts are selected for.
    pub host: HostPlatform,
    /// Extraction ceilings.
    pub limits: ExtractLimits,
    /// Verify downloads against published checksums.
    pub verify_checksums: bool,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("host", &self.host)
            .field("limits", &self.limits)
            .field("verify_checksums", &self.verify_checksums)
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    /// Build a context from explicit collaborators, for the current host,
    /// with the OS filesystem and default limits.
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpClient>,
        releases: Arc<dyn ReleaseSource>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            http,
            releases,
            fs: Arc::new(OsFileSystem),
            runner,
            host: HostPlatform::current(),
            limits: ExtractLimits::default(),
            verify_checksums: false,
        }
    }

    /// Production wiring: `reqwest`, the GitHub API and tokio processes.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        let releases = GitHubReleaseSource::new(http.clone())
            .with_api_url(settings.github_api_url.clone())
            .with_token(settings.github_token.clone());
        Ok(Self::new(http, Arc::new(releases), Arc::new(TokioProcessRunner))
            .with_limits(settings.limits)
            .with_verify_checksums(settings.verify_checksums))
    }

    /// Override the host platform.
    #[must_use]
    pub fn with_host(mut self, host: HostPlatform) -> Self {
        self.host = host;
        self
    }

    /// Override the filesystem.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Set the extraction ceilings.
    #[must_use]
    pub const fn with_limits(mut self, limits: ExtractLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Enable or disable checksum verification.
    #[must_use]
    pub const fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}
