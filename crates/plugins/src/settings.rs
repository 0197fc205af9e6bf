//! Engine-wide settings.
//!
//! Resolved once at startup, usually from the environment, and handed to
//! [`crate::PluginContext::from_settings`] and [`crate::Installer`].

use std::path::{Path, PathBuf};
use toolvm_archive::ExtractLimits;
use toolvm_core::version::ensure_path_component;
use toolvm_core::{Error, Result};
use toolvm_tools_github::DEFAULT_API_URL;

/// Overrides the data directory.
pub const ENV_DATA_DIR: &str = "TOOLVM_DATA_DIR";
/// Enables checksum verification of downloads (`1`, `true`, `yes`, `on`).
pub const ENV_VERIFY_CHECKSUMS: &str = "TOOLVM_VERIFY_CHECKSUMS";
/// Per-file extraction ceiling in bytes.
pub const ENV_MAX_FILE_SIZE: &str = "TOOLVM_MAX_FILE_SIZE";
/// Cumulative extraction ceiling in bytes.
pub const ENV_MAX_TOTAL_SIZE: &str = "TOOLVM_MAX_TOTAL_SIZE";
/// GitHub API root.
pub const ENV_GITHUB_API_URL: &str = "GITHUB_API_URL";
/// GitHub tokens, checked in order.
pub const ENV_GITHUB_TOKENS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Settings shared by every plugin and the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Root of `downloads/` and `installs/`.
    pub data_dir: PathBuf,
    /// Token for the GitHub API.
    pub github_token: Option<String>,
    /// GitHub API root.
    pub github_api_url: String,
    /// Verify downloads against published checksums.
    pub verify_checksums: bool,
    /// Extraction ceilings.
    pub limits: ExtractLimits,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            github_token: None,
            github_api_url: DEFAULT_API_URL.to_string(),
            verify_checksums: false,
            limits: ExtractLimits::default(),
        }
    }
}

/// `<platform data dir>/toolvm`, e.g. `~/.local/share/toolvm` on Linux.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("toolvm")
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_size(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::configuration(format!("{name}: invalid byte count '{value}': {e}")))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::configuration(format!(
            "{name}: expected a boolean, got '{other}'"
        ))),
    }
}

impl EngineSettings {
    /// Defaults overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed numeric or boolean
    /// values, or zero extraction ceilings.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(dir) = non_empty_var(ENV_DATA_DIR) {
            settings.data_dir = PathBuf::from(dir);
        }
        settings.github_token = ENV_GITHUB_TOKENS.iter().find_map(|name| non_empty_var(name));
        if let Some(url) = non_empty_var(ENV_GITHUB_API_URL) {
            settings.github_api_url = url;
        }
        if let Some(flag) = non_empty_var(ENV_VERIFY_CHECKSUMS) {
            settings.verify_checksums = parse_flag(ENV_VERIFY_CHECKSUMS, &flag)?;
        }
        if let Some(size) = non_empty_var(ENV_MAX_FILE_SIZE) {
            settings.limits.max_file_size = parse_size(ENV_MAX_FILE_SIZE, &size)?;
        }
        if let Some(size) = non_empty_var(ENV_MAX_TOTAL_SIZE) {
            settings.limits.max_total_size = parse_size(ENV_MAX_TOTAL_SIZE, &size)?;
        }
        settings.limits.validate()?;

        tracing::debug!(
            data_dir = %settings.data_dir.display(),
            api = %settings.github_api_url,
            authenticated = settings.github_token.is_some(),
            verify_checksums = settings.verify_checksums,
            "Loaded engine settings"
        );
        Ok(settings)
    }

    /// Set the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the GitHub token.
    #[must_use]
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token;
        self
    }

    /// Set the GitHub API root.
    #[must_use]
    pub fn with_github_api_url(mut self, url: impl Into<String>) -> Self {
        self.github_api_url = url.into();
        self
    }

    /// Enable or disable checksum verification.
    #[must_use]
    pub const fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the extraction ceilings.
    #[must_use]
    pub const fn with_limits(mut self, limits: ExtractLimits) -> Self {
        self.limits = limits;
        self
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
}

/// `<data_dir>/<kind>/<tool>/<version>`, never leaving `<data_dir>/<kind>/<tool>`.
pub(crate) fn layout_path(data_dir: &Path, kind: &str, tool: &str, version: &str) -> Result<PathBuf> {
    ensure_path_component(tool)
        .map_err(|_| Error::configuration(format!("invalid tool name '{tool}'")))?;
    ensure_path_component(version)?;
    Ok(data_dir.join(kind).join(tool).join(version))
}
