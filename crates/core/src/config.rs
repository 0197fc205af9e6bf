//! Declarative per-tool plugin configuration.
//!
//! A [`PluginConfig`] is plain data, usually loaded from TOML. Calling
//! [`PluginConfig::compile`] validates it once and produces a
//! [`PluginSpec`] with parsed templates and compiled regular expressions;
//! everything after that point is read-only.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::artifact::{ArchiveKind, ArtifactDescriptor};
use crate::platform::{HostPlatform, PlatformMap, PlatformPair, normalize_platform};
use crate::template::{Placeholder, Template, TemplateVars, render_download_url, render_file_name};
use crate::version::VersionRules;
use crate::{Error, Result};

/// Smallest download accepted as a previously completed artifact.
pub const DEFAULT_MIN_DOWNLOAD_SIZE: u64 = 1024;

/// Where version numbers are enumerated from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// Repository tags.
    #[default]
    Tags,
    /// Published (non-draft) releases.
    Releases,
}

/// How the source-build strategy obtains a source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceFetch {
    /// Download and extract a source archive.
    Archive {
        /// URL template; `{{.FileName}}` is the archive's file name.
        url_template: String,
        /// File name template; defaults to `<name>-{{.Version}}.tar.gz`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name_template: Option<String>,
    },
    /// Clone a git repository at a tag.
    Git {
        /// Clone URL; defaults to the GitHub repository.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Ref to check out; defaults to `<version_prefix>{{.Version}}`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ref_template: Option<String>,
    },
}

/// Packages installed after the tool itself, one per line of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPackages {
    /// File listing one package per line; `#` starts a comment.
    pub file: PathBuf,
    /// Install-relative program run once per package (e.g. `bin/gem`).
    pub program: String,
    /// Arguments placed before the package name.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Static description of one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Tool name, also the registry key.
    pub name: String,
    /// Source repository owner.
    pub owner: String,
    /// Source repository name.
    pub repo: String,
    /// Where versions are listed from.
    #[serde(default)]
    pub version_source: VersionSource,
    /// Prefix stripped from tags to obtain versions (`v`, `go`, ...).
    #[serde(default)]
    pub version_prefix: String,
    /// Only versions matching this regular expression are listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_filter: Option<String>,
    /// Tool-specific pre-release pattern, on top of the generic markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerelease_pattern: Option<String>,
    /// Release file name template (binary strategy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_template: Option<String>,
    /// Download URL template; defaults to the GitHub release asset URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url_template: Option<String>,
    /// Checksum file URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_url_template: Option<String>,
    /// Overrides archive kind detection from the file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_kind: Option<ArchiveKind>,
    /// OS/architecture remap tables.
    #[serde(default)]
    pub platforms: PlatformMap,
    /// Install-relative paths that must exist after installation.
    #[serde(default)]
    pub expected_artifacts: Vec<String>,
    /// Install-relative directories holding executables.
    #[serde(default = "default_bin_paths")]
    pub bin_paths: Vec<String>,
    /// Install-relative destination for raw or gzip-only binaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    /// Move the contents of a lone top-level directory up after extraction.
    #[serde(default = "default_true")]
    pub strip_top_level_dir: bool,
    /// Cached downloads smaller than this are fetched again.
    #[serde(default = "default_min_download_size")]
    pub min_download_size: u64,
    /// Tools installed before this one, in order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Source tree location (source-build strategy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceFetch>,
    /// Optional default-packages step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_packages: Option<DefaultPackages>,
}

fn default_bin_paths() -> Vec<String> {
    vec!["bin".to_string()]
}

const fn default_true() -> bool {
    true
}

const fn default_min_download_size() -> u64 {
    DEFAULT_MIN_DOWNLOAD_SIZE
}

impl PluginConfig {
    /// Minimal configuration for a GitHub-hosted tool.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            repo: repo.into(),
            version_source: VersionSource::default(),
            version_prefix: String::new(),
            version_filter: None,
            prerelease_pattern: None,
            file_name_template: None,
            download_url_template: None,
            checksum_url_template: None,
            archive_kind: None,
            platforms: PlatformMap::default(),
            expected_artifacts: Vec::new(),
            bin_paths: default_bin_paths(),
            binary_path: None,
            strip_top_level_dir: true,
            min_download_size: DEFAULT_MIN_DOWNLOAD_SIZE,
            dependencies: Vec::new(),
            source: None,
            default_packages: None,
        }
    }

    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the document is malformed.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::configuration(format!("invalid plugin config: {e}")))
    }

    /// Set the tag prefix.
    #[must_use]
    pub fn with_version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    /// Set the version include filter.
    #[must_use]
    pub fn with_version_filter(mut self, pattern: impl Into<String>) -> Self {
        self.version_filter = Some(pattern.into());
        self
    }

    /// Set the release file name template.
    #[must_use]
    pub fn with_file_name_template(mut self, template: impl Into<String>) -> Self {
        self.file_name_template = Some(template.into());
        self
    }

    /// Set the download URL template.
    #[must_use]
    pub fn with_download_url_template(mut self, template: impl Into<String>) -> Self {
        self.download_url_template = Some(template.into());
        self
    }

    /// Set the checksum URL template.
    #[must_use]
    pub fn with_checksum_url_template(mut self, template: impl Into<String>) -> Self {
        self.checksum_url_template = Some(template.into());
        self
    }

    /// Set the expected artifacts.
    #[must_use]
    pub fn with_expected_artifacts<I, S>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_artifacts = artifacts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the platform remap tables.
    #[must_use]
    pub fn with_platforms(mut self, platforms: PlatformMap) -> Self {
        self.platforms = platforms;
        self
    }

    /// Set the dependency list.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the source fetch description.
    #[must_use]
    pub fn with_source(mut self, source: SourceFetch) -> Self {
        self.source = Some(source);
        self
    }

    /// Validate the configuration and compile templates and patterns.
    ///
    /// # Errors
    ///
    /// Returns a configuration or template error describing the first
    /// problem found.
    pub fn compile(self) -> Result<PluginSpec> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("plugin name must not be empty"));
        }
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            return Err(Error::configuration(format!(
                "{}: repository owner and name are required",
                self.name
            )));
        }
        for artifact in self.expected_artifacts.iter().chain(&self.bin_paths) {
            ensure_relative(&self.name, artifact)?;
        }
        if let Some(path) = &self.binary_path {
            ensure_relative(&self.name, path)?;
        }
        if let Some(packages) = &self.default_packages {
            ensure_relative(&self.name, &packages.program)?;
        }

        let rules = VersionRules::compile(
            self.version_filter.as_deref(),
            self.prerelease_pattern.as_deref(),
        )?;

        let file_name = self
            .file_name_template
            .as_deref()
            .map(Template::parse)
            .transpose()?;
        if let Some(t) = &file_name {
            t.ensure_only(&[Placeholder::Version, Placeholder::Platform, Placeholder::Arch])?;
        }

        let download_url = match self.download_url_template.as_deref() {
            Some(source) => Template::parse(source)?,
            None => Template::github_release_asset(&self.version_prefix),
        };
        url_placeholders_only(&download_url)?;

        let checksum_url = self
            .checksum_url_template
            .as_deref()
            .map(Template::parse)
            .transpose()?;
        if let Some(t) = &checksum_url {
            url_placeholders_only(t)?;
        }

        if let Some(source) = &self.source {
            validate_source_templates(source)?;
        }

        Ok(PluginSpec {
            config: Arc::new(self),
            rules,
            file_name,
            download_url,
            checksum_url,
        })
    }
}

fn url_placeholders_only(template: &Template) -> Result<()> {
    template.ensure_only(&[
        Placeholder::Version,
        Placeholder::FileName,
        Placeholder::RepoOwner,
        Placeholder::RepoName,
    ])
}

/// Source templates are rendered with the version and repository only.
fn validate_source_templates(source: &SourceFetch) -> Result<()> {
    const VERSION_ONLY: [Placeholder; 3] =
        [Placeholder::Version, Placeholder::RepoOwner, Placeholder::RepoName];
    match source {
        SourceFetch::Archive {
            url_template,
            file_name_template,
        } => {
            url_placeholders_only(&Template::parse(url_template)?)?;
            if let Some(t) = file_name_template {
                Template::parse(t)?.ensure_only(&VERSION_ONLY)?;
            }
        }
        SourceFetch::Git { ref_template, .. } => {
            if let Some(t) = ref_template {
                Template::parse(t)?.ensure_only(&VERSION_ONLY)?;
            }
        }
    }
    Ok(())
}

fn ensure_relative(tool: &str, path: &str) -> Result<()> {
    let p = Path::new(path);
    let escapes = p
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.is_empty() || escapes {
        return Err(Error::configuration(format!(
            "{tool}: '{path}' must be a relative path inside the install directory"
        )));
    }
    Ok(())
}

/// A validated plugin configuration.
///
/// Cheap to clone; the configuration data is shared.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    config: Arc<PluginConfig>,
    rules: VersionRules,
    file_name: Option<Template>,
    download_url: Template,
    checksum_url: Option<Template>,
}

impl PluginSpec {
    /// The underlying configuration.
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Compiled version rules.
    #[must_use]
    pub const fn rules(&self) -> &VersionRules {
        &self.rules
    }

    /// Normalize the host platform through the tool's tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] for excluded hosts.
    pub fn platform(&self, host: &HostPlatform) -> Result<PlatformPair> {
        normalize_platform(&self.config.name, &host.os, &host.arch, &self.config.platforms)
    }

    /// Render the release file name for `version` on `host`.
    ///
    /// # Errors
    ///
    /// Fails for unsupported platforms or when the tool has no file name
    /// template.
    pub fn file_name(&self, version: &str, host: &HostPlatform) -> Result<String> {
        let template = self.file_name.as_ref().ok_or_else(|| {
            Error::configuration(format!("{}: no file_name_template configured", self.name()))
        })?;
        let pair = self.platform(host)?;
        render_file_name(template, version, &pair.os, &pair.arch)
    }

    /// Compute the artifact descriptor for `version` on `host`.
    ///
    /// Pure: performs no I/O.
    ///
    /// # Errors
    ///
    /// Fails for unsupported platforms or unrenderable templates.
    pub fn artifact(&self, version: &str, host: &HostPlatform) -> Result<ArtifactDescriptor> {
        let file_name = self.file_name(version, host)?;
        let url = render_download_url(
            &self.download_url,
            &self.config.owner,
            &self.config.repo,
            version,
            &file_name,
        )?;
        let checksum_url = self
            .checksum_url
            .as_ref()
            .map(|t| {
                t.render(&TemplateVars {
                    version: Some(version),
                    file_name: Some(&file_name),
                    repo_owner: Some(&self.config.owner),
                    repo_name: Some(&self.config.repo),
                    ..TemplateVars::default()
                })
            })
            .transpose()?;
        let kind = self
            .config
            .archive_kind
            .unwrap_or_else(|| ArchiveKind::from_file_name(&file_name));

        Ok(ArtifactDescriptor {
            file_name,
            url,
            kind,
            checksum_url,
        })
    }

    /// Render a template that may use version and repository fields.
    ///
    /// # Errors
    ///
    /// Fails on parse errors or placeholders without values.
    pub fn render_with_version(&self, template: &str, version: &str) -> Result<String> {
        Template::parse(template)?.render(&TemplateVars {
            version: Some(version),
            repo_owner: Some(&self.config.owner),
            repo_name: Some(&self.config.repo),
            ..TemplateVars::default()
        })
    }
}
