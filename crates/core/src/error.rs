//! Error types for the installation engine.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle stage an error was raised in.
///
/// Used by [`Error::Stage`] so callers receive a single error that names
/// the failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Listing or resolving versions.
    Resolve,
    /// Fetching the artifact or source tree.
    Download,
    /// Extracting or building into the install root.
    Install,
    /// Checking expected artifacts after install.
    Verify,
    /// Removing an install root.
    Uninstall,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Download => "download",
            Self::Install => "install",
            Self::Verify => "verify",
            Self::Uninstall => "uninstall",
        };
        f.write_str(name)
    }
}

/// Errors produced by the installation engine.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The version source returned nothing at all.
    #[error("No versions found for {tool}")]
    #[diagnostic(
        code(toolvm::version::none_found),
        help("Check the repository owner/name and the version filter of the plugin")
    )]
    NoVersionsFound {
        /// Tool (or listing) the lookup was for.
        tool: String,
    },

    /// Versions exist but none start with the requested prefix.
    #[error("No versions matching '{query}' for {tool}")]
    #[diagnostic(code(toolvm::version::none_matching))]
    NoVersionsMatching {
        /// Tool the lookup was for.
        tool: String,
        /// The requested version prefix.
        query: String,
    },

    /// A version string that cannot name an install directory.
    #[error("Invalid version '{version}': {reason}")]
    #[diagnostic(code(toolvm::version::invalid))]
    InvalidVersion {
        /// The rejected version.
        version: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The tool does not publish artifacts for the host platform.
    #[error("Platform {os}/{arch} is not supported by {tool}")]
    #[diagnostic(code(toolvm::platform::unsupported))]
    UnsupportedPlatform {
        /// Tool name.
        tool: String,
        /// Raw host OS token.
        os: String,
        /// Raw host architecture token.
        arch: String,
    },

    /// An archive entry resolves outside the extraction root.
    #[error("Illegal file path in archive: {entry}")]
    #[diagnostic(
        code(toolvm::archive::invalid_path),
        help("The archive tries to write outside its destination directory and was rejected")
    )]
    InvalidFilePath {
        /// The stored entry name (or link target).
        entry: String,
    },

    /// Extraction exceeded the per-file or cumulative size ceiling.
    #[error("Archive too large: {entry} exceeds the {limit}-byte {scope} limit")]
    #[diagnostic(code(toolvm::archive::too_large))]
    ArchiveTooLarge {
        /// The entry being written when the ceiling was hit.
        entry: String,
        /// The ceiling in bytes.
        limit: u64,
        /// Which ceiling: `"per-file"` or `"total"`.
        scope: &'static str,
    },

    /// An extraction ceiling was configured as zero.
    #[error("Invalid archive limits: {0}")]
    #[diagnostic(code(toolvm::archive::invalid_limits))]
    InvalidArchiveLimits(String),

    /// The archive could not be decoded.
    #[error("Failed to read archive {}: {message}", path.display())]
    #[diagnostic(code(toolvm::archive::read))]
    Archive {
        /// Archive path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Post-install verification found a declared artifact missing.
    #[error("Expected artifact missing after install: {}", path.display())]
    #[diagnostic(
        code(toolvm::install::artifact_missing),
        help("Uninstall the tool and retry; the install directory is incomplete")
    )]
    ExpectedArtifactMissing {
        /// Full path that was expected to exist.
        path: PathBuf,
    },

    /// The server answered with a non-success status.
    #[error("Download failed: {url} (HTTP {status})")]
    #[diagnostic(code(toolvm::http::download_failed))]
    DownloadFailed {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Transport-level failure (connection, TLS, body read).
    #[error("Request to {url} failed")]
    #[diagnostic(code(toolvm::http::transport))]
    Transport {
        /// Requested URL.
        url: String,
        /// The underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A downloaded artifact does not match its published checksum.
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    #[diagnostic(code(toolvm::download::checksum_mismatch))]
    ChecksumMismatch {
        /// Artifact file name.
        file: String,
        /// Published digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// A template references an unknown or unavailable placeholder.
    #[error("Invalid template '{template}': {message}")]
    #[diagnostic(
        code(toolvm::config::template),
        help("Supported placeholders: .Version, .Platform, .Arch, .FileName, .RepoOwner, .RepoName")
    )]
    Template {
        /// The offending template.
        template: String,
        /// What went wrong.
        message: String,
    },

    /// Invalid plugin or engine configuration.
    #[error("Configuration error: {0}")]
    #[diagnostic(code(toolvm::config))]
    Configuration(String),

    /// An external command exited unsuccessfully.
    #[error("Command `{command}` failed: {message}")]
    #[diagnostic(code(toolvm::exec::command))]
    Command {
        /// Program and arguments.
        command: String,
        /// Exit status and captured stderr.
        message: String,
    },

    /// A build or post-install hook reported a failure.
    #[error("{hook} hook failed for {tool}: {message}")]
    #[diagnostic(code(toolvm::hook))]
    Hook {
        /// Hook kind (`build`, `post-install`).
        hook: &'static str,
        /// Tool name.
        tool: String,
        /// Failure description.
        message: String,
    },

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    #[diagnostic(code(toolvm::cancelled))]
    Cancelled,

    /// Plugin dependencies form a cycle.
    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    #[diagnostic(code(toolvm::install::dependency_cycle))]
    DependencyCycle {
        /// Tools visited, ending with the repeated one.
        chain: Vec<String>,
    },

    /// No plugin registered under the requested name.
    #[error("No plugin registered for '{0}'")]
    #[diagnostic(code(toolvm::registry::not_found))]
    PluginNotFound(String),

    /// A lifecycle step failed; wraps the underlying cause.
    #[error("{stage} failed for {tool}")]
    #[diagnostic(code(toolvm::stage))]
    Stage {
        /// Tool name.
        tool: String,
        /// The failing step.
        stage: Stage,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Wrapped I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(toolvm::io))]
    Io(#[from] std::io::Error),

    /// Wrapped JSON error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(toolvm::json))]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create an archive decoding error.
    #[must_use]
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid version error.
    #[must_use]
    pub fn invalid_version(version: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            reason,
        }
    }

    /// Create an invalid file path error.
    #[must_use]
    pub fn invalid_file_path(entry: impl Into<String>) -> Self {
        Self::InvalidFilePath {
            entry: entry.into(),
        }
    }

    /// Wrap a transport failure.
    #[must_use]
    pub fn transport(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Create a command failure.
    #[must_use]
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a hook failure.
    #[must_use]
    pub fn hook(hook: &'static str, tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook,
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with the tool and stage it happened in.
    ///
    /// Errors that already carry a stage are returned unchanged.
    #[must_use]
    pub fn at_stage(self, tool: impl Into<String>, stage: Stage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                tool: tool.into(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through [`Error::Stage`] wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error must never be downgraded to a warning.
    #[must_use]
    pub fn is_safety_violation(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidFilePath { .. }
                | Self::ArchiveTooLarge { .. }
                | Self::InvalidArchiveLimits(_)
                | Self::InvalidVersion { .. }
                | Self::ExpectedArtifactMissing { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_root() {
        let err = Error::NoVersionsFound { tool: "jq".into() }.at_stage("jq", Stage::Resolve);
        assert_eq!(err.to_string(), "resolve failed for jq");
        assert!(matches!(err.root(), Error::NoVersionsFound { .. }));
    }

    #[test]
    fn test_stage_wrapping_is_not_nested() {
        let err = Error::Cancelled
            .at_stage("jq", Stage::Download)
            .at_stage("other", Stage::Install);
        match err {
            Error::Stage { tool, stage, .. } => {
                assert_eq!(tool, "jq");
                assert_eq!(stage, Stage::Download);
            }
            other => panic!("expected stage error, got {other:?}"),
        }
    }

    #[test]
    fn test_safety_violations() {
        assert!(Error::invalid_file_path("../x").is_safety_violation());
        assert!(
            Error::ArchiveTooLarge {
                entry: "a".into(),
                limit: 1,
                scope: "total",
            }
            .at_stage("t", Stage::Install)
            .is_safety_violation()
        );
        assert!(!Error::Cancelled.is_safety_violation());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::DownloadFailed {
            url: "https://example.com/a.tar.gz".into(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Download failed: https://example.com/a.tar.gz (HTTP 404)"
        );

        let err = Error::DependencyCycle {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }
}
