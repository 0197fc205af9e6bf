//! Collaborator interfaces injected into plugins.
//!
//! Strategies never reach for the network, the filesystem or subprocesses
//! directly; they go through these traits so tests can substitute them.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// A GET request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Create a request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A buffered response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Look up a header by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET and buffer the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Transport failures and cancellation.
    async fn get(&self, request: &HttpRequest, cancel: &CancellationToken)
    -> Result<HttpResponse>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`crate::Error::DownloadFailed`] for a non-success status, transport
    /// failures, I/O errors and cancellation.
    async fn download(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64>;
}

/// A source repository, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    /// Owner or organisation.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoRef {
    /// Create a repository reference.
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub download_url: String,
    /// Size in bytes.
    pub size: u64,
}

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Tag the release points at.
    pub tag_name: String,
    /// Whether the publisher marked it as a pre-release.
    pub prerelease: bool,
    /// Attached files.
    pub assets: Vec<ReleaseAsset>,
}

/// Lists tags and releases of a source repository.
///
/// Implementations paginate transparently and fail the whole listing if
/// any page fails.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// All tag names, in the order the source reports them.
    ///
    /// # Errors
    ///
    /// Transport errors, non-success responses, cancellation.
    async fn list_tags(&self, repo: &RepoRef, cancel: &CancellationToken) -> Result<Vec<String>>;

    /// All published releases.
    ///
    /// # Errors
    ///
    /// Transport errors, non-success responses, cancellation.
    async fn list_releases(&self, repo: &RepoRef, cancel: &CancellationToken)
    -> Result<Vec<Release>>;

    /// Assets of the release tagged `tag`.
    ///
    /// # Errors
    ///
    /// Transport errors, non-success responses (including an unknown tag),
    /// cancellation.
    async fn list_release_assets(
        &self,
        repo: &RepoRef,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReleaseAsset>>;
}

/// Filesystem operations used by the lifecycle.
pub trait FileSystem: Send + Sync {
    /// Whether `path` exists (following symlinks).
    fn exists(&self, path: &Path) -> bool;

    /// Size of a regular file, `None` if it does not exist.
    fn file_size(&self, path: &Path) -> Option<u64>;

    /// Create a directory and its parents.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a directory tree; succeeds if it is already gone.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors other than "not found".
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a file; succeeds if it is already gone.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors other than "not found".
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Rename a file or directory.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Read a UTF-8 file.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors.
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Names of the entries of a directory, sorted; empty if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors other than "not found".
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match std::fs::remove_dir_all(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = entries
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}

/// A subprocess invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Kill the process after this long.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined for display.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs subprocesses.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is *not* an error here; see [`run_checked`].
    ///
    /// # Errors
    ///
    /// Spawn failures, timeouts and cancellation.
    async fn run(&self, command: &CommandSpec, cancel: &CancellationToken)
    -> Result<CommandOutput>;
}

/// Run a command and turn a non-zero exit into [`crate::Error::Command`].
///
/// # Errors
///
/// Everything [`ProcessRunner::run`] returns, plus unsuccessful exits.
pub async fn run_checked(
    runner: &dyn ProcessRunner,
    command: &CommandSpec,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    let output = runner.run(command, cancel).await?;
    if output.success() {
        return Ok(output);
    }
    let status = output
        .code
        .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
    Err(crate::Error::command(
        command.display(),
        format!("{status}: {}", output.stderr.trim()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_header_lookup() {
        let mut response = HttpResponse {
            status: 200,
            ..HttpResponse::default()
        };
        response
            .headers
            .insert("link".into(), "<https://x>; rel=\"next\"".into());
        assert!(response.is_success());
        assert_eq!(response.header("Link"), Some("<https://x>; rel=\"next\""));
        assert!(response.header("etag").is_none());
    }

    #[test]
    fn test_os_filesystem_removal_is_idempotent() {
        let temp = tempfile::TempDir::new().unwrap();
        let fs = OsFileSystem;
        let dir = temp.path().join("a/b");
        fs.create_dir_all(&dir).unwrap();
        assert!(fs.exists(&dir));
        assert!(fs.file_size(&dir).is_none());
        fs.remove_dir_all(&temp.path().join("a")).unwrap();
        fs.remove_dir_all(&temp.path().join("a")).unwrap();
        fs.remove_file(&temp.path().join("missing")).unwrap();
        assert!(!fs.exists(&dir));
        assert!(fs.list_dir(&dir).unwrap().is_empty());
    }

    #[test]
    fn test_os_filesystem_list_dir_sorted() {
        let temp = tempfile::TempDir::new().unwrap();
        let fs = OsFileSystem;
        for name in ["b", "a", "c"] {
            fs.create_dir_all(&temp.path().join(name)).unwrap();
        }
        assert_eq!(fs.list_dir(temp.path()).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_command_spec_display() {
        let cmd = CommandSpec::new("git")
            .args(["clone", "--depth", "1"])
            .arg("https://example.com/r.git")
            .cwd("/tmp");
        assert_eq!(cmd.display(), "git clone --depth 1 https://example.com/r.git");
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("/tmp")));
    }

    struct Exit(Option<i32>);

    #[async_trait]
    impl ProcessRunner for Exit {
        async fn run(&self, _: &CommandSpec, _: &CancellationToken) -> Result<CommandOutput> {
            Ok(CommandOutput {
                code: self.0,
                stdout: String::new(),
                stderr: "boom\n".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_run_checked() {
        let cancel = CancellationToken::new();
        let cmd = CommandSpec::new("make").arg("install");
        assert!(run_checked(&Exit(Some(0)), &cmd, &cancel).await.is_ok());

        let err = run_checked(&Exit(Some(2)), &cmd, &cancel).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command `make install` failed: exit code 2: boom"
        );
    }
}
