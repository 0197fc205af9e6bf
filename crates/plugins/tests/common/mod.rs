//! In-memory port fakes shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{
    CommandOutput, CommandSpec, HttpClient, HttpRequest, HttpResponse, ProcessRunner, Release,
    ReleaseAsset, ReleaseSource, RepoRef,
};
use toolvm_core::{Error, HostPlatform, Result};
use toolvm_plugins::PluginContext;

/// Release source serving fixed tags and releases.
#[derive(Default)]
pub struct FakeReleases {
    pub tags: Vec<String>,
    pub releases: Vec<Release>,
    pub calls: Mutex<usize>,
}

impl FakeReleases {
    pub fn with_tags(tags: &[&str]) -> Self {
        Self {
            tags: tags.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ReleaseSource for FakeReleases {
    async fn list_tags(&self, _: &RepoRef, cancel: &CancellationToken) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        *self.calls.lock().unwrap() += 1;
        Ok(self.tags.clone())
    }

    async fn list_releases(&self, _: &RepoRef, cancel: &CancellationToken) -> Result<Vec<Release>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        *self.calls.lock().unwrap() += 1;
        Ok(self.releases.clone())
    }

    async fn list_release_assets(
        &self,
        _: &RepoRef,
        tag: &str,
        _: &CancellationToken,
    ) -> Result<Vec<ReleaseAsset>> {
        Ok(self
            .releases
            .iter()
            .find(|r| r.tag_name == tag)
            .map(|r| r.assets.clone())
            .unwrap_or_default())
    }
}

/// HTTP client serving fixed bodies by URL and recording what was fetched.
#[derive(Default)]
pub struct FakeHttp {
    pub routes: Mutex<HashMap<String, Vec<u8>>>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn route(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, request: &HttpRequest, _: &CancellationToken) -> Result<HttpResponse> {
        let body = self.routes.lock().unwrap().get(&request.url).cloned();
        Ok(match body {
            Some(body) => HttpResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: Bytes::from(body),
            },
            None => HttpResponse {
                status: 404,
                headers: BTreeMap::new(),
                body: Bytes::new(),
            },
        })
    }

    async fn download(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let body = self.routes.lock().unwrap().get(url).cloned();
        let Some(body) = body else {
            return Err(Error::DownloadFailed {
                url: url.to_string(),
                status: 404,
            });
        };
        self.downloads.lock().unwrap().push(url.to_string());
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

type RunHook = Box<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

/// Process runner recording commands; the optional handler decides the
/// outcome and may touch the filesystem.
#[derive(Default)]
pub struct FakeRunner {
    pub commands: Mutex<Vec<CommandSpec>>,
    pub handler: Option<RunHook>,
}

impl FakeRunner {
    pub fn with_handler(
        handler: impl Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static,
    ) -> Self {
        Self {
            commands: Mutex::default(),
            handler: Some(Box::new(handler)),
        }
    }

    pub fn displayed(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(CommandSpec::display)
            .collect()
    }
}

pub fn ok_output() -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
    }
}

pub fn failed_output(stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.commands.lock().unwrap().push(spec.clone());
        Ok(self.handler.as_ref().map_or_else(ok_output, |h| h(spec)))
    }
}

/// Fakes wired into a plugin context for `linux/amd64`.
pub struct Harness {
    pub releases: Arc<FakeReleases>,
    pub http: Arc<FakeHttp>,
    pub runner: Arc<FakeRunner>,
    pub ctx: PluginContext,
    pub temp: tempfile::TempDir,
}

impl Harness {
    pub fn new(releases: FakeReleases) -> Self {
        Self::with_runner(releases, FakeRunner::default())
    }

    pub fn with_runner(releases: FakeReleases, runner: FakeRunner) -> Self {
        let releases = Arc::new(releases);
        let http = Arc::new(FakeHttp::default());
        let runner = Arc::new(runner);
        let ctx = PluginContext::new(http.clone(), releases.clone(), runner.clone())
            .with_host(HostPlatform::new("linux", "amd64"));
        Self {
            releases,
            http,
            runner,
            ctx,
            temp: tempfile::TempDir::new().unwrap(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    pub fn download_path(&self, tool: &str, version: &str) -> PathBuf {
        self.temp.path().join("downloads").join(tool).join(version)
    }

    pub fn install_path(&self, tool: &str, version: &str) -> PathBuf {
        self.temp.path().join("installs").join(tool).join(version)
    }
}

/// A gzip-compressed tarball of `(path, contents, mode)` entries.
pub fn tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
