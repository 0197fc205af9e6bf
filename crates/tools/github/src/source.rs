//! GitHub REST API implementation of [`ReleaseSource`].

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{HttpClient, HttpRequest, Release, ReleaseAsset, ReleaseSource, RepoRef};
use toolvm_core::{Error, Result};
use tracing::{debug, trace};

use crate::link::parse_next_link;

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size requested from list endpoints (the API maximum).
pub const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct TagDto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AssetDto {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ReleaseDto {
    #[serde(default)]
    id: u64,
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<AssetDto>,
}

impl From<AssetDto> for ReleaseAsset {
    fn from(asset: AssetDto) -> Self {
        Self {
            name: asset.name,
            download_url: asset.browser_download_url,
            size: asset.size,
        }
    }
}

impl From<ReleaseDto> for Release {
    fn from(release: ReleaseDto) -> Self {
        Self {
            tag_name: release.tag_name,
            prerelease: release.prerelease,
            assets: release.assets.into_iter().map(Into::into).collect(),
        }
    }
}

/// Lists tags and releases through the GitHub REST API.
pub struct GitHubReleaseSource {
    http: Arc<dyn HttpClient>,
    api_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for GitHubReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubReleaseSource")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubReleaseSource {
    /// Create a source talking to the public API, unauthenticated.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
        }
    }

    /// Use a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn repo_url(&self, repo: &RepoRef, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, repo.owner, repo.name, path)
    }

    /// `releases/tags/<tag>` with the tag percent-encoded as one path segment.
    fn release_by_tag_url(&self, repo: &RepoRef, tag: &str) -> Result<String> {
        let base = self.repo_url(repo, "releases/tags");
        let invalid = || Error::configuration(format!("invalid GitHub API URL '{base}'"));
        let mut url = reqwest::Url::parse(&base).map_err(|_| invalid())?;
        url.path_segments_mut().map_err(|()| invalid())?.push(tag);
        Ok(url.into())
    }

    fn request(&self, url: &str) -> HttpRequest {
        let request = HttpRequest::get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(T, Option<String>)> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let response = self.http.get(&self.request(url), cancel).await?;
        if !response.is_success() {
            return Err(Error::DownloadFailed {
                url: url.to_string(),
                status: response.status,
            });
        }
        let next = response.header("link").and_then(parse_next_link);
        Ok((serde_json::from_slice(&response.body)?, next))
    }

    async fn get_paginated<T: DeserializeOwned>(
        &self,
        first: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;
        while let Some(url) = next {
            let (page, following): (Vec<T>, _) = self.get_json(&url, cancel).await?;
            pages += 1;
            trace!(%url, items = page.len(), "Fetched page");
            items.extend(page);
            next = following;
        }
        debug!(pages, items = items.len(), "Pagination complete");
        Ok(items)
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    async fn list_tags(&self, repo: &RepoRef, cancel: &CancellationToken) -> Result<Vec<String>> {
        debug!(%repo, "Listing tags");
        let url = self.repo_url(repo, &format!("tags?per_page={PER_PAGE}"));
        let tags: Vec<TagDto> = self.get_paginated(url, cancel).await?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    async fn list_releases(
        &self,
        repo: &RepoRef,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>> {
        debug!(%repo, "Listing releases");
        let url = self.repo_url(repo, &format!("releases?per_page={PER_PAGE}"));
        let releases: Vec<ReleaseDto> = self.get_paginated(url, cancel).await?;
        Ok(releases
            .into_iter()
            .filter(|r| !r.draft)
            .map(Into::into)
            .collect())
    }

    async fn list_release_assets(
        &self,
        repo: &RepoRef,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReleaseAsset>> {
        debug!(%repo, %tag, "Listing release assets");
        let url = self.release_by_tag_url(repo, tag)?;
        let (release, _): (ReleaseDto, _) = self.get_json(&url, cancel).await?;
        if release.id == 0 {
            return Ok(release.assets.into_iter().map(Into::into).collect());
        }
        // The embedded asset list is truncated; page through the assets endpoint.
        let url = self.repo_url(
            repo,
            &format!("releases/{}/assets?per_page={PER_PAGE}", release.id),
        );
        let assets: Vec<AssetDto> = self.get_paginated(url, cancel).await?;
        Ok(assets.into_iter().map(Into::into).collect())
    }
}
