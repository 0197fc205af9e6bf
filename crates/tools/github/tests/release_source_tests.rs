//! Tests for the GitHub release source against an in-memory HTTP client.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{HttpClient, HttpRequest, HttpResponse, ReleaseSource, RepoRef};
use toolvm_core::{Error, Result};
use toolvm_tools_github::GitHubReleaseSource;

const API: &str = "https://api.test";

#[derive(Default)]
struct FakeHttp {
    routes: HashMap<String, HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    fn route(mut self, url: &str, status: u16, body: &str, next: Option<&str>) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(next) = next {
            headers.insert("link".to_string(), format!("<{next}>; rel=\"next\""));
        }
        self.routes.insert(
            url.to_string(),
            HttpResponse {
                status,
                headers,
                body: Bytes::from(body.to_string()),
            },
        );
        self
    }

    fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, request: &HttpRequest, _: &CancellationToken) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.routes.get(&request.url).cloned().unwrap_or(HttpResponse {
            status: 404,
            ..HttpResponse::default()
        }))
    }

    async fn download(&self, url: &str, _: &Path, _: &CancellationToken) -> Result<u64> {
        Err(Error::DownloadFailed {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn repo() -> RepoRef {
    RepoRef::new("acme", "tool")
}

fn source(http: &Arc<FakeHttp>) -> GitHubReleaseSource {
    GitHubReleaseSource::new(http.clone()).with_api_url(format!("{API}/"))
}

#[tokio::test]
async fn test_tags_follow_pagination() {
    let page2 = format!("{API}/repositories/1/tags?per_page=100&page=2");
    let http = Arc::new(
        FakeHttp::default()
            .route(
                &format!("{API}/repos/acme/tool/tags?per_page=100"),
                200,
                r#"[{"name":"v1.2.0"},{"name":"v1.1.0-rc1"}]"#,
                Some(&page2),
            )
            .route(&page2, 200, r#"[{"name":"v1.0.0"}]"#, None),
    );

    let tags = source(&http)
        .list_tags(&repo(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tags, vec!["v1.2.0", "v1.1.0-rc1", "v1.0.0"]);
    assert_eq!(http.requested_urls().len(), 2);
}

#[tokio::test]
async fn test_page_failure_aborts_listing() {
    let page2 = format!("{API}/repositories/1/tags?page=2");
    let http = Arc::new(
        FakeHttp::default()
            .route(
                &format!("{API}/repos/acme/tool/tags?per_page=100"),
                200,
                r#"[{"name":"v1.0.0"}]"#,
                Some(&page2),
            )
            .route(&page2, 502, "bad gateway", None),
    );

    let err = source(&http)
        .list_tags(&repo(), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        Error::DownloadFailed { url, status } => {
            assert_eq!(url, page2);
            assert_eq!(status, 502);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_releases_skip_drafts() {
    let http = Arc::new(FakeHttp::default().route(
        &format!("{API}/repos/acme/tool/releases?per_page=100"),
        200,
        r#"[
            {"tag_name":"v2.0.0","draft":true,"prerelease":false,"assets":[]},
            {"tag_name":"v1.1.0-rc1","draft":false,"prerelease":true,"assets":[]},
            {"tag_name":"v1.0.0","draft":false,"prerelease":false,"assets":[
                {"name":"tool_linux_amd64.tar.gz","browser_download_url":"https://dl/tool.tgz","size":1234}
            ]}
        ]"#,
        None,
    ));

    let releases = source(&http)
        .list_releases(&repo(), &CancellationToken::new())
        .await
        .unwrap();

    let tags: Vec<_> = releases.iter().map(|r| r.tag_name.as_str()).collect();
    assert_eq!(tags, vec!["v1.1.0-rc1", "v1.0.0"]);
    assert!(releases[0].prerelease);
    assert_eq!(releases[1].assets[0].size, 1234);
    assert_eq!(releases[1].assets[0].download_url, "https://dl/tool.tgz");
}

#[tokio::test]
async fn test_release_assets_by_tag() {
    let page2 = format!("{API}/repositories/1/releases/42/assets?per_page=100&page=2");
    let http = Arc::new(
        FakeHttp::default()
            .route(
                &format!("{API}/repos/acme/tool/releases/tags/v1.0.0"),
                200,
                r#"{"id":42,"tag_name":"v1.0.0","assets":[
                    {"name":"a.zip","browser_download_url":"https://dl/a.zip","size":1}
                ]}"#,
                None,
            )
            .route(
                &format!("{API}/repos/acme/tool/releases/42/assets?per_page=100"),
                200,
                r#"[{"name":"a.zip","browser_download_url":"https://dl/a.zip","size":1}]"#,
                Some(&page2),
            )
            .route(
                &page2,
                200,
                r#"[{"name":"checksums.txt","browser_download_url":"https://dl/checksums.txt"}]"#,
                None,
            ),
    );

    let assets = source(&http)
        .list_release_assets(&repo(), "v1.0.0", &CancellationToken::new())
        .await
        .unwrap();
    let names: Vec<_> = assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a.zip", "checksums.txt"]);
    assert_eq!(http.requested_urls().len(), 3);

    let err = source(&http)
        .list_release_assets(&repo(), "v9.9.9", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DownloadFailed { status: 404, .. }));
}

#[tokio::test]
async fn test_release_tag_is_escaped() {
    let http = Arc::new(FakeHttp::default().route(
        &format!("{API}/repos/acme/tool/releases/tags/tool%2F1.0%20final%3F"),
        200,
        r#"{"tag_name":"tool/1.0 final?","assets":[
            {"name":"a.zip","browser_download_url":"https://dl/a.zip"}
        ]}"#,
        None,
    ));

    let assets = source(&http)
        .list_release_assets(&repo(), "tool/1.0 final?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(
        http.requested_urls(),
        vec![format!("{API}/repos/acme/tool/releases/tags/tool%2F1.0%20final%3F")]
    );
}

#[tokio::test]
async fn test_token_and_headers() {
    let http = Arc::new(FakeHttp::default().route(
        &format!("{API}/repos/acme/tool/tags?per_page=100"),
        200,
        "[]",
        None,
    ));

    source(&http)
        .with_token(Some("secret".into()))
        .list_tags(&repo(), &CancellationToken::new())
        .await
        .unwrap();
    source(&http)
        .with_token(Some("  ".into()))
        .list_tags(&repo(), &CancellationToken::new())
        .await
        .unwrap();

    let requests = http.requests.lock().unwrap();
    let auth = |r: &HttpRequest| {
        r.headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .map(|(_, v)| v.clone())
    };
    assert_eq!(auth(&requests[0]).as_deref(), Some("Bearer secret"));
    assert_eq!(auth(&requests[1]), None);
    assert!(
        requests[0]
            .headers
            .iter()
            .any(|(k, v)| k == "Accept" && v == "application/vnd.github+json")
    );
}

#[tokio::test]
async fn test_malformed_body() {
    let http = Arc::new(FakeHttp::default().route(
        &format!("{API}/repos/acme/tool/tags?per_page=100"),
        200,
        "{not json",
        None,
    ));
    let err = source(&http)
        .list_tags(&repo(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[tokio::test]
async fn test_cancelled_listing() {
    let http = Arc::new(FakeHttp::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = source(&http).list_tags(&repo(), &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(http.requested_urls().is_empty());
}
