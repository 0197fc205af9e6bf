//! [`HttpClient`] backed by `reqwest`.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use toolvm_core::ports::{HttpClient, HttpRequest, HttpResponse};
use toolvm_core::{Error, Result};
use tracing::{debug, trace};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("toolvm/", env!("CARGO_PKG_VERSION"));

/// HTTP client with cancellation and streaming downloads.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a client with the default TLS configuration.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            response = builder.send() => {
                response.map_err(|e| Error::transport(&request.url, e))
            }
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        trace!(url = %request.url, "GET");
        let response = self.send(request, cancel).await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            body = response.bytes() => body.map_err(|e| Error::transport(&request.url, e))?,
        };
        debug!(url = %request.url, status, bytes = body.len(), "Response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        debug!(%url, dest = %dest.display(), "Downloading");
        let mut response = self.send(&HttpRequest::get(url), cancel).await?;
        if !response.status().is_success() {
            return Err(Error::DownloadFailed {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk.map_err(|e| Error::transport(url, e))?,
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(%url, bytes = written, "Download complete");
        Ok(written)
    }
}
