use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pipeline::{GitRef, RepositoryRef, SourceError, SourceRepository};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::GitHubError;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("gh-s3-deploy/", env!("CARGO_PKG_VERSION"));

/// Authenticated client for the subset of the GitHub REST API the pipeline
/// needs.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: SecretString,
}

impl GitHubClient {
    /// A client against [`DEFAULT_API_URL`] authenticating with `token`.
    pub fn new(token: SecretString) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
            token,
        })
    }

    /// Points the client at another API root, e.g. a GitHub Enterprise host.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Turns any non-success status into [`GitHubError::Status`].
    pub(crate) async fn check(response: Response) -> Result<Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response.text().await.unwrap_or_default();
        Err(GitHubError::Status {
            status: status.as_u16(),
            message,
            retry_after,
        })
    }

    async fn get_contents(
        &self,
        repo: &RepositoryRef,
        path: &str,
        git_ref: &GitRef,
    ) -> Result<Vec<u8>, GitHubError> {
        let url = format!(
            "/repos/{}/{}/contents/{}",
            repo.owner,
            repo.name,
            path.trim_start_matches('/')
        );
        let response = self
            .request(Method::GET, &url)
            .query(&[("ref", git_ref.as_str())])
            .send()
            .await?;
        let contents: ContentsResponse = Self::check(response).await?.json().await?;
        contents.decode()
    }

    async fn stream_zipball(
        &self,
        repo: &RepositoryRef,
        git_ref: &GitRef,
        dest: &Path,
    ) -> Result<u64, GitHubError> {
        let url = format!("/repos/{}/{}/zipball/{}", repo.owner, repo.name, git_ref);
        let response = self.request(Method::GET, &url).send().await?;
        let mut response = Self::check(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceRepository for GitHubClient {
    #[instrument(skip(self), fields(repo = %repo, git_ref = %git_ref))]
    async fn fetch_file(
        &self,
        repo: &RepositoryRef,
        path: &str,
        git_ref: &GitRef,
    ) -> Result<Vec<u8>, SourceError> {
        let bytes = self.get_contents(repo, path, git_ref).await?;
        debug!(bytes = bytes.len(), "Fetched file contents");
        Ok(bytes)
    }

    #[instrument(skip(self, dest), fields(repo = %repo, git_ref = %git_ref))]
    async fn download_archive(
        &self,
        repo: &RepositoryRef,
        git_ref: &GitRef,
        dest: &Path,
    ) -> Result<u64, SourceError> {
        let written = self.stream_zipball(repo, git_ref, dest).await?;
        debug!(bytes = written, dest = %dest.display(), "Downloaded archive");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Contents endpoint payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl ContentsResponse {
    fn decode(self) -> Result<Vec<u8>, GitHubError> {
        match (self.encoding.as_deref(), self.content) {
            (Some("base64"), Some(content)) => {
                // The API wraps the payload at 60 columns.
                let compact: String = content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                STANDARD
                    .decode(compact)
                    .map_err(|e| GitHubError::Decode(format!("invalid base64 content: {e}")))
            }
            (encoding, _) => Err(GitHubError::Decode(format!(
                "unsupported content encoding {encoding:?}"
            ))),
        }
    }
}
