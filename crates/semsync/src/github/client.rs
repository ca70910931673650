//! GitHub contents-API backend.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::error::GitHubError;
use super::types::{ContentsResponse, GitHubContent, PutContentsRequest, PutContentsResponse};
use crate::auth::CredentialCache;
use crate::http::reqwest_transport::{DEFAULT_REQUEST_TIMEOUT, ReqwestTransport};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::provider::{
    self, BackendKind, DirEntry, EntryKind, RateLimiter, RemoteBackend, RemoteFile,
    decode_content, encode_content,
};

/// Public GitHub API endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// REST API version requested on every call.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Backend storing a semantic space in a GitHub repository.
///
/// Every request carries `Authorization: Bearer <token>`; personal, OAuth and
/// installation tokens all use that header shape.
#[derive(Clone)]
pub struct GitHubBackend {
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    credentials: CredentialCache,
    /// Fed with the remote's `x-ratelimit-*` headers.
    rate_limiter: Option<RateLimiter>,
}

impl GitHubBackend {
    /// Create a backend using the reqwest transport.
    ///
    /// `host` selects GitHub Enterprise Server (`https://ghe.example.com` →
    /// `https://ghe.example.com/api/v3`); `None` means github.com.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let credentials = CredentialCache::new(CredentialClass::PersonalToken, Some(token));
    /// let backend = GitHubBackend::new(None, "octocat", "knowledge", "main", credentials, None)?;
    /// ```
    pub fn new(
        host: Option<&str>,
        owner: &str,
        repo: &str,
        branch: &str,
        credentials: CredentialCache,
        rate_limiter: Option<RateLimiter>,
    ) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| GitHubError::Config(e.to_string()))?;

        Self::new_with_transport(
            host,
            owner,
            repo,
            branch,
            credentials,
            rate_limiter,
            Arc::new(transport),
        )
    }

    pub fn new_with_transport(
        host: Option<&str>,
        owner: &str,
        repo: &str,
        branch: &str,
        credentials: CredentialCache,
        rate_limiter: Option<RateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GitHubError> {
        if owner.is_empty() || repo.is_empty() {
            return Err(GitHubError::Config(
                "owner and repository are required".to_string(),
            ));
        }

        let api_base = api_base_for(host);
        Url::parse(&api_base).map_err(|e| GitHubError::Config(format!("{api_base}: {e}")))?;

        Ok(Self {
            transport,
            api_base,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            credentials,
            rate_limiter,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, segments: &[&str], path: Option<&str>, with_ref: bool) -> Result<String, GitHubError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| GitHubError::Config(e.to_string()))?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| GitHubError::Config(format!("{} cannot be a base URL", self.api_base)))?;
            parts.pop_if_empty().extend(segments);
            if let Some(path) = path {
                parts.extend(path.split('/').filter(|s| !s.is_empty()));
            }
        }
        if with_ref {
            url.query_pairs_mut().append_pair("ref", &self.branch);
        }
        Ok(url.to_string())
    }

    fn contents_url(&self, path: &str, with_ref: bool) -> Result<String, GitHubError> {
        self.url(
            &["repos", self.owner.as_str(), self.repo.as_str(), "contents"],
            Some(path),
            with_ref,
        )
    }

    fn request(&self, method: HttpMethod, url: String) -> Result<HttpRequest, GitHubError> {
        let authorization = self
            .credentials
            .authorization("Bearer")
            .ok_or(GitHubError::AuthRequired)?;

        Ok(HttpRequest::new(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "semsync")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header("Authorization", authorization))
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitHubError> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| GitHubError::Http(e.to_string()))?;

        if let Some(ref limiter) = self.rate_limiter {
            limiter.observe_headers(self.credentials.class(), &response.headers);
        }
        Ok(response)
    }

    /// GET the contents endpoint; `None` on 404.
    async fn get_contents(&self, path: &str) -> Result<Option<ContentsResponse>, GitHubError> {
        let request = self.request(HttpMethod::Get, self.contents_url(path, true)?)?;
        let response = self.send(request).await?;

        match response.status {
            404 => Ok(None),
            s if (200..300).contains(&s) => Ok(Some(serde_json::from_slice(&response.body)?)),
            _ => Err(GitHubError::from_response(&response, path)),
        }
    }

    pub async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, GitHubError> {
        match self.get_contents(path).await? {
            None => Ok(None),
            Some(ContentsResponse::File(item)) => file_from_item(path, item).map(Some),
            Some(ContentsResponse::Directory(_)) => Err(GitHubError::Content {
                path: path.to_string(),
                message: "is a directory".to_string(),
            }),
        }
    }

    pub async fn put_file(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<String, GitHubError> {
        let body = PutContentsRequest {
            message,
            content: encode_content(content),
            sha,
            branch: &self.branch,
        };
        let request = self
            .request(HttpMethod::Put, self.contents_url(path, false)?)?
            .json(&body)?;
        let response = self.send(request).await?;

        if !response.is_success() {
            return Err(GitHubError::from_response(&response, path));
        }

        let committed: PutContentsResponse = serde_json::from_slice(&response.body)?;
        tracing::debug!(path = %committed.content.path, sha = %committed.content.sha, "GitHub write accepted");
        Ok(committed.content.sha)
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, GitHubError> {
        match self.get_contents(path).await? {
            None => Err(GitHubError::NotFound(path.to_string())),
            Some(ContentsResponse::Directory(items)) => {
                Ok(items.into_iter().map(entry_from_item).collect())
            }
            Some(ContentsResponse::File(_)) => Err(GitHubError::Content {
                path: path.to_string(),
                message: "is a file".to_string(),
            }),
        }
    }

    /// `GET /repos/{owner}/{repo}`: checks reachability and the credential.
    pub async fn get_repo(&self) -> Result<(), GitHubError> {
        let url = self.url(&["repos", self.owner.as_str(), self.repo.as_str()], None, false)?;
        let response = self.send(self.request(HttpMethod::Get, url)?).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(GitHubError::from_response(
                &response,
                &format!("{}/{}", self.owner, self.repo),
            ))
        }
    }
}

fn api_base_for(host: Option<&str>) -> String {
    match host.map(|h| h.trim_end_matches('/')) {
        None | Some("") | Some("https://github.com") | Some("github.com") => {
            GITHUB_API_URL.to_string()
        }
        Some(h) if h.contains("api.github.com") || h.ends_with("/api/v3") => h.to_string(),
        Some(h) => format!("{h}/api/v3"),
    }
}

fn file_from_item(path: &str, item: GitHubContent) -> Result<RemoteFile, GitHubError> {
    if item.kind != "file" {
        return Err(GitHubError::Content {
            path: path.to_string(),
            message: format!("unexpected entry type {}", item.kind),
        });
    }
    let content = match (item.encoding.as_deref(), item.content.as_deref()) {
        (Some("base64") | None, Some(encoded)) => {
            decode_content(encoded).map_err(|e| GitHubError::Content {
                path: path.to_string(),
                message: e.to_string(),
            })?
        }
        (Some("base64") | None, None) => Vec::new(),
        // Files over 1 MB come back with encoding "none" and no inline content.
        (Some(other), _) => {
            return Err(GitHubError::Content {
                path: path.to_string(),
                message: format!("unsupported encoding {other}"),
            });
        }
    };

    Ok(RemoteFile {
        content,
        version: item.sha,
    })
}

fn entry_from_item(item: GitHubContent) -> DirEntry {
    let kind = if item.kind == "dir" {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    DirEntry {
        name: item.name,
        path: item.path,
        kind,
        size: item.size,
        version: Some(item.sha),
    }
}

#[async_trait]
impl RemoteBackend for GitHubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GitHub
    }

    fn name(&self) -> String {
        format!("github:{}/{}@{}", self.owner, self.repo, self.branch)
    }

    fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    async fn fetch(&self, path: &str) -> provider::Result<Option<RemoteFile>> {
        Ok(self.get_file(path).await?)
    }

    async fn store(
        &self,
        path: &str,
        content: &[u8],
        version: Option<&str>,
        message: &str,
    ) -> provider::Result<String> {
        Ok(self.put_file(path, content, version, message).await?)
    }

    async fn list(&self, path: &str) -> provider::Result<Vec<DirEntry>> {
        Ok(self.list_dir(path).await?)
    }

    async fn ping(&self) -> provider::Result<()> {
        Ok(self.get_repo().await?)
    }
}
