//! Gitea contents-API backend.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::error::GiteaError;
use super::types::{GiteaContent, GiteaContentsResponse, GiteaFileOptions, GiteaFileResponse};
use crate::auth::{CredentialCache, CredentialClass};
use crate::http::reqwest_transport::{DEFAULT_REQUEST_TIMEOUT, ReqwestTransport};
use crate::http::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::provider::{
    self, BackendKind, DirEntry, EntryKind, RateLimiter, RemoteBackend, RemoteFile,
    decode_content, encode_content,
};

/// Default Codeberg host.
pub const CODEBERG_HOST: &str = "https://codeberg.org";

/// Backend storing a semantic space on a Gitea-compatible forge
/// (Gitea, Forgejo, Codeberg).
#[derive(Clone)]
pub struct GiteaBackend {
    transport: Arc<dyn HttpTransport>,
    host: String,
    owner: String,
    repo: String,
    branch: String,
    credentials: CredentialCache,
    /// Fed with the remote's `x-ratelimit-*` headers, when the forge sends them.
    rate_limiter: Option<RateLimiter>,
}

impl GiteaBackend {
    /// Create a new Gitea backend.
    ///
    /// # Arguments
    ///
    /// * `host` - Forge URL (e.g., "https://codeberg.org")
    /// * `owner` / `repo` / `branch` - Where the space lives
    /// * `credentials` - Token slot; personal tokens use the `token` scheme,
    ///   OAuth and installation tokens `Bearer`
    /// * `rate_limiter` - Receives remote-reported budgets
    ///
    /// # Example
    ///
    /// ```ignore
    /// let backend = GiteaBackend::new("https://git.example.com", "alice", "space", "main", credentials, None)?;
    /// ```
    pub fn new(
        host: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        credentials: CredentialCache,
        rate_limiter: Option<RateLimiter>,
    ) -> Result<Self, GiteaError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| GiteaError::Config(e.to_string()))?;

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
        host: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        credentials: CredentialCache,
        rate_limiter: Option<RateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GiteaError> {
        let host = host.trim_end_matches('/').to_string();
        Url::parse(&host).map_err(|e| GiteaError::Config(format!("{}: {}", host, e)))?;
        if owner.is_empty() || repo.is_empty() {
            return Err(GiteaError::Config(
                "owner and repository are required".to_string(),
            ));
        }

        Ok(Self {
            transport,
            host,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            credentials,
            rate_limiter,
        })
    }

    /// Get the host URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Update the rate limiter with rate limit info from response headers, if available.
    fn update_rate_limit(&self, headers: &HttpHeaders) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.observe_headers(self.credentials.class(), headers);
        }
    }

    fn api_url(&self, path: Option<&str>, with_ref: bool) -> Result<String, GiteaError> {
        let mut url = Url::parse(&self.host).map_err(|e| GiteaError::Config(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GiteaError::Config(format!("{} cannot be a base URL", self.host)))?;
            segments
                .pop_if_empty()
                .extend(["api", "v1", "repos", self.owner.as_str(), self.repo.as_str()]);
            if let Some(path) = path {
                segments
                    .push("contents")
                    .extend(path.split('/').filter(|s| !s.is_empty()));
            }
        }
        if with_ref {
            url.query_pairs_mut().append_pair("ref", &self.branch);
        }
        Ok(url.to_string())
    }

    fn authorization(&self) -> Result<String, GiteaError> {
        let scheme = match self.credentials.class() {
            CredentialClass::PersonalToken => "token",
            CredentialClass::OAuth | CredentialClass::Installation => "Bearer",
        };
        self.credentials
            .authorization(scheme)
            .ok_or_else(|| GiteaError::Auth("no token cached".to_string()))
    }

    async fn send(&self, method: HttpMethod, url: String, body: Option<&GiteaFileOptions<'_>>) -> Result<HttpResponse, GiteaError> {
        let mut request = HttpRequest::new(method, url)
            .header("Accept", "application/json")
            .header("User-Agent", "semsync")
            .header("Authorization", self.authorization()?);
        if let Some(body) = body {
            request = request.json(body)?;
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| GiteaError::Http(e.to_string()))?;

        self.update_rate_limit(&response.headers);
        Ok(response)
    }

    async fn get_contents(&self, path: &str) -> Result<Option<GiteaContentsResponse>, GiteaError> {
        let response = self
            .send(HttpMethod::Get, self.api_url(Some(path), true)?, None)
            .await?;

        match response.status {
            404 => Ok(None),
            s if (200..300).contains(&s) => Ok(Some(serde_json::from_slice(&response.body)?)),
            _ => Err(GiteaError::from_response(&response, path)),
        }
    }

    pub async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, GiteaError> {
        match self.get_contents(path).await? {
            None => Ok(None),
            Some(GiteaContentsResponse::File(item)) => {
                if item.kind != "file" {
                    return Err(GiteaError::Content {
                        path: path.to_string(),
                        message: format!("unexpected entry type {}", item.kind),
                    });
                }
                let content = match item.content.as_deref() {
                    Some(encoded) => decode_content(encoded).map_err(|e| GiteaError::Content {
                        path: path.to_string(),
                        message: e.to_string(),
                    })?,
                    None => Vec::new(),
                };
                Ok(Some(RemoteFile {
                    content,
                    version: item.sha,
                }))
            }
            Some(GiteaContentsResponse::Directory(_)) => Err(GiteaError::Content {
                path: path.to_string(),
                message: "is a directory".to_string(),
            }),
        }
    }

    /// Create (`POST`, no sha) or update (`PUT`, with sha) a file.
    pub async fn write_file(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<String, GiteaError> {
        let options = GiteaFileOptions {
            content: encode_content(content),
            message,
            branch: &self.branch,
            sha,
        };
        let method = if sha.is_some() {
            HttpMethod::Put
        } else {
            HttpMethod::Post
        };

        let response = self
            .send(method, self.api_url(Some(path), false)?, Some(&options))
            .await?;

        match response.status {
            s if (200..300).contains(&s) => {
                let written: GiteaFileResponse = serde_json::from_slice(&response.body)?;
                tracing::debug!(path = %written.content.path, sha = %written.content.sha, "Gitea write accepted");
                Ok(written.content.sha)
            }
            // Updating a file that was deleted in the meantime.
            404 if sha.is_some() => Err(GiteaError::Conflict(path.to_string())),
            _ => Err(GiteaError::from_response(&response, path)),
        }
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, GiteaError> {
        match self.get_contents(path).await? {
            None => Err(GiteaError::NotFound(path.to_string())),
            Some(GiteaContentsResponse::Directory(items)) => {
                Ok(items.into_iter().map(entry_from_content).collect())
            }
            Some(GiteaContentsResponse::File(_)) => Err(GiteaError::Content {
                path: path.to_string(),
                message: "is a file".to_string(),
            }),
        }
    }

    pub async fn get_repo(&self) -> Result<(), GiteaError> {
        let response = self
            .send(HttpMethod::Get, self.api_url(None, false)?, None)
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(GiteaError::from_response(
                &response,
                &format!("{}/{}", self.owner, self.repo),
            ))
        }
    }
}

fn entry_from_content(item: GiteaContent) -> DirEntry {
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
impl RemoteBackend for GiteaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gitea
    }

    fn name(&self) -> String {
        format!("gitea:{}/{}/{}@{}", self.host, self.owner, self.repo, self.branch)
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
        Ok(self.write_file(path, content, version, message).await?)
    }

    async fn list(&self, path: &str) -> provider::Result<Vec<DirEntry>> {
        Ok(self.list_dir(path).await?)
    }

    async fn ping(&self) -> provider::Result<()> {
        Ok(self.get_repo().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockTransport, header_get};
    use crate::provider::ProviderError;

    const CONTENTS: &str = "https://forge.test/api/v1/repos/alice/space/contents";

    fn to_headers(pairs: Vec<(&str, &str)>) -> HttpHeaders {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn response(status: u16, headers: Vec<(&str, &str)>, body: impl AsRef<[u8]>) -> HttpResponse {
        HttpResponse {
            status,
            headers: to_headers(headers),
            body: body.as_ref().to_vec(),
        }
    }

    fn backend_with(transport: &MockTransport, class: CredentialClass) -> GiteaBackend {
        GiteaBackend::new_with_transport(
            "https://forge.test/",
            "alice",
            "space",
            "main",
            CredentialCache::new(class, Some("secret".to_string())),
            None,
            Arc::new(transport.clone()),
        )
        .expect("backend")
    }

    fn backend(transport: &MockTransport) -> GiteaBackend {
        backend_with(transport, CredentialClass::PersonalToken)
    }

    fn file_response(path: &str, sha: &str) -> String {
        serde_json::json!({
            "content": {
                "name": path.rsplit('/').next().unwrap(),
                "path": path,
                "sha": sha,
                "type": "file",
                "size": 3,
                "encoding": null,
                "content": null
            }
        })
        .to_string()
    }

    #[test]
    fn test_codeberg_host() {
        assert_eq!(CODEBERG_HOST, "https://codeberg.org");
    }

    #[test]
    fn test_new_normalizes_host_with_multiple_trailing_slashes() {
        let backend = GiteaBackend::new_with_transport(
            "https://forge.example///",
            "alice",
            "space",
            "main",
            CredentialCache::new(CredentialClass::PersonalToken, None),
            None,
            Arc::new(MockTransport::new()),
        )
        .unwrap();

        assert_eq!(backend.host(), "https://forge.example");
    }

    #[test]
    fn test_new_rejects_invalid_host() {
        let result = GiteaBackend::new_with_transport(
            "not a url",
            "alice",
            "space",
            "main",
            CredentialCache::new(CredentialClass::PersonalToken, None),
            None,
            Arc::new(MockTransport::new()),
        );
        assert!(matches!(result, Err(GiteaError::Config(_))));
    }

    #[test]
    fn test_api_urls() {
        let backend = backend(&MockTransport::new());
        assert_eq!(
            backend.api_url(Some("semantic/a b.ttl"), true).unwrap(),
            format!("{CONTENTS}/semantic/a%20b.ttl?ref=main")
        );
        assert_eq!(
            backend.api_url(None, false).unwrap(),
            "https://forge.test/api/v1/repos/alice/space"
        );
    }

    #[tokio::test]
    async fn test_authorization_scheme_follows_credential_class() {
        let transport = MockTransport::new();
        let repo_url = "https://forge.test/api/v1/repos/alice/space";
        transport.push_response(HttpMethod::Get, repo_url, response(200, vec![], "{}"));
        transport.push_response(HttpMethod::Get, repo_url, response(200, vec![], "{}"));

        backend(&transport).ping().await.unwrap();
        backend_with(&transport, CredentialClass::OAuth).ping().await.unwrap();

        let requests = transport.requests();
        assert_eq!(
            header_get(&requests[0].headers, "authorization"),
            Some("token secret")
        );
        assert_eq!(
            header_get(&requests[1].headers, "authorization"),
            Some("Bearer secret")
        );
    }

    #[tokio::test]
    async fn test_fetch_file() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{CONTENTS}/a.ttl?ref=main"),
            response(
                200,
                vec![],
                serde_json::json!({
                    "name": "a.ttl",
                    "path": "a.ttl",
                    "sha": "5a1",
                    "type": "file",
                    "size": 5,
                    "encoding": "base64",
                    "content": encode_content(b"hello")
                })
                .to_string(),
            ),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{CONTENTS}/gone.ttl?ref=main"),
            response(404, vec![], r#"{"message":"not found"}"#),
        );

        let backend = backend(&transport);
        let file = backend.fetch("a.ttl").await.unwrap().unwrap();
        assert_eq!(file.content, b"hello");
        assert_eq!(file.version, "5a1");
        assert!(backend.fetch("gone.ttl").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_uses_post_and_update_uses_put() {
        let transport = MockTransport::new();
        let url = format!("{CONTENTS}/a.ttl");
        transport.push_response(HttpMethod::Post, url.clone(), response(201, vec![], file_response("a.ttl", "s1")));
        transport.push_response(HttpMethod::Put, url, response(200, vec![], file_response("a.ttl", "s2")));

        let backend = backend(&transport);
        assert_eq!(backend.store("a.ttl", b"one", None, "Create a.ttl").await.unwrap(), "s1");
        assert_eq!(
            backend.store("a.ttl", b"two", Some("s1"), "Update a.ttl").await.unwrap(),
            "s2"
        );

        let requests = transport.requests();
        let create: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(create.get("sha").is_none());
        assert_eq!(create["branch"], "main");
        let update: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(update["sha"], "s1");
    }

    #[tokio::test]
    async fn test_stale_sha_and_deleted_file_are_conflicts() {
        let transport = MockTransport::new();
        let url = format!("{CONTENTS}/a.ttl");
        transport.push_response(
            HttpMethod::Put,
            url.clone(),
            response(422, vec![], r#"{"message":"sha does not match"}"#),
        );
        transport.push_response(HttpMethod::Put, url, response(404, vec![], "{}"));

        let backend = backend(&transport);
        for _ in 0..2 {
            let err = backend.store("a.ttl", b"x", Some("old"), "m").await.unwrap_err();
            assert!(matches!(err, ProviderError::VersionConflict { .. }));
        }
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_expired() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            format!("{CONTENTS}/a.ttl"),
            response(401, vec![], r#"{"message":"invalid token"}"#),
        );
        let err = backend(&transport).store("a.ttl", b"x", None, "m").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthExpired));
    }

    #[tokio::test]
    async fn test_list_directory_entries() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{CONTENTS}/semantic/vocabulary?ref=main"),
            response(
                200,
                vec![],
                serde_json::json!([
                    {"name": "concepts", "path": "semantic/vocabulary/concepts", "sha": "t1", "type": "dir", "size": 0, "encoding": null, "content": null}
                ])
                .to_string(),
            ),
        );

        let entries = backend(&transport).list("semantic/vocabulary").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert_eq!(entries[0].path, "semantic/vocabulary/concepts");
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let transport = MockTransport::new();
        transport.push_failure(
            HttpMethod::Get,
            format!("{CONTENTS}/a.ttl?ref=main"),
            "connection refused",
        );
        let err = backend(&transport).fetch("a.ttl").await.unwrap_err();
        assert!(err.is_transient());
    }
}
