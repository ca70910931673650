use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::auth::{CredentialCache, CredentialClass};

use super::errors::{ProviderError, Result};
use super::memory::MemoryBackend;
use super::rate_limit::RateLimiter;
use super::store::Provider;
use super::types::{BackendKind, RemoteBackend};

/// Where and how to reach one semantic space.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: BackendKind,
    /// Forge URL for Gitea, GitHub Enterprise URL for GitHub (unset means github.com).
    pub host: Option<String>,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: Option<String>,
    pub credential_class: CredentialClass,
    /// Directory of the space inside the repository.
    pub base_path: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::GitHub,
            host: None,
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            token: None,
            credential_class: CredentialClass::PersonalToken,
            base_path: "semantic".to_string(),
        }
    }
}

impl ProviderConfig {
    /// A config for an in-memory space named `label`.
    pub fn memory(label: &str) -> Self {
        Self {
            kind: BackendKind::Memory,
            repo: label.to_string(),
            token: Some("memory".to_string()),
            ..Self::default()
        }
    }

    /// `owner/repo`, or the memory label.
    pub fn display_name(&self) -> String {
        match self.kind {
            BackendKind::Memory => format!("memory:{}", self.repo),
            _ => format!("{}:{}/{}", self.kind, self.owner, self.repo),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("credential_class", &self.credential_class)
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// Construct a [`Provider`] for `config`, sharing `limiter` with every other
/// provider built from the same instance.
pub fn build_provider(config: &ProviderConfig, limiter: &RateLimiter) -> Result<Provider> {
    let credentials = CredentialCache::new(config.credential_class, config.token.clone());

    let backend: Arc<dyn RemoteBackend> = match config.kind {
        BackendKind::Memory => {
            let label = if config.repo.is_empty() {
                "default"
            } else {
                config.repo.as_str()
            };
            Arc::new(MemoryBackend::with_credentials(label, credentials))
        }
        #[cfg(feature = "github")]
        BackendKind::GitHub => Arc::new(crate::github::GitHubBackend::new(
            config.host.as_deref(),
            &config.owner,
            &config.repo,
            &config.branch,
            credentials,
            Some(limiter.clone()),
        )?),
        #[cfg(feature = "gitea")]
        BackendKind::Gitea => {
            let host = config
                .host
                .as_deref()
                .unwrap_or(crate::gitea::CODEBERG_HOST);
            Arc::new(crate::gitea::GiteaBackend::new(
                host,
                &config.owner,
                &config.repo,
                &config.branch,
                credentials,
                Some(limiter.clone()),
            )?)
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(ProviderError::internal(format!(
                "backend {other} is not enabled in this build"
            )));
        }
    };

    Ok(Provider::new(backend)
        .with_base_path(&config.base_path)
        .with_rate_limiter(limiter.clone()))
}
