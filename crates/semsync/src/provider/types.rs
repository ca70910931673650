use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialCache, CredentialClass};

use super::errors::Result;
use super::rate_limit::RateUsage;

/// Which remote a backend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[serde(rename = "github")]
    GitHub,
    Gitea,
    Memory,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::GitHub => "github",
            BackendKind::Gitea => "gitea",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// Last path segment.
    pub name: String,
    /// Full path, relative to the repository root.
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Version token, when the remote reports one.
    pub version: Option<String>,
}

/// Content of a remote object together with its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    pub version: String,
}

/// Result of [`Provider::write_raw`](super::Provider::write_raw).
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum WriteOutcome {
    /// The remote accepted the write and now holds `version`.
    Committed { version: String },
    /// Identical content was written to the same path moments ago; no call was made.
    Skipped,
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed { .. })
    }
}

/// Snapshot reported by [`Provider::status`](super::Provider::status).
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub kind: BackendKind,
    pub available: bool,
    pub authenticated: bool,
    pub credential_class: CredentialClass,
    /// `None` when the provider runs without a rate limiter.
    pub usage: Option<RateUsage>,
}

/// Contents-API operations a remote host must offer.
///
/// Implementations perform a single attempt per call: conflict retries,
/// deduplication and transient-failure retries live in
/// [`Provider`](super::Provider) so they behave the same for every host.
/// Paths are relative to the repository root and never start with `/`.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable name, e.g. `github:owner/repo@main`.
    fn name(&self) -> String;

    /// The credential slot this backend authenticates with.
    fn credentials(&self) -> &CredentialCache;

    /// Fetch the current content and version token, `None` if the path does not exist.
    async fn fetch(&self, path: &str) -> Result<Option<RemoteFile>>;

    /// Write `content` at `path`.
    ///
    /// `version` must be the token last observed for the path, or `None` to
    /// create it. A mismatch fails with
    /// [`ProviderError::VersionConflict`](super::ProviderError::VersionConflict).
    /// Returns the new version token.
    async fn store(
        &self,
        path: &str,
        content: &[u8],
        version: Option<&str>,
        message: &str,
    ) -> Result<String>;

    /// List a directory. A missing directory is reported as `NotFound`.
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Cheap request that succeeds when the remote is reachable and the credential is valid.
    async fn ping(&self) -> Result<()>;

    /// Record one logical commit covering `paths`.
    ///
    /// Contents APIs commit on every write, so the default only logs.
    async fn record_commit(&self, message: &str, paths: &[String]) -> Result<()> {
        tracing::debug!(
            backend = %self.name(),
            files = paths.len(),
            "Commit recorded: {}",
            message
        );
        Ok(())
    }
}
