use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::auth::CredentialCache;
use crate::retry::{ConflictBackoff, RetryConfig, with_retry};

use super::archive::GraphArchive;
use super::encoding::content_digest;
use super::errors::{ProviderError, Result, short_error_message};
use super::paths::{ensure_ttl_extension, join, normalize, standard_layout};
use super::rate_limit::RateLimiter;
use super::types::{
    BackendKind, DirEntry, EntryKind, ProviderStatus, RemoteBackend, RemoteFile, WriteOutcome,
};

/// Window in which a byte-identical rewrite of the same path is skipped.
pub const REDUNDANT_WRITE_WINDOW_MS: u64 = 1_500;

/// A semantic space on one remote backend.
///
/// Wraps a [`RemoteBackend`] with the behaviour every host shares: rate-limit
/// admission, transient retries on reads, the optimistic-concurrency write loop,
/// redundant-write suppression and credential invalidation. All paths taken by
/// the public methods are relative to the space's base path.
pub struct Provider {
    backend: Arc<dyn RemoteBackend>,
    base_path: String,
    limiter: Option<RateLimiter>,
    conflict: ConflictBackoff,
    retry: RetryConfig,
    redundant_window: Duration,
    recent_writes: Mutex<HashMap<String, (String, Instant)>>,
}

impl Provider {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self {
            backend,
            base_path: String::new(),
            limiter: None,
            conflict: ConflictBackoff::default(),
            retry: RetryConfig::default(),
            redundant_window: Duration::from_millis(REDUNDANT_WRITE_WINDOW_MS),
            recent_writes: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory of the space inside the repository.
    #[must_use]
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = normalize(base_path);
        self
    }

    /// Admit every remote call through `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_conflict_backoff(mut self, conflict: ConflictBackoff) -> Self {
        self.conflict = conflict;
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_redundant_write_window(mut self, window: Duration) -> Self {
        self.redundant_window = window;
        self
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.backend.name()
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[must_use]
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialCache {
        self.backend.credentials()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_present()
    }

    /// Install a fresh credential after [`ProviderError::AuthExpired`].
    pub fn set_credentials(&self, token: impl Into<String>) {
        self.credentials().replace(token);
    }

    pub fn clear_credentials(&self) {
        self.credentials().clear();
    }

    fn resolve(&self, path: &str) -> String {
        join(&self.base_path, path)
    }

    fn relative<'a>(&self, full: &'a str) -> &'a str {
        if self.base_path.is_empty() {
            return full;
        }
        match full.strip_prefix(self.base_path.as_str()) {
            Some("") => "",
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => full,
        }
    }

    /// Run one remote call: credential check, admission, accounting, and
    /// invalidation of the credential when the remote rejects it.
    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        let credentials = self.backend.credentials();
        if !credentials.is_present() {
            return Err(ProviderError::AuthExpired);
        }

        if let Some(limiter) = &self.limiter {
            limiter.admit(credentials.class()).await;
        }
        let result = request.await;
        if let Some(limiter) = &self.limiter {
            limiter.record(credentials.class());
        }

        if matches!(result, Err(ProviderError::AuthExpired)) {
            credentials.clear();
        }
        result
    }

    async fn fetch_full(&self, full: &str) -> Result<Option<RemoteFile>> {
        with_retry(
            || self.call(self.backend.fetch(full)),
            ProviderError::is_transient,
            |e: &ProviderError| short_error_message(e),
            full,
            self.retry.clone(),
        )
        .await
    }

    /// Current content and version token at `path`, `None` if absent.
    pub async fn read_raw(&self, path: &str) -> Result<Option<RemoteFile>> {
        self.fetch_full(&self.resolve(path)).await
    }

    fn is_redundant(&self, full: &str, digest: &str) -> bool {
        let recent = self.recent_writes.lock().unwrap_or_else(|e| e.into_inner());
        recent
            .get(full)
            .is_some_and(|(d, at)| d == digest && at.elapsed() < self.redundant_window)
    }

    fn remember_write(&self, full: String, digest: String) {
        let mut recent = self.recent_writes.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.redundant_window;
        recent.retain(|_, (_, at)| at.elapsed() < window);
        recent.insert(full, (digest, Instant::now()));
    }

    /// Write `content` at `path` with optimistic concurrency.
    ///
    /// Reads the current version token, submits the write with it, and on a
    /// version conflict waits on the [`ConflictBackoff`] ladder before re-reading
    /// and resubmitting. Fails with [`ProviderError::ConflictExhausted`] once the
    /// ladder's attempts are used up. An authentication failure is returned
    /// immediately with the cached credential cleared.
    pub async fn write_raw(&self, path: &str, content: &[u8]) -> Result<WriteOutcome> {
        let full = self.resolve(path);
        let digest = content_digest(content);

        if self.is_redundant(&full, &digest) {
            tracing::debug!(path = %full, "Skipping redundant write");
            return Ok(WriteOutcome::Skipped);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let current = self.fetch_full(&full).await?;
            let version = current.as_ref().map(|f| f.version.as_str());
            let message = match version {
                Some(_) => format!("Update {path}"),
                None => format!("Create {path}"),
            };

            match self
                .call(self.backend.store(&full, content, version, &message))
                .await
            {
                Ok(new_version) => {
                    self.remember_write(full, digest);
                    return Ok(WriteOutcome::Committed {
                        version: new_version,
                    });
                }
                Err(ProviderError::VersionConflict { .. }) => {
                    if attempt >= self.conflict.max_attempts {
                        tracing::warn!(path = %full, attempts = attempt, "Version conflict persisted");
                        return Err(ProviderError::ConflictExhausted {
                            path: full,
                            attempts: attempt,
                        });
                    }
                    let delay = self.conflict.delay_for(attempt);
                    tracing::debug!(
                        path = %full,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Version conflict, re-reading before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read a Turtle record; `.ttl` is appended when `path` has no extension.
    pub async fn read_semantic_file(&self, path: &str) -> Result<Option<String>> {
        let path = ensure_ttl_extension(path);
        match self.read_raw(&path).await? {
            Some(file) => String::from_utf8(file.content)
                .map(Some)
                .map_err(|e| ProviderError::parse(format!("{path} is not UTF-8: {e}"))),
            None => Ok(None),
        }
    }

    /// Write a Turtle record; `.ttl` is appended when `path` has no extension.
    pub async fn write_semantic_file(&self, path: &str, content: &str) -> Result<WriteOutcome> {
        self.write_raw(&ensure_ttl_extension(path), content.as_bytes())
            .await
    }

    /// List a directory. A missing directory yields an empty list.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = self.resolve(path);
        let listed = with_retry(
            || self.call(self.backend.list(&full)),
            ProviderError::is_transient,
            |e: &ProviderError| short_error_message(e),
            &full,
            self.retry.clone(),
        )
        .await;

        match listed {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|mut entry| {
                    entry.path = self.relative(&entry.path).to_string();
                    entry
                })
                .collect()),
            Err(ProviderError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Whether the remote is reachable with the current credential.
    pub async fn is_available(&self) -> bool {
        match self.call(self.backend.ping()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(provider = %self.name(), "Provider unavailable: {}", short_error_message(&e));
                false
            }
        }
    }

    /// Record one logical commit for the paths written by a flush.
    pub async fn commit_changes(&self, message: &str, paths: &[String]) -> Result<()> {
        let full: Vec<String> = paths.iter().map(|p| self.resolve(p)).collect();
        self.backend.record_commit(message, &full).await
    }

    /// Read every file under the base path into an archive.
    pub async fn export_all(&self) -> Result<GraphArchive> {
        let mut archive = GraphArchive::new(self.name());
        let mut pending = vec![String::new()];

        while let Some(dir) = pending.pop() {
            for entry in self.list_directory(&dir).await? {
                match entry.kind {
                    EntryKind::Dir => pending.push(entry.path),
                    EntryKind::File => {
                        if let Some(file) = self.read_raw(&entry.path).await? {
                            archive.insert(entry.path, &file.content);
                        }
                    }
                }
            }
        }

        tracing::debug!(provider = %self.name(), files = archive.len(), "Exported space");
        Ok(archive)
    }

    /// Write every file of `archive`, then record one commit for them.
    ///
    /// Returns the number of files written (skipped redundant writes included).
    pub async fn import_all(&self, archive: &GraphArchive) -> Result<usize> {
        let mut written = Vec::with_capacity(archive.len());
        for entry in archive.entries() {
            let (path, content) = entry?;
            self.write_raw(path, &content).await?;
            written.push(path.to_string());
        }

        if !written.is_empty() {
            self.commit_changes(
                &format!("Import {} files from {}", written.len(), archive.source),
                &written,
            )
            .await?;
        }
        Ok(written.len())
    }

    /// Create the standard space layout, leaving existing files untouched.
    ///
    /// Returns the paths that were created.
    pub async fn create_semantic_space(&self, space: &str) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for (path, content) in standard_layout(space) {
            if self.read_raw(path).await?.is_some() {
                continue;
            }
            self.write_raw(path, content.as_bytes()).await?;
            created.push(path.to_string());
        }

        if !created.is_empty() {
            self.commit_changes(&format!("Create semantic space {space}"), &created)
                .await?;
            tracing::info!(provider = %self.name(), files = created.len(), "Semantic space created");
        }
        Ok(created)
    }

    pub async fn status(&self) -> ProviderStatus {
        let class = self.credentials().class();
        ProviderStatus {
            name: self.name(),
            kind: self.kind(),
            available: self.is_available().await,
            authenticated: self.is_authenticated(),
            credential_class: class,
            usage: self.limiter.as_ref().map(|l| l.usage(class)),
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.backend.name())
            .field("base_path", &self.base_path)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}
