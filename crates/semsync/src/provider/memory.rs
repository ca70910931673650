use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::auth::{CredentialCache, CredentialClass};

use super::encoding::content_digest;
use super::errors::{ProviderError, Result};
use super::paths::normalize;
use super::types::{BackendKind, DirEntry, EntryKind, RemoteBackend, RemoteFile};

/// Failure injected into the next matching [`MemoryBackend`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Reject a write as if another client had updated the object.
    Conflict,
    /// Reject the credential (the remote answered 401).
    AuthExpired,
    /// Transport failure.
    Network,
}

impl ScriptedFailure {
    fn into_error(self, path: &str) -> ProviderError {
        match self {
            ScriptedFailure::Conflict => ProviderError::conflict(path),
            ScriptedFailure::AuthExpired => ProviderError::AuthExpired,
            ScriptedFailure::Network => ProviderError::network("scripted network failure"),
        }
    }
}

/// One logical commit recorded by the memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub message: String,
    pub paths: Vec<String>,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, RemoteFile>,
    commits: Vec<CommitRecord>,
    fetch_failures: VecDeque<ScriptedFailure>,
    store_failures: VecDeque<ScriptedFailure>,
    fetches: usize,
    stores: usize,
    lists: usize,
    pings: usize,
}

/// Backend keeping every object in memory.
///
/// Version tokens are content hashes, and writes are a real compare-and-swap on
/// them, so concurrency behaves like a contents API. Clones share state, which
/// lets a test keep a handle while a [`Provider`](super::Provider) owns another.
#[derive(Clone)]
pub struct MemoryBackend {
    label: String,
    credentials: CredentialCache,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_credentials(
            label,
            CredentialCache::new(CredentialClass::PersonalToken, Some("memory".to_string())),
        )
    }

    pub fn with_credentials(label: impl Into<String>, credentials: CredentialCache) -> Self {
        Self {
            label: label.into(),
            credentials,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn version_of(content: &[u8]) -> String {
        // Blob-sha length, like the hosted backends report.
        content_digest(content)[..40].to_string()
    }

    /// Put an object in place without going through the write path.
    ///
    /// Also simulates a write from another client: the version token changes,
    /// so a writer holding the old token is rejected.
    pub fn insert_file(&self, path: &str, content: impl Into<Vec<u8>>) -> String {
        let content = content.into();
        let version = Self::version_of(&content);
        self.state().files.insert(
            normalize(path),
            RemoteFile {
                content,
                version: version.clone(),
            },
        );
        version
    }

    /// Content currently stored at `path`.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state()
            .files
            .get(&normalize(path))
            .map(|f| f.content.clone())
    }

    /// Content at `path` as UTF-8 text.
    #[must_use]
    pub fn file_text(&self, path: &str) -> Option<String> {
        self.file(path)
            .map(|c| String::from_utf8_lossy(&c).to_string())
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    #[must_use]
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state().commits.clone()
    }

    /// Make the next fetch fail.
    pub fn fail_next_fetch(&self, failure: ScriptedFailure) {
        self.state().fetch_failures.push_back(failure);
    }

    /// Make the next write fail. Failures queue up in order.
    pub fn fail_next_store(&self, failure: ScriptedFailure) {
        self.state().store_failures.push_back(failure);
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.state().fetches
    }

    #[must_use]
    pub fn store_calls(&self) -> usize {
        self.state().stores
    }

    /// Every remote call made so far (fetch, store, list, ping).
    #[must_use]
    pub fn total_calls(&self) -> usize {
        let state = self.state();
        state.fetches + state.stores + state.lists + state.pings
    }

    fn check_credentials(&self) -> Result<()> {
        if self.credentials.is_present() {
            Ok(())
        } else {
            Err(ProviderError::AuthExpired)
        }
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> String {
        format!("memory:{}", self.label)
    }

    fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    async fn fetch(&self, path: &str) -> Result<Option<RemoteFile>> {
        self.check_credentials()?;
        let mut state = self.state();
        state.fetches += 1;
        if let Some(failure) = state.fetch_failures.pop_front() {
            return Err(failure.into_error(path));
        }
        Ok(state.files.get(&normalize(path)).cloned())
    }

    async fn store(
        &self,
        path: &str,
        content: &[u8],
        version: Option<&str>,
        _message: &str,
    ) -> Result<String> {
        self.check_credentials()?;
        let path = normalize(path);
        let mut state = self.state();
        state.stores += 1;
        if let Some(failure) = state.store_failures.pop_front() {
            return Err(failure.into_error(&path));
        }

        let current = state.files.get(&path).map(|f| f.version.as_str());
        if current != version {
            return Err(ProviderError::conflict(path));
        }

        let new_version = Self::version_of(content);
        state.files.insert(
            path,
            RemoteFile {
                content: content.to_vec(),
                version: new_version.clone(),
            },
        );
        Ok(new_version)
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.check_credentials()?;
        let dir = normalize(path);
        let mut state = self.state();
        state.lists += 1;

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let mut entries = Vec::new();
        let mut seen_dirs = BTreeSet::new();
        for (file_path, file) in state.files.range(prefix.clone()..) {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    if seen_dirs.insert(sub.to_string()) {
                        entries.push(DirEntry {
                            name: sub.to_string(),
                            path: format!("{prefix}{sub}"),
                            kind: EntryKind::Dir,
                            size: 0,
                            version: None,
                        });
                    }
                }
                None => entries.push(DirEntry {
                    name: rest.to_string(),
                    path: file_path.clone(),
                    kind: EntryKind::File,
                    size: file.content.len() as u64,
                    version: Some(file.version.clone()),
                }),
            }
        }

        if entries.is_empty() && !dir.is_empty() {
            return Err(ProviderError::not_found(dir));
        }
        Ok(entries)
    }

    async fn ping(&self) -> Result<()> {
        self.check_credentials()?;
        self.state().pings += 1;
        Ok(())
    }

    async fn record_commit(&self, message: &str, paths: &[String]) -> Result<()> {
        self.state().commits.push(CommitRecord {
            message: message.to_string(),
            paths: paths.to_vec(),
        });
        Ok(())
    }
}
