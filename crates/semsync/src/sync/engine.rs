//! The write-behind synchronization engine.
//!
//! Mutations apply to the local snapshot immediately and append a
//! [`PendingCommit`]. A flush drains the queue, writes one record per touched
//! concept through the active [`Provider`] and records one logical commit. A
//! failed flush puts the whole drained batch back at the front of the queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::concept::{self, CommitKind, Concept, ConceptData, PendingCommit};
use crate::provider::paths::{CONCEPTS_DIR, concept_id_from_file, concept_path};
use crate::provider::{
    EntryKind, ErrorKind, Provider, ProviderConfig, ProviderError, RateLimiter, Result,
    build_provider, short_error_message,
};

use super::backup::BackupSet;
use super::events::{EventCallback, StatusBus, SubscriptionId, SyncEvent};
use super::types::{
    BackupFailure, BatchOutcome, FlushReport, LoadReport, STATUS_REAUTH, STATUS_SAVED,
    STATUS_SAVING, STATUS_SYNCING, SyncConfig, SyncStatus,
};

#[derive(Default)]
struct State {
    concepts: HashMap<String, Concept>,
    pending: VecDeque<PendingCommit>,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<(ErrorKind, String)>,
    message: String,
}

struct Inner {
    config: SyncConfig,
    provider: RwLock<Arc<Provider>>,
    state: Mutex<State>,
    flush_lock: tokio::sync::Mutex<()>,
    committing: AtomicBool,
    bus: Arc<StatusBus>,
    backups: BackupSet,
}

/// Local concept snapshot with write-behind persistence to a [`Provider`].
///
/// Cloning is cheap and clones share all state, so a clone can be handed to
/// the background flush task.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(provider: Provider) -> Self {
        Self::with_config(provider, SyncConfig::default())
    }

    pub fn with_config(provider: Provider, config: SyncConfig) -> Self {
        let provider = provider
            .with_redundant_write_window(Duration::from_millis(config.redundant_write_window_ms));
        let backups = BackupSet::new(config.backup_error_log_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                provider: RwLock::new(Arc::new(provider)),
                state: Mutex::new(State::default()),
                flush_lock: tokio::sync::Mutex::new(()),
                committing: AtomicBool::new(false),
                bus: Arc::new(StatusBus::new()),
                backups,
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The active provider.
    pub fn provider(&self) -> Arc<Provider> {
        Arc::clone(&self.inner.provider.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.inner.bus.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    fn publish(&self, event: SyncEvent) {
        self.inner.bus.publish(&event);
    }

    fn publish_status(&self) {
        self.publish(SyncEvent::Status(self.status()));
    }

    pub fn is_committing(&self) -> bool {
        self.inner.committing.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SyncStatus {
        let provider = self.provider();
        let state = self.state();
        SyncStatus {
            provider: provider.name(),
            pending: state.pending.len(),
            in_flight: self.is_committing(),
            authenticated: provider.is_authenticated(),
            last_sync: state.last_sync,
            last_error: state.last_error.as_ref().map(|(_, msg)| msg.clone()),
            last_error_kind: state.last_error.as_ref().map(|(kind, _)| *kind),
            message: state.message.clone(),
        }
    }

    fn enqueue(&self, kind: CommitKind, record: Concept) {
        let id = record.id.clone();
        {
            let mut state = self.state();
            state.pending.push_back(PendingCommit::new(kind, record));
            state.message = STATUS_SAVING.to_string();
        }
        tracing::trace!(id = %id, kind = kind.as_str(), "Queued local change");
        self.publish(SyncEvent::ConceptChanged { id, kind });
        self.publish_status();
    }

    /// Create `id` with `data`. An existing concept with the same id is replaced.
    pub fn create_concept(&self, id: impl Into<String>, data: ConceptData) -> Concept {
        let concept = Concept::from_data(id, data, Utc::now());
        self.state()
            .concepts
            .insert(concept.id.clone(), concept.clone());
        self.enqueue(CommitKind::Create, concept.clone());
        concept
    }

    /// Replace the attributes of `id`, keeping its creation time.
    ///
    /// Updating an unknown id creates it locally; the remote write is the same.
    pub fn update_concept(&self, id: impl Into<String>, data: ConceptData) -> Concept {
        let id = id.into();
        let concept = {
            let mut state = self.state();
            let created_at = state
                .concepts
                .get(&id)
                .map_or_else(Utc::now, |existing| existing.created_at);
            let concept = Concept::from_data(id.clone(), data, created_at);
            state.concepts.insert(id, concept.clone());
            concept
        };
        self.enqueue(CommitKind::Update, concept.clone());
        concept
    }

    /// Remove `id` from the snapshot and queue its tombstone.
    ///
    /// Returns `false` (and queues nothing) when the id is unknown.
    pub fn delete_concept(&self, id: &str) -> bool {
        let Some(existing) = self.state().concepts.remove(id) else {
            return false;
        };
        self.enqueue(CommitKind::Delete, existing.tombstone(Utc::now()));
        true
    }

    pub fn get_concept(&self, id: &str) -> Option<Concept> {
        self.state().concepts.get(id).cloned()
    }

    /// Every visible concept, ordered by id.
    pub fn get_all_concepts(&self) -> Vec<Concept> {
        let mut all: Vec<Concept> = self.state().concepts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn pending_commits(&self) -> Vec<PendingCommit> {
        self.state().pending.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// The visible snapshot as one Turtle document.
    pub fn export_full_graph(&self) -> String {
        concept::encode_graph(&self.get_all_concepts())
    }

    /// Read every concept record from the provider into the snapshot.
    ///
    /// Tombstones remove the concept from the snapshot. Records that fail to
    /// parse are skipped with a warning. Ids with queued local changes keep
    /// their local state.
    pub async fn load_from_provider(&self) -> Result<LoadReport> {
        let provider = self.provider();
        let entries = provider.list_directory(CONCEPTS_DIR).await?;

        let mut report = LoadReport::default();
        let mut decoded = Vec::new();
        for entry in entries.into_iter().filter(|e| e.kind == EntryKind::File) {
            if concept_id_from_file(&entry.name).is_none() {
                tracing::debug!(path = %entry.path, "Ignoring non-record file");
                continue;
            }
            let text = match provider.read_semantic_file(&entry.path).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(ProviderError::Parse { message }) => {
                    tracing::warn!(path = %entry.path, error = %message, "Skipping unreadable record");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match concept::decode(&text) {
                Ok(concept) => decoded.push(concept),
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "Skipping malformed record");
                    report.skipped += 1;
                }
            }
        }

        {
            let mut state = self.state();
            let queued: HashSet<String> = state.pending.iter().map(|c| c.id.clone()).collect();
            for concept in decoded {
                if queued.contains(&concept.id) {
                    report.shadowed += 1;
                    continue;
                }
                if concept.deleted {
                    state.concepts.remove(&concept.id);
                    report.tombstones += 1;
                } else {
                    state.concepts.insert(concept.id.clone(), concept);
                    report.loaded += 1;
                }
            }
        }

        tracing::info!(
            provider = %provider.name(),
            loaded = report.loaded,
            tombstones = report.tombstones,
            skipped = report.skipped,
            "Loaded concepts"
        );
        self.publish(SyncEvent::Loaded {
            count: report.loaded,
            skipped: report.skipped,
        });
        self.publish_status();
        Ok(report)
    }

    /// Flush the pending queue unless a flush is already running.
    ///
    /// This is the timer's entry point: an overlapping call returns
    /// [`BatchOutcome::Busy`] instead of waiting.
    pub async fn batch_commit(&self) -> Result<BatchOutcome> {
        let Ok(_guard) = self.inner.flush_lock.try_lock() else {
            tracing::trace!("Flush already in progress, skipping tick");
            return Ok(BatchOutcome::Busy);
        };
        self.flush_locked().await
    }

    /// Flush the pending queue now, waiting for any running flush first.
    pub async fn force_sync(&self) -> Result<BatchOutcome> {
        let _guard = self.inner.flush_lock.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> Result<BatchOutcome> {
        let provider = self.provider();

        let batch: Vec<PendingCommit> = {
            let mut state = self.state();
            if state.pending.is_empty() {
                return Ok(BatchOutcome::Idle);
            }
            if !provider.is_authenticated() {
                tracing::debug!(pending = state.pending.len(), "No credential, flush deferred");
                return Ok(BatchOutcome::Unauthenticated);
            }
            state.message = STATUS_SYNCING.to_string();
            state.pending.drain(..).collect()
        };

        let requeued = batch.len();
        let in_flight = InFlightBatch::new(self, batch);
        tracing::debug!(pending = requeued, provider = %provider.name(), "Flush started");
        self.publish(SyncEvent::FlushStarted { pending: requeued });
        self.publish_status();

        let start = Instant::now();
        let result = write_batch(&provider, in_flight.commits()).await;

        match result {
            Ok((mut report, files, message)) => {
                in_flight.complete();
                report.elapsed_ms = start.elapsed().as_millis() as u64;
                {
                    let mut state = self.state();
                    state.last_sync = Some(Utc::now());
                    state.last_error = None;
                    state.message = if state.pending.is_empty() {
                        STATUS_SAVED.to_string()
                    } else {
                        STATUS_SAVING.to_string()
                    };
                }
                tracing::info!(
                    written = report.written,
                    commits = report.commits,
                    elapsed_ms = report.elapsed_ms,
                    "Flush completed"
                );
                self.inner
                    .backups
                    .replicate(files, message, Arc::clone(&self.inner.bus));
                self.publish(SyncEvent::FlushCompleted {
                    written: report.written,
                    elapsed_ms: report.elapsed_ms,
                });
                self.publish_status();
                Ok(BatchOutcome::Flushed(report))
            }
            Err(e) => {
                drop(in_flight);
                let kind = e.kind();
                let error = short_error_message(&e);
                {
                    let mut state = self.state();
                    state.last_error = Some((kind, error.clone()));
                    state.message = if kind == ErrorKind::AuthExpired {
                        STATUS_REAUTH.to_string()
                    } else {
                        format!("Sync failed: {error}")
                    };
                }
                tracing::warn!(requeued, kind = ?kind, error = %error, "Flush failed, commits requeued");
                self.publish(SyncEvent::FlushFailed {
                    kind,
                    error,
                    requeued,
                });
                if kind == ErrorKind::AuthExpired {
                    self.publish(SyncEvent::AuthExpired);
                }
                self.publish_status();
                Err(e)
            }
        }
    }

    /// Install a fresh credential on the active provider after
    /// [`SyncEvent::AuthExpired`]. Queued commits go out on the next flush.
    pub fn reauthenticate(&self, token: impl Into<String>) {
        self.provider().set_credentials(token);
        {
            let mut state = self.state();
            if matches!(state.last_error, Some((ErrorKind::AuthExpired, _))) {
                state.last_error = None;
                state.message = if state.pending.is_empty() {
                    STATUS_SAVED.to_string()
                } else {
                    STATUS_SAVING.to_string()
                };
            }
        }
        tracing::info!("Credential replaced");
        self.publish_status();
    }

    /// Build a provider for `config` and move the space onto it.
    pub async fn migrate_provider(&self, config: &ProviderConfig, limiter: &RateLimiter) -> Result<usize> {
        let target = build_provider(config, limiter)?;
        self.migrate_to_provider(target).await
    }

    /// Copy every file of the active provider into `target`, then make `target`
    /// the active provider.
    ///
    /// Flushes are held off for the duration. On any failure the engine stays on
    /// the current provider. Returns the number of files copied.
    pub async fn migrate_to_provider(&self, target: Provider) -> Result<usize> {
        let _guard = self.inner.flush_lock.lock().await;
        let source = self.provider();
        let target = target.with_redundant_write_window(Duration::from_millis(
            self.inner.config.redundant_write_window_ms,
        ));

        let archive = source.export_all().await?;
        let copied = target.import_all(&archive).await?;

        let (from, to) = (source.name(), target.name());
        *self.inner.provider.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(target);

        tracing::info!(from = %from, to = %to, files = copied, "Provider migrated");
        self.publish(SyncEvent::ProviderMigrated { from, to });
        self.publish_status();
        Ok(copied)
    }

    /// Build a backup provider for each config.
    ///
    /// Every config is validated before any backup is added. Returns the number
    /// of backups now configured.
    pub fn setup_redundant_storage(
        &self,
        configs: &[ProviderConfig],
        limiter: &RateLimiter,
    ) -> Result<usize> {
        let built = configs
            .iter()
            .map(|config| build_provider(config, limiter))
            .collect::<Result<Vec<_>>>()?;
        for provider in built {
            self.add_backup_provider(provider);
        }
        Ok(self.backup_providers().len())
    }

    pub fn add_backup_provider(&self, provider: Provider) {
        self.inner.backups.add(provider);
    }

    pub fn backup_providers(&self) -> Vec<String> {
        self.inner.backups.names()
    }

    /// Recent backup failures, oldest first.
    pub fn backup_errors(&self) -> Vec<BackupFailure> {
        self.inner.backups.failures()
    }

    /// Backup replication tasks still running.
    pub fn backups_in_flight(&self) -> usize {
        self.inner.backups.in_flight()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("provider", &self.provider().name())
            .field("pending", &self.pending_count())
            .field("committing", &self.is_committing())
            .finish()
    }
}

/// Keep the last queued commit per id, in the order those last commits were queued.
fn coalesce(batch: &[PendingCommit]) -> Vec<&PendingCommit> {
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (index, commit) in batch.iter().enumerate() {
        last.insert(commit.id.as_str(), index);
    }
    batch
        .iter()
        .enumerate()
        .filter(|(index, commit)| last.get(commit.id.as_str()) == Some(index))
        .map(|(_, commit)| commit)
        .collect()
}

/// A drained batch whose writes have not finished.
///
/// Dropping it without [`InFlightBatch::complete`] puts the commits back at
/// the front of the queue, so a failed flush and a cancelled one both leave
/// the queue as it was. `committing` is cleared either way.
struct InFlightBatch<'a> {
    engine: &'a SyncEngine,
    commits: Option<Vec<PendingCommit>>,
}

impl<'a> InFlightBatch<'a> {
    fn new(engine: &'a SyncEngine, commits: Vec<PendingCommit>) -> Self {
        engine.inner.committing.store(true, Ordering::SeqCst);
        Self {
            engine,
            commits: Some(commits),
        }
    }

    fn commits(&self) -> &[PendingCommit] {
        self.commits.as_deref().unwrap_or_default()
    }

    fn complete(mut self) {
        self.commits = None;
    }
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        if let Some(commits) = self.commits.take() {
            let requeued = commits.len();
            let mut state = self.engine.state();
            let newer = std::mem::take(&mut state.pending);
            state.pending = commits.into_iter().chain(newer).collect();
            if state.message == STATUS_SYNCING {
                state.message = STATUS_SAVING.to_string();
            }
            tracing::debug!(requeued, "Batch returned to queue");
        }
        self.engine.inner.committing.store(false, Ordering::SeqCst);
    }
}


/// Write every record of `batch` and record one commit for them.
///
/// Returns the report, the written files (for backups) and the commit message.
async fn write_batch(
    provider: &Provider,
    batch: &[PendingCommit],
) -> Result<(FlushReport, Vec<(String, Vec<u8>)>, String)> {
    let commits = coalesce(batch);
    let mut report = FlushReport {
        commits: batch.len(),
        ..FlushReport::default()
    };
    let mut files = Vec::with_capacity(commits.len());

    for commit in commits {
        let path = concept_path(&commit.id);
        let content = concept::encode(&commit.record).into_bytes();
        provider.write_raw(&path, &content).await?;

        match commit.kind {
            CommitKind::Create => report.created += 1,
            CommitKind::Update => report.updated += 1,
            CommitKind::Delete => report.deleted += 1,
        }
        report.paths.push(path.clone());
        files.push((path, content));
    }
    report.written = files.len();

    let message = format!(
        "Sync {} concepts ({} created, {} updated, {} deleted)",
        report.written, report.created, report.updated, report.deleted
    );
    provider.commit_changes(&message, &report.paths).await?;
    Ok((report, files, message))
}
