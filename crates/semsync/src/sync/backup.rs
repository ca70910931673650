//! Fire-and-forget replication to backup providers.
//!
//! After a successful primary flush the written records are copied to every
//! backup provider on detached tasks. Failures are logged, published on the
//! status bus and kept in a bounded log; they are never retried and never
//! reach the caller of the flush.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;

use crate::provider::{Provider, short_error_message};

use super::events::{StatusBus, SyncEvent};
use super::types::BackupFailure;

#[derive(Debug)]
pub(crate) struct BackupSet {
    providers: RwLock<Vec<Arc<Provider>>>,
    failures: Arc<Mutex<VecDeque<BackupFailure>>>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl BackupSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn add(&self, provider: Provider) {
        tracing::info!(provider = %provider.name(), "Backup provider added");
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(provider));
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.name())
            .collect()
    }

    pub(crate) fn failures(&self) -> Vec<BackupFailure> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Replication tasks that have not finished yet.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Copy `files` to every backup provider on detached tasks.
    pub(crate) fn replicate(&self, files: Vec<(String, Vec<u8>)>, message: String, bus: Arc<StatusBus>) {
        if files.is_empty() {
            return;
        }
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if providers.is_empty() {
            return;
        }

        let files = Arc::new(files);
        for provider in providers {
            let files = Arc::clone(&files);
            let failures = Arc::clone(&self.failures);
            let in_flight = Arc::clone(&self.in_flight);
            let bus = Arc::clone(&bus);
            let message = message.clone();
            let capacity = self.capacity;

            in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let record = |path: Option<&str>, error: String| {
                    tracing::warn!(
                        provider = %provider.name(),
                        path = path.unwrap_or("-"),
                        error = %error,
                        "Backup write failed"
                    );
                    let mut log = failures.lock().unwrap_or_else(|e| e.into_inner());
                    if log.len() >= capacity {
                        log.pop_front();
                    }
                    log.push_back(BackupFailure {
                        provider: provider.name(),
                        path: path.map(str::to_string),
                        error: error.clone(),
                        at: Utc::now(),
                    });
                    drop(log);
                    bus.publish(&SyncEvent::BackupFailed {
                        provider: provider.name(),
                        error,
                    });
                };

                let mut written = Vec::with_capacity(files.len());
                for (path, content) in files.iter() {
                    match provider.write_raw(path, content).await {
                        Ok(_) => written.push(path.clone()),
                        Err(e) => record(Some(path), short_error_message(&e)),
                    }
                }
                if !written.is_empty()
                    && let Err(e) = provider.commit_changes(&message, &written).await
                {
                    record(None, short_error_message(&e));
                }

                tracing::debug!(provider = %provider.name(), files = written.len(), "Backup replicated");
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }
}
