//! Sync engine configuration, status and flush results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::{ErrorKind, REDUNDANT_WRITE_WINDOW_MS};

/// Default interval between background flushes.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 2_000;

/// Number of backup failures retained for inspection.
pub const BACKUP_ERROR_LOG_CAPACITY: usize = 50;

/// Status message while local edits are waiting for a flush.
pub const STATUS_SAVING: &str = "Saving…";
pub const STATUS_SYNCING: &str = "Syncing…";
pub const STATUS_SAVED: &str = "All changes saved";
pub const STATUS_REAUTH: &str = "Re-authentication required";

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the background flush timer.
    pub flush_interval_ms: u64,
    /// Window in which byte-identical rewrites of a path are skipped.
    pub redundant_write_window_ms: u64,
    /// Capacity of the backup failure log.
    pub backup_error_log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            redundant_write_window_ms: REDUNDANT_WRITE_WINDOW_MS,
            backup_error_log_capacity: BACKUP_ERROR_LOG_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_interval_ms)
    }
}

/// Human-readable sync state, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub provider: String,
    pub pending: usize,
    pub in_flight: bool,
    pub authenticated: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub message: String,
}

impl SyncStatus {
    /// Nothing queued, nothing in flight, no outstanding error.
    pub fn is_clean(&self) -> bool {
        self.pending == 0 && !self.in_flight && self.last_error.is_none()
    }
}

/// What one successful flush wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Distinct concepts written after coalescing.
    pub written: usize,
    /// Pending commits drained from the queue.
    pub commits: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Record paths touched, relative to the provider's base path.
    pub paths: Vec<String>,
    pub elapsed_ms: u64,
}

/// Result of a flush attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "BatchOutcome reports whether anything was written"]
pub enum BatchOutcome {
    Flushed(FlushReport),
    /// The queue was empty; no remote calls were made.
    Idle,
    /// Another flush was running; this tick was skipped.
    Busy,
    /// No credential is cached; the queue is kept until re-authentication.
    Unauthenticated,
}

impl BatchOutcome {
    pub fn report(&self) -> Option<&FlushReport> {
        match self {
            BatchOutcome::Flushed(report) => Some(report),
            _ => None,
        }
    }
}

/// Outcome of [`SyncEngine::load_from_provider`](super::SyncEngine::load_from_provider).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Live concepts placed in the snapshot.
    pub loaded: usize,
    /// Tombstoned records read and kept out of the snapshot.
    pub tombstones: usize,
    /// Records that could not be parsed.
    pub skipped: usize,
    /// Records ignored because local edits to the same id are still queued.
    pub shadowed: usize,
}

/// A failed write to a backup provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFailure {
    pub provider: String,
    pub path: Option<String>,
    pub error: String,
    pub at: DateTime<Utc>,
}
