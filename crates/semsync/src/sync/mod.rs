//! Write-behind synchronization of the concept snapshot.
//!
//! # Module Structure
//!
//! - [`SyncEngine`] - local snapshot, pending queue, batched flush, migration
//! - [`spawn_flush_task`] - interval timer driving [`SyncEngine::batch_commit`]
//! - [`StatusBus`] / [`SyncEvent`] - observer notifications
//! - backup replication to redundant providers
//!
//! # Example
//!
//! ```ignore
//! use semsync::concept::ConceptData;
//! use semsync::sync::{SyncEngine, spawn_flush_task};
//!
//! let engine = SyncEngine::new(provider);
//! engine.load_from_provider().await?;
//! let task = spawn_flush_task(engine.clone(), engine.config().flush_interval());
//!
//! engine.create_concept("climate-policy", ConceptData::named("Climate Policy"));
//!
//! let result = task.shutdown().await;
//! ```

mod backup;
mod engine;
mod events;
mod flush_task;
mod types;

pub use engine::SyncEngine;
pub use events::{EventCallback, StatusBus, SubscriptionId, SyncEvent};
pub use flush_task::{FLUSH_TASK_SHUTDOWN_TIMEOUT, FlushTask, FlushTaskResult, spawn_flush_task};
pub use types::{
    BACKUP_ERROR_LOG_CAPACITY, BackupFailure, BatchOutcome, DEFAULT_FLUSH_INTERVAL_MS,
    FlushReport, LoadReport, STATUS_REAUTH, STATUS_SAVED, STATUS_SAVING, STATUS_SYNCING,
    SyncConfig, SyncStatus,
};
