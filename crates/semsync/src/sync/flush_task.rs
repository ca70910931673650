//! Background task flushing the engine on a fixed interval.
//!
//! Each tick calls [`SyncEngine::batch_commit`], which skips the tick when a
//! flush is already running. Failures are already reported on the status bus
//! and the batch requeued, so the task only counts them. Shutdown performs
//! one final flush that waits for any running flush.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::engine::SyncEngine;
use super::types::BatchOutcome;

/// Maximum time to wait for the task to exit after shutdown is requested.
pub const FLUSH_TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Totals over the life of a flush task.
#[derive(Debug, Default)]
#[must_use = "FlushTaskResult may contain errors that should be checked"]
pub struct FlushTaskResult {
    /// Flushes that wrote at least one record.
    pub flushes: usize,
    /// Records written across all flushes.
    pub written: usize,
    /// Ticks skipped because a flush was running.
    pub skipped: usize,
    /// Error message of every failed flush.
    pub errors: Vec<String>,
    /// Panic message if the task panicked.
    pub panic_info: Option<String>,
}

impl FlushTaskResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.panic_info.is_some()
    }

    fn absorb(&mut self, outcome: crate::provider::Result<BatchOutcome>) {
        match outcome {
            Ok(BatchOutcome::Flushed(report)) => {
                self.flushes += 1;
                self.written += report.written;
            }
            Ok(BatchOutcome::Busy) => self.skipped += 1,
            Ok(BatchOutcome::Idle | BatchOutcome::Unauthenticated) => {}
            Err(e) => self.errors.push(e.to_string()),
        }
    }
}

/// Handle to a running flush task.
#[derive(Debug)]
pub struct FlushTask {
    handle: JoinHandle<FlushTaskResult>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

/// Spawn a task calling [`SyncEngine::batch_commit`] every `period`.
///
/// The first tick fires one period after spawning. Ticks missed while a flush
/// runs long are skipped rather than bunched up.
pub fn spawn_flush_task(engine: SyncEngine, period: Duration) -> FlushTask {
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    let flag = Arc::clone(&shutdown);
    let notify = Arc::clone(&wake);

    let handle = tokio::spawn(async move {
        let mut result = FlushTaskResult::default();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(period_ms = period.as_millis() as u64, "Flush task started");
        loop {
            if flag.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    result.absorb(engine.batch_commit().await);
                }
                () = notify.notified() => {}
            }
        }

        tracing::debug!(pending = engine.pending_count(), "Shutdown requested, final flush");
        result.absorb(engine.force_sync().await);
        tracing::debug!(
            flushes = result.flushes,
            written = result.written,
            errors = result.errors.len(),
            "Flush task completed"
        );
        result
    });

    FlushTask {
        handle,
        shutdown,
        wake,
    }
}

impl FlushTask {
    /// Stop the timer, run a final flush and return the task's totals.
    pub async fn shutdown(self) -> FlushTaskResult {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
        await_flush_task(self.handle).await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn await_flush_task(mut handle: JoinHandle<FlushTaskResult>) -> FlushTaskResult {
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) => {
                let panic_info = if e.is_panic() {
                    let payload = e.into_panic();
                    if let Some(s) = payload.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    }
                } else {
                    format!("Task failed: {e}")
                };
                tracing::error!(panic_info = %panic_info, "Flush task failed");
                FlushTaskResult {
                    panic_info: Some(panic_info),
                    ..FlushTaskResult::default()
                }
            }
        },
        () = tokio::time::sleep(FLUSH_TASK_SHUTDOWN_TIMEOUT) => {
            handle.abort();
            tracing::error!(
                timeout_secs = FLUSH_TASK_SHUTDOWN_TIMEOUT.as_secs(),
                "Flush task did not stop in time"
            );
            FlushTaskResult {
                panic_info: Some(format!(
                    "Flush task timed out after {}s",
                    FLUSH_TASK_SHUTDOWN_TIMEOUT.as_secs()
                )),
                ..FlushTaskResult::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::concept::ConceptData;
    use crate::provider::{MemoryBackend, Provider, ScriptedFailure};

    use super::*;

    fn engine(backend: &MemoryBackend) -> SyncEngine {
        SyncEngine::new(Provider::new(Arc::new(backend.clone())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_flushes_pending_commits() {
        let backend = MemoryBackend::new("ticks");
        let engine = engine(&backend);
        let task = spawn_flush_task(engine.clone(), Duration::from_secs(2));

        engine.create_concept("a", ConceptData::named("x"));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(backend.commits().len(), 1);

        let result = task.shutdown().await;
        assert_eq!(result.flushes, 1);
        assert_eq!(result.written, 1);
        assert!(!result.has_errors());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_is_written_before_first_tick() {
        let backend = MemoryBackend::new("early");
        let engine = engine(&backend);
        let task = spawn_flush_task(engine.clone(), Duration::from_secs(2));

        engine.create_concept("a", ConceptData::named("x"));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(backend.total_calls(), 0);

        let _ = task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_performs_final_flush() {
        let backend = MemoryBackend::new("final");
        let engine = engine(&backend);
        let task = spawn_flush_task(engine.clone(), Duration::from_secs(60));

        engine.create_concept("a", ConceptData::named("x"));
        let result = task.shutdown().await;

        assert_eq!(result.flushes, 1);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_is_counted_and_retried_next_tick() {
        let backend = MemoryBackend::new("retry");
        backend.fail_next_fetch(ScriptedFailure::Network);
        backend.fail_next_fetch(ScriptedFailure::Network);
        backend.fail_next_fetch(ScriptedFailure::Network);
        let engine = engine(&backend);
        let task = spawn_flush_task(engine.clone(), Duration::from_secs(10));

        engine.create_concept("a", ConceptData::named("x"));
        // First tick at 10s exhausts the transient retries within a few seconds.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(engine.pending_count(), 1);
        assert!(engine.status().last_error.is_some());

        // Second tick at 20s succeeds.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.pending_count(), 0);

        let result = task.shutdown().await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.flushes, 1);
    }

    #[test]
    fn test_result_defaults() {
        let result = FlushTaskResult::default();
        assert!(!result.has_errors());
        let result = FlushTaskResult {
            panic_info: Some("boom".to_string()),
            ..FlushTaskResult::default()
        };
        assert!(result.has_errors());
    }
}
