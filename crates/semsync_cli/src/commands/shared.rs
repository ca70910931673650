//! Helpers shared by the commands: engine setup, flushing and output.

use std::time::Duration;

use clap::ValueEnum;
use semsync::provider::{RateLimiter, build_provider};
use semsync::sync::{BatchOutcome, SyncEngine};
use serde::Serialize;

use crate::config::Config;

pub(crate) type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// How long to wait for backup copies after the final flush.
const BACKUP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const BACKUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

impl OutputFormat {
    pub(crate) fn print<T>(self, items: Vec<T>) -> CommandResult
    where
        T: Serialize + tabled::Tabled,
    {
        match self {
            OutputFormat::Table => {
                let mut table = tabled::Table::new(items);
                table.with(tabled::settings::Style::rounded());
                println!("{table}");
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&items)?);
            }
        }
        Ok(())
    }
}

/// An engine on the configured provider, with backups attached and sharing one
/// rate limiter.
pub(crate) struct Session {
    pub engine: SyncEngine,
    pub limiter: RateLimiter,
}

impl Session {
    pub(crate) fn open(config: &Config) -> CommandResult<Self> {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let provider = build_provider(&config.provider, &limiter)?;
        let engine = SyncEngine::with_config(provider, config.sync.clone());

        if !config.backups.is_empty() {
            let configured = engine.setup_redundant_storage(&config.backups, &limiter)?;
            tracing::debug!(backups = configured, "Redundant storage configured");
        }

        Ok(Self { engine, limiter })
    }

    /// Open a session and load the remote snapshot.
    pub(crate) async fn open_loaded(config: &Config) -> CommandResult<Self> {
        let session = Self::open(config)?;
        let report = session.engine.load_from_provider().await?;
        if report.skipped > 0 {
            tracing::warn!(skipped = report.skipped, "Some records could not be read");
        }
        Ok(session)
    }

    /// Flush everything queued, then wait for backup copies to land.
    pub(crate) async fn finish(self) -> CommandResult<usize> {
        let written = match self.engine.force_sync().await? {
            BatchOutcome::Flushed(report) => report.written,
            BatchOutcome::Unauthenticated => {
                return Err("no credential configured for the provider".into());
            }
            BatchOutcome::Idle | BatchOutcome::Busy => 0,
        };

        let drained = tokio::time::timeout(BACKUP_DRAIN_TIMEOUT, async {
            while self.engine.backups_in_flight() > 0 {
                tokio::time::sleep(BACKUP_POLL_INTERVAL).await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                in_flight = self.engine.backups_in_flight(),
                "Backup copies still running at exit"
            );
        }
        for failure in self.engine.backup_errors() {
            tracing::warn!(provider = %failure.provider, error = %failure.error, "Backup failed");
        }

        Ok(written)
    }
}

/// Format a duration as a human-readable string (e.g., "1h 23m", "45m", "30s").
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs <= 0 {
        return "now".to_string();
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}
