use semsync::provider::ProviderStatus;
use semsync::sync::{LoadReport, SyncStatus};
use serde::Serialize;

use crate::commands::shared::{CommandResult, OutputFormat, Session};
use crate::config::Config;

#[derive(Debug, Serialize, tabled::Tabled)]
struct StatusRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn status_rows(
    provider: &ProviderStatus,
    sync: &SyncStatus,
    load: Option<&LoadReport>,
    backups: &[String],
) -> Vec<StatusRow> {
    let row = |field, value: String| StatusRow { field, value };
    let yes_no = |flag: bool| String::from(if flag { "yes" } else { "no" });

    let mut rows = vec![
        row("Provider", provider.name.clone()),
        row("Backend", provider.kind.to_string()),
        row("Reachable", yes_no(provider.available)),
        row("Authenticated", yes_no(provider.authenticated)),
        row("Credential", provider.credential_class.to_string()),
    ];
    if let Some(usage) = &provider.usage {
        rows.push(row("Calls left", format!("{}/{}", usage.remaining, usage.limit)));
    }
    if let Some(load) = load {
        rows.push(row("Concepts", load.loaded.to_string()));
        rows.push(row("Tombstones", load.tombstones.to_string()));
        if load.skipped > 0 {
            rows.push(row("Unreadable", load.skipped.to_string()));
        }
    }
    rows.push(row(
        "Backups",
        if backups.is_empty() {
            "none".to_string()
        } else {
            backups.join(", ")
        },
    ));
    rows.push(row("State", sync.message.clone()));
    if let Some(error) = &sync.last_error {
        rows.push(row("Last error", error.clone()));
    }
    rows
}

pub(crate) async fn handle_status(config: &Config, output: OutputFormat) -> CommandResult {
    let session = Session::open(config)?;
    let provider = session.engine.provider().status().await;

    // An unreachable provider is still worth reporting on.
    let load = if provider.available {
        match session.engine.load_from_provider().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load concepts");
                None
            }
        }
    } else {
        None
    };
    let sync = session.engine.status();
    let backups = session.engine.backup_providers();

    match output {
        OutputFormat::Table => output.print(status_rows(&provider, &sync, load.as_ref(), &backups)),
        OutputFormat::Json => {
            let document = serde_json::json!({
                "provider": provider,
                "sync": sync,
                "concepts": load.as_ref().map(|l| l.loaded),
                "tombstones": load.as_ref().map(|l| l.tombstones),
                "backups": backups,
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
    }
}
