use std::fs;
use std::path::{Path, PathBuf};

use semsync::provider::GraphArchive;

use crate::commands::shared::{CommandResult, Session};
use crate::config::Config;

pub(crate) async fn handle_init(config: &Config, space: Option<String>) -> CommandResult {
    let session = Session::open(config)?;
    let space = space.unwrap_or_else(|| config.provider.repo.clone());

    let created = session
        .engine
        .provider()
        .create_semantic_space(&space)
        .await?;

    if created.is_empty() {
        println!("Space '{space}' already initialised");
    } else {
        for path in &created {
            println!("created {path}");
        }
    }
    Ok(())
}

pub(crate) async fn handle_export(
    config: &Config,
    file: Option<PathBuf>,
    turtle: bool,
) -> CommandResult {
    let document = if turtle {
        let session = Session::open_loaded(config).await?;
        session.engine.export_full_graph()
    } else {
        let session = Session::open(config)?;
        let archive = session.engine.provider().export_all().await?;
        tracing::info!(files = archive.len(), source = %archive.source, "Space exported");
        archive.to_json()?
    };

    match file {
        Some(path) => fs::write(&path, document)?,
        None => println!("{document}"),
    }
    Ok(())
}

pub(crate) async fn handle_import(config: &Config, file: &Path) -> CommandResult {
    let archive = read_archive(file)?;
    let session = Session::open(config)?;
    let written = session.engine.provider().import_all(&archive).await?;

    println!("Imported {written} files from {}", archive.source);
    Ok(())
}

fn read_archive(file: &Path) -> CommandResult<GraphArchive> {
    let text = fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let archive = GraphArchive::from_json(&text)
        .map_err(|e| format!("{} is not a semsync archive: {e}", file.display()))?;
    Ok(archive)
}
