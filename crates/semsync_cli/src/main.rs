//! Semsync CLI - command-line interface for concept graph synchronisation.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use semsync::provider::BackendKind;
use tracing_subscriber::EnvFilter;

use crate::commands::shared::OutputFormat;

#[derive(Parser)]
#[command(name = "semsync")]
#[command(version)]
#[command(about = "Write-behind sync of a concept graph to a Git host")]
#[command(
    long_about = "Semsync keeps a knowledge graph of concepts in a repository on GitHub or a \
Gitea/Forgejo forge. Each concept is one Turtle record; edits are batched into \
flushes that use each file's version token for optimistic concurrency."
)]
#[command(after_long_help = r#"EXAMPLES
    Create the standard layout of a new space:
        $ semsync init

    Add a concept with a relationship:
        $ semsync create climate-policy --name "Climate Policy" --rel influences=economic-growth

    Copy the whole space to another repository:
        $ semsync migrate --kind gitea --host https://codeberg.org --owner alice --repo knowledge

CONFIGURATION
    Semsync reads configuration from:
      1. ~/.config/semsync/config.toml (or $XDG_CONFIG_HOME/semsync/config.toml)
      2. ./semsync.toml
      3. Environment variables (SEMSYNC_* prefix, e.g., SEMSYNC_PROVIDER__TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    SEMSYNC_PROVIDER__KIND     github, gitea or memory (default: github)
    SEMSYNC_PROVIDER__HOST     Forge URL (Gitea) or Enterprise URL (GitHub)
    SEMSYNC_PROVIDER__OWNER    Repository owner
    SEMSYNC_PROVIDER__REPO     Repository name
    SEMSYNC_PROVIDER__TOKEN    Access token
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show provider availability, credential and sync state
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Create the standard semantic space layout
    Init {
        /// Space name written into the profile (default: the repository name)
        #[arg(short, long)]
        space: Option<String>,
    },
    /// List the concepts in the space
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Create or replace a concept
    Create {
        /// Concept identifier
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        color: Option<String>,

        /// Relationship as RELATION=TARGET (repeatable)
        #[arg(short, long = "rel", value_name = "RELATION=TARGET")]
        relationships: Vec<String>,
    },
    /// Delete a concept, leaving a tombstone record
    Delete {
        /// Concept identifier
        id: String,
    },
    /// Export the space as a JSON archive, or the graph as one Turtle document
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Export the live concepts as Turtle instead of a file archive
        #[arg(short, long)]
        turtle: bool,
    },
    /// Import a JSON archive produced by `export`
    Import {
        /// Archive file
        file: PathBuf,
    },
    /// Copy the space to another provider
    Migrate {
        /// Target backend
        #[arg(short, long, value_enum)]
        kind: TargetKind,

        /// Forge or Enterprise URL
        #[arg(short = 'H', long)]
        host: Option<String>,

        #[arg(short, long)]
        owner: String,

        #[arg(short, long)]
        repo: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Token for the target (default: the configured token)
        #[arg(short, long, env = "SEMSYNC_MIGRATE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Show call budget usage per credential class
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

/// Backends a space can be migrated to.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TargetKind {
    Github,
    Gitea,
    Memory,
}

impl From<TargetKind> for BackendKind {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Github => BackendKind::GitHub,
            TargetKind::Gitea => BackendKind::Gitea,
            TargetKind::Memory => BackendKind::Memory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("semsync=info,semsync_cli=info"),
    };

    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(Term::stderr().is_term())
        .with_writer(std::io::stderr)
        .init();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status { output } => {
            commands::status::handle_status(&config, output).await?;
        }
        Commands::Init { space } => {
            commands::space::handle_init(&config, space).await?;
        }
        Commands::List { output } => {
            commands::concepts::handle_list(&config, output).await?;
        }
        Commands::Create {
            id,
            name,
            description,
            color,
            relationships,
        } => {
            let data = commands::concepts::concept_data(name, description, color, &relationships)?;
            commands::concepts::handle_create(&config, id, data).await?;
        }
        Commands::Delete { id } => {
            commands::concepts::handle_delete(&config, &id).await?;
        }
        Commands::Export { file, turtle } => {
            commands::space::handle_export(&config, file, turtle).await?;
        }
        Commands::Import { file } => {
            commands::space::handle_import(&config, &file).await?;
        }
        Commands::Migrate {
            kind,
            host,
            owner,
            repo,
            branch,
            token,
        } => {
            let target = commands::migrate::MigrateTarget {
                kind: kind.into(),
                host,
                owner,
                repo,
                branch,
                token,
            };
            commands::migrate::handle_migrate(&config, target).await?;
        }
        Commands::Limits { output } => {
            commands::limits::handle_limits(&config, output).await?;
        }
    }

    Ok(())
}
