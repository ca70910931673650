use semsync::provider::{BackendKind, ProviderConfig};

use crate::commands::shared::{CommandResult, Session};
use crate::config::Config;

/// Where `semsync migrate` moves the space.
pub(crate) struct MigrateTarget {
    pub kind: BackendKind,
    pub host: Option<String>,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: Option<String>,
}

impl MigrateTarget {
    /// Provider config for the target. Unset fields are inherited from the
    /// source: the token, its credential class and the base path.
    fn provider_config(self, source: &ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            kind: self.kind,
            host: self.host,
            owner: self.owner,
            repo: self.repo,
            branch: self.branch,
            token: self.token.or_else(|| source.token.clone()),
            credential_class: source.credential_class,
            base_path: source.base_path.clone(),
        }
    }
}

pub(crate) async fn handle_migrate(config: &Config, target: MigrateTarget) -> CommandResult {
    let target = target.provider_config(&config.provider);
    if target == config.provider {
        return Err("target is the configured provider".into());
    }

    let session = Session::open(config)?;
    let from = session.engine.provider().name();
    let copied = session
        .engine
        .migrate_provider(&target, &session.limiter)
        .await?;

    println!(
        "Copied {copied} files from {from} to {}",
        session.engine.provider().name()
    );
    println!("Update [provider] in your config to use the new location.");
    Ok(())
}
