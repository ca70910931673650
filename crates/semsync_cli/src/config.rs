//! Configuration file support for semsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `SEMSYNC_`, nested keys joined by `__`,
//!    e.g. `SEMSYNC_PROVIDER__TOKEN`)
//! 3. Config file (./semsync.toml, then ~/.config/semsync/config.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [provider]
//! kind = "gitea"
//! host = "https://codeberg.org"
//! owner = "alice"
//! repo = "knowledge"
//! token = "..."  # or use SEMSYNC_PROVIDER__TOKEN
//! base_path = "semantic"
//!
//! [[backups]]
//! kind = "github"
//! owner = "alice"
//! repo = "knowledge-mirror"
//!
//! [sync]
//! flush_interval_ms = 2000
//!
//! [rate_limit]
//! personal_token_quota = 4500
//! min_spacing_ms = 250
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use semsync::provider::{ProviderConfig, RateLimitConfig};
use semsync::sync::SyncConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The primary semantic space.
    pub provider: ProviderConfig,
    /// Spaces receiving best-effort copies of every flush.
    pub backups: Vec<ProviderConfig>,
    pub sync: SyncConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/semsync/config.toml)
    /// 3. Local config file (./semsync.toml)
    /// 4. Environment variables with SEMSYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("semsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./semsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // SEMSYNC_PROVIDER__OWNER -> provider.owner
        builder = builder.add_source(
            Environment::with_prefix("SEMSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Path of the per-user config file.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "semsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use semsync::auth::CredentialClass;
    use semsync::provider::BackendKind;

    use super::*;

    fn parse(toml_content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.kind, BackendKind::GitHub);
        assert_eq!(config.provider.branch, "main");
        assert_eq!(config.provider.base_path, "semantic");
        assert!(config.provider.token.is_none());
        assert!(config.backups.is_empty());
        assert_eq!(config.sync.flush_interval_ms, 2_000);
        assert_eq!(config.rate_limit.min_spacing_ms, 250);
    }

    #[test]
    fn test_config_builder_with_defaults() {
        let settings = ConfigBuilder::builder().build().unwrap();
        let config: Config = settings.try_deserialize().unwrap_or_default();

        assert_eq!(config.provider.kind, BackendKind::GitHub);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_full_config_parsing() {
        let config = parse(
            r#"
            [provider]
            kind = "gitea"
            host = "https://codeberg.org"
            owner = "alice"
            repo = "knowledge"
            token = "secret"
            credential_class = "oauth"

            [[backups]]
            kind = "github"
            owner = "alice"
            repo = "mirror"

            [[backups]]
            kind = "memory"
            repo = "scratch"

            [sync]
            flush_interval_ms = 5000

            [rate_limit]
            personal_token_quota = 100
        "#,
        );

        assert_eq!(config.provider.kind, BackendKind::Gitea);
        assert_eq!(config.provider.host.as_deref(), Some("https://codeberg.org"));
        assert_eq!(config.provider.token.as_deref(), Some("secret"));
        assert_eq!(config.provider.credential_class, CredentialClass::OAuth);
        assert_eq!(config.provider.branch, "main");

        assert_eq!(config.backups.len(), 2);
        assert_eq!(config.backups[0].repo, "mirror");
        assert_eq!(config.backups[1].kind, BackendKind::Memory);

        assert_eq!(config.sync.flush_interval_ms, 5_000);
        assert_eq!(
            config.sync.redundant_write_window_ms,
            SyncConfig::default().redundant_write_window_ms
        );
        assert_eq!(config.rate_limit.personal_token_quota, 100);
        assert_eq!(
            config.rate_limit.oauth_quota,
            RateLimitConfig::default().oauth_quota
        );
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let config = parse(
            r#"
            [provider]
            repo = "notes"
        "#,
        );

        assert_eq!(config.provider.repo, "notes");
        assert_eq!(config.provider.kind, BackendKind::GitHub);
        assert!(config.backups.is_empty());
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let config = parse(
            r#"
            [provider]
            token = "ghp_verysecret"
        "#,
        );
        assert!(!format!("{config:?}").contains("ghp_verysecret"));
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = Config::default_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
