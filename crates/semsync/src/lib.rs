//! Semsync - write-behind synchronisation of a concept graph to Git hosts.
//!
//! This library keeps a local snapshot of concepts (named nodes with typed
//! relationships), accepts edits instantly, and flushes them in batches to a
//! repository on GitHub or a Gitea/Forgejo forge through the hosts' contents
//! APIs, using each file's version token for optimistic concurrency.
//!
//! # Features
//!
//! - `github` - GitHub (and GitHub Enterprise) backend.
//! - `gitea` - Gitea, Forgejo and Codeberg backend.
//!
//! The in-memory backend is always available.
//!
//! # Example
//!
//! ```ignore
//! use semsync::concept::ConceptData;
//! use semsync::provider::{ProviderConfig, RateLimiter, build_provider};
//! use semsync::sync::SyncEngine;
//!
//! let limiter = RateLimiter::default();
//! let provider = build_provider(&config, &limiter)?;
//! let engine = SyncEngine::new(provider);
//!
//! engine.load_from_provider().await?;
//! engine.create_concept("climate-policy", ConceptData::named("Climate Policy"));
//! engine.force_sync().await?;
//! ```

pub mod auth;
pub mod concept;
pub mod http;
pub mod provider;
pub mod retry;
pub mod sync;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "gitea")]
pub mod gitea;

pub use auth::{CredentialCache, CredentialClass};
pub use concept::{CommitKind, Concept, ConceptData, PendingCommit};
pub use provider::{
    BackendKind, ErrorKind, Provider, ProviderConfig, ProviderError, RateLimiter, build_provider,
};
pub use sync::{SyncEngine, SyncEvent, SyncStatus, spawn_flush_task};
