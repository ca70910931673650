//! Gitea backend for semantic spaces.
//!
//! Works with Gitea-based forges (Gitea, Forgejo, Codeberg) through the
//! repository contents API under `/api/v1`.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for Gitea API operations
//! - [`types`] - Contents API request/response types
//! - [`client`] - The [`GiteaBackend`] itself
//!
//! ```ignore
//! use semsync::gitea::GiteaBackend;
//!
//! // For Codeberg
//! let backend = GiteaBackend::new("https://codeberg.org", "alice", "space", "main", credentials, None)?;
//!
//! // For self-hosted Gitea/Forgejo
//! let backend = GiteaBackend::new("https://git.example.com", "alice", "space", "main", credentials, None)?;
//! ```

mod client;
pub mod error;
mod types;

pub use client::{CODEBERG_HOST, GiteaBackend};
pub use error::GiteaError;
pub use types::{GiteaContent, GiteaContentsResponse};
