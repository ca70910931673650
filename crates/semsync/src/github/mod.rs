//! GitHub backend for semantic spaces.
//!
//! Stores every file through the repository contents API
//! (`/repos/{owner}/{repo}/contents/{path}`), using blob shas as version tokens.
//!
//! # Module Structure
//!
//! - [`error`] - Error types and their mapping to provider errors
//! - [`types`] - Contents API request/response types
//! - [`client`] - The [`GitHubBackend`] itself
//!
//! ```ignore
//! use semsync::github::GitHubBackend;
//! use semsync::provider::{Provider, RateLimiter};
//!
//! let limiter = RateLimiter::default();
//! let backend = GitHubBackend::new(None, "octocat", "knowledge", "main", credentials, Some(limiter.clone()))?;
//! let provider = Provider::new(Arc::new(backend)).with_rate_limiter(limiter);
//! ```

mod client;
pub mod error;
mod types;

pub use client::{GITHUB_API_URL, GITHUB_API_VERSION, GitHubBackend};
pub use error::GitHubError;
pub use types::{ContentsResponse, GitHubContent};
