//! Storage backends and the provider that drives them.
//!
//! A [`RemoteBackend`] is one remote host's contents API reduced to four calls
//! (fetch, store, list, ping). A [`Provider`] wraps a backend with everything
//! that must behave identically across hosts: rate-limit admission, the
//! optimistic-concurrency write loop, redundant-write suppression and bulk
//! export/import.
//!
//! # Example
//!
//! ```ignore
//! use semsync::provider::{MemoryBackend, Provider, RateLimiter};
//!
//! let limiter = RateLimiter::default();
//! let provider = Provider::new(Arc::new(MemoryBackend::new("notes")))
//!     .with_base_path("semantic")
//!     .with_rate_limiter(limiter.clone());
//!
//! provider.write_semantic_file("vocabulary/concepts/a", "<#a> rdfs:label \"A\" .").await?;
//! ```

mod archive;
mod config;
mod encoding;
mod errors;
mod memory;
pub mod paths;
mod rate_limit;
mod store;
mod types;

pub use archive::GraphArchive;
pub use config::{ProviderConfig, build_provider};
pub use encoding::{content_digest, decode_content, encode_content};
pub use errors::{ErrorKind, ProviderError, Result, short_error_message};
pub use memory::{CommitRecord, MemoryBackend, ScriptedFailure};
pub use rate_limit::{
    RateLimitConfig, RateLimitInfo, RateLimiter, RateUsage, parse_rate_limit_headers, rate_limits,
};
pub use store::{Provider, REDUNDANT_WRITE_WINDOW_MS};
pub use types::{
    BackendKind, DirEntry, EntryKind, ProviderStatus, RemoteBackend, RemoteFile, WriteOutcome,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::auth::CredentialClass;

    use super::*;

    fn provider(backend: &MemoryBackend) -> Provider {
        Provider::new(Arc::new(backend.clone())).with_base_path("semantic")
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::network("connection refused");
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("connection refused"));

        let err = ProviderError::ConflictExhausted {
            path: "a.ttl".into(),
            attempts: 3,
        };
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(err.kind(), ErrorKind::ConflictExhausted);

        assert!(ProviderError::AuthExpired.to_string().contains("re-authentication"));
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(ProviderError::network("x").is_transient());
        assert!(!ProviderError::conflict("a").is_transient());
        assert!(!ProviderError::AuthExpired.is_transient());
        assert!(!ProviderError::api(500, "x").is_transient());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ConflictExhausted).unwrap(),
            "\"conflict_exhausted\""
        );
    }

    #[test]
    fn test_short_error_message_multiline() {
        let err = std::io::Error::other("first line\nsecond line\nthird line");
        assert_eq!(short_error_message(&err), "first line");
    }

    #[tokio::test]
    async fn test_write_then_read_under_base_path() {
        let backend = MemoryBackend::new("rw");
        let provider = provider(&backend);

        let outcome = provider
            .write_semantic_file("vocabulary/concepts/a", "label A")
            .await
            .unwrap();
        assert!(outcome.is_committed());
        assert_eq!(
            backend.file_text("semantic/vocabulary/concepts/a.ttl").as_deref(),
            Some("label A")
        );

        let text = provider
            .read_semantic_file("vocabulary/concepts/a")
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("label A"));
        assert_eq!(provider.read_semantic_file("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_version_is_retried_once_with_one_reread() {
        let backend = MemoryBackend::new("conflict-once");
        backend.insert_file("semantic/a.ttl", "old");
        backend.fail_next_store(ScriptedFailure::Conflict);
        let provider = provider(&backend);

        let start = Instant::now();
        let outcome = provider.write_raw("a.ttl", b"new").await.unwrap();

        assert!(outcome.is_committed());
        assert_eq!(backend.store_calls(), 2);
        // Initial read plus exactly one re-read.
        assert_eq!(backend.fetch_calls(), 2);
        // First ladder step is 1s.
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(backend.file("semantic/a.ttl").unwrap(), b"new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_ladder_exhausts_after_three_attempts() {
        let backend = MemoryBackend::new("conflict-always");
        for _ in 0..3 {
            backend.fail_next_store(ScriptedFailure::Conflict);
        }
        let provider = provider(&backend);

        let start = Instant::now();
        let err = provider.write_raw("a.ttl", b"x").await.unwrap_err();

        match err {
            ProviderError::ConflictExhausted { path, attempts } => {
                assert_eq!(path, "semantic/a.ttl");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.store_calls(), 3);
        // Delays of 1s and 3s between the three attempts.
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(backend.file("semantic/a.ttl").is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_clears_credentials_without_retry() {
        let backend = MemoryBackend::new("auth");
        backend.fail_next_store(ScriptedFailure::AuthExpired);
        let provider = provider(&backend);

        let err = provider.write_raw("a.ttl", b"x").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthExpired));
        assert_eq!(backend.store_calls(), 1);
        assert!(!provider.is_authenticated());

        // No further network calls until a new credential is installed.
        let calls = backend.total_calls();
        let err = provider.write_raw("b.ttl", b"y").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthExpired));
        assert_eq!(backend.total_calls(), calls);

        provider.set_credentials("fresh");
        provider.write_raw("b.ttl", b"y").await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_rewrite_within_window_is_skipped() {
        let backend = MemoryBackend::new("dedup");
        let provider = provider(&backend);

        provider.write_raw("a.ttl", b"same").await.unwrap();
        let calls = backend.total_calls();

        let outcome = provider.write_raw("a.ttl", b"same").await.unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(backend.total_calls(), calls);

        // Different content goes through.
        let outcome = provider.write_raw("a.ttl", b"changed").await.unwrap();
        assert!(outcome.is_committed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_rewrite_after_window_is_written() {
        let backend = MemoryBackend::new("dedup-window");
        let provider = provider(&backend);

        provider.write_raw("a.ttl", b"same").await.unwrap();
        tokio::time::advance(Duration::from_millis(REDUNDANT_WRITE_WINDOW_MS + 1)).await;

        let outcome = provider.write_raw("a.ttl", b"same").await.unwrap();
        assert!(outcome.is_committed());
        assert_eq!(backend.store_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_directory_lists_empty() {
        let backend = MemoryBackend::new("list");
        backend.insert_file("semantic/vocabulary/concepts/a.ttl", "x");
        let provider = provider(&backend);

        let entries = provider.list_directory("vocabulary/concepts").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "vocabulary/concepts/a.ttl");

        assert!(provider.list_directory("federation").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_and_import_between_providers() {
        let source_backend = MemoryBackend::new("source");
        source_backend.insert_file("semantic/profile/webid.ttl", "me");
        source_backend.insert_file("semantic/vocabulary/concepts/a.ttl", "A");
        source_backend.insert_file("semantic/vocabulary/concepts/b.ttl", "B");
        source_backend.insert_file("elsewhere/ignored.ttl", "-");
        let source = provider(&source_backend);

        let archive = source.export_all().await.unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.source, "memory:source");
        assert_eq!(archive.get("vocabulary/concepts/b.ttl").unwrap().unwrap(), b"B");

        let target_backend = MemoryBackend::new("target");
        let target = Provider::new(Arc::new(target_backend.clone())).with_base_path("kg");
        assert_eq!(target.import_all(&archive).await.unwrap(), 3);

        assert_eq!(target_backend.file_text("kg/profile/webid.ttl").as_deref(), Some("me"));
        let commits = target_backend.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].paths.len(), 3);
    }

    #[tokio::test]
    async fn test_create_semantic_space_keeps_existing_files() {
        let backend = MemoryBackend::new("space");
        backend.insert_file("semantic/profile/webid.ttl", "custom");
        let provider = provider(&backend);

        let created = provider.create_semantic_space("alice").await.unwrap();
        assert_eq!(created.len(), 4);
        assert!(!created.contains(&paths::PROFILE_WEBID.to_string()));
        assert_eq!(
            backend.file_text("semantic/profile/webid.ttl").as_deref(),
            Some("custom")
        );
        assert!(backend.file("semantic/federation/cross-refs.ttl").is_some());

        // Second run is a no-op.
        assert!(provider.create_semantic_space("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_every_call_is_admitted_and_recorded() {
        let backend = MemoryBackend::new("limited");
        let limiter = RateLimiter::new(RateLimitConfig {
            min_spacing_ms: 0,
            ..RateLimitConfig::default()
        });
        let provider = provider(&backend).with_rate_limiter(limiter.clone());

        provider.write_raw("a.ttl", b"x").await.unwrap();
        provider.read_raw("a.ttl").await.unwrap();

        let usage = limiter.usage(CredentialClass::PersonalToken);
        assert_eq!(usage.used as usize, backend.total_calls());
        assert_eq!(usage.used, 3);
    }

    #[tokio::test]
    async fn test_status_reports_availability_and_usage() {
        let backend = MemoryBackend::new("status");
        let provider = provider(&backend).with_rate_limiter(RateLimiter::default());

        let status = provider.status().await;
        assert!(status.available);
        assert!(status.authenticated);
        assert_eq!(status.kind, BackendKind::Memory);
        assert_eq!(status.usage.map(|u| u.used), Some(1));

        provider.clear_credentials();
        let status = provider.status().await;
        assert!(!status.available);
        assert!(!status.authenticated);
    }
}
