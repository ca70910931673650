//! Integration tests for the sync engine.
//!
//! Everything here goes through the public API against the in-memory backend,
//! and every await is bounded so a deadlock fails the test instead of hanging it.
//!
//! Key scenarios tested:
//! - Local edits converge on the remote after a flush
//! - Stale version tokens are retried on the conflict ladder, then requeued
//! - A rejected credential stops the session without retries
//! - Tombstones and malformed records are kept out of a load
//! - One rate budget is shared by every provider using a credential class

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use semsync::auth::CredentialClass;
use semsync::concept::{self, Concept, ConceptData};
use semsync::provider::paths::concept_path;
use semsync::provider::{
    ErrorKind, MemoryBackend, Provider, ProviderConfig, ProviderError, RateLimitConfig,
    RateLimiter, ScriptedFailure,
};
use semsync::sync::{BatchOutcome, SyncConfig, SyncEngine, SyncEvent, spawn_flush_task};
use tokio::time::{Instant, timeout};

/// Maximum time any sync operation should take in tests.
const SYNC_TIMEOUT: Duration = Duration::from_secs(60);

fn engine_on(backend: &MemoryBackend) -> SyncEngine {
    SyncEngine::new(Provider::new(Arc::new(backend.clone())).with_base_path("semantic"))
}

fn remote_concept(backend: &MemoryBackend, id: &str) -> Option<Concept> {
    backend
        .file_text(&format!("semantic/{}", concept_path(id)))
        .map(|text| concept::decode(&text).expect("remote record decodes"))
}

async fn flush(engine: &SyncEngine) -> semsync::provider::Result<BatchOutcome> {
    timeout(SYNC_TIMEOUT, engine.batch_commit())
        .await
        .expect("flush timed out")
}

#[tokio::test]
async fn test_create_then_update_converges_to_last_write() {
    let backend = MemoryBackend::new("converge");
    let engine = engine_on(&backend);

    engine.create_concept("A", ConceptData::named("x"));
    engine.update_concept("A", ConceptData::named("y"));
    let outcome = flush(&engine).await.unwrap();

    assert!(matches!(outcome, BatchOutcome::Flushed(_)));
    assert_eq!(remote_concept(&backend, "A").unwrap().name.as_deref(), Some("y"));
}

#[tokio::test]
async fn test_delete_leaves_tombstone_on_remote() {
    let backend = MemoryBackend::new("tombstone");
    let engine = engine_on(&backend);

    engine.create_concept("A", ConceptData::named("x"));
    assert!(matches!(flush(&engine).await.unwrap(), BatchOutcome::Flushed(_)));
    engine.delete_concept("A");
    assert!(matches!(flush(&engine).await.unwrap(), BatchOutcome::Flushed(_)));

    let record = remote_concept(&backend, "A").unwrap();
    assert!(record.deleted);
    assert!(record.deleted_at.is_some());
    assert_eq!(record.name.as_deref(), Some("x"));
}

#[test]
fn test_codec_round_trip_with_relationships() {
    let concepts = [
        Concept::new("climate-policy")
            .with_name("Climate Policy")
            .with_relationship("influences", "economic-growth"),
        Concept::new("with space")
            .with_description("quote \" and backslash \\")
            .with_relationship("rel/with/slash", "target.with.dots")
            .with_relationship("rel/with/slash", "second"),
        Concept::new("x")
            .with_color("#fff")
            .with_relationship("seeAlso", "https://example.org/x")
            .tombstone(Utc::now()),
    ];
    for concept in concepts {
        assert_eq!(concept::decode(&concept::encode(&concept)).unwrap(), concept);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stale_token_is_rejected_once_and_reread_once() {
    let backend = MemoryBackend::new("stale-once");
    backend.fail_next_store(ScriptedFailure::Conflict);
    let engine = engine_on(&backend);

    engine.create_concept("A", ConceptData::named("x"));
    let _ = flush(&engine).await.unwrap();

    assert_eq!(backend.store_calls(), 2);
    assert_eq!(backend.fetch_calls(), 2);
    assert!(remote_concept(&backend, "A").is_some());
    assert_eq!(engine.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_remote_write_is_overwritten_after_reread() {
    let backend = MemoryBackend::new("race");
    let engine = engine_on(&backend);
    engine.create_concept("A", ConceptData::named("ours"));

    // Another client writes between our read and our write.
    backend.fail_next_store(ScriptedFailure::Conflict);
    backend.insert_file(
        &format!("semantic/{}", concept_path("A")),
        concept::encode(&Concept::new("A").with_name("theirs")),
    );
    let _ = flush(&engine).await.unwrap();

    assert_eq!(remote_concept(&backend, "A").unwrap().name.as_deref(), Some("ours"));
}

#[tokio::test(start_paused = true)]
async fn test_three_stale_responses_exhaust_and_keep_commit_queued() {
    let backend = MemoryBackend::new("stale-always");
    for _ in 0..3 {
        backend.fail_next_store(ScriptedFailure::Conflict);
    }
    let engine = engine_on(&backend);
    engine.create_concept("A", ConceptData::named("x"));

    let start = Instant::now();
    let err = flush(&engine).await.unwrap_err();

    assert!(matches!(err, ProviderError::ConflictExhausted { attempts: 3, .. }));
    assert_eq!(backend.store_calls(), 3);
    // 1s then 3s between the attempts.
    assert!(start.elapsed() >= Duration::from_secs(4));
    assert!(start.elapsed() < Duration::from_secs(13));

    let pending = engine.pending_commits();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "A");
    assert_eq!(engine.status().last_error_kind, Some(ErrorKind::ConflictExhausted));
}

#[tokio::test(start_paused = true)]
async fn test_401_clears_credentials_without_backoff() {
    let backend = MemoryBackend::new("unauthorized");
    backend.fail_next_store(ScriptedFailure::AuthExpired);
    let engine = engine_on(&backend);
    let auth_events = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&auth_events);
    engine.subscribe(Arc::new(move |event: &SyncEvent| {
        if matches!(event, SyncEvent::AuthExpired) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));

    engine.create_concept("A", ConceptData::named("x"));
    let start = Instant::now();
    let err = flush(&engine).await.unwrap_err();

    assert!(matches!(err, ProviderError::AuthExpired));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(backend.store_calls(), 1);
    assert_eq!(auth_events.load(Ordering::SeqCst), 1);
    assert!(!engine.provider().is_authenticated());
    assert_eq!(engine.pending_count(), 1);
}

#[tokio::test]
async fn test_empty_flush_makes_no_calls() {
    let backend = MemoryBackend::new("empty");
    let engine = engine_on(&backend);
    let before = engine.status();

    assert_eq!(flush(&engine).await.unwrap(), BatchOutcome::Idle);
    assert_eq!(backend.total_calls(), 0);
    assert_eq!(engine.status(), before);
}

#[tokio::test]
async fn test_load_excludes_tombstones() {
    let backend = MemoryBackend::new("load");
    let live = Concept::new("live").with_name("Live");
    let dead = Concept::new("dead").with_name("Dead").tombstone(Utc::now());
    for concept in [&live, &dead] {
        backend.insert_file(
            &format!("semantic/{}", concept_path(&concept.id)),
            concept::encode(concept),
        );
    }
    let engine = engine_on(&backend);

    let report = timeout(SYNC_TIMEOUT, engine.load_from_provider())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.loaded, 1);
    assert_eq!(report.tombstones, 1);
    assert_eq!(engine.get_all_concepts(), vec![live]);
    assert!(engine.get_concept("dead").is_none());
}

#[tokio::test]
async fn test_load_from_empty_space() {
    let engine = engine_on(&MemoryBackend::new("fresh"));
    let report = engine.load_from_provider().await.unwrap();
    assert_eq!(report.loaded, 0);
    assert!(engine.get_all_concepts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_limiter_delays_call_over_quota_until_reset() {
    let limiter = RateLimiter::new(RateLimitConfig {
        personal_token_quota: 2,
        min_spacing_ms: 0,
        window_secs: 60,
        ..RateLimitConfig::default()
    });
    let class = CredentialClass::PersonalToken;

    let start = Instant::now();
    for _ in 0..2 {
        limiter.admit(class).await;
        limiter.record(class);
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    limiter.admit(class).await;
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_limiter_spacing_delays_not_drops() {
    let limiter = RateLimiter::default();
    let class = CredentialClass::OAuth;

    limiter.admit(class).await;
    limiter.record(class);
    let start = Instant::now();
    limiter.admit(class).await;
    limiter.record(class);

    assert!(start.elapsed() >= Duration::from_millis(250));
    assert_eq!(limiter.usage(class).used, 2);
}

#[tokio::test]
async fn test_budget_is_shared_across_engines() {
    let limiter = RateLimiter::new(RateLimitConfig {
        min_spacing_ms: 0,
        ..RateLimitConfig::default()
    });
    let first = MemoryBackend::new("doc-1");
    let second = MemoryBackend::new("doc-2");
    let engines = [&first, &second].map(|backend| {
        SyncEngine::new(Provider::new(Arc::new(backend.clone())).with_rate_limiter(limiter.clone()))
    });

    for (i, engine) in engines.iter().enumerate() {
        engine.create_concept(format!("c{i}"), ConceptData::named("x"));
        let _ = flush(engine).await.unwrap();
    }

    let used = limiter.usage(CredentialClass::PersonalToken).used as usize;
    assert_eq!(used, first.total_calls() + second.total_calls());
    assert!(used >= 4);
}

#[tokio::test]
async fn test_migrate_provider_moves_space_and_swaps() {
    let backend = MemoryBackend::new("origin");
    let engine = engine_on(&backend);
    engine.create_concept("A", ConceptData::named("x"));
    let _ = flush(&engine).await.unwrap();

    let limiter = RateLimiter::default();
    let copied = engine
        .migrate_provider(&ProviderConfig::memory("destination"), &limiter)
        .await
        .unwrap();

    assert_eq!(copied, 1);
    let provider = engine.provider();
    assert_eq!(provider.name(), "memory:destination");
    let text = provider
        .read_semantic_file(&concept_path("A"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(concept::decode(&text).unwrap().name.as_deref(), Some("x"));

    // Later edits land on the new provider only.
    engine.update_concept("A", ConceptData::named("y"));
    let _ = flush(&engine).await.unwrap();
    assert_eq!(remote_concept(&backend, "A").unwrap().name.as_deref(), Some("x"));
}

#[tokio::test]
async fn test_redundant_storage_is_best_effort() {
    let backend = MemoryBackend::new("primary");
    let engine = engine_on(&backend);
    let limiter = RateLimiter::default();
    let configured = engine
        .setup_redundant_storage(&[ProviderConfig::memory("mirror")], &limiter)
        .unwrap();
    assert_eq!(configured, 1);
    assert_eq!(engine.backup_providers(), vec!["memory:mirror".to_string()]);

    engine.create_concept("A", ConceptData::named("x"));
    let _ = flush(&engine).await.unwrap();
    timeout(SYNC_TIMEOUT, async {
        while engine.backups_in_flight() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(engine.backup_errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_background_task_flushes_and_reports_status() {
    let backend = MemoryBackend::new("background");
    let config = SyncConfig {
        flush_interval_ms: 500,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::with_config(
        Provider::new(Arc::new(backend.clone())).with_base_path("semantic"),
        config,
    );
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    engine.subscribe(Arc::new(move |event: &SyncEvent| {
        if let SyncEvent::Status(status) = event {
            sink.lock().unwrap().push(status.message.clone());
        }
    }));

    let task = spawn_flush_task(engine.clone(), engine.config().flush_interval());
    engine.create_concept("A", ConceptData::named("x"));
    tokio::time::sleep(Duration::from_millis(600)).await;

    let result = timeout(SYNC_TIMEOUT, task.shutdown()).await.unwrap();
    assert_eq!(result.flushes, 1);
    assert!(!result.has_errors());
    assert!(remote_concept(&backend, "A").is_some());

    let messages = messages.lock().unwrap();
    assert_eq!(messages.first().map(String::as_str), Some("Saving…"));
    assert_eq!(messages.last().map(String::as_str), Some("All changes saved"));
}

#[tokio::test]
async fn test_export_full_graph_round_trips_each_concept() {
    let engine = engine_on(&MemoryBackend::new("export"));
    engine.create_concept(
        "a",
        ConceptData::named("A").with_relationship("relatesTo", "b"),
    );
    engine.create_concept("b", ConceptData::named("B"));

    let graph = engine.export_full_graph();
    assert_eq!(graph.matches("a redstring:Concept").count(), 2);
    assert!(graph.contains("redstring:relatesTo redstring:b"));
}
