//! Integration tests: evaluation against a live store, protection of
//! pinned/profile tiers, and hard-cap enforcement.

use std::sync::Arc;

use engram_core::config::{EmbeddingConfig, LifecycleConfig};
use engram_core::memory::{MemoryRecord, MemoryType};
use engram_embeddings::EmbeddingService;
use engram_lifecycle::LifecycleManager;
use engram_vector::VectorStore;
use test_fixtures::RecordBuilder;

async fn store() -> Arc<VectorStore> {
    let dir = tempfile::tempdir().unwrap();
    let store = VectorStore::new(
        dir.path(),
        Arc::new(EmbeddingService::new(EmbeddingConfig::default())),
    );
    store.initialize().await.unwrap();
    Arc::new(store)
}

fn seed(store: &VectorStore, record: MemoryRecord) -> String {
    let id = record.id.clone();
    store.insert_record(record).unwrap();
    id
}

#[tokio::test]
async fn heavily_accessed_short_term_upgrades() {
    let store = store().await;
    let id = seed(
        &store,
        RecordBuilder::new("u1", "content")
            .memory_type(MemoryType::ShortTerm)
            .importance(0.4)
            .age_days(8)
            .access_count(12)
            .last_accessed_hours_ago(1)
            .build(),
    );

    let manager = LifecycleManager::new(Arc::clone(&store), LifecycleConfig::default());
    let result = manager.evaluate_user("u1").unwrap();

    assert_eq!(result.upgraded, 1);
    assert_eq!(result.deleted, 0);
    let updated = store.get_by_id(&id).unwrap();
    assert_eq!(updated.metadata.memory_type, MemoryType::MidTerm);
    assert!((updated.metadata.importance - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn protected_tiers_are_never_transitioned() {
    let store = store().await;
    for tier in [MemoryType::Pinned, MemoryType::Profile] {
        seed(
            &store,
            RecordBuilder::new("u1", "content")
                .memory_type(tier)
                .importance(0.0)
                .age_days(1000)
                .build(),
        );
    }

    let manager = LifecycleManager::new(Arc::clone(&store), LifecycleConfig::default());
    let result = manager.evaluate_user("u1").unwrap();

    assert_eq!(result.deleted, 0);
    assert_eq!(result.upgraded, 0);
    assert_eq!(result.downgraded, 0);
    assert_eq!(store.get_by_user("u1").len(), 2);
}

#[tokio::test]
async fn hard_cap_evicts_lowest_value_records() {
    let store = store().await;
    for i in 0..10 {
        seed(
            &store,
            RecordBuilder::new("u1", "content")
                .importance(i as f64 / 10.0)
                .last_accessed_hours_ago(0)
                .build(),
        );
    }

    let config = LifecycleConfig {
        max_memories_per_user: 5,
        ..Default::default()
    };
    let manager = LifecycleManager::new(Arc::clone(&store), config);
    let result = manager.evaluate_user("u1").unwrap();

    assert_eq!(result.evicted, 5);
    let remaining = store.get_by_user("u1");
    assert_eq!(remaining.len(), 5);
    // The high-importance half survived.
    assert!(remaining.iter().all(|r| r.metadata.importance >= 0.5));
}

#[tokio::test]
async fn hard_cap_with_only_protected_records_logs_and_keeps() {
    let store = store().await;
    for _ in 0..4 {
        seed(
            &store,
            RecordBuilder::new("u1", "content")
                .memory_type(MemoryType::Pinned)
                .importance(0.9)
                .build(),
        );
    }

    let config = LifecycleConfig {
        max_memories_per_user: 2,
        ..Default::default()
    };
    let manager = LifecycleManager::new(Arc::clone(&store), config);
    let result = manager.evaluate_user("u1").unwrap();

    assert_eq!(result.evicted, 0);
    assert_eq!(store.get_by_user("u1").len(), 4);
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("hard cap") || e.contains("protected")));
}

#[tokio::test]
async fn evaluate_all_covers_every_user() {
    let store = store().await;
    for user in ["u1", "u2"] {
        seed(
            &store,
            RecordBuilder::new(user, "stale trivia")
                .importance(0.05)
                .age_days(45)
                .last_accessed_hours_ago(45 * 24)
                .build(),
        );
    }

    let manager = LifecycleManager::new(Arc::clone(&store), LifecycleConfig::default());
    let result = manager.evaluate_all();

    assert_eq!(result.deleted, 2);
    assert!(store.get_by_user("u1").is_empty());
    assert!(store.get_by_user("u2").is_empty());
}

#[tokio::test]
async fn stats_aggregate_by_type() {
    let store = store().await;
    seed(&store, RecordBuilder::new("u1", "a").importance(0.2).build());
    seed(&store, RecordBuilder::new("u1", "b").importance(0.4).build());
    seed(
        &store,
        RecordBuilder::new("u1", "c")
            .memory_type(MemoryType::Pinned)
            .importance(1.0)
            .build(),
    );

    let manager = LifecycleManager::new(Arc::clone(&store), LifecycleConfig::default());
    let stats = manager.stats("u1");

    assert_eq!(stats.total_count, 3);
    assert_eq!(stats.by_type.get("shortTerm"), Some(&2));
    assert_eq!(stats.by_type.get("pinned"), Some(&1));
    assert!((stats.average_importance - (0.2 + 0.4 + 1.0) / 3.0).abs() < 1e-9);
}
