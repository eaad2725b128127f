//! End-to-end scenarios against a fully wired manager: ingest→retrieve,
//! preference flip with auto-resolution, duplicate suppression via
//! compression, hybrid tiebreaks, lifecycle upgrade, and transactional
//! rollback on a failed resolution.

use chrono::{Duration, Utc};
use engram_core::config::EngramConfig;
use engram_core::graph::{EntityType, RelationType};
use engram_core::memory::MemoryType;
use engram_graph::{EntityFilter, RelationFilter};
use engram_manager::{MemoryManager, QueryOptions, UpdateOptions};

async fn manager() -> (tempfile::TempDir, MemoryManager) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngramConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let manager = MemoryManager::new(config).await.unwrap();
    (dir, manager)
}

#[tokio::test]
async fn ingest_then_retrieve_with_graph() {
    let (_dir, manager) = manager().await;

    let update = manager
        .update_memory("u1", "我叫张三，在明略科技工作", &UpdateOptions::default())
        .await
        .unwrap();
    assert!(update.success, "errors: {:?}", update.errors);
    assert!(update.vectors_added >= 1);
    let (entities, relations) = update.graph_extracted.unwrap();
    assert!(entities >= 2);
    assert!(relations >= 1);

    let result = manager
        .query("u1", "张三在哪工作", &QueryOptions::default())
        .await
        .unwrap();
    assert!(
        result
            .memories
            .iter()
            .any(|m| m.record.content.contains("明略科技")),
        "retrieved: {:?}",
        result.memories.iter().map(|m| &m.record.content).collect::<Vec<_>>()
    );

    let people = manager
        .query_entities(&EntityFilter {
            user_id: Some("u1".to_string()),
            entity_type: Some(EntityType::Person),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(people.iter().any(|e| e.name == "张三"));

    let orgs = manager
        .query_entities(&EntityFilter {
            user_id: Some("u1".to_string()),
            entity_type: Some(EntityType::Organization),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(orgs.iter().any(|e| e.name == "明略科技公司"));

    let works_at = manager
        .query_relations(&RelationFilter {
            user_id: Some("u1".to_string()),
            relation_type: Some(RelationType::WorksAt),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(works_at.len(), 1);
}

#[tokio::test]
async fn preference_flip_resolves_by_replacement() {
    let (_dir, manager) = manager().await;

    manager
        .update_memory("u1", "我喜欢Python", &UpdateOptions::default())
        .await
        .unwrap();

    let update = manager
        .update_memory(
            "u1",
            "我不喜欢Python了",
            &UpdateOptions {
                auto_resolve_conflicts: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(
        update
            .conflicts_detected
            .iter()
            .any(|c| c.conflict_type == engram_core::conflict::ConflictType::PreferenceChange),
        "detected: {:?}",
        update.conflicts_detected
    );
    assert!(!update.conflicts_resolved.is_empty());

    // The old preference is gone; the new one remains.
    let remaining = manager.store().get_by_user("u1");
    assert!(remaining.iter().all(|r| r.content != "我喜欢Python"));
    assert!(remaining.iter().any(|r| r.content.contains("不喜欢Python")));
}

#[tokio::test]
async fn duplicate_suppression_via_compression() {
    let (_dir, manager) = manager().await;

    let options = UpdateOptions {
        importance: Some(0.8),
        extract_graph: false,
        detect_conflicts: false,
        ..Default::default()
    };
    manager
        .update_memory("u1", "Python是我最喜欢的语言", &options)
        .await
        .unwrap();
    manager
        .update_memory("u1", "我最喜欢的语言是Python", &options)
        .await
        .unwrap();

    let before = manager.store().get_by_user("u1").len();
    assert_eq!(before, 2);

    let compression = manager.auto_compress_memories("u1").await.unwrap();
    assert!(compression.compressed, "no trigger fired");
    assert_eq!(compression.deleted, 2);
    assert_eq!(compression.created, 1);

    let after = manager.store().get_by_user("u1").len();
    assert_eq!(after, before - 1);
}

#[tokio::test]
async fn conflicting_dates_collapse_to_newest_via_update() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngramConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    // Two records are enough to trip the count trigger.
    config.compression.count_limit = 2;
    let manager = MemoryManager::new(config).await.unwrap();

    let options = UpdateOptions {
        detect_conflicts: false,
        extract_graph: false,
        ..Default::default()
    };
    manager
        .update_memory("u1", "婚礼定在2024年3月，在北京饭店举行", &options)
        .await
        .unwrap();
    // Distinct timestamps so the newer record is unambiguous.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    manager
        .update_memory("u1", "婚礼改期到2024年5月", &options)
        .await
        .unwrap();

    let compression = manager.auto_compress_memories("u1").await.unwrap();
    assert!(compression.compressed, "no trigger fired");
    assert_eq!(compression.deleted, 1);
    assert_eq!(compression.created, 0);

    let remaining = manager.store().get_by_user("u1");
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].content.contains("5月"));
}

#[tokio::test]
async fn hybrid_tiebreak_prefers_long_term() {
    let (_dir, manager) = manager().await;

    manager
        .update_memory(
            "u1",
            "张三住在北京",
            &UpdateOptions {
                memory_type: Some(MemoryType::LongTerm),
                extract_graph: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    manager
        .update_memory(
            "u1",
            "李四住在北京",
            &UpdateOptions {
                memory_type: Some(MemoryType::ShortTerm),
                extract_graph: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = manager
        .query("u1", "北京", &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(result.memories.len(), 2);
    assert_eq!(
        result.memories[0].record.metadata.memory_type,
        MemoryType::LongTerm
    );
    assert!(result.memories[0].score > result.memories[1].score);
}

#[tokio::test]
async fn lifecycle_upgrade_scenario() {
    let (_dir, manager) = manager().await;

    manager
        .update_memory(
            "u1",
            "一条经常被访问的记忆",
            &UpdateOptions {
                memory_type: Some(MemoryType::ShortTerm),
                importance: Some(0.4),
                extract_graph: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Backdate and mark as heavily accessed.
    let record = manager.store().get_by_user("u1").pop().unwrap();
    let mut tuned = record.clone();
    tuned.metadata.timestamp = Utc::now() - Duration::days(8);
    tuned.access_count = 12;
    tuned.last_accessed = Utc::now() - Duration::hours(1);
    manager.store().update_record(tuned).unwrap();

    let result = manager.evaluate_memory_lifecycle("u1").unwrap();
    assert_eq!(result.upgraded, 1);
    assert_eq!(result.deleted, 0);

    let updated = manager.store().get_by_id(&record.id).unwrap();
    assert_eq!(updated.metadata.memory_type, MemoryType::MidTerm);
    assert!((updated.metadata.importance - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn failed_resolution_rolls_back_to_checkpoint() {
    let (_dir, manager) = manager().await;

    // A pinned preference cannot be removed by auto-resolution, so the
    // first resolution attempt fails.
    manager
        .update_memory(
            "u1",
            "我喜欢Python",
            &UpdateOptions {
                memory_type: Some(MemoryType::Pinned),
                extract_graph: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let before = manager.store().get_by_user("u1").len();

    let update = manager
        .update_memory(
            "u1",
            "我不喜欢Python了",
            &UpdateOptions {
                auto_resolve_conflicts: true,
                extract_graph: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The vector additions survive; the resolutions do not.
    assert!(update.conflicts_resolved.is_empty());
    assert!(!update.errors.is_empty());
    assert!(!update.success);
    let after = manager.store().get_by_user("u1").len();
    assert_eq!(after, before + update.vectors_added);
    // The pinned record is untouched.
    assert!(manager
        .store()
        .get_by_user("u1")
        .iter()
        .any(|r| r.metadata.memory_type == MemoryType::Pinned));
}

#[tokio::test]
async fn distillation_respects_token_cap_and_sections() {
    let (_dir, manager) = manager().await;

    manager
        .update_memory("u1", "我叫张三，在明略科技工作", &UpdateOptions::default())
        .await
        .unwrap();
    manager
        .update_memory("u1", "我喜欢在周末骑车", &UpdateOptions::default())
        .await
        .unwrap();
    manager
        .update_memory("u1", "今天下午开了项目会", &UpdateOptions::default())
        .await
        .unwrap();

    let distilled = manager
        .distill_memories_for_context("u1", "介绍一下我自己", 500)
        .await
        .unwrap();

    assert!(distilled.tokens_used <= 500);
    assert!(!distilled.sources.is_empty());
    assert!(distilled.distilled.contains("###"));
    // Profile facts outrank chit-chat in the section order.
    if let (Some(profile_pos), Some(recent_pos)) = (
        distilled.distilled.find("### Profile"),
        distilled.distilled.find("### Recent"),
    ) {
        assert!(profile_pos < recent_pos);
    }
}

#[tokio::test]
async fn query_with_no_candidates_is_empty_not_an_error() {
    let (_dir, manager) = manager().await;
    let result = manager
        .query("nobody", "anything at all", &QueryOptions::default())
        .await
        .unwrap();
    assert!(result.memories.is_empty());
    assert_eq!(result.metadata.total_found, 0);
}

#[tokio::test]
async fn empty_user_id_fails_validation() {
    let (_dir, manager) = manager().await;
    let err = manager
        .update_memory("", "text", &UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INPUT_VALIDATION_FAILED");
}

#[tokio::test]
async fn graph_paths_are_attached_when_requested() {
    let (_dir, manager) = manager().await;

    manager
        .update_memory("u1", "我叫张三，在明略科技工作", &UpdateOptions::default())
        .await
        .unwrap();

    let result = manager
        .query(
            "u1",
            "张三",
            &QueryOptions {
                graph: Some(engram_manager::GraphQueryOptions {
                    entity_name: Some("张三".to_string()),
                    path_between: Some(("张三".to_string(), "明略科技公司".to_string())),
                    max_path_depth: Some(3),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let graph = result.graph.unwrap();
    assert!(graph.entities.iter().any(|e| e.name == "明略科技公司"));
    assert!(!graph.paths.is_empty());
    assert!(graph.paths.iter().all(|p| !p.is_empty()));
}
