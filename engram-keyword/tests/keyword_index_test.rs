//! Integration tests for the keyword index: CJK bigram search, per-user
//! isolation, score normalization, and removal.

use engram_core::memory::{MemoryMetadata, MemoryRecord, MemoryType};
use engram_keyword::{KeywordIndex, KeywordSearchOptions};

fn record(user: &str, content: &str) -> MemoryRecord {
    MemoryRecord::new(content, MemoryMetadata::new(user, MemoryType::ShortTerm, 0.5))
}

#[tokio::test]
async fn cjk_query_matches_by_bigram() {
    let index = KeywordIndex::open_in_memory().unwrap();
    let rec = record("u1", "张三住在北京");
    index.index(&rec).await.unwrap();

    let hits = index
        .search("北京", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory_id, rec.id);
    assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
}

#[tokio::test]
async fn ascii_search_is_case_insensitive() {
    let index = KeywordIndex::open_in_memory().unwrap();
    let rec = record("u1", "I love RUST programming");
    index.index(&rec).await.unwrap();

    let hits = index
        .search("rust", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn results_are_isolated_per_user() {
    let index = KeywordIndex::open_in_memory().unwrap();
    index.index(&record("u1", "shared keyword apple")).await.unwrap();
    index.index(&record("u2", "shared keyword apple")).await.unwrap();

    let hits = index
        .search("apple", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn partial_keyword_match_scores_fractionally() {
    let index = KeywordIndex::open_in_memory().unwrap();
    let rec = record("u1", "alpha beta");
    index.index(&rec).await.unwrap();

    let hits = index
        .search("alpha gamma", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn min_score_filters_weak_hits() {
    let index = KeywordIndex::open_in_memory().unwrap();
    index.index(&record("u1", "alpha beta")).await.unwrap();

    let mut options = KeywordSearchOptions::new("u1");
    options.min_score = 0.9;
    let hits = index.search("alpha gamma", &options).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn remove_deletes_the_row() {
    let index = KeywordIndex::open_in_memory().unwrap();
    let rec = record("u1", "disappearing act");
    index.index(&rec).await.unwrap();

    assert!(index.remove(&rec.id).await.unwrap());
    assert!(!index.remove(&rec.id).await.unwrap());

    let hits = index
        .search("disappearing", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn reindex_replaces_previous_content() {
    let index = KeywordIndex::open_in_memory().unwrap();
    let mut rec = record("u1", "original wording");
    index.index(&rec).await.unwrap();

    rec.content = "updated phrasing".to_string();
    index.index(&rec).await.unwrap();

    let old = index
        .search("original", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert!(old.is_empty());
    let new = index
        .search("updated", &KeywordSearchOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(new.len(), 1);
}

#[tokio::test]
async fn type_filter_restricts_results() {
    let index = KeywordIndex::open_in_memory().unwrap();
    let mut long = record("u1", "topic in common");
    long.metadata.memory_type = MemoryType::LongTerm;
    index.index(&long).await.unwrap();
    index.index(&record("u1", "topic in common")).await.unwrap();

    let mut options = KeywordSearchOptions::new("u1");
    options.types = Some(vec![MemoryType::LongTerm]);
    let hits = index.search("topic", &options).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory_id, long.id);
}
