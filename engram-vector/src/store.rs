use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use engram_core::errors::{EngramResult, StoreError};
use engram_core::memory::{MemoryMetadata, MemoryRecord, MemoryType};
use engram_core::vecmath::cosine_similarity;
use engram_embeddings::EmbeddingService;

use crate::persistence::{self, IndexFile, VectorsFile};

/// Search request against the store.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub user_id: String,
    /// Pre-computed query embedding.
    pub embedding: Vec<f32>,
    pub limit: usize,
    pub min_similarity: f64,
    /// Inclusive creation-time window.
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Restrict to these tiers when present.
    pub types: Option<Vec<MemoryType>>,
}

impl SearchQuery {
    pub fn new(user_id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            user_id: user_id.into(),
            embedding,
            limit: engram_core::constants::DEFAULT_MAX_RESULTS,
            min_similarity: engram_core::constants::DEFAULT_MIN_SIMILARITY,
            time_range: None,
            types: None,
        }
    }
}

/// A scored search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: MemoryRecord,
    pub similarity: f64,
}

/// Options for `cleanup_expired`.
#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Records older than this are deletion candidates.
    pub max_age: Option<Duration>,
    /// Retain at most this many records per user (most recently
    /// accessed survive).
    pub max_vectors_per_user: Option<usize>,
    /// Candidates must also fall below this importance.
    pub min_importance: Option<f64>,
}

/// Result of a cleanup sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub kept: usize,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, MemoryRecord>,
    by_user: HashMap<String, HashSet<String>>,
}

impl StoreInner {
    fn insert(&mut self, record: MemoryRecord) {
        self.by_user
            .entry(record.metadata.user_id.clone())
            .or_default()
            .insert(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) -> Option<MemoryRecord> {
        let record = self.records.remove(id)?;
        if let Some(ids) = self.by_user.get_mut(&record.metadata.user_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_user.remove(&record.metadata.user_id);
            }
        }
        Some(record)
    }
}

/// The vector store. One instance owns the `memory_vectors` files under
/// the data directory; construction is guarded so two concurrent
/// initializations fail fast instead of racing the load.
pub struct VectorStore {
    inner: RwLock<StoreInner>,
    embedder: Arc<EmbeddingService>,
    vectors_path: PathBuf,
    index_path: PathBuf,
    dirty: AtomicBool,
    initialized: AtomicBool,
    initializing: AtomicBool,
    /// Chained single-flight save queue.
    save_queue: tokio::sync::Mutex<()>,
}

impl VectorStore {
    /// Create an unloaded store. Call `initialize()` before use.
    pub fn new(data_dir: impl Into<PathBuf>, embedder: Arc<EmbeddingService>) -> Self {
        let dir = data_dir.into().join("memory_vectors");
        Self {
            inner: RwLock::new(StoreInner::default()),
            embedder,
            vectors_path: dir.join("vectors.json"),
            index_path: dir.join("index.json"),
            dirty: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
            save_queue: tokio::sync::Mutex::new(()),
        }
    }

    /// Load persisted state. A second caller arriving while a load is in
    /// flight fails fast rather than observing a partial store.
    pub async fn initialize(&self) -> EngramResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.initializing.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyInitializing.into());
        }

        let result = persistence::load(&self.vectors_path, &self.index_path).await;
        match result {
            Ok((vectors, _index)) => {
                let mut inner = self.inner.write();
                // Rebuild the user index from the records; the persisted
                // index file is a fast-path snapshot, not the source of
                // truth.
                for (_, record) in vectors.records {
                    inner.insert(record);
                }
                let count = inner.records.len();
                drop(inner);
                self.initialized.store(true, Ordering::SeqCst);
                self.initializing.store(false, Ordering::SeqCst);
                info!(records = count, "vector store initialized");
                Ok(())
            }
            Err(e) => {
                self.initializing.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Whether `initialize()` has completed.
    pub fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> EngramResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotReady.into())
        }
    }

    /// Embedding service used by this store.
    pub fn embedder(&self) -> &Arc<EmbeddingService> {
        &self.embedder
    }

    /// Create a record from `content`, embed it, and insert it.
    /// Returns the new record id.
    pub async fn add(&self, content: &str, metadata: MemoryMetadata) -> EngramResult<String> {
        self.ensure_ready()?;

        let embedded = self.embedder.embed_text(content, false).await?;
        let mut record = MemoryRecord::new(content, metadata);
        record.embedding = embedded.embedding;

        let id = record.id.clone();
        self.inner.write().insert(record);
        self.dirty.store(true, Ordering::SeqCst);
        debug!(id = %id, "added memory record");
        Ok(id)
    }

    /// Insert a fully formed record (rollback restores, migrations).
    pub fn insert_record(&self, record: MemoryRecord) -> EngramResult<()> {
        self.ensure_ready()?;
        self.inner.write().insert(record);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Replace an existing record in place, keyed by its id.
    pub fn update_record(&self, record: MemoryRecord) -> EngramResult<bool> {
        self.ensure_ready()?;
        let mut inner = self.inner.write();
        let existed = inner.records.contains_key(&record.id);
        if existed {
            inner.insert(record);
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(existed)
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove(&self, id: &str) -> EngramResult<bool> {
        self.ensure_ready()?;
        let removed = self.inner.write().remove(id).is_some();
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    pub fn get_by_id(&self, id: &str) -> Option<MemoryRecord> {
        self.inner.read().records.get(id).cloned()
    }

    pub fn get_by_user(&self, user_id: &str) -> Vec<MemoryRecord> {
        let inner = self.inner.read();
        inner
            .by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_all(&self) -> Vec<MemoryRecord> {
        self.inner.read().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct user ids present in the store.
    pub fn user_ids(&self) -> Vec<String> {
        self.inner.read().by_user.keys().cloned().collect()
    }

    /// Cosine search over the user's records. Hits bump the records'
    /// access counters.
    pub fn search(&self, query: &SearchQuery) -> EngramResult<Vec<SearchHit>> {
        self.ensure_ready()?;

        let candidates: Vec<MemoryRecord> = {
            let inner = self.inner.read();
            let Some(ids) = inner.by_user.get(&query.user_id) else {
                return Ok(Vec::new());
            };
            ids.iter()
                .filter_map(|id| inner.records.get(id))
                .filter(|r| {
                    if let Some((from, to)) = query.time_range {
                        if r.metadata.timestamp < from || r.metadata.timestamp > to {
                            return false;
                        }
                    }
                    if let Some(types) = &query.types {
                        if !types.contains(&r.metadata.memory_type) {
                            return false;
                        }
                    }
                    r.has_embedding()
                })
                .cloned()
                .collect()
        };

        let mut hits: Vec<SearchHit> = candidates
            .into_par_iter()
            .filter_map(|record| {
                let similarity = cosine_similarity(&query.embedding, &record.embedding);
                (similarity >= query.min_similarity).then_some(SearchHit { record, similarity })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.limit);

        // Retrieval hits update lifecycle counters.
        {
            let mut inner = self.inner.write();
            for hit in &mut hits {
                if let Some(record) = inner.records.get_mut(&hit.record.id) {
                    record.touch();
                    hit.record = record.clone();
                }
            }
        }
        if !hits.is_empty() {
            self.dirty.store(true, Ordering::SeqCst);
        }

        Ok(hits)
    }

    /// Record retrieval hits for records that reached the caller through
    /// a channel other than `search` (e.g. keyword-only hybrid hits).
    pub fn touch_records(&self, ids: &[String]) {
        let mut inner = self.inner.write();
        let mut touched = false;
        for id in ids {
            if let Some(record) = inner.records.get_mut(id) {
                record.touch();
                touched = true;
            }
        }
        if touched {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Whether unpersisted changes exist.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persist to disk through the single-flight save queue.
    ///
    /// Clears the dirty flag on entry; a failed write restores it so the
    /// next trigger retries. A caller arriving while another write is in
    /// flight chains behind it; callers arriving when the store is clean
    /// return immediately.
    pub async fn persist(&self) -> EngramResult<()> {
        self.ensure_ready()?;

        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.save_queue.lock().await;

        let (vectors, index) = {
            let inner = self.inner.read();
            let vectors = VectorsFile {
                records: inner.records.clone(),
            };
            let index = IndexFile {
                by_user: inner
                    .by_user
                    .iter()
                    .map(|(user, ids)| {
                        let mut sorted: Vec<String> = ids.iter().cloned().collect();
                        sorted.sort();
                        (user.clone(), sorted)
                    })
                    .collect(),
            };
            (vectors, index)
        };

        match persistence::save(&self.vectors_path, &self.index_path, &vectors, &index).await {
            Ok(()) => {
                debug!(records = vectors.records.len(), "vector store persisted");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "vector store persistence failed; will retry");
                self.dirty.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Delete records that are simultaneously too old AND below the
    /// importance floor, then apply the per-user retention cap.
    /// Protected tiers are never touched.
    pub fn cleanup_expired(&self, options: &CleanupOptions) -> EngramResult<CleanupReport> {
        self.ensure_ready()?;
        let now = Utc::now();
        let mut removed = 0usize;

        let mut inner = self.inner.write();

        if let Some(max_age) = options.max_age {
            let min_importance = options.min_importance.unwrap_or(0.0);
            let expired: Vec<String> = inner
                .records
                .values()
                .filter(|r| {
                    !r.metadata.memory_type.is_protected()
                        && r.age(now) > max_age
                        && r.metadata.importance < min_importance
                })
                .map(|r| r.id.clone())
                .collect();
            for id in expired {
                inner.remove(&id);
                removed += 1;
            }
        }

        if let Some(cap) = options.max_vectors_per_user {
            let users: Vec<String> = inner.by_user.keys().cloned().collect();
            for user in users {
                let mut ids: Vec<(String, DateTime<Utc>, bool)> = inner
                    .by_user
                    .get(&user)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| inner.records.get(id))
                            .map(|r| {
                                (
                                    r.id.clone(),
                                    r.last_accessed,
                                    r.metadata.memory_type.is_protected(),
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if ids.len() <= cap {
                    continue;
                }
                // Most recently accessed survive; protected always survive.
                ids.sort_by(|a, b| b.1.cmp(&a.1));
                for (id, _, protected) in ids.into_iter().skip(cap) {
                    if !protected {
                        inner.remove(&id);
                        removed += 1;
                    }
                }
            }
        }

        let kept = inner.records.len();
        drop(inner);

        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
            info!(removed, kept, "cleanup sweep complete");
        }
        Ok(CleanupReport { removed, kept })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::config::EmbeddingConfig;

    fn service() -> Arc<EmbeddingService> {
        Arc::new(EmbeddingService::new(EmbeddingConfig::default()))
    }

    async fn open_store(dir: &std::path::Path) -> VectorStore {
        let store = VectorStore::new(dir, service());
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn add_before_initialize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path(), service());
        let meta = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
        let err = store.add("hello", meta).await.unwrap_err();
        assert_eq!(err.code(), "STORE_NOT_READY");
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let meta = MemoryMetadata::new("u1", MemoryType::LongTerm, 0.7);
        let id = store.add("张三住在北京", meta).await.unwrap();

        let record = store.get_by_id(&id).unwrap();
        assert_eq!(record.content, "张三住在北京");
        assert_eq!(record.metadata.memory_type, MemoryType::LongTerm);
        assert_eq!(record.embedding.len(), 384);
        assert_eq!(store.get_by_user("u1").len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn remove_updates_user_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let meta = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
        let id = store.add("hello", meta).await.unwrap();

        assert!(store.remove(&id).unwrap());
        assert!(!store.remove(&id).unwrap());
        assert!(store.get_by_user("u1").is_empty());
        assert!(store.user_ids().is_empty());
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_touches() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let meta = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
        store.add("I love Rust programming", meta.clone()).await.unwrap();
        store.add("the weather is sunny today", meta).await.unwrap();

        let query_vec = store
            .embedder()
            .embed_text("Rust programming", false)
            .await
            .unwrap()
            .embedding;
        let hits = store
            .search(&SearchQuery {
                min_similarity: 0.01,
                ..SearchQuery::new("u1", query_vec)
            })
            .unwrap();

        assert!(!hits.is_empty());
        assert!(hits[0].record.content.contains("Rust"));
        assert_eq!(hits[0].record.access_count, 1);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn search_filters_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let long = MemoryMetadata::new("u1", MemoryType::LongTerm, 0.5);
        let short = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
        store.add("shared topic alpha", long).await.unwrap();
        store.add("shared topic alpha", short).await.unwrap();

        let query_vec = store
            .embedder()
            .embed_text("shared topic alpha", false)
            .await
            .unwrap()
            .embedding;
        let hits = store
            .search(&SearchQuery {
                min_similarity: 0.01,
                types: Some(vec![MemoryType::LongTerm]),
                ..SearchQuery::new("u1", query_vec)
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.metadata.memory_type, MemoryType::LongTerm);
    }

    #[tokio::test]
    async fn cleanup_requires_both_age_and_low_importance() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        let mut old_important = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.9);
        old_important.timestamp = Utc::now() - Duration::days(100);
        let mut old_trivial = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.05);
        old_trivial.timestamp = Utc::now() - Duration::days(100);

        store.add("old but important", old_important).await.unwrap();
        let trivial_id = store.add("old and trivial", old_trivial).await.unwrap();

        let report = store
            .cleanup_expired(&CleanupOptions {
                max_age: Some(Duration::days(30)),
                min_importance: Some(0.1),
                max_vectors_per_user: None,
            })
            .unwrap();

        assert_eq!(report.removed, 1);
        assert!(store.get_by_id(&trivial_id).is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_cap_keeps_protected_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        for i in 0..3 {
            let meta = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
            store.add(&format!("note {i}"), meta).await.unwrap();
        }
        let pinned = MemoryMetadata::new("u1", MemoryType::Pinned, 1.0);
        let pinned_id = store.add("never delete me", pinned).await.unwrap();

        store
            .cleanup_expired(&CleanupOptions {
                max_vectors_per_user: Some(2),
                ..Default::default()
            })
            .unwrap();

        assert!(store.get_by_id(&pinned_id).is_some());
        assert!(store.len() >= 2);
    }
}
