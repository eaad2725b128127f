use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use engram_compression::{CompressionEngine, CompressionPolicy};
use engram_conflict::ConflictDetector;
use engram_core::config::EngramConfig;
use engram_core::conflict::{Conflict, ConflictType, Resolution, ResolutionAction};
use engram_core::constants::{
    DEFAULT_MAX_PATH_DEPTH, DEFAULT_MAX_RESULTS, DEFAULT_MIN_SIMILARITY, DEFAULT_SUBGRAPH_RADIUS,
    DISTILL_RETRIEVE_LIMIT,
};
use engram_core::errors::{EngramError, EngramResult};
use engram_core::graph::{GraphEntity, GraphRelation};
use engram_core::memory::{MemoryMetadata, MemoryRecord, MemoryType};
use engram_embeddings::EmbeddingService;
use engram_graph::extract::{EntityExtractor, RelationExtractor};
use engram_graph::{
    Direction, EntityFilter, GraphIndex, GraphPath, GraphStore, LlmClient, RelationFilter,
    Subgraph,
};
use engram_keyword::{KeywordIndex, KeywordSearchOptions};
use engram_lifecycle::{LifecycleEvaluationResult, LifecycleManager, LifecycleStats};
use engram_tokens::{estimate_tokens, select_within_budget, BudgetManager, SelectionStrategy};
use engram_vector::{SearchQuery, VectorStore};

use crate::extract::extract_structured_info;
use crate::hybrid;
use crate::results::{
    CompressionResult, DistillResult, EnhancedMemoryResult, GraphAttachment, MemoryStats,
    MemoryUpdateResult, ScoredMemory,
};
use crate::txlog::TransactionLog;

/// Options for `update_memory`.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub detect_conflicts: bool,
    pub auto_resolve_conflicts: bool,
    pub extract_graph: bool,
    /// Force every extracted item into this tier (skips structured
    /// extraction: the whole input becomes one record).
    pub memory_type: Option<MemoryType>,
    pub importance: Option<f64>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            detect_conflicts: true,
            auto_resolve_conflicts: false,
            extract_graph: true,
            memory_type: None,
            importance: None,
        }
    }
}

/// Graph context requested alongside a query.
#[derive(Debug, Clone, Default)]
pub struct GraphQueryOptions {
    /// Resolve this name; absent means "top entities".
    pub entity_name: Option<String>,
    /// Find paths between two named entities.
    pub path_between: Option<(String, String)>,
    pub max_path_depth: Option<usize>,
}

/// Options for `query`.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub max_results: usize,
    pub min_similarity: f64,
    pub types: Option<Vec<MemoryType>>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub graph: Option<GraphQueryOptions>,
    pub include_conflicts: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            types: None,
            time_range: None,
            graph: None,
            include_conflicts: false,
        }
    }
}

/// Records examined by the compression-time conflict sweep, newest first.
const UPDATE_SWEEP_LIMIT: usize = 100;

/// The memory orchestrator. Every component is injected at construction
/// so tests can wire alternatives; nothing here is a process global.
pub struct MemoryManager {
    config: EngramConfig,
    embedder: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    keyword: Arc<KeywordIndex>,
    graph_store: Arc<GraphStore>,
    graph_index: RwLock<GraphIndex>,
    entity_extractor: EntityExtractor,
    relation_extractor: RelationExtractor,
    detector: ConflictDetector,
    budget: BudgetManager,
    policy: CompressionPolicy,
    engine: CompressionEngine,
    lifecycle: Arc<LifecycleManager>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl MemoryManager {
    /// Build and initialize the full stack under `config.data_dir`.
    pub async fn new(config: EngramConfig) -> EngramResult<Self> {
        let embedder = Arc::new(EmbeddingService::new(config.embedding.clone()));

        let store = Arc::new(VectorStore::new(&config.data_dir, Arc::clone(&embedder)));
        store.initialize().await?;

        let keyword = Arc::new(KeywordIndex::open(config.keyword_db_path()).await?);
        let graph_store = Arc::new(GraphStore::open(config.graph_db_path()).await?);

        // The traversal index must be rebuilt from the store before any
        // graph query runs.
        let mut graph_index = GraphIndex::new();
        graph_index.rebuild(
            graph_store.all_entities(None).await?,
            graph_store.all_relations(None).await?,
        );

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&store),
            config.lifecycle.clone(),
        ));

        let budget = BudgetManager::new(config.budget.clone());
        let policy =
            CompressionPolicy::new(config.compression.clone(), config.budget.token_budget);

        info!(data_dir = %config.data_dir.display(), "memory manager initialized");

        Ok(Self {
            embedder,
            store,
            keyword,
            graph_store,
            graph_index: RwLock::new(graph_index),
            entity_extractor: EntityExtractor::new(),
            relation_extractor: RelationExtractor::new(),
            detector: ConflictDetector::new(),
            budget,
            policy,
            engine: CompressionEngine::new(),
            lifecycle,
            llm: None,
            config,
        })
    }

    /// Attach an LLM client for augmented extraction.
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn config(&self) -> &EngramConfig {
        &self.config
    }

    /// Ingest one utterance: structured extraction, vector + keyword
    /// writes, conflict detection, optional auto-resolution under a
    /// checkpoint, and graph extraction. Failures after the vector
    /// writes degrade rather than fail the call.
    pub async fn update_memory(
        &self,
        user_id: &str,
        text: &str,
        options: &UpdateOptions,
    ) -> EngramResult<MemoryUpdateResult> {
        validate_user_id(user_id)?;
        if text.trim().is_empty() {
            return Err(EngramError::InputValidation {
                reason: "empty input text".to_string(),
            });
        }

        let mut result = MemoryUpdateResult::default();
        let mut txlog = TransactionLog::new();

        // 1. Structured extraction (or a forced single record).
        let items = match options.memory_type {
            Some(memory_type) => vec![crate::extract::ExtractedItem {
                content: text.to_string(),
                memory_type,
                importance: options.importance.unwrap_or(0.5),
            }],
            None => {
                let mut extracted = extract_structured_info(text);
                if extracted.is_empty() {
                    extracted.push(crate::extract::ExtractedItem {
                        content: text.to_string(),
                        memory_type: MemoryType::ShortTerm,
                        importance: options.importance.unwrap_or(0.5),
                    });
                }
                extracted
            }
        };

        // 2. Vector + keyword writes, logged for rollback.
        let existing_before: Vec<MemoryRecord> = self.store.get_by_user(user_id);
        for item in items {
            let importance = options.importance.unwrap_or(item.importance);
            let metadata = MemoryMetadata::new(user_id, item.memory_type, importance);
            let id = match self.store.add(&item.content, metadata).await {
                Ok(id) => id,
                Err(e) => {
                    // Terminal write failure: back out the partial batch
                    // before surfacing the error.
                    if let Err(rollback_err) = txlog.rollback(&self.store, None) {
                        error!(
                            code = rollback_err.code(),
                            error = %rollback_err,
                            "rollback after failed add did not complete"
                        );
                    }
                    return Err(e);
                }
            };
            txlog.record_add(&id, None);
            result.added_ids.push(id.clone());

            if let Some(record) = self.store.get_by_id(&id) {
                if let Err(e) = self.keyword.index(&record).await {
                    warn!(error = %e, id = %id, "keyword indexing failed");
                    result.errors.push(format!("keyword index: {e}"));
                }
            }
        }
        result.vectors_added = result.added_ids.len();

        // 3. Conflict detection against the pre-existing records.
        if options.detect_conflicts {
            for id in &result.added_ids {
                if let Some(record) = self.store.get_by_id(id) {
                    result
                        .conflicts_detected
                        .extend(self.detector.detect(&record, &existing_before));
                }
            }
        }

        // 4. Auto-resolution under a checkpoint: a failure rolls back the
        // resolutions but keeps the vector additions.
        if options.auto_resolve_conflicts && !result.conflicts_detected.is_empty() {
            txlog.create_checkpoint("before_conflict_resolution");
            let mut resolved: Vec<Resolution> = Vec::new();
            let mut failure: Option<EngramError> = None;

            for conflict in result
                .conflicts_detected
                .iter()
                .filter(|c| c.auto_resolvable)
            {
                match self.apply_resolution(&mut txlog, conflict).await {
                    Ok(Some(resolution)) => resolved.push(resolution),
                    Ok(None) => {}
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            match failure {
                None => result.conflicts_resolved = resolved,
                Some(e) => {
                    result.errors.push(format!("conflict resolution: {e}"));
                    match txlog.rollback(&self.store, Some("before_conflict_resolution")) {
                        Ok(_) => {}
                        Err(partial) => {
                            warn!(error = %partial, "checkpoint rollback failed; attempting full rollback");
                            match txlog.rollback(&self.store, None) {
                                Ok(_) => {
                                    result.vectors_added = 0;
                                    result.added_ids.clear();
                                    result.errors.push(format!("rolled back fully: {partial}"));
                                }
                                Err(full) => {
                                    error!(
                                        code = full.code(),
                                        error = %full,
                                        "CRITICAL: full rollback failed; store may be inconsistent"
                                    );
                                    result.errors.push(format!("CRITICAL rollback failure: {full}"));
                                }
                            }
                        }
                    }
                }
            }
        }

        // 5. Graph extraction; failures land in errors, never fail the call.
        if options.extract_graph {
            let first_id = result.added_ids.first().cloned().unwrap_or_default();
            match self.extract_graph(user_id, text, &first_id).await {
                Ok(counts) => result.graph_extracted = Some(counts),
                Err(e) => {
                    warn!(error = %e, "graph extraction failed");
                    result.errors.push(format!("graph extraction: {e}"));
                }
            }
        }

        // 6. Commit whatever survived, persist best-effort.
        txlog.commit();
        if let Err(e) = self.store.persist().await {
            warn!(error = %e, "persistence deferred; dirty flag restored");
            result.errors.push(format!("persistence: {e}"));
        }

        // 7. Optional automatic compression.
        if self.config.compression.auto {
            if let Err(e) = self.auto_compress_memories(user_id).await {
                result.errors.push(format!("auto compression: {e}"));
            }
        }

        result.success = result.errors.is_empty();
        debug!(
            counter = "memory.enhanced.update",
            user_id,
            vectors = result.vectors_added,
            conflicts = result.conflicts_detected.len(),
            "update complete"
        );
        Ok(result)
    }

    /// Execute one suggested resolution, logging the inverse operations.
    /// Returns `Ok(None)` for suggestions that need no store mutation.
    async fn apply_resolution(
        &self,
        txlog: &mut TransactionLog,
        conflict: &Conflict,
    ) -> EngramResult<Option<Resolution>> {
        let resolution = &conflict.suggested;
        match resolution.action {
            ResolutionAction::Replace | ResolutionAction::Archive => {
                let Some(loser_id) = &resolution.loser_id else {
                    return Ok(None);
                };
                let Some(prior) = self.store.get_by_id(loser_id) else {
                    return Err(EngramError::InputValidation {
                        reason: format!("resolution loser {loser_id} no longer exists"),
                    });
                };
                if prior.metadata.memory_type.is_protected() {
                    return Err(EngramError::InputValidation {
                        reason: format!(
                            "refusing to remove protected {} record {loser_id}",
                            prior.metadata.memory_type
                        ),
                    });
                }
                self.store.remove(loser_id)?;
                txlog.record_remove(
                    loser_id,
                    prior,
                    Some(serde_json::json!({ "conflict": conflict.id, "action": "replace" })),
                );
                if let Err(e) = self.keyword.remove(loser_id).await {
                    warn!(error = %e, "keyword removal after resolution failed");
                }
                Ok(Some(resolution.clone()))
            }
            ResolutionAction::UpdateConfidence => {
                let Some(loser_id) = &resolution.loser_id else {
                    return Ok(None);
                };
                let Some(prior) = self.store.get_by_id(loser_id) else {
                    return Ok(None);
                };
                let mut next = prior.clone();
                next.metadata.importance = (next.metadata.importance - 0.1).clamp(0.0, 1.0);
                self.store.update_record(next.clone())?;
                txlog.record_update(loser_id, prior, next, None);
                Ok(Some(resolution.clone()))
            }
            ResolutionAction::Merge
            | ResolutionAction::FlagForReview
            | ResolutionAction::CreateAlternative => Ok(None),
        }
    }

    async fn extract_graph(
        &self,
        user_id: &str,
        text: &str,
        memory_id: &str,
    ) -> EngramResult<(usize, usize)> {
        let raw_entities = match &self.llm {
            Some(client) => {
                self.entity_extractor
                    .extract_with_llm(text, client.as_ref())
                    .await
            }
            None => self.entity_extractor.extract(text),
        };
        if raw_entities.is_empty() {
            return Ok((0, 0));
        }

        // Disambiguate against the stored graph: same (user, type, name)
        // updates the existing entity instead of minting a new id.
        let mut entities: Vec<GraphEntity> = Vec::new();
        for raw in raw_entities {
            match self
                .graph_store
                .find_entity(user_id, raw.entity_type, &raw.name)
                .await?
            {
                Some(mut existing) => {
                    existing.confidence = existing.confidence.max(raw.confidence);
                    for alias in &raw.aliases {
                        if !existing.answers_to(alias) {
                            existing.aliases.push(alias.clone());
                        }
                    }
                    for (k, v) in raw.properties {
                        existing.properties.entry(k).or_insert(v);
                    }
                    existing.metadata.access_count += 1;
                    existing.metadata.last_accessed = Utc::now();
                    self.graph_store.upsert_entity(&existing).await?;
                    entities.push(existing);
                }
                None => {
                    let entity = raw.into_graph_entity(user_id, memory_id);
                    self.graph_store.upsert_entity(&entity).await?;
                    entities.push(entity);
                }
            }
        }

        let relations = self.relation_extractor.extract(text, &entities);
        for relation in &relations {
            self.graph_store.upsert_relation(relation).await?;
        }

        {
            let mut index = self.graph_index.write();
            for entity in &entities {
                index.add_entity(entity.clone());
            }
            for relation in &relations {
                index.add_relation(relation.clone());
            }
        }

        debug!(
            entities = entities.len(),
            relations = relations.len(),
            "graph extraction complete"
        );
        Ok((entities.len(), relations.len()))
    }

    /// Hybrid retrieval. Downstream failures degrade to partial results;
    /// only input validation fails the call.
    pub async fn query(
        &self,
        user_id: &str,
        text: &str,
        options: &QueryOptions,
    ) -> EngramResult<EnhancedMemoryResult> {
        validate_user_id(user_id)?;
        let started = Instant::now();
        let mut result = EnhancedMemoryResult::default();
        let expanded_limit = options.max_results * 2;

        // Channel 1: dense vectors.
        let embedding = self
            .embedder
            .embed_text(text, false)
            .await
            .map(|r| r.embedding)
            .unwrap_or_default();
        let vector_hits = match self.store.search(&SearchQuery {
            user_id: user_id.to_string(),
            embedding,
            limit: expanded_limit,
            min_similarity: options.min_similarity,
            time_range: options.time_range,
            types: options.types.clone(),
        }) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "vector search failed; continuing keyword-only");
                Vec::new()
            }
        };

        // Channel 2: keywords.
        let keyword_hits = match self
            .keyword
            .search(
                text,
                &KeywordSearchOptions {
                    user_id: user_id.to_string(),
                    types: options.types.clone(),
                    limit: expanded_limit,
                    min_score: 0.0,
                },
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "keyword search failed; continuing vector-only");
                Vec::new()
            }
        };

        // Blend, rerank, truncate once.
        let vector_ids: HashSet<String> =
            vector_hits.iter().map(|h| h.record.id.clone()).collect();
        let blended = hybrid::blend(
            &vector_hits,
            &keyword_hits,
            |id| {
                self.store.get_by_id(id).filter(|r| {
                    options.time_range.map_or(true, |(from, to)| {
                        r.metadata.timestamp >= from && r.metadata.timestamp <= to
                    })
                })
            },
            Utc::now(),
        );
        result.metadata.total_found = blended.len();

        let mut memories: Vec<ScoredMemory> = blended
            .into_iter()
            .take(options.max_results)
            .map(|c| ScoredMemory {
                record: c.record,
                score: c.score,
            })
            .collect();

        // Keyword-only hits are retrieval hits too.
        let keyword_only: Vec<String> = memories
            .iter()
            .filter(|m| !vector_ids.contains(&m.record.id))
            .map(|m| m.record.id.clone())
            .collect();
        if !keyword_only.is_empty() {
            self.store.touch_records(&keyword_only);
            for memory in &mut memories {
                if keyword_only.contains(&memory.record.id) {
                    if let Some(updated) = self.store.get_by_id(&memory.record.id) {
                        memory.record = updated;
                    }
                }
            }
        }
        result.memories = memories;

        // Optional graph context.
        if let Some(graph_options) = &options.graph {
            result.graph = Some(self.graph_attachment(graph_options));
        }

        // Optional conflict annotation across the returned set.
        if options.include_conflicts {
            let records: Vec<MemoryRecord> =
                result.memories.iter().map(|m| m.record.clone()).collect();
            result.conflicts = self.detector.detect_among(&records);
        }

        result.metadata.query_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            counter = "memory.enhanced.query",
            user_id,
            found = result.metadata.total_found,
            returned = result.memories.len(),
            query_time_ms = result.metadata.query_time_ms,
            "query complete"
        );
        Ok(result)
    }

    fn graph_attachment(&self, options: &GraphQueryOptions) -> GraphAttachment {
        let index = self.graph_index.read();
        let mut attachment = GraphAttachment::default();

        let seed_entities: Vec<GraphEntity> = match &options.entity_name {
            Some(name) => index
                .ids_by_name(name)
                .iter()
                .filter_map(|id| index.entity(id).cloned())
                .collect(),
            None => index.top_entities(5),
        };

        for entity in &seed_entities {
            for neighbor in index.neighbors(&entity.id, Direction::Both) {
                if !attachment.entities.iter().any(|e| e.id == neighbor.entity.id) {
                    attachment.entities.push(neighbor.entity);
                }
                if !attachment
                    .relations
                    .iter()
                    .any(|r| r.id == neighbor.relation.id)
                {
                    attachment.relations.push(neighbor.relation);
                }
            }
        }
        for entity in seed_entities {
            if !attachment.entities.iter().any(|e| e.id == entity.id) {
                attachment.entities.push(entity);
            }
        }

        if let Some((from, to)) = &options.path_between {
            let depth = options.max_path_depth.unwrap_or(DEFAULT_MAX_PATH_DEPTH);
            for from_id in index.ids_by_name(from) {
                for to_id in index.ids_by_name(to) {
                    attachment.paths.extend(index.find_paths(&from_id, &to_id, depth));
                }
            }
        }

        attachment
    }

    /// Select and format memories for prompt injection within
    /// `max_tokens`.
    pub async fn distill_memories_for_context(
        &self,
        user_id: &str,
        current_query: &str,
        max_tokens: usize,
    ) -> EngramResult<DistillResult> {
        let retrieved = self
            .query(
                user_id,
                current_query,
                &QueryOptions {
                    max_results: DISTILL_RETRIEVE_LIMIT,
                    min_similarity: 0.1,
                    ..Default::default()
                },
            )
            .await?;

        let mut buckets: HashMap<MemoryType, Vec<MemoryRecord>> = HashMap::new();
        for memory in retrieved.memories {
            buckets
                .entry(memory.record.metadata.memory_type)
                .or_default()
                .push(memory.record);
        }

        let allocation = self.budget.allocate_budget(user_id);
        let mut distilled = DistillResult::default();
        let mut sections: Vec<String> = Vec::new();

        for tier in [
            MemoryType::Pinned,
            MemoryType::Profile,
            MemoryType::LongTerm,
            MemoryType::MidTerm,
            MemoryType::ShortTerm,
        ] {
            if distilled.tokens_used >= max_tokens {
                break;
            }
            let Some(records) = buckets.get(&tier) else {
                continue;
            };
            let tier_budget = allocation
                .tokens_for(tier)
                .min(max_tokens - distilled.tokens_used);
            let (selected, tokens) =
                select_within_budget(records, tier_budget, SelectionStrategy::Relevance);
            if selected.is_empty() {
                continue;
            }

            let mut section = format!("### {}\n", tier_title(tier));
            for record in &selected {
                section.push_str("- ");
                section.push_str(&record.content);
                section.push('\n');
                distilled.sources.push(record.id.clone());
            }
            sections.push(section);
            distilled.tokens_used += tokens;
        }

        distilled.distilled = sections.join("\n");
        Ok(distilled)
    }

    /// Evaluate the compression policy and execute the engine's plan
    /// when any trigger is active.
    pub async fn auto_compress_memories(&self, user_id: &str) -> EngramResult<CompressionResult> {
        validate_user_id(user_id)?;
        let mut result = CompressionResult::default();

        if !self.policy.is_enabled() {
            return Ok(result);
        }
        let records = self.store.get_by_user(user_id);
        let triggers = self.policy.active_triggers(&records);
        if triggers.is_empty() {
            return Ok(result);
        }
        info!(user_id, triggers = ?triggers, "compression triggered");

        let mut plan = self.engine.plan(&records);

        // Update strategy: a bounded conflict sweep over the records the
        // main plan left alone; each group describing the same thing at
        // different times keeps only its newest record.
        let mut planned_deletes: HashSet<String> = plan
            .groups
            .iter()
            .flat_map(|g| g.delete_ids.iter().cloned())
            .collect();
        let mut sweep: Vec<MemoryRecord> = records
            .iter()
            .filter(|r| !planned_deletes.contains(&r.id))
            .cloned()
            .collect();
        sweep.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        sweep.truncate(UPDATE_SWEEP_LIMIT);
        for conflict in self.detector.detect_among(&sweep) {
            if !matches!(
                conflict.conflict_type,
                ConflictType::TemporalConflict | ConflictType::OutdatedInfo
            ) {
                continue;
            }
            let group: Vec<MemoryRecord> = conflict
                .record_ids
                .iter()
                .filter(|id| !planned_deletes.contains(id.as_str()))
                .filter_map(|id| self.store.get_by_id(id))
                .collect();
            if let Some(update) = self.engine.plan_update(&group) {
                planned_deletes.extend(update.delete_ids.iter().cloned());
                plan.groups.push(update);
            }
        }

        if plan.is_empty() {
            return Ok(result);
        }

        for group in &plan.groups {
            for id in &group.delete_ids {
                match self.store.remove(id) {
                    Ok(true) => {
                        result.deleted += 1;
                        if let Err(e) = self.keyword.remove(id).await {
                            warn!(error = %e, "keyword removal during compression failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => result.errors.push(format!("delete {id}: {e}")),
                }
            }
            if let Some((content, metadata)) = &group.create {
                match self.store.add(content, metadata.clone()).await {
                    Ok(id) => {
                        result.created += 1;
                        if let Some(record) = self.store.get_by_id(&id) {
                            if let Err(e) = self.keyword.index(&record).await {
                                warn!(error = %e, "keyword indexing during compression failed");
                            }
                        }
                    }
                    Err(e) => result.errors.push(format!("create replacement: {e}")),
                }
            }
            result.tokens_saved += group.tokens_saved;
        }

        result.compressed = result.deleted > 0 || result.created > 0;
        if let Err(e) = self.store.persist().await {
            result.errors.push(format!("persistence: {e}"));
        }
        info!(
            user_id,
            deleted = result.deleted,
            created = result.created,
            tokens_saved = result.tokens_saved,
            "compression complete"
        );
        Ok(result)
    }

    /// Store and conflict statistics for one user.
    pub fn get_memory_stats(&self, user_id: &str) -> MemoryStats {
        let records = self.store.get_by_user(user_id);
        let mut stats = MemoryStats {
            vector_count: records.len(),
            ..Default::default()
        };
        for record in &records {
            *stats
                .by_type
                .entry(record.metadata.memory_type.as_str().to_string())
                .or_default() += 1;
            stats.estimated_tokens += estimate_tokens(&record.content);
        }

        // Bounded pairwise sweep for the conflict summary.
        let sample: Vec<MemoryRecord> = records.into_iter().take(50).collect();
        let conflicts = self.detector.detect_among(&sample);
        stats.conflicts_detected = conflicts.len();
        stats.conflicts_auto_resolvable = conflicts.iter().filter(|c| c.auto_resolvable).count();
        stats
    }

    // ---- Lifecycle surface ----

    pub fn evaluate_memory_lifecycle(
        &self,
        user_id: &str,
    ) -> EngramResult<LifecycleEvaluationResult> {
        self.lifecycle.evaluate_user(user_id)
    }

    pub fn get_lifecycle_stats(&self, user_id: &str) -> LifecycleStats {
        self.lifecycle.stats(user_id)
    }

    pub fn start_lifecycle_evaluation(&self) {
        self.lifecycle.start();
    }

    pub fn stop_lifecycle_evaluation(&self) {
        self.lifecycle.stop();
    }

    // ---- Graph surface ----

    pub async fn query_entities(&self, filter: &EntityFilter) -> EngramResult<Vec<GraphEntity>> {
        self.graph_store.query_entities(filter).await
    }

    pub async fn query_relations(
        &self,
        filter: &RelationFilter,
    ) -> EngramResult<Vec<GraphRelation>> {
        self.graph_store.query_relations(filter).await
    }

    /// Read-only; degraded to empty on unknown ids.
    pub fn get_neighbors(&self, entity_id: &str, direction: Direction) -> Vec<(GraphEntity, GraphRelation)> {
        self.graph_index
            .read()
            .neighbors(entity_id, direction)
            .into_iter()
            .map(|n| (n.entity, n.relation))
            .collect()
    }

    pub fn find_paths(&self, source_id: &str, target_id: &str, max_depth: usize) -> Vec<GraphPath> {
        self.graph_index.read().find_paths(source_id, target_id, max_depth)
    }

    pub fn extract_subgraph(&self, center_id: &str, radius: Option<usize>) -> Subgraph {
        self.graph_index
            .read()
            .extract_subgraph(center_id, radius.unwrap_or(DEFAULT_SUBGRAPH_RADIUS))
    }

    /// Merge entities in the store, then rebuild the traversal index so
    /// the two stay lossless mirrors.
    pub async fn merge_entities(&self, ids: &[String]) -> EngramResult<Option<GraphEntity>> {
        let survivor = self.graph_store.merge_entities(ids).await?;
        let entities = self.graph_store.all_entities(None).await?;
        let relations = self.graph_store.all_relations(None).await?;
        self.graph_index.write().rebuild(entities, relations);
        Ok(survivor)
    }
}

fn validate_user_id(user_id: &str) -> EngramResult<()> {
    if user_id.trim().is_empty() {
        return Err(EngramError::InputValidation {
            reason: "userId must be a non-empty string".to_string(),
        });
    }
    Ok(())
}

fn tier_title(tier: MemoryType) -> &'static str {
    match tier {
        MemoryType::Pinned => "Pinned",
        MemoryType::Profile => "Profile",
        MemoryType::LongTerm => "Long-term",
        MemoryType::MidTerm => "Mid-term",
        MemoryType::ShortTerm => "Recent",
    }
}
