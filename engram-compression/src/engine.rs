use chrono::{Duration, Utc};
use tracing::debug;

use engram_core::memory::{MemoryMetadata, MemoryRecord, MemoryType};
use engram_core::vecmath::cosine_similarity;
use engram_tokens::estimate_tokens;

/// Mean pairwise similarity required for a merge group.
const MERGE_SIMILARITY_FLOOR: f64 = 0.85;
const MERGE_GROUP_MAX: usize = 5;
/// Mean timestamp gap (minutes) under which a run of records is a
/// summarizable burst.
const SUMMARIZE_MAX_MEAN_GAP_MINUTES: i64 = 60;
const SUMMARIZE_GROUP_MIN: usize = 5;
/// Ignore rule thresholds.
const IGNORE_MIN_AGE_DAYS: i64 = 60;
const IGNORE_MAX_IMPORTANCE: f64 = 0.3;
const IGNORE_MAX_ACCESS: u64 = 1;
/// Cap on the summarize record's content length.
const SUMMARY_CONTENT_CAP: usize = 500;

/// The strategy decided for one group of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    Merge,
    Summarize,
    Ignore,
    Update,
}

/// One group with its decided strategy. `create` is the replacement
/// record's content and metadata, when the strategy produces one.
#[derive(Debug, Clone)]
pub struct PlannedGroup {
    pub strategy: CompressionStrategy,
    pub delete_ids: Vec<String>,
    pub create: Option<(String, MemoryMetadata)>,
    pub tokens_saved: i64,
}

/// The full plan over a record set.
#[derive(Debug, Clone, Default)]
pub struct CompressionPlan {
    pub groups: Vec<PlannedGroup>,
}

impl CompressionPlan {
    pub fn deleted(&self) -> usize {
        self.groups.iter().map(|g| g.delete_ids.len()).sum()
    }

    pub fn created(&self) -> usize {
        self.groups.iter().filter(|g| g.create.is_some()).count()
    }

    pub fn tokens_saved(&self) -> i64 {
        self.groups.iter().map(|g| g.tokens_saved).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Plans compression strategies over candidate groups. Protected tiers
/// never participate. Execution against the store is the orchestrator's
/// job.
#[derive(Default)]
pub struct CompressionEngine;

impl CompressionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build a plan: merge near-duplicate groups, summarize bursts,
    /// drop stale trivia.
    pub fn plan(&self, records: &[MemoryRecord]) -> CompressionPlan {
        let now = Utc::now();
        let mut candidates: Vec<&MemoryRecord> = records
            .iter()
            .filter(|r| !r.metadata.memory_type.is_protected())
            .collect();
        candidates.sort_by_key(|r| r.metadata.timestamp);

        let mut plan = CompressionPlan::default();
        let mut consumed: std::collections::HashSet<&str> = std::collections::HashSet::new();

        // Ignore: stale, unimportant, untouched records are deleted outright.
        let ignorable: Vec<&MemoryRecord> = candidates
            .iter()
            .filter(|r| {
                r.age(now) > Duration::days(IGNORE_MIN_AGE_DAYS)
                    && r.metadata.importance < IGNORE_MAX_IMPORTANCE
                    && r.access_count <= IGNORE_MAX_ACCESS
            })
            .copied()
            .collect();
        if !ignorable.is_empty() {
            for r in &ignorable {
                consumed.insert(r.id.as_str());
            }
            plan.groups.push(PlannedGroup {
                strategy: CompressionStrategy::Ignore,
                delete_ids: ignorable.iter().map(|r| r.id.clone()).collect(),
                create: None,
                tokens_saved: ignorable
                    .iter()
                    .map(|r| estimate_tokens(&r.content) as i64)
                    .sum(),
            });
        }

        // Merge: same-tier groups of 2-5 whose mean pairwise similarity
        // clears the floor.
        let mergeable: Vec<&MemoryRecord> = candidates
            .iter()
            .filter(|r| !consumed.contains(r.id.as_str()) && r.has_embedding())
            .copied()
            .collect();
        for group in greedy_similarity_groups(&mergeable) {
            for r in &group {
                consumed.insert(r.id.as_str());
            }
            plan.groups.push(Self::plan_merge(&group));
        }

        // Summarize: bursts of 5+ records whose mean gap is under an hour.
        let remaining: Vec<&MemoryRecord> = candidates
            .iter()
            .filter(|r| !consumed.contains(r.id.as_str()))
            .copied()
            .collect();
        for group in burst_groups(&remaining) {
            for r in &group {
                consumed.insert(r.id.as_str());
            }
            plan.groups.push(Self::plan_summarize(&group));
        }

        debug!(
            groups = plan.groups.len(),
            deleted = plan.deleted(),
            "compression plan built"
        );
        plan
    }

    /// Update strategy for a conflict group: the newest record survives.
    pub fn plan_update(&self, records: &[MemoryRecord]) -> Option<PlannedGroup> {
        if records.len() < 2 {
            return None;
        }
        let newest = records.iter().max_by_key(|r| r.metadata.timestamp)?;
        let delete_ids: Vec<String> = records
            .iter()
            .filter(|r| r.id != newest.id && !r.metadata.memory_type.is_protected())
            .map(|r| r.id.clone())
            .collect();
        if delete_ids.is_empty() {
            return None;
        }
        let tokens_saved: i64 = records
            .iter()
            .filter(|r| delete_ids.contains(&r.id))
            .map(|r| estimate_tokens(&r.content) as i64)
            .sum();
        Some(PlannedGroup {
            strategy: CompressionStrategy::Update,
            delete_ids,
            create: None,
            tokens_saved,
        })
    }

    fn plan_merge(group: &[&MemoryRecord]) -> PlannedGroup {
        let content = group
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let importance = group
            .iter()
            .map(|r| r.metadata.importance)
            .fold(0.0f64, f64::max);
        // Groups are same-tier, so the original type is preserved.
        let mut metadata = MemoryMetadata::new(
            group[0].metadata.user_id.clone(),
            group[0].metadata.memory_type,
            importance,
        );
        metadata.category = group.iter().find_map(|r| r.metadata.category.clone());

        let before: i64 = group.iter().map(|r| estimate_tokens(&r.content) as i64).sum();
        let after = estimate_tokens(&content) as i64;

        PlannedGroup {
            strategy: CompressionStrategy::Merge,
            delete_ids: group.iter().map(|r| r.id.clone()).collect(),
            create: Some((content, metadata)),
            tokens_saved: before - after,
        }
    }

    fn plan_summarize(group: &[&MemoryRecord]) -> PlannedGroup {
        let mut content = format!("[摘要 {} 条记录] ", group.len());
        content.push_str(
            &group
                .iter()
                .map(|r| r.content.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        );
        if content.chars().count() > SUMMARY_CONTENT_CAP {
            content = content.chars().take(SUMMARY_CONTENT_CAP).collect();
        }

        let importance = group
            .iter()
            .map(|r| r.metadata.importance)
            .fold(0.0f64, f64::max);
        let metadata = MemoryMetadata::new(
            group[0].metadata.user_id.clone(),
            MemoryType::LongTerm,
            importance,
        );

        let before: i64 = group.iter().map(|r| estimate_tokens(&r.content) as i64).sum();
        let after = estimate_tokens(&content) as i64;

        PlannedGroup {
            strategy: CompressionStrategy::Summarize,
            delete_ids: group.iter().map(|r| r.id.clone()).collect(),
            create: Some((content, metadata)),
            tokens_saved: before - after,
        }
    }
}

/// Greedy same-tier grouping by embedding similarity: each unclaimed
/// record seeds a group of up to five whose mean pairwise similarity
/// clears the merge floor.
fn greedy_similarity_groups<'a>(records: &[&'a MemoryRecord]) -> Vec<Vec<&'a MemoryRecord>> {
    let mut groups = Vec::new();
    let mut claimed = vec![false; records.len()];

    for i in 0..records.len() {
        if claimed[i] {
            continue;
        }
        let seed = records[i];
        let mut group = vec![seed];
        let mut members = vec![i];

        for (j, candidate) in records.iter().enumerate().skip(i + 1) {
            if claimed[j] || group.len() >= MERGE_GROUP_MAX {
                continue;
            }
            if candidate.metadata.memory_type != seed.metadata.memory_type {
                continue;
            }
            if group
                .iter()
                .all(|m| cosine_similarity(&m.embedding, &candidate.embedding) > MERGE_SIMILARITY_FLOOR)
            {
                group.push(candidate);
                members.push(j);
            }
        }

        if group.len() >= 2 && mean_pairwise_similarity(&group) > MERGE_SIMILARITY_FLOOR {
            for j in members {
                claimed[j] = true;
            }
            groups.push(group);
        }
    }
    groups
}

fn mean_pairwise_similarity(group: &[&MemoryRecord]) -> f64 {
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for (i, a) in group.iter().enumerate() {
        for b in group.iter().skip(i + 1) {
            sum += cosine_similarity(&a.embedding, &b.embedding);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        sum / pairs as f64
    }
}

/// Runs of 5+ timestamp-sorted records whose mean gap is under an hour.
fn burst_groups<'a>(records: &[&'a MemoryRecord]) -> Vec<Vec<&'a MemoryRecord>> {
    if records.len() < SUMMARIZE_GROUP_MIN {
        return Vec::new();
    }

    let mut groups = Vec::new();
    let mut run: Vec<&MemoryRecord> = vec![records[0]];

    let max_gap = Duration::minutes(SUMMARIZE_MAX_MEAN_GAP_MINUTES);
    for window in records.windows(2) {
        let gap = window[1].metadata.timestamp - window[0].metadata.timestamp;
        if gap <= max_gap {
            run.push(window[1]);
        } else {
            if run.len() >= SUMMARIZE_GROUP_MIN && mean_gap_ok(&run) {
                groups.push(run.clone());
            }
            run = vec![window[1]];
        }
    }
    if run.len() >= SUMMARIZE_GROUP_MIN && mean_gap_ok(&run) {
        groups.push(run);
    }
    groups
}

fn mean_gap_ok(run: &[&MemoryRecord]) -> bool {
    if run.len() < 2 {
        return false;
    }
    let total = run[run.len() - 1].metadata.timestamp - run[0].metadata.timestamp;
    let mean = total / (run.len() as i32 - 1);
    mean < Duration::minutes(SUMMARIZE_MAX_MEAN_GAP_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(content: &str, importance: f64) -> MemoryRecord {
        MemoryRecord::new(content, MemoryMetadata::new("u1", MemoryType::ShortTerm, importance))
    }

    #[test]
    fn near_duplicates_merge_into_one() {
        let mut a = record("Python是我最喜欢的语言", 0.8);
        let mut b = record("我最喜欢的语言是Python", 0.8);
        a.embedding = vec![1.0, 0.0];
        b.embedding = vec![0.99, 0.14];

        let plan = CompressionEngine::new().plan(&[a.clone(), b.clone()]);
        assert_eq!(plan.groups.len(), 1);
        let group = &plan.groups[0];
        assert_eq!(group.strategy, CompressionStrategy::Merge);
        assert_eq!(group.delete_ids.len(), 2);
        let (content, metadata) = group.create.as_ref().unwrap();
        assert!(content.contains(" | "));
        assert_eq!(metadata.memory_type, MemoryType::ShortTerm);
        assert!((metadata.importance - 0.8).abs() < 1e-9);
    }

    #[test]
    fn merge_caps_group_size_at_five() {
        let records: Vec<MemoryRecord> = (0..8)
            .map(|i| {
                let mut r = record(&format!("same thing {i}"), 0.5);
                r.embedding = vec![1.0, 0.0];
                r
            })
            .collect();
        let plan = CompressionEngine::new().plan(&records);
        for group in &plan.groups {
            assert!(group.delete_ids.len() <= 5);
        }
    }

    #[test]
    fn stale_trivial_records_are_ignored_away() {
        let mut stale = record("forgettable detail", 0.1);
        stale.metadata.timestamp = Utc::now() - Duration::days(90);

        let plan = CompressionEngine::new().plan(&[stale.clone()]);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].strategy, CompressionStrategy::Ignore);
        assert!(plan.groups[0].create.is_none());
        assert!(plan.tokens_saved() > 0);
    }

    #[test]
    fn bursts_summarize_to_long_term() {
        let base = Utc::now() - Duration::days(1);
        let records: Vec<MemoryRecord> = (0..6)
            .map(|i| {
                let mut r = record(&format!("burst note {i}"), 0.4);
                r.metadata.timestamp = base + Duration::minutes(i * 10);
                r
            })
            .collect();

        let plan = CompressionEngine::new().plan(&records);
        let summarize = plan
            .groups
            .iter()
            .find(|g| g.strategy == CompressionStrategy::Summarize)
            .expect("burst should summarize");
        assert_eq!(summarize.delete_ids.len(), 6);
        let (_, metadata) = summarize.create.as_ref().unwrap();
        assert_eq!(metadata.memory_type, MemoryType::LongTerm);
    }

    #[test]
    fn protected_records_never_compress() {
        let mut pinned = record("pinned forever", 0.1);
        pinned.metadata.memory_type = MemoryType::Pinned;
        pinned.metadata.timestamp = Utc::now() - Duration::days(400);

        let plan = CompressionEngine::new().plan(&[pinned]);
        assert!(plan.is_empty());
    }

    #[test]
    fn update_keeps_the_newest() {
        let mut older = record("address: old street", 0.5);
        older.metadata.timestamp = Utc::now() - Duration::days(10);
        let newer = record("address: new street", 0.5);

        let group = CompressionEngine::new()
            .plan_update(&[older.clone(), newer.clone()])
            .unwrap();
        assert_eq!(group.strategy, CompressionStrategy::Update);
        assert_eq!(group.delete_ids, vec![older.id]);
    }
}
