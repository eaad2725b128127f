use chrono::Utc;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use engram_core::conflict::{Conflict, ConflictType};
use engram_core::constants::CONFLICT_PREFILTER_TOP_K;
use engram_core::memory::MemoryRecord;
use engram_core::vecmath::cosine_similarity;

use crate::resolver::suggest_resolution;
use crate::text::{char_similarity, jaccard_similarity};

/// Thresholds from the detection rules.
const SEMANTIC_SIMILARITY_FLOOR: f64 = 0.8;
const SURFACE_AGREEMENT_CEILING: f64 = 0.6;
const FACT_KEY_SIMILARITY_FLOOR: f64 = 0.8;
const FACT_VALUE_SIMILARITY_CEILING: f64 = 0.3;
const DUPLICATE_JACCARD_FLOOR: f64 = 0.9;

fn temporal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\d{4}年\d{1,2}月(?:\d{1,2}日)?|\d{4}-\d{1,2}-\d{1,2}|昨天|今天|明天|前天|后天|去年|今年|明年|上周|下周|上个月|下个月",
        )
        .expect("static pattern")
    })
}

fn fact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([^，。：:\s]{1,12})(?:是|：|:|为)([^，。：:\s]{1,16})").expect("static pattern")
    })
}

/// Detects conflicts between memory records.
pub struct ConflictDetector {
    prefilter_top_k: usize,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self {
            prefilter_top_k: CONFLICT_PREFILTER_TOP_K,
        }
    }

    pub fn with_top_k(prefilter_top_k: usize) -> Self {
        Self { prefilter_top_k }
    }

    /// Detect conflicts between `incoming` and a candidate set. When
    /// embeddings are present the candidates are pre-filtered to the
    /// top-K by cosine similarity, bounding detection cost.
    pub fn detect(&self, incoming: &MemoryRecord, existing: &[MemoryRecord]) -> Vec<Conflict> {
        let candidates = self.prefilter(incoming, existing);
        let mut conflicts = Vec::new();
        for candidate in candidates {
            conflicts.extend(self.detect_pair(incoming, candidate));
        }
        if !conflicts.is_empty() {
            debug!(
                counter = "memory.conflicts.detected",
                count = conflicts.len(),
                "conflicts detected"
            );
        }
        conflicts
    }

    /// Pairwise detection across a result set (query-time annotation).
    pub fn detect_among(&self, records: &[MemoryRecord]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, a) in records.iter().enumerate() {
            for b in records.iter().skip(i + 1) {
                conflicts.extend(self.detect_pair(a, b));
            }
        }
        conflicts
    }

    fn prefilter<'a>(
        &self,
        incoming: &MemoryRecord,
        existing: &'a [MemoryRecord],
    ) -> Vec<&'a MemoryRecord> {
        let others: Vec<&MemoryRecord> =
            existing.iter().filter(|r| r.id != incoming.id).collect();
        if !incoming.has_embedding() || others.len() <= self.prefilter_top_k {
            return others;
        }

        let mut scored: Vec<(&MemoryRecord, f64)> = others
            .into_iter()
            .map(|r| {
                let sim = cosine_similarity(&incoming.embedding, &r.embedding);
                (r, sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.prefilter_top_k)
            .map(|(r, _)| r)
            .collect()
    }

    /// Run the five detectors over one pair. At most one conflict is
    /// reported per pair: the most specific detector wins (duplicate >
    /// preference > temporal > factual-by-facts > semantic).
    fn detect_pair(&self, incoming: &MemoryRecord, existing: &MemoryRecord) -> Option<Conflict> {
        let surface = jaccard_similarity(&incoming.content, &existing.content);
        let semantic = if incoming.has_embedding() && existing.has_embedding() {
            cosine_similarity(&incoming.embedding, &existing.embedding)
        } else {
            surface
        };
        let now = Utc::now();

        if surface > DUPLICATE_JACCARD_FLOOR {
            return Some(Conflict::new(
                ConflictType::Duplicate,
                vec![incoming.id.clone(), existing.id.clone()],
                semantic,
                surface,
                suggest_resolution(ConflictType::Duplicate, incoming, existing, now),
                "near-identical surface content",
            ));
        }

        if let Some(subject) = opposite_preference(&incoming.content, &existing.content) {
            return Some(Conflict::new(
                ConflictType::PreferenceChange,
                vec![incoming.id.clone(), existing.id.clone()],
                semantic,
                surface,
                suggest_resolution(ConflictType::PreferenceChange, incoming, existing, now),
                format!("opposite preference polarity about {subject}"),
            ));
        }

        if let Some((a_time, b_time)) = differing_time_tokens(&incoming.content, &existing.content)
        {
            return Some(Conflict::new(
                ConflictType::TemporalConflict,
                vec![incoming.id.clone(), existing.id.clone()],
                semantic,
                surface,
                suggest_resolution(ConflictType::TemporalConflict, incoming, existing, now),
                format!("time references differ: {a_time} vs {b_time}"),
            ));
        }

        if let Some((key, v1, v2)) = contradicting_facts(&incoming.content, &existing.content) {
            return Some(Conflict::new(
                ConflictType::FactualContradiction,
                vec![incoming.id.clone(), existing.id.clone()],
                semantic,
                surface,
                suggest_resolution(ConflictType::FactualContradiction, incoming, existing, now),
                format!("fact '{key}' has contradictory values: {v1} vs {v2}"),
            ));
        }

        if semantic >= SEMANTIC_SIMILARITY_FLOOR && surface < SURFACE_AGREEMENT_CEILING {
            return Some(Conflict::new(
                ConflictType::FactualContradiction,
                vec![incoming.id.clone(), existing.id.clone()],
                semantic,
                surface,
                suggest_resolution(ConflictType::FactualContradiction, incoming, existing, now),
                "high semantic similarity with low surface agreement",
            ));
        }

        None
    }
}

/// Preference polarity of a text about some subject, when present.
fn preference_polarity(text: &str) -> Option<(bool, String)> {
    static NEGATIVE: OnceLock<Regex> = OnceLock::new();
    static POSITIVE: OnceLock<Regex> = OnceLock::new();
    let negative = NEGATIVE.get_or_init(|| {
        Regex::new(r"(?:讨厌|不喜欢)([A-Za-z0-9]+|[\p{Han}]{1,8})").expect("static pattern")
    });
    let positive = POSITIVE.get_or_init(|| {
        Regex::new(r"(?:^|[^不])(?:喜欢|爱好)([A-Za-z0-9]+|[\p{Han}]{1,8})").expect("static pattern")
    });

    if let Some(captures) = negative.captures(text) {
        return Some((false, captures[1].to_lowercase()));
    }
    if let Some(captures) = positive.captures(text) {
        return Some((true, captures[1].to_lowercase()));
    }
    None
}

/// Both texts state a preference about the same subject with opposite
/// polarity.
fn opposite_preference(a: &str, b: &str) -> Option<String> {
    let (polarity_a, subject_a) = preference_polarity(a)?;
    let (polarity_b, subject_b) = preference_polarity(b)?;
    if polarity_a == polarity_b {
        return None;
    }
    if subject_a == subject_b || subject_a.contains(&subject_b) || subject_b.contains(&subject_a) {
        Some(subject_a)
    } else {
        None
    }
}

/// Both texts carry date/relative-time tokens but the sets differ.
fn differing_time_tokens(a: &str, b: &str) -> Option<(String, String)> {
    let tokens_a: HashSet<String> = temporal_pattern()
        .find_iter(a)
        .map(|m| m.as_str().to_string())
        .collect();
    let tokens_b: HashSet<String> = temporal_pattern()
        .find_iter(b)
        .map(|m| m.as_str().to_string())
        .collect();
    if tokens_a.is_empty() || tokens_b.is_empty() || tokens_a == tokens_b {
        return None;
    }
    Some((
        tokens_a.iter().next().cloned().unwrap_or_default(),
        tokens_b.iter().next().cloned().unwrap_or_default(),
    ))
}

/// Copula facts from both texts whose keys agree but values disagree.
fn contradicting_facts(a: &str, b: &str) -> Option<(String, String, String)> {
    let facts_a: Vec<(String, String)> = fact_pattern()
        .captures_iter(a)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();
    let facts_b: Vec<(String, String)> = fact_pattern()
        .captures_iter(b)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    for (key_a, value_a) in &facts_a {
        for (key_b, value_b) in &facts_b {
            if char_similarity(key_a, key_b) > FACT_KEY_SIMILARITY_FLOOR
                && char_similarity(value_a, value_b) < FACT_VALUE_SIMILARITY_CEILING
            {
                return Some((key_a.clone(), value_a.clone(), value_b.clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::conflict::ResolutionAction;
    use engram_core::memory::{MemoryMetadata, MemoryType};

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(content, MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5))
    }

    #[test]
    fn preference_flip_is_detected_and_auto_resolvable() {
        let older = record("我喜欢Python");
        let newer = record("我不喜欢Python了");

        let conflicts = ConflictDetector::new().detect(&newer, &[older.clone()]);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::PreferenceChange);
        assert!(conflict.auto_resolvable);
        assert_eq!(conflict.suggested.action, ResolutionAction::Replace);
        assert_eq!(conflict.suggested.winner_id.as_deref(), Some(newer.id.as_str()));
    }

    #[test]
    fn duplicates_are_detected() {
        let a = record("Python是我最喜欢的语言");
        let b = record("我最喜欢的语言是Python");
        let conflicts = ConflictDetector::new().detect(&a, &[b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Duplicate);
    }

    #[test]
    fn temporal_difference_is_detected() {
        let a = record("会议在2024年3月举行");
        let b = record("会议在2024年5月举行");
        let conflicts = ConflictDetector::new().detect(&a, &[b]);
        assert!(conflicts
            .iter()
            .any(|c| c.conflict_type == ConflictType::TemporalConflict));
    }

    #[test]
    fn factual_copula_contradiction_is_detected() {
        let a = record("我的职业是医生");
        let b = record("我的职业是老师");
        let conflicts = ConflictDetector::new().detect(&a, &[b]);
        assert!(conflicts
            .iter()
            .any(|c| c.conflict_type == ConflictType::FactualContradiction));
    }

    #[test]
    fn unrelated_texts_do_not_conflict() {
        let a = record("今天天气不错");
        let b = record("Rust has a strong type system");
        let conflicts = ConflictDetector::new().detect(&a, &[b]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn prefilter_bounds_candidate_count() {
        let mut incoming = record("target");
        incoming.embedding = vec![1.0, 0.0];
        let existing: Vec<MemoryRecord> = (0..50)
            .map(|i| {
                let mut r = record(&format!("candidate {i}"));
                r.embedding = vec![1.0, i as f32 * 0.01];
                r
            })
            .collect();

        let detector = ConflictDetector::with_top_k(5);
        let filtered = detector.prefilter(&incoming, &existing);
        assert_eq!(filtered.len(), 5);
    }

    #[test]
    fn high_semantic_low_surface_flags_contradiction() {
        let mut a = record("小王的生日是三月五号");
        let mut b = record("planet orbit data entry");
        a.embedding = vec![1.0, 0.0, 0.0];
        b.embedding = vec![0.99, 0.14, 0.0];
        let conflicts = ConflictDetector::new().detect(&a, &[b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::FactualContradiction);
    }
}
