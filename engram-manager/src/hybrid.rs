//! Hybrid rerank: max-normalized vector and keyword scores blended
//! 0.7/0.3, then weighted by memory tier and time decay.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use engram_core::constants::{KEYWORD_BLEND_WEIGHT, TIME_DECAY_HALF_LIFE_DAYS, VECTOR_BLEND_WEIGHT};
use engram_core::memory::MemoryRecord;
use engram_keyword::KeywordHit;
use engram_vector::SearchHit;

/// A candidate after blending, before truncation.
#[derive(Debug, Clone)]
pub struct BlendedCandidate {
    pub record: MemoryRecord,
    pub score: f64,
}

/// Blend the two channels per id and apply the tier/decay rerank.
///
/// Each score set is normalized by its own maximum into [0, 1]; a
/// missing side contributes 0. The final score is
/// `combined × typeWeight × (0.7 + 0.3 × exp(−age/7d))`, sorted once,
/// descending.
pub fn blend(
    vector_hits: &[SearchHit],
    keyword_hits: &[KeywordHit],
    resolve: impl Fn(&str) -> Option<MemoryRecord>,
    now: DateTime<Utc>,
) -> Vec<BlendedCandidate> {
    let max_vector = vector_hits
        .iter()
        .map(|h| h.similarity)
        .fold(0.0f64, f64::max);
    let max_keyword = keyword_hits.iter().map(|h| h.score).fold(0.0f64, f64::max);

    struct Sides {
        vector: f64,
        keyword: f64,
        record: Option<MemoryRecord>,
    }
    let mut by_id: HashMap<String, Sides> = HashMap::new();

    for hit in vector_hits {
        let normalized = if max_vector > 0.0 {
            hit.similarity / max_vector
        } else {
            0.0
        };
        by_id.insert(
            hit.record.id.clone(),
            Sides {
                vector: normalized,
                keyword: 0.0,
                record: Some(hit.record.clone()),
            },
        );
    }

    for hit in keyword_hits {
        let normalized = if max_keyword > 0.0 {
            hit.score / max_keyword
        } else {
            0.0
        };
        match by_id.get_mut(&hit.memory_id) {
            Some(sides) => sides.keyword = normalized,
            None => {
                // Keyword-only candidate: fetch the record.
                if let Some(record) = resolve(&hit.memory_id) {
                    by_id.insert(
                        hit.memory_id.clone(),
                        Sides {
                            vector: 0.0,
                            keyword: normalized,
                            record: Some(record),
                        },
                    );
                }
            }
        }
    }

    let mut candidates: Vec<BlendedCandidate> = by_id
        .into_values()
        .filter_map(|sides| {
            let record = sides.record?;
            let combined =
                VECTOR_BLEND_WEIGHT * sides.vector + KEYWORD_BLEND_WEIGHT * sides.keyword;
            let age_days =
                (now - record.metadata.timestamp).num_milliseconds() as f64 / 86_400_000.0;
            let decay = (-age_days.max(0.0) / TIME_DECAY_HALF_LIFE_DAYS).exp();
            let type_weight = record.metadata.memory_type.rerank_weight();
            let score = combined * type_weight * (0.7 + 0.3 * decay);
            Some(BlendedCandidate { record, score })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::memory::{MemoryMetadata, MemoryType};

    fn record(content: &str, tier: MemoryType) -> MemoryRecord {
        MemoryRecord::new(content, MemoryMetadata::new("u1", tier, 0.5))
    }

    #[test]
    fn type_weight_breaks_ties() {
        let long = record("张三住在北京", MemoryType::LongTerm);
        let short = record("李四住在北京", MemoryType::ShortTerm);

        let vector_hits = vec![
            SearchHit {
                record: long.clone(),
                similarity: 0.5,
            },
            SearchHit {
                record: short.clone(),
                similarity: 0.5,
            },
        ];
        let keyword_hits = vec![
            KeywordHit {
                memory_id: long.id.clone(),
                score: 1.0,
            },
            KeywordHit {
                memory_id: short.id.clone(),
                score: 1.0,
            },
        ];

        let blended = blend(&vector_hits, &keyword_hits, |_| None, Utc::now());
        assert_eq!(blended[0].record.id, long.id);
        assert!(blended[0].score > blended[1].score);
    }

    #[test]
    fn vector_only_equals_vector_search_order() {
        let a = record("first", MemoryType::ShortTerm);
        let b = record("second", MemoryType::ShortTerm);
        let vector_hits = vec![
            SearchHit {
                record: a.clone(),
                similarity: 0.9,
            },
            SearchHit {
                record: b.clone(),
                similarity: 0.6,
            },
        ];

        let blended = blend(&vector_hits, &[], |_| None, Utc::now());
        assert_eq!(blended.len(), 2);
        assert_eq!(blended[0].record.id, a.id);
        // Same tier and age: relative order matches the vector channel.
        assert!(blended[0].score > blended[1].score);
    }

    #[test]
    fn keyword_only_candidates_are_resolved() {
        let a = record("keyword only", MemoryType::ShortTerm);
        let keyword_hits = vec![KeywordHit {
            memory_id: a.id.clone(),
            score: 0.8,
        }];
        let resolver = {
            let a = a.clone();
            move |id: &str| (id == a.id).then(|| a.clone())
        };

        let blended = blend(&[], &keyword_hits, resolver, Utc::now());
        assert_eq!(blended.len(), 1);
        assert!(blended[0].score > 0.0);
    }

    #[test]
    fn missing_record_is_dropped() {
        let keyword_hits = vec![KeywordHit {
            memory_id: "ghost".to_string(),
            score: 1.0,
        }];
        let blended = blend(&[], &keyword_hits, |_| None, Utc::now());
        assert!(blended.is_empty());
    }
}
