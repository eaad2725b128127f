use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use tracing::debug;

use engram_core::config::CompressionConfig;
use engram_core::memory::MemoryRecord;
use engram_core::vecmath::cosine_similarity;
use engram_tokens::estimate_tokens;

/// Sample sizes for the redundancy estimate.
const REDUNDANCY_SAMPLE_RECORDS: usize = 200;
const REDUNDANCY_SAMPLE_PAIRS: usize = 100;
const REDUNDANCY_SIMILARITY_FLOOR: f64 = 0.8;

/// Why compression should run.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionTrigger {
    /// Estimated tokens exceed the configured share of the budget.
    TokenLimit { estimated: usize, threshold: usize },
    /// Record count approaches the count limit.
    Count { count: usize, limit: usize },
    /// Too many old records, and they are a meaningful share of the set.
    Age { old_count: usize, total: usize },
    /// Sampled pairwise similarity indicates redundant content.
    Redundancy { score: f64 },
}

/// Evaluates the four independent triggers against a user's records.
pub struct CompressionPolicy {
    config: CompressionConfig,
    token_budget: usize,
}

impl CompressionPolicy {
    pub fn new(config: CompressionConfig, token_budget: usize) -> Self {
        Self {
            config,
            token_budget,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// All triggers currently active for this record set.
    pub fn active_triggers(&self, records: &[MemoryRecord]) -> Vec<CompressionTrigger> {
        if !self.config.enabled || records.is_empty() {
            return Vec::new();
        }

        let mut triggers = Vec::new();

        let estimated: usize = records.iter().map(|r| estimate_tokens(&r.content)).sum();
        let threshold =
            (self.token_budget as f64 * self.config.token_threshold_percent) as usize;
        if estimated > threshold {
            triggers.push(CompressionTrigger::TokenLimit {
                estimated,
                threshold,
            });
        }

        let count = records.len();
        if count as f64 > 0.9 * self.config.count_limit as f64 {
            triggers.push(CompressionTrigger::Count {
                count,
                limit: self.config.count_limit,
            });
        }

        let now = Utc::now();
        let age_cutoff = Duration::days(self.config.age_days_threshold);
        let old_count = records.iter().filter(|r| r.age(now) > age_cutoff).count();
        if old_count > 100 && old_count as f64 > 0.1 * count as f64 {
            triggers.push(CompressionTrigger::Age {
                old_count,
                total: count,
            });
        }

        let redundancy = self.redundancy_score(records);
        if redundancy > self.config.redundancy_threshold {
            triggers.push(CompressionTrigger::Redundancy { score: redundancy });
        }

        debug!(triggers = triggers.len(), "compression triggers evaluated");
        triggers
    }

    /// Sampled redundancy: the fraction of random pairs above the
    /// similarity floor, weighted by the mean similarity of those pairs.
    fn redundancy_score(&self, records: &[MemoryRecord]) -> f64 {
        let with_embeddings: Vec<&MemoryRecord> =
            records.iter().filter(|r| r.has_embedding()).collect();
        if with_embeddings.len() < 2 {
            return 0.0;
        }

        let mut rng = rand::thread_rng();
        let sample: Vec<&&MemoryRecord> = with_embeddings
            .choose_multiple(&mut rng, REDUNDANCY_SAMPLE_RECORDS.min(with_embeddings.len()))
            .collect();

        let mut redundant = 0usize;
        let mut redundant_sim_sum = 0.0f64;
        let mut pairs = 0usize;
        for _ in 0..REDUNDANCY_SAMPLE_PAIRS {
            let a = sample.choose(&mut rng);
            let b = sample.choose(&mut rng);
            let (Some(a), Some(b)) = (a, b) else { break };
            if a.id == b.id {
                continue;
            }
            pairs += 1;
            let sim = cosine_similarity(&a.embedding, &b.embedding);
            if sim > REDUNDANCY_SIMILARITY_FLOOR {
                redundant += 1;
                redundant_sim_sum += sim;
            }
        }

        if pairs == 0 || redundant == 0 {
            return 0.0;
        }
        let fraction = redundant as f64 / pairs as f64;
        let mean_similarity = redundant_sim_sum / redundant as f64;
        fraction * mean_similarity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::memory::{MemoryMetadata, MemoryType};

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(content, MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5))
    }

    #[test]
    fn disabled_policy_never_triggers() {
        let config = CompressionConfig {
            enabled: false,
            ..Default::default()
        };
        let policy = CompressionPolicy::new(config, 100);
        let records = vec![record(&"word ".repeat(1000))];
        assert!(policy.active_triggers(&records).is_empty());
    }

    #[test]
    fn token_limit_trigger_fires() {
        let policy = CompressionPolicy::new(CompressionConfig::default(), 100);
        let records = vec![record(&"word ".repeat(200))];
        let triggers = policy.active_triggers(&records);
        assert!(triggers
            .iter()
            .any(|t| matches!(t, CompressionTrigger::TokenLimit { .. })));
    }

    #[test]
    fn count_trigger_fires_above_ninety_percent() {
        let config = CompressionConfig {
            count_limit: 10,
            ..Default::default()
        };
        let policy = CompressionPolicy::new(config, 1_000_000);
        let records: Vec<MemoryRecord> = (0..10).map(|i| record(&format!("note {i}"))).collect();
        let triggers = policy.active_triggers(&records);
        assert!(triggers
            .iter()
            .any(|t| matches!(t, CompressionTrigger::Count { .. })));
    }

    #[test]
    fn identical_embeddings_score_redundant() {
        let policy = CompressionPolicy::new(CompressionConfig::default(), 1_000_000);
        let records: Vec<MemoryRecord> = (0..20)
            .map(|i| {
                let mut r = record(&format!("dup {i}"));
                r.embedding = vec![1.0, 0.0, 0.0];
                r
            })
            .collect();
        let triggers = policy.active_triggers(&records);
        assert!(triggers
            .iter()
            .any(|t| matches!(t, CompressionTrigger::Redundancy { .. })));
    }
}
