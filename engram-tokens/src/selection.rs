use chrono::Utc;
use serde::{Deserialize, Serialize};

use engram_core::memory::MemoryRecord;

use crate::estimator::estimate_tokens;

/// How records are ordered before greedy budget packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    Importance,
    Recency,
    #[default]
    Relevance,
    Balanced,
}

/// Greedy selection: sort by strategy score, then add records while
/// `used + record_tokens <= budget`, stopping early once utilization
/// reaches 95%.
///
/// Returns the selected records (cloned, in selection order) and the
/// token total they consume.
pub fn select_within_budget(
    records: &[MemoryRecord],
    budget: usize,
    strategy: SelectionStrategy,
) -> (Vec<MemoryRecord>, usize) {
    if budget == 0 || records.is_empty() {
        return (Vec::new(), 0);
    }

    let now = Utc::now();
    let mut scored: Vec<(&MemoryRecord, f64)> = records
        .iter()
        .map(|r| (r, score(r, strategy, now)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    let mut used = 0usize;
    let stop_at = (budget as f64 * 0.95) as usize;

    for (record, _) in scored {
        let tokens = estimate_tokens(&record.content);
        if used + tokens <= budget {
            used += tokens;
            selected.push(record.clone());
        }
        if used >= stop_at {
            break;
        }
    }

    (selected, used)
}

fn score(record: &MemoryRecord, strategy: SelectionStrategy, now: chrono::DateTime<Utc>) -> f64 {
    let importance = record.metadata.importance;
    let age_days = (now - record.metadata.timestamp).num_milliseconds() as f64 / 86_400_000.0;
    let recency = (-age_days / 30.0).exp();
    let frequency = ((record.access_count as f64 + 1.0).log10() / 2.0).min(1.0);

    match strategy {
        SelectionStrategy::Importance => importance,
        SelectionStrategy::Recency => recency,
        SelectionStrategy::Relevance => 0.4 * importance + 0.3 * recency + 0.3 * frequency,
        SelectionStrategy::Balanced => {
            let quality = if record.has_embedding() { 0.5 } else { 0.0 }
                + (record.content.len() as f64 / 500.0).min(0.5);
            0.35 * importance + 0.30 * recency + 0.20 * frequency + 0.15 * quality
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::memory::{MemoryMetadata, MemoryType};

    fn record(content: &str, importance: f64) -> MemoryRecord {
        MemoryRecord::new(content, MemoryMetadata::new("u1", MemoryType::ShortTerm, importance))
    }

    #[test]
    fn zero_budget_selects_nothing() {
        let records = vec![record("hello world", 0.9)];
        let (selected, used) = select_within_budget(&records, 0, SelectionStrategy::Importance);
        assert!(selected.is_empty());
        assert_eq!(used, 0);
    }

    #[test]
    fn importance_orders_selection() {
        let records = vec![record("low importance item", 0.1), record("high importance item", 0.9)];
        let (selected, _) = select_within_budget(&records, 1_000, SelectionStrategy::Importance);
        assert_eq!(selected[0].metadata.importance, 0.9);
    }

    #[test]
    fn never_exceeds_budget() {
        let records: Vec<_> = (0..50)
            .map(|i| record(&format!("memory item number {i} with some padding text"), 0.5))
            .collect();
        let budget = 40;
        let (_, used) = select_within_budget(&records, budget, SelectionStrategy::Relevance);
        assert!(used <= budget);
    }

    #[test]
    fn oversized_record_is_skipped_not_fatal() {
        let big = "word ".repeat(500);
        let records = vec![record(&big, 0.9), record("small one", 0.1)];
        let (selected, used) = select_within_budget(&records, 20, SelectionStrategy::Importance);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].content, "small one");
        assert!(used <= 20);
    }
}
