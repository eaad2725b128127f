use chrono::{DateTime, Utc};

use engram_core::memory::MemoryRecord;

/// Credibility of a record: a weighted sum of four evidence signals.
///
/// - temporal freshness: exponential decay with a 7-day half-life (0.3)
/// - access frequency: saturating at 10 hits (0.2)
/// - assigned importance (0.3)
/// - contextual completeness: category and tags present (0.2)
pub fn credibility(record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
    let age_days = (now - record.metadata.timestamp).num_milliseconds() as f64 / 86_400_000.0;
    let freshness = 0.5f64.powf(age_days.max(0.0) / 7.0);
    let frequency = (record.access_count.min(10) as f64) / 10.0;
    let importance = record.metadata.importance;
    let completeness = match (
        record.metadata.category.is_some(),
        !record.metadata.tags.is_empty(),
    ) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.5,
        (false, false) => 0.0,
    };

    0.3 * freshness + 0.2 * frequency + 0.3 * importance + 0.2 * completeness
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::memory::{MemoryMetadata, MemoryType};

    #[test]
    fn fresh_complete_record_outranks_stale_bare_one() {
        let now = Utc::now();

        let mut fresh = MemoryRecord::new(
            "fresh",
            MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.8),
        );
        fresh.metadata.category = Some("work".into());
        fresh.metadata.tags = vec!["tag".into()];
        fresh.access_count = 10;

        let mut stale = MemoryRecord::new(
            "stale",
            MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.2),
        );
        stale.metadata.timestamp = now - chrono::Duration::days(60);

        assert!(credibility(&fresh, now) > credibility(&stale, now));
    }

    #[test]
    fn credibility_is_bounded() {
        let now = Utc::now();
        let mut best = MemoryRecord::new("x", MemoryMetadata::new("u1", MemoryType::Pinned, 1.0));
        best.metadata.category = Some("c".into());
        best.metadata.tags = vec!["t".into()];
        best.access_count = 100;
        let score = credibility(&best, now);
        assert!(score <= 1.0 + 1e-9);
        assert!(score >= 0.0);
    }

    #[test]
    fn seven_day_half_life() {
        let now = Utc::now();
        let mut week_old =
            MemoryRecord::new("x", MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.0));
        week_old.metadata.timestamp = now - chrono::Duration::days(7);
        // Only the freshness term is non-zero: 0.3 * 0.5.
        let score = credibility(&week_old, now);
        assert!((score - 0.15).abs() < 0.01);
    }
}
