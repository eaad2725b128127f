use chrono::{DateTime, Utc};

use engram_core::config::LifecycleThresholds;
use engram_core::memory::{MemoryRecord, MemoryType};

/// The per-record lifecycle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Keep,
    Delete,
    Upgrade(MemoryType),
    Downgrade(MemoryType),
}

/// Decide what happens to one record. Protected tiers always keep.
///
/// Order: expiry first (too old AND unimportant), then promotion
/// (access count, access density, and survival days all clear their
/// thresholds), then demotion (idle AND unimportant).
pub fn evaluate_record(
    record: &MemoryRecord,
    thresholds: &LifecycleThresholds,
    now: DateTime<Utc>,
) -> LifecycleAction {
    let tier = record.metadata.memory_type;
    if tier.is_protected() {
        return LifecycleAction::Keep;
    }

    let age_days = (now - record.metadata.timestamp).num_milliseconds() as f64 / 86_400_000.0;
    let importance = record.metadata.importance;

    let expiry = match tier {
        MemoryType::ShortTerm => &thresholds.expiry_short_term,
        MemoryType::MidTerm => &thresholds.expiry_mid_term,
        MemoryType::LongTerm => &thresholds.expiry_long_term,
        _ => unreachable!("protected tiers returned above"),
    };
    if age_days > expiry.max_age_days && importance < expiry.min_importance {
        return LifecycleAction::Delete;
    }

    let upgrade = match tier {
        MemoryType::ShortTerm => Some((&thresholds.upgrade_short_to_mid, MemoryType::MidTerm)),
        MemoryType::MidTerm => Some((&thresholds.upgrade_mid_to_long, MemoryType::LongTerm)),
        _ => None,
    };
    if let Some((rule, next)) = upgrade {
        let survival_days = age_days.max(f64::EPSILON);
        let density = record.access_count as f64 / survival_days;
        if record.access_count >= rule.min_access_count
            && density >= rule.min_access_density
            && survival_days >= rule.min_survival_days
        {
            return LifecycleAction::Upgrade(next);
        }
    }

    let downgrade = match tier {
        MemoryType::LongTerm => Some((&thresholds.downgrade_long_to_mid, MemoryType::MidTerm)),
        MemoryType::MidTerm => Some((&thresholds.downgrade_mid_to_short, MemoryType::ShortTerm)),
        _ => None,
    };
    if let Some((rule, next)) = downgrade {
        let inactive_days = record.inactive_days(now);
        if inactive_days > rule.inactive_days && importance < rule.max_importance {
            return LifecycleAction::Downgrade(next);
        }
    }

    LifecycleAction::Keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use engram_core::memory::MemoryMetadata;

    fn record(tier: MemoryType, importance: f64) -> MemoryRecord {
        MemoryRecord::new("content", MemoryMetadata::new("u1", tier, importance))
    }

    #[test]
    fn active_short_term_upgrades_to_mid() {
        let now = Utc::now();
        let mut r = record(MemoryType::ShortTerm, 0.4);
        r.metadata.timestamp = now - Duration::days(8);
        r.access_count = 12;
        r.last_accessed = now - Duration::hours(1);

        assert_eq!(
            evaluate_record(&r, &LifecycleThresholds::default(), now),
            LifecycleAction::Upgrade(MemoryType::MidTerm)
        );
    }

    #[test]
    fn young_records_do_not_upgrade() {
        let now = Utc::now();
        let mut r = record(MemoryType::ShortTerm, 0.4);
        r.metadata.timestamp = now - Duration::days(2);
        r.access_count = 50;

        assert_eq!(
            evaluate_record(&r, &LifecycleThresholds::default(), now),
            LifecycleAction::Keep
        );
    }

    #[test]
    fn stale_unimportant_short_term_is_deleted() {
        let now = Utc::now();
        let mut r = record(MemoryType::ShortTerm, 0.05);
        r.metadata.timestamp = now - Duration::days(45);

        assert_eq!(
            evaluate_record(&r, &LifecycleThresholds::default(), now),
            LifecycleAction::Delete
        );
    }

    #[test]
    fn stale_but_important_short_term_survives() {
        let now = Utc::now();
        let mut r = record(MemoryType::ShortTerm, 0.9);
        r.metadata.timestamp = now - Duration::days(45);
        r.last_accessed = now;

        assert_eq!(
            evaluate_record(&r, &LifecycleThresholds::default(), now),
            LifecycleAction::Keep
        );
    }

    #[test]
    fn idle_long_term_downgrades() {
        let now = Utc::now();
        let mut r = record(MemoryType::LongTerm, 0.3);
        r.metadata.timestamp = now - Duration::days(200);
        r.last_accessed = now - Duration::days(120);

        assert_eq!(
            evaluate_record(&r, &LifecycleThresholds::default(), now),
            LifecycleAction::Downgrade(MemoryType::MidTerm)
        );
    }

    #[test]
    fn pinned_and_profile_always_keep() {
        let now = Utc::now();
        for tier in [MemoryType::Pinned, MemoryType::Profile] {
            let mut r = record(tier, 0.0);
            r.metadata.timestamp = now - Duration::days(1000);
            assert_eq!(
                evaluate_record(&r, &LifecycleThresholds::default(), now),
                LifecycleAction::Keep
            );
        }
    }
}
