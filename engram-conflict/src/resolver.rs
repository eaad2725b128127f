use chrono::{DateTime, Utc};

use engram_core::conflict::{ConflictType, Resolution, ResolutionAction};
use engram_core::memory::MemoryRecord;

use crate::credibility::credibility;

/// Suggest a resolution for a conflict between `incoming` and `existing`.
///
/// Policies:
/// - factual: the higher-credibility record replaces the other;
/// - temporal / outdated: the newer record replaces the older;
/// - preference: the newer preference wins;
/// - duplicate: archive the lower-credibility copy;
/// - context mismatch: flag for review, never auto-acted.
pub fn suggest_resolution(
    conflict_type: ConflictType,
    incoming: &MemoryRecord,
    existing: &MemoryRecord,
    now: DateTime<Utc>,
) -> Resolution {
    match conflict_type {
        ConflictType::FactualContradiction => {
            let (winner, loser) = by_credibility(incoming, existing, now);
            Resolution {
                action: ResolutionAction::Replace,
                winner_id: Some(winner.id.clone()),
                loser_id: Some(loser.id.clone()),
                reason: "higher credibility wins the factual contradiction".to_string(),
            }
        }
        ConflictType::TemporalConflict | ConflictType::OutdatedInfo => {
            let (winner, loser) = by_recency(incoming, existing);
            Resolution {
                action: ResolutionAction::Replace,
                winner_id: Some(winner.id.clone()),
                loser_id: Some(loser.id.clone()),
                reason: "newer information replaces older".to_string(),
            }
        }
        ConflictType::PreferenceChange => {
            let (winner, loser) = by_recency(incoming, existing);
            Resolution {
                action: ResolutionAction::Replace,
                winner_id: Some(winner.id.clone()),
                loser_id: Some(loser.id.clone()),
                reason: "newer preference wins".to_string(),
            }
        }
        ConflictType::Duplicate => {
            let (winner, loser) = by_credibility(incoming, existing, now);
            Resolution {
                action: ResolutionAction::Archive,
                winner_id: Some(winner.id.clone()),
                loser_id: Some(loser.id.clone()),
                reason: "archive the lower-credibility duplicate".to_string(),
            }
        }
        ConflictType::ContextMismatch => Resolution::flag("contexts differ; needs review"),
    }
}

fn by_recency<'a>(
    a: &'a MemoryRecord,
    b: &'a MemoryRecord,
) -> (&'a MemoryRecord, &'a MemoryRecord) {
    if a.metadata.timestamp >= b.metadata.timestamp {
        (a, b)
    } else {
        (b, a)
    }
}

fn by_credibility<'a>(
    a: &'a MemoryRecord,
    b: &'a MemoryRecord,
    now: DateTime<Utc>,
) -> (&'a MemoryRecord, &'a MemoryRecord) {
    if credibility(a, now) >= credibility(b, now) {
        (a, b)
    } else {
        (b, a)
    }
}
