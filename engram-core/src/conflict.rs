//! Conflict types shared between the detector, the resolver, and the
//! orchestrator's transaction handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of contradiction detectable between two memory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// High semantic similarity with low surface agreement.
    FactualContradiction,
    /// Both records carry differing date/relative-time tokens.
    TemporalConflict,
    /// Opposite preference polarity about the same subject.
    PreferenceChange,
    /// Near-identical surface content.
    Duplicate,
    /// Newer information supersedes older.
    OutdatedInfo,
    /// Records disagree only because their contexts differ.
    ContextMismatch,
}

/// Severity, derived from the gap between semantic and surface similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    /// Derive severity from the semantic-minus-surface similarity gap.
    pub fn from_gap(gap: f64) -> Self {
        if gap >= 0.6 {
            ConflictSeverity::Critical
        } else if gap >= 0.4 {
            ConflictSeverity::High
        } else if gap >= 0.2 {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }

    /// Whether the resolver may act on a conflict of this severity without
    /// human review.
    pub fn auto_resolvable(self) -> bool {
        !matches!(self, ConflictSeverity::Critical)
    }
}

/// What the resolver does about a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Merge,
    Replace,
    Archive,
    FlagForReview,
    CreateAlternative,
    UpdateConfidence,
}

/// A suggested or executed resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub action: ResolutionAction,
    /// Record that survives, when the action removes one side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    /// Record that is replaced or archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loser_id: Option<String>,
    pub reason: String,
}

impl Resolution {
    pub fn flag(reason: impl Into<String>) -> Self {
        Self {
            action: ResolutionAction::FlagForReview,
            winner_id: None,
            loser_id: None,
            reason: reason.into(),
        }
    }
}

/// A detected contradiction between memory records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    /// Participating record ids; the first is the incoming record.
    pub record_ids: Vec<String>,
    /// Dense-vector cosine similarity between the two sides.
    pub semantic_similarity: f64,
    /// Surface content-word Jaccard similarity.
    pub content_similarity: f64,
    /// Whether the resolver may act without review.
    pub auto_resolvable: bool,
    pub suggested: Resolution,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Build a conflict, deriving severity and auto-resolvability from the
    /// similarity gap.
    pub fn new(
        conflict_type: ConflictType,
        record_ids: Vec<String>,
        semantic_similarity: f64,
        content_similarity: f64,
        suggested: Resolution,
        description: impl Into<String>,
    ) -> Self {
        let severity = ConflictSeverity::from_gap(semantic_similarity - content_similarity);
        Self {
            id: Uuid::new_v4().to_string(),
            conflict_type,
            severity,
            record_ids,
            semantic_similarity,
            content_similarity,
            auto_resolvable: severity.auto_resolvable(),
            suggested,
            description: description.into(),
            detected_at: Utc::now(),
        }
    }
}
