//! Knowledge-graph types: typed entities connected by typed directed
//! relations, both attributed to the memory they were extracted from.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    Concept,
    Product,
    Time,
    Skill,
    Preference,
}

impl EntityType {
    /// Static type-to-importance table; scaled by extraction confidence
    /// when an entity is promoted into the graph.
    pub fn base_importance(self) -> f64 {
        match self {
            EntityType::Person => 0.9,
            EntityType::Organization => 0.8,
            EntityType::Preference => 0.8,
            EntityType::Skill => 0.7,
            EntityType::Location => 0.6,
            EntityType::Event => 0.6,
            EntityType::Product => 0.5,
            EntityType::Concept => 0.5,
            EntityType::Time => 0.3,
        }
    }
}

/// Closed set of relation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    WorksAt,
    LocatedIn,
    Knows,
    Likes,
    Dislikes,
    HasSkill,
    ParticipatedIn,
    RelatedTo,
    Owns,
    HappenedAt,
}

/// Where a graph element came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// Memory record the element was extracted from.
    pub memory_id: String,
    /// Extraction time.
    pub timestamp: DateTime<Utc>,
}

/// Per-entity bookkeeping mirroring the memory-record lifecycle counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphMetadata {
    pub user_id: String,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub importance: f64,
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    /// Alternate names; unioned when entities merge.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// String-keyed property map.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
    pub source: SourceRef,
    pub metadata: GraphMetadata,
}

impl GraphEntity {
    /// Create a fresh entity for `user_id` extracted from `memory_id`.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        confidence: f64,
        user_id: impl Into<String>,
        memory_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            entity_type,
            aliases: Vec::new(),
            properties: HashMap::new(),
            confidence,
            source: SourceRef {
                memory_id: memory_id.into(),
                timestamp: now,
            },
            metadata: GraphMetadata {
                user_id: user_id.into(),
                access_count: 0,
                last_accessed: now,
                importance: entity_type.base_importance() * confidence,
            },
        }
    }

    /// Whether `name` matches this entity's name or one of its aliases,
    /// case-insensitively.
    pub fn answers_to(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.name.to_lowercase() == lower
            || self.aliases.iter().any(|a| a.to_lowercase() == lower)
    }
}

impl PartialEq for GraphEntity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Validity window of a relation. `timestamp` is always present;
/// `start_time`/`end_time` bound relations that hold only for a period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemporalSpan {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl TemporalSpan {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }
}

/// Source attribution for a relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationSource {
    pub memory_id: String,
    pub user_id: String,
}

/// A directed, typed edge between two entities. Relations referencing a
/// deleted entity are cascade-deleted; the `(source_id, relation_type,
/// target_id)` triple is unique and upserted in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelation {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    pub confidence: f64,
    pub temporal: TemporalSpan,
    pub source: RelationSource,
}

impl GraphRelation {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
        confidence: f64,
        user_id: impl Into<String>,
        memory_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            properties: HashMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
            temporal: TemporalSpan::now(),
            source: RelationSource {
                memory_id: memory_id.into(),
                user_id: user_id.into(),
            },
        }
    }

    /// The upsert key: two relations with the same triple collapse.
    pub fn triple(&self) -> (String, RelationType, String) {
        (
            self.source_id.clone(),
            self.relation_type,
            self.target_id.clone(),
        )
    }
}

impl PartialEq for GraphRelation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
