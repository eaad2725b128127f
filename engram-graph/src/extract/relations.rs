use std::collections::HashMap;

use regex::{Captures, Regex};
use tracing::debug;

use engram_core::graph::{EntityType, GraphEntity, GraphRelation, RelationType};

/// A rule in the relation pattern table.
pub struct RelationPattern {
    pub pattern: Regex,
    pub relation_type: RelationType,
    pub base_confidence: f64,
    /// Restrict endpoint resolution to entities of these types.
    pub source_type: Option<EntityType>,
    pub target_type: Option<EntityType>,
    pub source_fn: fn(&Captures) -> Option<String>,
    pub target_fn: fn(&Captures) -> Option<String>,
    pub properties_fn: Option<fn(&Captures) -> HashMap<String, String>>,
}

/// A relation candidate whose endpoints are still names, not ids.
#[derive(Debug, Clone)]
pub struct ExtractedRelation {
    pub source_name: String,
    pub target_name: String,
    pub relation_type: RelationType,
    pub confidence: f64,
    pub properties: HashMap<String, String>,
}

fn cap1(captures: &Captures) -> Option<String> {
    captures.get(1).map(|m| m.as_str().to_string())
}

fn cap2(captures: &Captures) -> Option<String> {
    captures.get(2).map(|m| m.as_str().to_string())
}

/// Target of the Chinese WORKS_AT rule: the organization stem plus its
/// optional kind suffix (科技, 公司, …).
fn org_target(captures: &Captures) -> Option<String> {
    let stem = cap2(captures)?;
    let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
    Some(format!("{stem}{suffix}"))
}

/// Resolve an endpoint name against the entities extracted from the same
/// text: exact name match first, then alias match, then substring
/// containment in either direction.
pub fn resolve_endpoint<'a>(
    name: &str,
    entities: &'a [GraphEntity],
    type_filter: Option<EntityType>,
) -> Option<&'a GraphEntity> {
    let lower = name.to_lowercase();
    let candidates: Vec<&GraphEntity> = entities
        .iter()
        .filter(|e| type_filter.map_or(true, |t| e.entity_type == t))
        .collect();

    if let Some(exact) = candidates.iter().find(|e| e.name.to_lowercase() == lower) {
        return Some(exact);
    }
    if let Some(alias) = candidates
        .iter()
        .find(|e| e.aliases.iter().any(|a| a.to_lowercase() == lower))
    {
        return Some(alias);
    }
    candidates.into_iter().find(|e| {
        let entity_lower = e.name.to_lowercase();
        entity_lower.contains(&lower) || lower.contains(&entity_lower)
    })
}

/// Regex-driven relation extractor.
pub struct RelationExtractor {
    patterns: Vec<RelationPattern>,
}

impl Default for RelationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationExtractor {
    pub fn new() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }

    pub fn register(&mut self, pattern: RelationPattern) {
        self.patterns.push(pattern);
    }

    /// Extract relations from `text`, resolving endpoints against the
    /// entities extracted from the same text. A relation whose endpoint
    /// cannot be resolved is discarded. Deduplicated by
    /// `(source, type, target)`.
    pub fn extract(&self, text: &str, entities: &[GraphEntity]) -> Vec<GraphRelation> {
        let user_id = entities
            .first()
            .map(|e| e.metadata.user_id.clone())
            .unwrap_or_default();
        let memory_id = entities
            .first()
            .map(|e| e.source.memory_id.clone())
            .unwrap_or_default();

        let mut seen: HashMap<(String, RelationType, String), GraphRelation> = HashMap::new();

        for rule in &self.patterns {
            for captures in rule.pattern.captures_iter(text) {
                let Some(source_name) = (rule.source_fn)(&captures) else {
                    continue;
                };
                let Some(target_name) = (rule.target_fn)(&captures) else {
                    continue;
                };

                let Some(source) = resolve_endpoint(&source_name, entities, rule.source_type)
                else {
                    continue;
                };
                let Some(target) = resolve_endpoint(&target_name, entities, rule.target_type)
                else {
                    continue;
                };
                if source.id == target.id {
                    continue;
                }

                let mut relation = GraphRelation::new(
                    &source.id,
                    &target.id,
                    rule.relation_type,
                    rule.base_confidence,
                    &user_id,
                    &memory_id,
                );
                if let Some(f) = rule.properties_fn {
                    relation.properties = f(&captures);
                }

                seen.entry((source.name.clone(), rule.relation_type, target.name.clone()))
                    .or_insert(relation);
            }
        }

        let out: Vec<GraphRelation> = seen.into_values().collect();
        debug!(count = out.len(), "relations extracted");
        out
    }
}

fn default_patterns() -> Vec<RelationPattern> {
    let rule = |pattern: &str,
                relation_type: RelationType,
                base_confidence: f64,
                source_type: Option<EntityType>,
                target_type: Option<EntityType>,
                source_fn: fn(&Captures) -> Option<String>,
                target_fn: fn(&Captures) -> Option<String>| {
        RelationPattern {
            pattern: Regex::new(pattern).expect("static pattern"),
            relation_type,
            base_confidence,
            source_type,
            target_type,
            source_fn,
            target_fn,
            properties_fn: None,
        }
    };

    vec![
        rule(
            r"([\p{Han}]{2,4})[，,]?\s*在([\p{Han}A-Za-z0-9]{2,12}?)(公司|科技|集团|银行|大学|学校)?(?:工作|上班)",
            RelationType::WorksAt,
            0.85,
            Some(EntityType::Person),
            Some(EntityType::Organization),
            cap1,
            org_target,
        ),
        rule(
            r"(?i)([a-z]+) works? at ([A-Z][A-Za-z0-9 ]*)",
            RelationType::WorksAt,
            0.8,
            Some(EntityType::Person),
            Some(EntityType::Organization),
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})住在([\p{Han}]{2,8})",
            RelationType::LocatedIn,
            0.85,
            Some(EntityType::Person),
            Some(EntityType::Location),
            cap1,
            cap2,
        ),
        rule(
            r"(?i)([a-z]+) lives? in ([A-Z][a-z]+)",
            RelationType::LocatedIn,
            0.8,
            Some(EntityType::Person),
            Some(EntityType::Location),
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})认识([\p{Han}]{2,4})",
            RelationType::Knows,
            0.7,
            Some(EntityType::Person),
            Some(EntityType::Person),
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})喜欢([A-Za-z0-9]+|[\p{Han}]{1,8})",
            RelationType::Likes,
            0.7,
            Some(EntityType::Person),
            None,
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})(?:讨厌|不喜欢)([A-Za-z0-9]+|[\p{Han}]{1,8})",
            RelationType::Dislikes,
            0.7,
            Some(EntityType::Person),
            None,
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})(?:擅长|精通)([A-Za-z0-9+#]+|[\p{Han}]{1,8})",
            RelationType::HasSkill,
            0.7,
            Some(EntityType::Person),
            Some(EntityType::Skill),
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})参加了?([\p{Han}]{2,8})",
            RelationType::ParticipatedIn,
            0.6,
            Some(EntityType::Person),
            Some(EntityType::Event),
            cap1,
            cap2,
        ),
        rule(
            r"([\p{Han}]{2,4})买了([A-Za-z0-9]+|[\p{Han}]{1,8})",
            RelationType::Owns,
            0.6,
            Some(EntityType::Person),
            None,
            cap1,
            cap2,
        ),
    ]
}
