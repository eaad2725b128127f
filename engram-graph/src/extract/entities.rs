use std::collections::HashMap;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use engram_core::constants::ENTITY_CONFIDENCE_THRESHOLD;
use engram_core::errors::EngramResult;
use engram_core::graph::{EntityType, GraphEntity};

use crate::llm::LlmClient;

/// A rule in the entity pattern table.
pub struct EntityPattern {
    pub pattern: Regex,
    pub entity_type: EntityType,
    pub base_confidence: f64,
    /// Extracts the canonical name (plus any aliases) from a match.
    pub name_fn: fn(&Captures) -> Option<(String, Vec<String>)>,
    pub properties_fn: Option<fn(&Captures) -> HashMap<String, String>>,
}

/// An entity candidate prior to promotion into the graph.
#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    pub aliases: Vec<String>,
    pub properties: HashMap<String, String>,
}

fn cap(captures: &Captures, group: usize) -> Option<String> {
    captures.get(group).map(|m| m.as_str().to_string())
}

fn plain_name(captures: &Captures) -> Option<(String, Vec<String>)> {
    cap(captures, 1).map(|name| (name, Vec::new()))
}

fn whole_match_name(captures: &Captures) -> Option<(String, Vec<String>)> {
    Some((captures.get(0)?.as_str().to_string(), Vec::new()))
}

/// Organization mentions drop the 公司 suffix in speech; canonicalize to
/// `<name>公司` and keep the raw mention as an alias.
fn org_name(captures: &Captures) -> Option<(String, Vec<String>)> {
    let stem = cap(captures, 1)?;
    let suffix = cap(captures, 2).unwrap_or_default();
    let raw = format!("{stem}{suffix}");
    if suffix == "公司" || raw.ends_with("公司") {
        Some((raw, vec![stem]))
    } else if matches!(suffix.as_str(), "科技" | "集团" | "银行") {
        Some((format!("{raw}公司"), vec![raw, stem]))
    } else {
        Some((raw, vec![stem]))
    }
}

fn positive_preference_props(_: &Captures) -> HashMap<String, String> {
    HashMap::from([("polarity".to_string(), "positive".to_string())])
}

fn negative_preference_props(_: &Captures) -> HashMap<String, String> {
    HashMap::from([("polarity".to_string(), "negative".to_string())])
}

/// Regex-driven entity extractor with the default rule set.
pub struct EntityExtractor {
    patterns: Vec<EntityPattern>,
    confidence_threshold: f64,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self {
            patterns: default_patterns(),
            confidence_threshold: ENTITY_CONFIDENCE_THRESHOLD,
        }
    }

    /// Register an additional pattern (tests, deployment tuning).
    pub fn register(&mut self, pattern: EntityPattern) {
        self.patterns.push(pattern);
    }

    /// Run the rule set over `text`, dedup by `(type, lowercased name)`,
    /// and filter weak matches.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut merged: HashMap<(EntityType, String), ExtractedEntity> = HashMap::new();

        for rule in &self.patterns {
            for captures in rule.pattern.captures_iter(text) {
                let Some((name, aliases)) = (rule.name_fn)(&captures) else {
                    continue;
                };
                let properties = rule
                    .properties_fn
                    .map(|f| f(&captures))
                    .unwrap_or_default();

                let key = (rule.entity_type, name.to_lowercase());
                match merged.get_mut(&key) {
                    Some(existing) => {
                        // Same surface form matched twice: average
                        // confidence, union aliases and properties.
                        existing.confidence = (existing.confidence + rule.base_confidence) / 2.0;
                        for alias in aliases {
                            if !existing.aliases.contains(&alias) && alias != existing.name {
                                existing.aliases.push(alias);
                            }
                        }
                        for (k, v) in properties {
                            existing.properties.entry(k).or_insert(v);
                        }
                    }
                    None => {
                        merged.insert(
                            key,
                            ExtractedEntity {
                                name,
                                entity_type: rule.entity_type,
                                confidence: rule.base_confidence,
                                aliases,
                                properties,
                            },
                        );
                    }
                }
            }
        }

        let mut out: Vec<ExtractedEntity> = merged
            .into_values()
            .filter(|e| e.confidence >= self.confidence_threshold)
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!(count = out.len(), "entities extracted");
        out
    }

    /// Rule extraction augmented by an LLM pass. Rule and LLM candidates
    /// merge by `(type, name)`: exact duplicates average their
    /// confidence, case variants take the max. LLM failures degrade to
    /// rule-only output.
    pub async fn extract_with_llm(
        &self,
        text: &str,
        client: &dyn LlmClient,
    ) -> Vec<ExtractedEntity> {
        let rule_results = self.extract(text);

        let llm_results = match self.llm_candidates(text, client).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "LLM entity augmentation failed; keeping rule results");
                return rule_results;
            }
        };

        let mut merged: HashMap<(EntityType, String), ExtractedEntity> = rule_results
            .into_iter()
            .map(|e| ((e.entity_type, e.name.to_lowercase()), e))
            .collect();

        for candidate in llm_results {
            let key = (candidate.entity_type, candidate.name.to_lowercase());
            match merged.get_mut(&key) {
                Some(existing) => {
                    if existing.name == candidate.name {
                        existing.confidence = (existing.confidence + candidate.confidence) / 2.0;
                    } else {
                        existing.confidence = existing.confidence.max(candidate.confidence);
                    }
                }
                None => {
                    merged.insert(key, candidate);
                }
            }
        }

        let mut out: Vec<ExtractedEntity> = merged
            .into_values()
            .filter(|e| e.confidence >= self.confidence_threshold)
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    async fn llm_candidates(
        &self,
        text: &str,
        client: &dyn LlmClient,
    ) -> EngramResult<Vec<ExtractedEntity>> {
        let prompt = format!(
            "Extract named entities from the text below. Respond with a JSON array \
             of objects {{\"name\", \"type\", \"confidence\"}} where type is one of \
             PERSON, ORGANIZATION, LOCATION, EVENT, CONCEPT, PRODUCT, TIME, SKILL, \
             PREFERENCE and confidence is between 0 and 1.\n\nText: {text}"
        );
        let generated = engram_core::asyncutil::with_timeout(
            std::time::Duration::from_secs(10),
            client.generate(&prompt),
        )
        .await;
        match generated {
            Some(raw) => Ok(parse_llm_entities(&raw?)),
            None => {
                warn!("LLM entity augmentation timed out");
                Ok(Vec::new())
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default = "default_llm_confidence")]
    confidence: f64,
}

fn default_llm_confidence() -> f64 {
    0.6
}

fn parse_entity_type(s: &str) -> Option<EntityType> {
    match s.to_ascii_uppercase().as_str() {
        "PERSON" => Some(EntityType::Person),
        "ORGANIZATION" => Some(EntityType::Organization),
        "LOCATION" => Some(EntityType::Location),
        "EVENT" => Some(EntityType::Event),
        "CONCEPT" => Some(EntityType::Concept),
        "PRODUCT" => Some(EntityType::Product),
        "TIME" => Some(EntityType::Time),
        "SKILL" => Some(EntityType::Skill),
        "PREFERENCE" => Some(EntityType::Preference),
        _ => None,
    }
}

/// Parse the LLM response, tolerating surrounding prose around the JSON
/// array.
fn parse_llm_entities(raw: &str) -> Vec<ExtractedEntity> {
    let json = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => return Vec::new(),
    };
    let parsed: Vec<LlmEntity> = serde_json::from_str(json).unwrap_or_default();
    parsed
        .into_iter()
        .filter_map(|e| {
            let entity_type = parse_entity_type(&e.entity_type)?;
            Some(ExtractedEntity {
                name: e.name,
                entity_type,
                confidence: e.confidence.clamp(0.0, 1.0),
                aliases: Vec::new(),
                properties: HashMap::new(),
            })
        })
        .collect()
}

impl ExtractedEntity {
    /// Promote into a graph entity attributed to `memory_id`.
    pub fn into_graph_entity(self, user_id: &str, memory_id: &str) -> GraphEntity {
        let mut entity =
            GraphEntity::new(self.name, self.entity_type, self.confidence, user_id, memory_id);
        entity.aliases = self.aliases;
        entity.properties = self.properties;
        entity
    }
}

fn default_patterns() -> Vec<EntityPattern> {
    let rule = |pattern: &str,
                entity_type: EntityType,
                base_confidence: f64,
                name_fn: fn(&Captures) -> Option<(String, Vec<String>)>,
                properties_fn: Option<fn(&Captures) -> HashMap<String, String>>| {
        EntityPattern {
            pattern: Regex::new(pattern).expect("static pattern"),
            entity_type,
            base_confidence,
            name_fn,
            properties_fn,
        }
    };

    vec![
        // People.
        rule(r"我叫([\p{Han}]{2,4})", EntityType::Person, 0.9, plain_name, None),
        rule(r"我是([\p{Han}]{2,4})", EntityType::Person, 0.7, plain_name, None),
        rule(
            r"(?i)my name is ([A-Za-z]+)",
            EntityType::Person,
            0.9,
            plain_name,
            None,
        ),
        rule(
            r"([\p{Han}]{2,3})(?:先生|女士|老师|同学)",
            EntityType::Person,
            0.8,
            plain_name,
            None,
        ),
        // Organizations.
        rule(
            r"在([\p{Han}A-Za-z0-9]{2,12}?)(公司|科技|集团|银行|大学|学校)(?:工作|上班)",
            EntityType::Organization,
            0.85,
            org_name,
            None,
        ),
        rule(
            r"(?i)works? at ([A-Z][A-Za-z0-9]*(?: [A-Z][A-Za-z0-9]*)*)",
            EntityType::Organization,
            0.8,
            plain_name,
            None,
        ),
        // Locations.
        rule(r"住在([\p{Han}]{2,8})", EntityType::Location, 0.85, plain_name, None),
        rule(
            r"去了?([\p{Han}]{2,6})(?:旅游|旅行|出差)",
            EntityType::Location,
            0.7,
            plain_name,
            None,
        ),
        rule(
            r"(?i)lives? in ([A-Z][a-z]+)",
            EntityType::Location,
            0.8,
            plain_name,
            None,
        ),
        // Preferences; the positive form must not fire inside 不喜欢.
        rule(
            r"(?:^|[^不])(?:喜欢|爱好|热爱)([A-Za-z0-9]+|[\p{Han}]{1,8})",
            EntityType::Preference,
            0.75,
            plain_name,
            Some(positive_preference_props),
        ),
        rule(
            r"(?:讨厌|不喜欢)([A-Za-z0-9]+|[\p{Han}]{1,8})",
            EntityType::Preference,
            0.75,
            plain_name,
            Some(negative_preference_props),
        ),
        rule(
            r"(?i)i (?:like|love|enjoy) ([a-z0-9]+)",
            EntityType::Preference,
            0.7,
            plain_name,
            Some(positive_preference_props),
        ),
        // Skills.
        rule(
            r"(?:擅长|精通)([\p{Han}A-Za-z0-9+#]{1,12})",
            EntityType::Skill,
            0.7,
            plain_name,
            None,
        ),
        rule(
            r"(?i)skilled (?:in|at) ([a-z0-9+#]+)",
            EntityType::Skill,
            0.7,
            plain_name,
            None,
        ),
        // Times.
        rule(
            r"(\d{4}年\d{1,2}月(?:\d{1,2}日)?|\d{4}-\d{1,2}-\d{1,2}|昨天|今天|明天|前天|后天|去年|今年|明年|上周|下周|上个月|下个月)",
            EntityType::Time,
            0.9,
            plain_name,
            None,
        ),
        // Events.
        rule(
            r"(会议|面试|婚礼|生日|聚会|发布会)",
            EntityType::Event,
            0.6,
            whole_match_name,
            None,
        ),
    ]
}
