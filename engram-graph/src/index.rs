//! In-memory adjacency index over the graph store.
//!
//! Rebuildable losslessly from the store by id; every mutation clears
//! the path cache. BFS queries never visit an entity twice on one path.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use engram_core::graph::{EntityType, GraphEntity, GraphRelation};

/// Traversal direction for neighbor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// An adjacent entity with its connecting relation.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub entity: GraphEntity,
    pub relation: GraphRelation,
}

/// A path between two entities, scored by
/// `mean(entity importance) * mean(relation confidence) / (1 + length)`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphPath {
    pub entities: Vec<GraphEntity>,
    pub relations: Vec<GraphRelation>,
    pub score: f64,
}

impl GraphPath {
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// A subgraph extracted around a center entity.
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub entities: Vec<GraphEntity>,
    pub relations: Vec<GraphRelation>,
}

/// Adjacency-list index. Mutations go through the store first; the index
/// mirrors them and must be rebuilt from the store after a restart.
#[derive(Default)]
pub struct GraphIndex {
    entities: HashMap<String, GraphEntity>,
    /// Relations leaving an entity, keyed by source id.
    outgoing: HashMap<String, Vec<GraphRelation>>,
    /// Relations entering an entity, keyed by target id.
    incoming: HashMap<String, Vec<GraphRelation>>,
    by_name: HashMap<String, HashSet<String>>,
    by_type: HashMap<EntityType, HashSet<String>>,
    /// `"src:tgt:depth"` → cached paths; cleared on any mutation.
    path_cache: Mutex<HashMap<String, Vec<GraphPath>>>,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a store snapshot. Building twice over the same data
    /// yields the same index.
    pub fn rebuild(&mut self, entities: Vec<GraphEntity>, relations: Vec<GraphRelation>) {
        self.entities.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.by_name.clear();
        self.by_type.clear();
        self.path_cache.lock().clear();

        for entity in entities {
            self.add_entity(entity);
        }
        for relation in relations {
            self.add_relation(relation);
        }
        debug!(
            entities = self.entities.len(),
            "graph index rebuilt"
        );
    }

    pub fn add_entity(&mut self, entity: GraphEntity) {
        self.by_name
            .entry(entity.name.to_lowercase())
            .or_default()
            .insert(entity.id.clone());
        for alias in &entity.aliases {
            self.by_name
                .entry(alias.to_lowercase())
                .or_default()
                .insert(entity.id.clone());
        }
        self.by_type
            .entry(entity.entity_type)
            .or_default()
            .insert(entity.id.clone());
        self.entities.insert(entity.id.clone(), entity);
        self.path_cache.lock().clear();
    }

    pub fn add_relation(&mut self, relation: GraphRelation) {
        // Ignore edges whose endpoints are unknown; the store is the
        // source of truth for referential integrity.
        if !self.entities.contains_key(&relation.source_id)
            || !self.entities.contains_key(&relation.target_id)
        {
            return;
        }
        let upsert = |list: &mut Vec<GraphRelation>, relation: &GraphRelation| {
            if let Some(existing) = list.iter_mut().find(|r| {
                r.source_id == relation.source_id
                    && r.target_id == relation.target_id
                    && r.relation_type == relation.relation_type
            }) {
                *existing = relation.clone();
            } else {
                list.push(relation.clone());
            }
        };
        upsert(
            self.outgoing.entry(relation.source_id.clone()).or_default(),
            &relation,
        );
        upsert(
            self.incoming.entry(relation.target_id.clone()).or_default(),
            &relation,
        );
        self.path_cache.lock().clear();
    }

    pub fn remove_entity(&mut self, id: &str) {
        let Some(entity) = self.entities.remove(id) else {
            return;
        };
        if let Some(ids) = self.by_name.get_mut(&entity.name.to_lowercase()) {
            ids.remove(id);
        }
        for alias in &entity.aliases {
            if let Some(ids) = self.by_name.get_mut(&alias.to_lowercase()) {
                ids.remove(id);
            }
        }
        if let Some(ids) = self.by_type.get_mut(&entity.entity_type) {
            ids.remove(id);
        }
        // Cascade: drop every edge touching the entity.
        self.outgoing.remove(id);
        self.incoming.remove(id);
        for list in self.outgoing.values_mut() {
            list.retain(|r| r.target_id != id);
        }
        for list in self.incoming.values_mut() {
            list.retain(|r| r.source_id != id);
        }
        self.path_cache.lock().clear();
    }

    pub fn remove_relation(&mut self, relation_id: &str) {
        for list in self.outgoing.values_mut() {
            list.retain(|r| r.id != relation_id);
        }
        for list in self.incoming.values_mut() {
            list.retain(|r| r.id != relation_id);
        }
        self.path_cache.lock().clear();
    }

    pub fn entity(&self, id: &str) -> Option<&GraphEntity> {
        self.entities.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Entity ids matching a (case-insensitive) name or alias.
    pub fn ids_by_name(&self, name: &str) -> Vec<String> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids_by_type(&self, entity_type: EntityType) -> Vec<String> {
        self.by_type
            .get(&entity_type)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entities sorted by importance, highest first.
    pub fn top_entities(&self, limit: usize) -> Vec<GraphEntity> {
        let mut all: Vec<GraphEntity> = self.entities.values().cloned().collect();
        all.sort_by(|a, b| {
            b.metadata
                .importance
                .partial_cmp(&a.metadata.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all.truncate(limit);
        all
    }

    /// Adjacent entities with their connecting relations.
    pub fn neighbors(&self, id: &str, direction: Direction) -> Vec<Neighbor> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(relations) = self.outgoing.get(id) {
                for relation in relations {
                    if let Some(entity) = self.entities.get(&relation.target_id) {
                        out.push(Neighbor {
                            entity: entity.clone(),
                            relation: relation.clone(),
                        });
                    }
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(relations) = self.incoming.get(id) {
                for relation in relations {
                    if let Some(entity) = self.entities.get(&relation.source_id) {
                        out.push(Neighbor {
                            entity: entity.clone(),
                            relation: relation.clone(),
                        });
                    }
                }
            }
        }
        out
    }

    /// BFS path search from `src` to `tgt`, bounded by `max_depth`
    /// relations. No entity appears twice on a path; `src == tgt` and
    /// depth 0 yield nothing. Results are cached until the next graph
    /// mutation and sorted by score, descending.
    pub fn find_paths(&self, src: &str, tgt: &str, max_depth: usize) -> Vec<GraphPath> {
        if max_depth == 0 || src == tgt {
            return Vec::new();
        }
        if !self.entities.contains_key(src) || !self.entities.contains_key(tgt) {
            return Vec::new();
        }

        let cache_key = format!("{src}:{tgt}:{max_depth}");
        if let Some(cached) = self.path_cache.lock().get(&cache_key) {
            return cached.clone();
        }

        let mut paths = Vec::new();
        // Queue of partial paths: (entity ids visited, relations taken).
        let mut queue: VecDeque<(Vec<String>, Vec<GraphRelation>)> = VecDeque::new();
        queue.push_back((vec![src.to_string()], Vec::new()));

        while let Some((visited, relations)) = queue.pop_front() {
            if relations.len() >= max_depth {
                continue;
            }
            let current = visited.last().expect("path is never empty");
            if let Some(edges) = self.outgoing.get(current) {
                for edge in edges {
                    if visited.contains(&edge.target_id) {
                        continue;
                    }
                    let mut next_visited = visited.clone();
                    next_visited.push(edge.target_id.clone());
                    let mut next_relations = relations.clone();
                    next_relations.push(edge.clone());

                    if edge.target_id == tgt {
                        paths.push(self.materialize(&next_visited, next_relations));
                    } else {
                        queue.push_back((next_visited, next_relations));
                    }
                }
            }
        }

        paths.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        self.path_cache.lock().insert(cache_key, paths.clone());
        paths
    }

    fn materialize(&self, visited: &[String], relations: Vec<GraphRelation>) -> GraphPath {
        let entities: Vec<GraphEntity> = visited
            .iter()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect();
        let mean_importance = if entities.is_empty() {
            0.0
        } else {
            entities.iter().map(|e| e.metadata.importance).sum::<f64>() / entities.len() as f64
        };
        let mean_confidence = if relations.is_empty() {
            0.0
        } else {
            relations.iter().map(|r| r.confidence).sum::<f64>() / relations.len() as f64
        };
        let score = mean_importance * mean_confidence / (1.0 + relations.len() as f64);
        GraphPath {
            entities,
            relations,
            score,
        }
    }

    /// BFS to radius `radius`, collecting reached entities and their
    /// connecting relations (both directions).
    pub fn extract_subgraph(&self, center: &str, radius: usize) -> Subgraph {
        let Some(center_entity) = self.entities.get(center) else {
            return Subgraph::default();
        };

        let mut seen: HashSet<String> = HashSet::from([center.to_string()]);
        let mut relations: HashMap<String, GraphRelation> = HashMap::new();
        let mut frontier: Vec<String> = vec![center.to_string()];

        for _ in 0..radius {
            let mut next = Vec::new();
            for id in &frontier {
                for neighbor in self.neighbors(id, Direction::Both) {
                    relations
                        .entry(neighbor.relation.id.clone())
                        .or_insert(neighbor.relation);
                    if seen.insert(neighbor.entity.id.clone()) {
                        next.push(neighbor.entity.id.clone());
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        let mut entities: Vec<GraphEntity> = seen
            .iter()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect();
        // Stable output: center first, then by importance.
        entities.sort_by(|a, b| {
            (b.id == center_entity.id)
                .cmp(&(a.id == center_entity.id))
                .then(
                    b.metadata
                        .importance
                        .partial_cmp(&a.metadata.importance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        Subgraph {
            entities,
            relations: relations.into_values().collect(),
        }
    }

    /// Snapshot of the path cache size (tests and stats).
    pub fn path_cache_len(&self) -> usize {
        self.path_cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::graph::{GraphEntity, GraphRelation, RelationType};

    fn entity(name: &str) -> GraphEntity {
        GraphEntity::new(name, EntityType::Person, 0.9, "u1", "m1")
    }

    fn relation(source: &GraphEntity, target: &GraphEntity) -> GraphRelation {
        GraphRelation::new(&source.id, &target.id, RelationType::Knows, 0.8, "u1", "m1")
    }

    fn triangle() -> (GraphIndex, GraphEntity, GraphEntity, GraphEntity) {
        let (a, b, c) = (entity("a"), entity("b"), entity("c"));
        let mut index = GraphIndex::new();
        index.add_entity(a.clone());
        index.add_entity(b.clone());
        index.add_entity(c.clone());
        index.add_relation(relation(&a, &b));
        index.add_relation(relation(&b, &c));
        index.add_relation(relation(&a, &c));
        (index, a, b, c)
    }

    #[test]
    fn neighbors_respect_direction() {
        let (index, a, b, _) = triangle();
        let out = index.neighbors(&a.id, Direction::Out);
        assert_eq!(out.len(), 2);
        let inn = index.neighbors(&b.id, Direction::In);
        assert_eq!(inn.len(), 1);
        let both = index.neighbors(&b.id, Direction::Both);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn find_paths_collects_all_and_sorts_by_score() {
        let (index, a, _, c) = triangle();
        let paths = index.find_paths(&a.id, &c.id, 3);
        assert_eq!(paths.len(), 2);
        // Direct path (length 1) scores above the 2-hop path.
        assert_eq!(paths[0].len(), 1);
        assert_eq!(paths[1].len(), 2);
        assert!(paths[0].score > paths[1].score);
    }

    #[test]
    fn paths_never_repeat_entities() {
        let (index, a, _, c) = triangle();
        for path in index.find_paths(&a.id, &c.id, 5) {
            let mut ids: Vec<&str> = path.entities.iter().map(|e| e.id.as_str()).collect();
            ids.sort_unstable();
            let before = ids.len();
            ids.dedup();
            assert_eq!(ids.len(), before);
        }
    }

    #[test]
    fn self_path_and_zero_depth_yield_nothing() {
        let (index, a, _, c) = triangle();
        assert!(index.find_paths(&a.id, &a.id, 3).is_empty());
        assert!(index.find_paths(&a.id, &c.id, 0).is_empty());
    }

    #[test]
    fn depth_bound_is_respected() {
        let (index, a, _, c) = triangle();
        let paths = index.find_paths(&a.id, &c.id, 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 1);
    }

    #[test]
    fn path_cache_cleared_on_mutation() {
        let (mut index, a, _, c) = triangle();
        index.find_paths(&a.id, &c.id, 3);
        assert_eq!(index.path_cache_len(), 1);

        let d = entity("d");
        index.add_entity(d);
        assert_eq!(index.path_cache_len(), 0);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let (a, b) = (entity("a"), entity("b"));
        let r = relation(&a, &b);

        let mut first = GraphIndex::new();
        first.rebuild(vec![a.clone(), b.clone()], vec![r.clone()]);
        let mut second = GraphIndex::new();
        second.rebuild(vec![a.clone(), b.clone()], vec![r.clone()]);
        second.rebuild(vec![a.clone(), b.clone()], vec![r.clone()]);

        assert_eq!(first.entity_count(), second.entity_count());
        assert_eq!(
            first.neighbors(&a.id, Direction::Out).len(),
            second.neighbors(&a.id, Direction::Out).len()
        );
        assert_eq!(first.path_cache_len(), second.path_cache_len());
    }

    #[test]
    fn subgraph_radius_bounds_reach() {
        let (index, a, b, c) = triangle();
        let sub = index.extract_subgraph(&a.id, 1);
        assert_eq!(sub.entities.len(), 3);
        assert_eq!(sub.entities[0].id, a.id);

        let chain_a = entity("x");
        let chain_b = entity("y");
        let chain_c = entity("z");
        let mut chain = GraphIndex::new();
        chain.add_entity(chain_a.clone());
        chain.add_entity(chain_b.clone());
        chain.add_entity(chain_c.clone());
        chain.add_relation(relation(&chain_a, &chain_b));
        chain.add_relation(relation(&chain_b, &chain_c));

        let sub = chain.extract_subgraph(&chain_a.id, 1);
        assert_eq!(sub.entities.len(), 2);
        let sub = chain.extract_subgraph(&chain_a.id, 2);
        assert_eq!(sub.entities.len(), 3);
        let _ = (b, c);
    }

    #[test]
    fn remove_entity_cascades_edges() {
        let (mut index, a, b, c) = triangle();
        index.remove_entity(&b.id);
        assert!(index.entity(&b.id).is_none());
        // Only the direct a→c edge remains.
        assert_eq!(index.neighbors(&a.id, Direction::Out).len(), 1);
        assert_eq!(index.neighbors(&c.id, Direction::In).len(), 1);
    }
}
