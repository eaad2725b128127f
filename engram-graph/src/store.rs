//! SQLite persistence for entities and relations.
//!
//! All writes run through one global chain; every call carries a timeout
//! that interrupts the running statement. Relation triples upsert in
//! place and entity deletion cascades to relations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle, OptionalExtension};
use tracing::debug;

use engram_core::errors::{EngramResult, GraphError};
use engram_core::graph::{
    EntityType, GraphEntity, GraphMetadata, GraphRelation, RelationSource, RelationType, SourceRef,
    TemporalSpan,
};

const QUERY_TIMEOUT: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Filter for entity queries.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub user_id: Option<String>,
    pub entity_type: Option<EntityType>,
    pub name: Option<String>,
    pub limit: Option<usize>,
}

/// Filter for relation queries.
#[derive(Debug, Clone, Default)]
pub struct RelationFilter {
    pub user_id: Option<String>,
    pub relation_type: Option<RelationType>,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    pub limit: Option<usize>,
}

/// SQLite-backed graph store.
pub struct GraphStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: InterruptHandle,
    /// Global write chain; graph mutations are serialized.
    write_lock: tokio::sync::Mutex<()>,
}

impl GraphStore {
    /// Open (or create) the graph database at `path`.
    pub async fn open(path: PathBuf) -> EngramResult<Self> {
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            }
            let conn = Connection::open(&path)?;
            Self::create_schema(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| GraphError::SqlFailed {
            message: e.to_string(),
        })?
        .map_err(|e| GraphError::SqlFailed {
            message: e.to_string(),
        })?;

        Ok(Self::from_connection(conn))
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> EngramResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| GraphError::SqlFailed {
            message: e.to_string(),
        })?;
        Self::create_schema(&conn).map_err(|e| GraphError::SqlFailed {
            message: e.to_string(),
        })?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS entities (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL,
                name              TEXT NOT NULL,
                entity_type       TEXT NOT NULL,
                aliases           TEXT NOT NULL DEFAULT '[]',
                properties        TEXT NOT NULL DEFAULT '{}',
                confidence        REAL NOT NULL,
                source_memory_id  TEXT NOT NULL,
                source_timestamp  TEXT NOT NULL,
                access_count      INTEGER NOT NULL DEFAULT 0,
                last_accessed     TEXT NOT NULL,
                importance        REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entities_user_name ON entities(user_id, name);
            CREATE INDEX IF NOT EXISTS idx_entities_user_type ON entities(user_id, entity_type);

            CREATE TABLE IF NOT EXISTS relations (
                id                TEXT PRIMARY KEY,
                source_id         TEXT NOT NULL,
                target_id         TEXT NOT NULL,
                relation_type     TEXT NOT NULL,
                properties        TEXT NOT NULL DEFAULT '{}',
                confidence        REAL NOT NULL,
                timestamp         TEXT NOT NULL,
                start_time        TEXT,
                end_time          TEXT,
                source_memory_id  TEXT NOT NULL,
                user_id           TEXT NOT NULL,
                UNIQUE (source_id, relation_type, target_id),
                FOREIGN KEY (source_id) REFERENCES entities(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES entities(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id);
            CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);
            CREATE INDEX IF NOT EXISTS idx_relations_user_type ON relations(user_id, relation_type);
            ",
        )
    }

    async fn run<T, F>(&self, timeout: Duration, f: F) -> EngramResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(GraphError::SqlFailed {
                message: e.to_string(),
            }
            .into()),
            Ok(Err(join)) => Err(GraphError::SqlFailed {
                message: join.to_string(),
            }
            .into()),
            Err(_) => {
                self.interrupt.interrupt();
                Err(GraphError::Timeout {
                    millis: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    /// Insert or update an entity by id.
    pub async fn upsert_entity(&self, entity: &GraphEntity) -> EngramResult<()> {
        let _guard = self.write_lock.lock().await;
        let e = entity.clone();
        self.run(WRITE_TIMEOUT, move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO entities
                 (id, user_id, name, entity_type, aliases, properties, confidence,
                  source_memory_id, source_timestamp, access_count, last_accessed, importance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    e.id,
                    e.metadata.user_id,
                    e.name,
                    type_to_str(e.entity_type),
                    serde_json::to_string(&e.aliases).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&e.properties).unwrap_or_else(|_| "{}".into()),
                    e.confidence,
                    e.source.memory_id,
                    e.source.timestamp.to_rfc3339(),
                    e.metadata.access_count as i64,
                    e.metadata.last_accessed.to_rfc3339(),
                    e.metadata.importance,
                ],
            )?;
            Ok(())
        })
        .await?;
        debug!(id = %entity.id, name = %entity.name, "entity upserted");
        Ok(())
    }

    /// Insert or update a relation; the `(source, type, target)` triple
    /// updates in place, keeping the original relation id.
    pub async fn upsert_relation(&self, relation: &GraphRelation) -> EngramResult<()> {
        let _guard = self.write_lock.lock().await;
        let r = relation.clone();
        self.run(WRITE_TIMEOUT, move |conn| {
            conn.execute(
                "INSERT INTO relations
                 (id, source_id, target_id, relation_type, properties, confidence,
                  timestamp, start_time, end_time, source_memory_id, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (source_id, relation_type, target_id) DO UPDATE SET
                    properties = excluded.properties,
                    confidence = excluded.confidence,
                    timestamp = excluded.timestamp,
                    start_time = excluded.start_time,
                    end_time = excluded.end_time,
                    source_memory_id = excluded.source_memory_id",
                rusqlite::params![
                    r.id,
                    r.source_id,
                    r.target_id,
                    relation_type_to_str(r.relation_type),
                    serde_json::to_string(&r.properties).unwrap_or_else(|_| "{}".into()),
                    r.confidence,
                    r.temporal.timestamp.to_rfc3339(),
                    r.temporal.start_time.map(|t| t.to_rfc3339()),
                    r.temporal.end_time.map(|t| t.to_rfc3339()),
                    r.source.memory_id,
                    r.source.user_id,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Delete an entity; its relations cascade.
    pub async fn delete_entity(&self, id: &str) -> EngramResult<bool> {
        let _guard = self.write_lock.lock().await;
        let id = id.to_string();
        let deleted = self
            .run(WRITE_TIMEOUT, move |conn| {
                conn.execute("DELETE FROM entities WHERE id = ?1", [&id])
            })
            .await?;
        Ok(deleted > 0)
    }

    pub async fn delete_relation(&self, id: &str) -> EngramResult<bool> {
        let _guard = self.write_lock.lock().await;
        let id = id.to_string();
        let deleted = self
            .run(WRITE_TIMEOUT, move |conn| {
                conn.execute("DELETE FROM relations WHERE id = ?1", [&id])
            })
            .await?;
        Ok(deleted > 0)
    }

    pub async fn get_entity(&self, id: &str) -> EngramResult<Option<GraphEntity>> {
        let id = id.to_string();
        self.run(QUERY_TIMEOUT, move |conn| {
            conn.query_row("SELECT * FROM entities WHERE id = ?1", [&id], row_to_entity)
                .optional()
        })
        .await
    }

    /// Find an entity by `(user, type, case-insensitive name)`, the
    /// disambiguation key used at extraction time.
    pub async fn find_entity(
        &self,
        user_id: &str,
        entity_type: EntityType,
        name: &str,
    ) -> EngramResult<Option<GraphEntity>> {
        let user_id = user_id.to_string();
        let type_str = type_to_str(entity_type).to_string();
        let name = name.to_lowercase();
        self.run(QUERY_TIMEOUT, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM entities WHERE user_id = ?1 AND entity_type = ?2",
            )?;
            let rows = stmt.query_map([&user_id, &type_str], row_to_entity)?;
            for row in rows {
                let entity = row?;
                if entity.name.to_lowercase() == name
                    || entity.aliases.iter().any(|a| a.to_lowercase() == name)
                {
                    return Ok(Some(entity));
                }
            }
            Ok(None)
        })
        .await
    }

    /// Query entities by filter.
    pub async fn query_entities(&self, filter: &EntityFilter) -> EngramResult<Vec<GraphEntity>> {
        let filter = filter.clone();
        self.run(QUERY_TIMEOUT, move |conn| {
            let mut sql = "SELECT * FROM entities WHERE 1=1".to_string();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            if let Some(user) = &filter.user_id {
                params.push(Box::new(user.clone()));
                sql.push_str(&format!(" AND user_id = ?{}", params.len()));
            }
            if let Some(t) = filter.entity_type {
                params.push(Box::new(type_to_str(t).to_string()));
                sql.push_str(&format!(" AND entity_type = ?{}", params.len()));
            }
            if let Some(name) = &filter.name {
                params.push(Box::new(format!("%{name}%")));
                sql.push_str(&format!(" AND name LIKE ?{}", params.len()));
            }
            sql.push_str(" ORDER BY importance DESC");
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(param_refs.as_slice(), row_to_entity)?;
            rows.collect()
        })
        .await
    }

    /// Query relations by filter.
    pub async fn query_relations(
        &self,
        filter: &RelationFilter,
    ) -> EngramResult<Vec<GraphRelation>> {
        let filter = filter.clone();
        self.run(QUERY_TIMEOUT, move |conn| {
            let mut sql = "SELECT * FROM relations WHERE 1=1".to_string();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            if let Some(user) = &filter.user_id {
                params.push(Box::new(user.clone()));
                sql.push_str(&format!(" AND user_id = ?{}", params.len()));
            }
            if let Some(t) = filter.relation_type {
                params.push(Box::new(relation_type_to_str(t).to_string()));
                sql.push_str(&format!(" AND relation_type = ?{}", params.len()));
            }
            if let Some(source) = &filter.source_id {
                params.push(Box::new(source.clone()));
                sql.push_str(&format!(" AND source_id = ?{}", params.len()));
            }
            if let Some(target) = &filter.target_id {
                params.push(Box::new(target.clone()));
                sql.push_str(&format!(" AND target_id = ?{}", params.len()));
            }
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(param_refs.as_slice(), row_to_relation)?;
            rows.collect()
        })
        .await
    }

    /// Merge entities: the highest-confidence entity survives, absorbing
    /// the others' names, aliases, properties, and relations.
    pub async fn merge_entities(&self, ids: &[String]) -> EngramResult<Option<GraphEntity>> {
        if ids.len() < 2 {
            return Ok(None);
        }

        let mut entities = Vec::new();
        for id in ids {
            match self.get_entity(id).await? {
                Some(e) => entities.push(e),
                None => {
                    return Err(GraphError::UnknownEntity { id: id.clone() }.into());
                }
            }
        }

        entities.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut survivor = entities[0].clone();
        let losers: Vec<GraphEntity> = entities.into_iter().skip(1).collect();

        for loser in &losers {
            if !survivor.answers_to(&loser.name) {
                survivor.aliases.push(loser.name.clone());
            }
            for alias in &loser.aliases {
                if !survivor.answers_to(alias) {
                    survivor.aliases.push(alias.clone());
                }
            }
            for (k, v) in &loser.properties {
                survivor.properties.entry(k.clone()).or_insert_with(|| v.clone());
            }
            survivor.metadata.access_count += loser.metadata.access_count;
            survivor.metadata.importance = survivor.metadata.importance.max(loser.metadata.importance);
        }

        // Re-point relations, then drop the losers (cascade would delete
        // the re-pointed rows otherwise).
        let _guard = self.write_lock.lock().await;
        let survivor_id = survivor.id.clone();
        let loser_ids: Vec<String> = losers.iter().map(|l| l.id.clone()).collect();
        self.run(WRITE_TIMEOUT, move |conn| {
            for loser_id in &loser_ids {
                conn.execute(
                    "UPDATE OR IGNORE relations SET source_id = ?1 WHERE source_id = ?2",
                    [&survivor_id, loser_id],
                )?;
                conn.execute(
                    "UPDATE OR IGNORE relations SET target_id = ?1 WHERE target_id = ?2",
                    [&survivor_id, loser_id],
                )?;
                // Triple collisions that survived the OR IGNORE are duplicates.
                conn.execute("DELETE FROM relations WHERE source_id = ?1 OR target_id = ?1", [loser_id])?;
                conn.execute("DELETE FROM entities WHERE id = ?1", [loser_id])?;
            }
            Ok(())
        })
        .await?;
        drop(_guard);

        self.upsert_entity(&survivor).await?;
        Ok(Some(survivor))
    }

    /// Every entity (optionally for one user); used to rebuild the
    /// in-memory index.
    pub async fn all_entities(&self, user_id: Option<&str>) -> EngramResult<Vec<GraphEntity>> {
        self.query_entities(&EntityFilter {
            user_id: user_id.map(String::from),
            ..Default::default()
        })
        .await
    }

    pub async fn all_relations(&self, user_id: Option<&str>) -> EngramResult<Vec<GraphRelation>> {
        self.query_relations(&RelationFilter {
            user_id: user_id.map(String::from),
            ..Default::default()
        })
        .await
    }
}

fn type_to_str(t: EntityType) -> &'static str {
    match t {
        EntityType::Person => "PERSON",
        EntityType::Organization => "ORGANIZATION",
        EntityType::Location => "LOCATION",
        EntityType::Event => "EVENT",
        EntityType::Concept => "CONCEPT",
        EntityType::Product => "PRODUCT",
        EntityType::Time => "TIME",
        EntityType::Skill => "SKILL",
        EntityType::Preference => "PREFERENCE",
    }
}

fn str_to_type(s: &str) -> EntityType {
    match s {
        "PERSON" => EntityType::Person,
        "ORGANIZATION" => EntityType::Organization,
        "LOCATION" => EntityType::Location,
        "EVENT" => EntityType::Event,
        "PRODUCT" => EntityType::Product,
        "TIME" => EntityType::Time,
        "SKILL" => EntityType::Skill,
        "PREFERENCE" => EntityType::Preference,
        _ => EntityType::Concept,
    }
}

fn relation_type_to_str(t: RelationType) -> &'static str {
    match t {
        RelationType::WorksAt => "WORKS_AT",
        RelationType::LocatedIn => "LOCATED_IN",
        RelationType::Knows => "KNOWS",
        RelationType::Likes => "LIKES",
        RelationType::Dislikes => "DISLIKES",
        RelationType::HasSkill => "HAS_SKILL",
        RelationType::ParticipatedIn => "PARTICIPATED_IN",
        RelationType::RelatedTo => "RELATED_TO",
        RelationType::Owns => "OWNS",
        RelationType::HappenedAt => "HAPPENED_AT",
    }
}

fn str_to_relation_type(s: &str) -> RelationType {
    match s {
        "WORKS_AT" => RelationType::WorksAt,
        "LOCATED_IN" => RelationType::LocatedIn,
        "KNOWS" => RelationType::Knows,
        "LIKES" => RelationType::Likes,
        "DISLIKES" => RelationType::Dislikes,
        "HAS_SKILL" => RelationType::HasSkill,
        "PARTICIPATED_IN" => RelationType::ParticipatedIn,
        "OWNS" => RelationType::Owns,
        "HAPPENED_AT" => RelationType::HappenedAt,
        _ => RelationType::RelatedTo,
    }
}

fn parse_time(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEntity> {
    let aliases: String = row.get("aliases")?;
    let properties: String = row.get("properties")?;
    let type_str: String = row.get("entity_type")?;
    let source_ts: String = row.get("source_timestamp")?;
    let last_accessed: String = row.get("last_accessed")?;

    Ok(GraphEntity {
        id: row.get("id")?,
        name: row.get("name")?,
        entity_type: str_to_type(&type_str),
        aliases: serde_json::from_str(&aliases).unwrap_or_default(),
        properties: serde_json::from_str::<HashMap<String, String>>(&properties)
            .unwrap_or_default(),
        confidence: row.get("confidence")?,
        source: SourceRef {
            memory_id: row.get("source_memory_id")?,
            timestamp: parse_time(source_ts),
        },
        metadata: GraphMetadata {
            user_id: row.get("user_id")?,
            access_count: row.get::<_, i64>("access_count")? as u64,
            last_accessed: parse_time(last_accessed),
            importance: row.get("importance")?,
        },
    })
}

fn row_to_relation(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphRelation> {
    let properties: String = row.get("properties")?;
    let type_str: String = row.get("relation_type")?;
    let timestamp: String = row.get("timestamp")?;
    let start_time: Option<String> = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;

    Ok(GraphRelation {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        relation_type: str_to_relation_type(&type_str),
        properties: serde_json::from_str::<HashMap<String, String>>(&properties)
            .unwrap_or_default(),
        confidence: row.get("confidence")?,
        temporal: TemporalSpan {
            timestamp: parse_time(timestamp),
            start_time: start_time.map(parse_time),
            end_time: end_time.map(parse_time),
        },
        source: RelationSource {
            memory_id: row.get("source_memory_id")?,
            user_id: row.get("user_id")?,
        },
    })
}
