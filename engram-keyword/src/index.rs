use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{Connection, InterruptHandle};
use tracing::{debug, warn};

use engram_core::errors::{EngramResult, IndexError};
use engram_core::memory::{MemoryRecord, MemoryType};

use crate::normalize::normalize_text;

/// Default per-call timeouts.
const QUERY_TIMEOUT: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Search options for the keyword index.
#[derive(Debug, Clone)]
pub struct KeywordSearchOptions {
    pub user_id: String,
    pub types: Option<Vec<MemoryType>>,
    pub limit: usize,
    pub min_score: f64,
}

impl KeywordSearchOptions {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            types: None,
            limit: engram_core::constants::DEFAULT_MAX_RESULTS,
            min_score: 0.0,
        }
    }
}

/// A keyword hit with its normalized score in [0, 1].
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub memory_id: String,
    pub score: f64,
}

/// Keyword index over SQLite. FTS5 when available, LIKE-only otherwise.
///
/// Writes for a given user are serialized through a per-user lock so
/// parallel indexing across users never contends on the same chain;
/// every call carries a timeout that interrupts the running statement.
pub struct KeywordIndex {
    conn: Arc<Mutex<Connection>>,
    interrupt: InterruptHandle,
    fts_available: bool,
    user_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    query_timeout: Duration,
    write_timeout: Duration,
}

impl KeywordIndex {
    /// Open (or create) the index database at `path`.
    pub async fn open(path: PathBuf) -> EngramResult<Self> {
        let (conn, fts_available) = tokio::task::spawn_blocking(move || -> rusqlite::Result<_> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
                })?;
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            let fts = Self::create_schema(&conn)?;
            Ok((conn, fts))
        })
        .await
        .map_err(|e| IndexError::SqlFailed {
            message: e.to_string(),
        })?
        .map_err(|e| IndexError::SqlFailed {
            message: e.to_string(),
        })?;

        Ok(Self::from_connection(conn, fts_available))
    }

    /// In-memory index for tests.
    pub fn open_in_memory() -> EngramResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| IndexError::SqlFailed {
            message: e.to_string(),
        })?;
        let fts = Self::create_schema(&conn).map_err(|e| IndexError::SqlFailed {
            message: e.to_string(),
        })?;
        Ok(Self::from_connection(conn, fts))
    }

    fn from_connection(conn: Connection, fts_available: bool) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            fts_available,
            user_locks: DashMap::new(),
            query_timeout: QUERY_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }

    /// Create the FTS5 table, degrading to a plain table when the build
    /// lacks FTS5.
    fn create_schema(conn: &Connection) -> rusqlite::Result<bool> {
        let fts = conn
            .execute_batch(
                "
                CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
                    memory_id UNINDEXED,
                    user_id UNINDEXED,
                    type UNINDEXED,
                    content,
                    importance UNINDEXED,
                    timestamp UNINDEXED
                );
                ",
            )
            .is_ok();

        if !fts {
            warn!("FTS5 unavailable; keyword index degrades to LIKE matching");
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS memory_keywords (
                    memory_id  TEXT PRIMARY KEY,
                    user_id    TEXT NOT NULL,
                    type       TEXT NOT NULL,
                    content    TEXT NOT NULL,
                    importance REAL NOT NULL,
                    timestamp  TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_keywords_user ON memory_keywords(user_id);
                ",
            )?;
        }
        Ok(fts)
    }

    fn table(&self) -> &'static str {
        if self.fts_available {
            "memory_fts"
        } else {
            "memory_keywords"
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run a closure against the connection under a timeout. On timeout
    /// the in-flight statement is interrupted and the caller receives
    /// `SQL_TIMEOUT`.
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
            Ok(Ok(Err(e))) => Err(IndexError::SqlFailed {
                message: e.to_string(),
            }
            .into()),
            Ok(Err(join)) => Err(IndexError::SqlFailed {
                message: join.to_string(),
            }
            .into()),
            Err(_) => {
                self.interrupt.interrupt();
                Err(IndexError::Timeout {
                    millis: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    /// Index (or re-index) one record.
    pub async fn index(&self, record: &MemoryRecord) -> EngramResult<()> {
        let lock = self.user_lock(&record.metadata.user_id).await;
        let _guard = lock.lock().await;
        self.write_row(record).await
    }

    /// Index a batch, serialized per user in one pass each.
    pub async fn index_batch(&self, records: &[MemoryRecord]) -> EngramResult<()> {
        let mut by_user: std::collections::HashMap<&str, Vec<&MemoryRecord>> =
            std::collections::HashMap::new();
        for record in records {
            by_user
                .entry(record.metadata.user_id.as_str())
                .or_default()
                .push(record);
        }

        for (user_id, group) in by_user {
            let lock = self.user_lock(user_id).await;
            let _guard = lock.lock().await;
            for record in group {
                self.write_row(record).await?;
            }
        }
        Ok(())
    }

    async fn write_row(&self, record: &MemoryRecord) -> EngramResult<()> {
        let table = self.table();
        let memory_id = record.id.clone();
        let user_id = record.metadata.user_id.clone();
        let type_str = record.metadata.memory_type.as_str().to_string();
        let content = normalize_text(&record.content);
        let importance = record.metadata.importance;
        let timestamp = record.metadata.timestamp.to_rfc3339();

        self.run(self.write_timeout, move |conn| {
            conn.execute(
                &format!("DELETE FROM {table} WHERE memory_id = ?1"),
                [&memory_id],
            )?;
            conn.execute(
                &format!(
                    "INSERT INTO {table} (memory_id, user_id, type, content, importance, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                rusqlite::params![memory_id, user_id, type_str, content, importance, timestamp],
            )?;
            Ok(())
        })
        .await?;
        debug!(id = %record.id, "indexed record for keyword search");
        Ok(())
    }

    /// Remove a record from the index. Returns whether a row existed.
    pub async fn remove(&self, memory_id: &str) -> EngramResult<bool> {
        let table = self.table();
        let id = memory_id.to_string();
        let deleted = self
            .run(self.write_timeout, move |conn| {
                conn.execute(&format!("DELETE FROM {table} WHERE memory_id = ?1"), [&id])
            })
            .await?;
        Ok(deleted > 0)
    }

    /// Keyword search. Scores are the fraction of query keywords present
    /// in a record's normalized content, so they land in [0, 1].
    pub async fn search(
        &self,
        query: &str,
        options: &KeywordSearchOptions,
    ) -> EngramResult<Vec<KeywordHit>> {
        let normalized = normalize_text(query);
        let mut keywords: Vec<String> = normalized.split_whitespace().map(String::from).collect();
        keywords.sort();
        keywords.dedup();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.table();
        let use_match = self.fts_available && keywords.iter().all(|k| is_match_safe(k));
        let user_id = options.user_id.clone();
        let keywords_for_sql = keywords.clone();

        let rows: Vec<(String, String, String)> = self
            .run(self.query_timeout, move |conn| {
                let mut predicates: Vec<String> = Vec::new();
                let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
                    vec![Box::new(user_id.clone())];

                for keyword in &keywords_for_sql {
                    params.push(Box::new(format!("%{keyword}%")));
                    predicates.push(format!("content LIKE ?{}", params.len()));
                }
                if use_match {
                    params.push(Box::new(keywords_for_sql.join(" OR ")));
                    predicates.push(format!(
                        "rowid IN (SELECT rowid FROM memory_fts WHERE memory_fts MATCH ?{})",
                        params.len()
                    ));
                }

                let sql = format!(
                    "SELECT memory_id, type, content FROM {table}
                     WHERE user_id = ?1 AND ({})",
                    predicates.join(" OR ")
                );

                let mut stmt = conn.prepare(&sql)?;
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mapped = stmt.query_map(param_refs.as_slice(), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                mapped.collect()
            })
            .await?;

        let total = keywords.len() as f64;
        let mut hits: Vec<KeywordHit> = rows
            .into_iter()
            .filter(|(_, type_str, _)| match &options.types {
                Some(types) => type_str
                    .parse::<MemoryType>()
                    .map(|t| types.contains(&t))
                    .unwrap_or(false),
                None => true,
            })
            .map(|(memory_id, _, content)| {
                let matched = keywords.iter().filter(|k| content.contains(k.as_str())).count();
                KeywordHit {
                    memory_id,
                    score: matched as f64 / total,
                }
            })
            .filter(|hit| hit.score > 0.0 && hit.score >= options.min_score)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.limit);
        Ok(hits)
    }
}

/// A keyword is safe inside an FTS MATCH expression when it has no
/// operators or quoting: plain alphanumerics and CJK only.
fn is_match_safe(keyword: &str) -> bool {
    keyword.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(c as u32,
                0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF
                | 0x3040..=0x30FF | 0xAC00..=0xD7AF)
    })
}
