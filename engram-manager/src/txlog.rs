//! Transaction log: ordered memory-mutating operations, each carrying
//! the pre-image needed to invert it, with named checkpoints for
//! partial rollback.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use engram_core::errors::{EngramError, EngramResult};
use engram_core::memory::MemoryRecord;
use engram_vector::VectorStore;

/// What a logged operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Add,
    Remove,
    Update,
    ResolveConflict,
}

/// One logged operation with its inverse material.
#[derive(Debug, Clone)]
pub struct Operation {
    pub op: OperationType,
    pub target_id: String,
    /// Full prior record, present for remove/update.
    pub prior: Option<MemoryRecord>,
    /// Replacement record, present for update.
    pub next: Option<MemoryRecord>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// The per-call transaction log. Commit clears it; rollback replays the
/// inverse of each operation in strict reverse order.
pub struct TransactionLog {
    id: String,
    started_at: DateTime<Utc>,
    operations: Vec<Operation>,
    /// Checkpoint name → operation-count offset.
    checkpoints: HashMap<String, usize>,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            operations: Vec::new(),
            checkpoints: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn record_add(&mut self, id: &str, metadata: Option<serde_json::Value>) {
        self.operations.push(Operation {
            op: OperationType::Add,
            target_id: id.to_string(),
            prior: None,
            next: None,
            timestamp: Utc::now(),
            metadata,
        });
    }

    pub fn record_remove(
        &mut self,
        id: &str,
        prior: MemoryRecord,
        metadata: Option<serde_json::Value>,
    ) {
        self.operations.push(Operation {
            op: OperationType::Remove,
            target_id: id.to_string(),
            prior: Some(prior),
            next: None,
            timestamp: Utc::now(),
            metadata,
        });
    }

    pub fn record_update(
        &mut self,
        id: &str,
        prior: MemoryRecord,
        next: MemoryRecord,
        metadata: Option<serde_json::Value>,
    ) {
        self.operations.push(Operation {
            op: OperationType::Update,
            target_id: id.to_string(),
            prior: Some(prior),
            next: Some(next),
            timestamp: Utc::now(),
            metadata,
        });
    }

    /// A conflict resolution that created a record (e.g. a merge
    /// product); inverted by removing it.
    pub fn record_conflict_resolution(&mut self, id: &str, metadata: Option<serde_json::Value>) {
        self.operations.push(Operation {
            op: OperationType::ResolveConflict,
            target_id: id.to_string(),
            prior: None,
            next: None,
            timestamp: Utc::now(),
            metadata,
        });
    }

    /// Store the current operation count under `name`.
    pub fn create_checkpoint(&mut self, name: &str) {
        self.checkpoints.insert(name.to_string(), self.operations.len());
    }

    pub fn checkpoint(&self, name: &str) -> Option<usize> {
        self.checkpoints.get(name).copied()
    }

    /// Roll back to a checkpoint (or to zero). Inverses replay in strict
    /// reverse order; a failing step is recorded but the remaining steps
    /// still run, and an aggregate error is returned at the end.
    ///
    /// A partial rollback trims the log to the checkpoint offset; a full
    /// rollback clears it.
    pub fn rollback(
        &mut self,
        store: &VectorStore,
        checkpoint_name: Option<&str>,
    ) -> EngramResult<usize> {
        let offset = match checkpoint_name {
            Some(name) => self.checkpoints.get(name).copied().ok_or_else(|| {
                EngramError::InputValidation {
                    reason: format!("unknown checkpoint: {name}"),
                }
            })?,
            None => 0,
        };

        let mut errors: Vec<String> = Vec::new();
        let mut reverted = 0usize;

        for operation in self.operations[offset..].iter().rev() {
            let result = match operation.op {
                OperationType::Add | OperationType::ResolveConflict => store
                    .remove(&operation.target_id)
                    .map(|_| ()),
                OperationType::Remove => match &operation.prior {
                    Some(prior) => store.insert_record(prior.clone()),
                    None => Err(EngramError::InputValidation {
                        reason: format!("remove of {} has no prior record", operation.target_id),
                    }),
                },
                OperationType::Update => match &operation.prior {
                    Some(prior) => store.update_record(prior.clone()).map(|_| ()),
                    None => Err(EngramError::InputValidation {
                        reason: format!("update of {} has no prior record", operation.target_id),
                    }),
                },
            };
            match result {
                Ok(()) => reverted += 1,
                Err(e) => {
                    error!(
                        target_id = %operation.target_id,
                        error = %e,
                        "rollback step failed"
                    );
                    errors.push(format!("{}: {e}", operation.target_id));
                }
            }
        }

        self.operations.truncate(offset);
        if offset == 0 {
            self.checkpoints.clear();
        } else {
            self.checkpoints.retain(|_, o| *o <= offset);
        }

        if errors.is_empty() {
            Ok(reverted)
        } else {
            Err(EngramError::RollbackFailed {
                reason: format!("{} step(s) failed: {}", errors.len(), errors.join("; ")),
            })
        }
    }

    /// Clear operations and checkpoints, logging the transaction id and
    /// duration.
    pub fn commit(&mut self) -> usize {
        let count = self.operations.len();
        let duration_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(
            transaction_id = %self.id,
            operations = count,
            duration_ms,
            "transaction committed"
        );
        self.operations.clear();
        self.checkpoints.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use engram_core::config::EmbeddingConfig;
    use engram_core::memory::{MemoryMetadata, MemoryType};
    use engram_embeddings::EmbeddingService;

    async fn store() -> (tempfile::TempDir, VectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(
            dir.path(),
            Arc::new(EmbeddingService::new(EmbeddingConfig::default())),
        );
        store.initialize().await.unwrap();
        (dir, store)
    }

    fn meta() -> MemoryMetadata {
        MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5)
    }

    #[tokio::test]
    async fn rollback_inverts_adds() {
        let (_dir, store) = store().await;
        let mut log = TransactionLog::new();

        let id = store.add("one", meta()).await.unwrap();
        log.record_add(&id, None);

        let reverted = log.rollback(&store, None).unwrap();
        assert_eq!(reverted, 1);
        assert_eq!(store.len(), 0);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn rollback_inverts_removes_and_updates() {
        let (_dir, store) = store().await;
        let mut log = TransactionLog::new();

        let id = store.add("original", meta()).await.unwrap();
        let original = store.get_by_id(&id).unwrap();

        let mut changed = original.clone();
        changed.metadata.importance = 0.9;
        store.update_record(changed.clone()).unwrap();
        log.record_update(&id, original.clone(), changed, None);

        let removed = store.get_by_id(&id).unwrap();
        store.remove(&id).unwrap();
        log.record_remove(&id, removed, None);

        log.rollback(&store, None).unwrap();
        let restored = store.get_by_id(&id).unwrap();
        assert!((restored.metadata.importance - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn checkpoint_rollback_preserves_earlier_operations() {
        let (_dir, store) = store().await;
        let mut log = TransactionLog::new();

        let keep = store.add("kept", meta()).await.unwrap();
        log.record_add(&keep, None);

        log.create_checkpoint("before_conflict_resolution");

        let discard = store.add("discarded", meta()).await.unwrap();
        log.record_add(&discard, None);

        log.rollback(&store, Some("before_conflict_resolution")).unwrap();

        assert!(store.get_by_id(&keep).is_some());
        assert!(store.get_by_id(&discard).is_none());
        assert_eq!(log.len(), 1);
        // The checkpoint itself survives a partial rollback.
        assert_eq!(log.checkpoint("before_conflict_resolution"), Some(1));
    }

    #[tokio::test]
    async fn unknown_checkpoint_is_an_error() {
        let (_dir, store) = store().await;
        let mut log = TransactionLog::new();
        let err = log.rollback(&store, Some("nope")).unwrap_err();
        assert_eq!(err.code(), "INPUT_VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn commit_clears_everything() {
        let (_dir, store) = store().await;
        let mut log = TransactionLog::new();
        let id = store.add("committed", meta()).await.unwrap();
        log.record_add(&id, None);
        log.create_checkpoint("cp");

        assert_eq!(log.commit(), 1);
        assert!(log.is_empty());
        assert_eq!(log.checkpoint("cp"), None);
        // Post-commit rollback is a no-op.
        assert_eq!(log.rollback(&store, None).unwrap(), 0);
        assert!(store.get_by_id(&id).is_some());
    }
}
