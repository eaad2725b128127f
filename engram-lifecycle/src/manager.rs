use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use engram_core::config::LifecycleConfig;
use engram_core::errors::{EngramError, EngramResult};
use engram_core::memory::MemoryRecord;
use engram_vector::VectorStore;

use crate::evaluator::{evaluate_record, LifecycleAction};

/// Importance adjustment applied on promotion/demotion.
const IMPORTANCE_STEP: f64 = 0.1;

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct LifecycleEvaluationResult {
    pub evaluated: usize,
    pub upgraded: usize,
    pub downgraded: usize,
    pub deleted: usize,
    /// Records evicted by hard-cap enforcement (beyond per-record deletes).
    pub evicted: usize,
    pub errors: Vec<String>,
}

/// Aggregate statistics for a user's record set.
#[derive(Debug, Clone, Default)]
pub struct LifecycleStats {
    pub total_count: usize,
    pub by_type: HashMap<String, usize>,
    pub average_importance: f64,
    pub average_access_count: f64,
    pub average_age_days: f64,
}

/// Runs lifecycle evaluation over the vector store, on demand or on a
/// schedule.
pub struct LifecycleManager {
    store: Arc<VectorStore>,
    config: LifecycleConfig,
    /// Re-entrancy guard: one evaluation at a time.
    evaluating: AtomicBool,
    scheduler: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    pub fn new(store: Arc<VectorStore>, config: LifecycleConfig) -> Self {
        Self {
            store,
            config,
            evaluating: AtomicBool::new(false),
            scheduler: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Evaluate one user: per-record decisions, then hard-cap
    /// enforcement.
    pub fn evaluate_user(&self, user_id: &str) -> EngramResult<LifecycleEvaluationResult> {
        let mut result = LifecycleEvaluationResult::default();
        let now = Utc::now();
        let records = self.store.get_by_user(user_id);
        result.evaluated = records.len();

        for record in records {
            match evaluate_record(&record, &self.config.thresholds, now) {
                LifecycleAction::Keep => {}
                LifecycleAction::Delete => {
                    self.store.remove(&record.id)?;
                    result.deleted += 1;
                }
                LifecycleAction::Upgrade(next) => {
                    let mut updated = record.clone();
                    updated.metadata.memory_type = next;
                    updated.metadata.importance =
                        (updated.metadata.importance + IMPORTANCE_STEP).clamp(0.0, 1.0);
                    self.store.update_record(updated)?;
                    result.upgraded += 1;
                }
                LifecycleAction::Downgrade(next) => {
                    let mut updated = record.clone();
                    updated.metadata.memory_type = next;
                    updated.metadata.importance =
                        (updated.metadata.importance - IMPORTANCE_STEP).clamp(0.0, 1.0);
                    self.store.update_record(updated)?;
                    result.downgraded += 1;
                }
            }
        }

        self.enforce_hard_cap(user_id, &mut result)?;

        info!(
            user_id,
            upgraded = result.upgraded,
            downgraded = result.downgraded,
            deleted = result.deleted,
            evicted = result.evicted,
            "lifecycle evaluation complete"
        );
        Ok(result)
    }

    /// Evaluate every user in the current store snapshot. Per-user
    /// failures are recorded and the sweep continues.
    pub fn evaluate_all(&self) -> LifecycleEvaluationResult {
        if self.evaluating.swap(true, Ordering::SeqCst) {
            debug!("lifecycle evaluation already running; skipping");
            return LifecycleEvaluationResult::default();
        }

        let mut total = LifecycleEvaluationResult::default();
        for user_id in self.store.user_ids() {
            match self.evaluate_user(&user_id) {
                Ok(result) => {
                    total.evaluated += result.evaluated;
                    total.upgraded += result.upgraded;
                    total.downgraded += result.downgraded;
                    total.deleted += result.deleted;
                    total.evicted += result.evicted;
                    total.errors.extend(result.errors);
                }
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "lifecycle evaluation failed for user");
                    total.errors.push(format!("{user_id}: {e}"));
                }
            }
        }

        self.evaluating.store(false, Ordering::SeqCst);
        total
    }

    /// Enforce the per-user cap by evicting the lowest-value records.
    fn enforce_hard_cap(
        &self,
        user_id: &str,
        result: &mut LifecycleEvaluationResult,
    ) -> EngramResult<()> {
        if !self.config.enforce_hard_cap {
            return Ok(());
        }
        let cap = self.config.max_memories_per_user;
        let records = self.store.get_by_user(user_id);
        if records.len() <= cap {
            return Ok(());
        }

        let now = Utc::now();
        let mut deletable: Vec<(f64, String)> = records
            .iter()
            .filter(|r| !r.metadata.memory_type.is_protected())
            .map(|r| (value_score(r, now), r.id.clone()))
            .collect();

        let protected = records.len() - deletable.len();
        if protected > cap {
            let err = EngramError::HardLimitUnsatisfiable {
                user_id: user_id.to_string(),
                cap,
                protected,
            };
            error!(code = err.code(), user_id, protected, cap, "hard cap cannot be enforced");
            result.errors.push(err.to_string());
        }

        // Lowest value first.
        deletable.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut remaining = records.len();
        for (_, id) in deletable {
            if remaining <= cap {
                break;
            }
            if self.store.remove(&id)? {
                remaining -= 1;
                result.evicted += 1;
            }
        }
        if result.evicted > 0 {
            warn!(user_id, evicted = result.evicted, "hard cap enforced");
        }
        Ok(())
    }

    /// Aggregate stats for a user.
    pub fn stats(&self, user_id: &str) -> LifecycleStats {
        let records = self.store.get_by_user(user_id);
        if records.is_empty() {
            return LifecycleStats::default();
        }

        let now = Utc::now();
        let total = records.len();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut importance_sum = 0.0;
        let mut access_sum = 0u64;
        let mut age_sum = 0.0;
        for record in &records {
            *by_type
                .entry(record.metadata.memory_type.as_str().to_string())
                .or_default() += 1;
            importance_sum += record.metadata.importance;
            access_sum += record.access_count;
            age_sum += (now - record.metadata.timestamp).num_milliseconds() as f64 / 86_400_000.0;
        }

        LifecycleStats {
            total_count: total,
            by_type,
            average_importance: importance_sum / total as f64,
            average_access_count: access_sum as f64 / total as f64,
            average_age_days: age_sum / total as f64,
        }
    }

    /// Start the periodic evaluation task. Refuses to start before the
    /// store is initialized; starting twice replaces nothing.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            debug!("lifecycle scheduling disabled by config");
            return;
        }
        if !self.store.is_ready() {
            warn!("lifecycle scheduler not started: store not initialized");
            return;
        }
        let mut slot = self.scheduler.lock();
        if slot.is_some() {
            return;
        }

        let manager = Arc::clone(self);
        let interval = Duration::from_millis(self.config.interval_ms.max(1));
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the first
            // evaluation happens one interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let result = manager.evaluate_all();
                debug!(
                    evaluated = result.evaluated,
                    deleted = result.deleted,
                    "scheduled lifecycle evaluation finished"
                );
            }
        }));
        info!(interval_ms = self.config.interval_ms, "lifecycle scheduler started");
    }

    /// Stop the periodic task, if running.
    pub fn stop(&self) {
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
            info!("lifecycle scheduler stopped");
        }
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }
    }
}

/// Eviction value: higher is more worth keeping.
fn value_score(record: &MemoryRecord, now: chrono::DateTime<Utc>) -> f64 {
    let idle_days = (now - record.last_accessed).num_milliseconds() as f64 / 86_400_000.0;
    let recency = (-idle_days.max(0.0) / 30.0).exp();
    let frequency = (record.access_count as f64 / 100.0).min(1.0);
    0.4 * record.metadata.importance + 0.3 * recency + 0.3 * frequency
}
