use serde::{Deserialize, Serialize};

use super::defaults;

/// Expiry rule: delete when BOTH conditions hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpiryRule {
    pub max_age_days: f64,
    pub min_importance: f64,
}

/// Upgrade rule: promote when access count, access density
/// (`access_count / survival_days`), and survival days all meet their
/// thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpgradeRule {
    pub min_access_count: u64,
    pub min_access_density: f64,
    pub min_survival_days: f64,
}

/// Downgrade rule: demote when inactive longer than `inactive_days` AND
/// importance is below `max_importance`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DowngradeRule {
    pub inactive_days: f64,
    pub max_importance: f64,
}

/// The full lifecycle threshold table, overridable per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleThresholds {
    pub expiry_short_term: ExpiryRule,
    pub expiry_mid_term: ExpiryRule,
    pub expiry_long_term: ExpiryRule,
    pub upgrade_short_to_mid: UpgradeRule,
    pub upgrade_mid_to_long: UpgradeRule,
    pub downgrade_long_to_mid: DowngradeRule,
    pub downgrade_mid_to_short: DowngradeRule,
}

impl Default for LifecycleThresholds {
    fn default() -> Self {
        Self {
            expiry_short_term: ExpiryRule {
                max_age_days: 30.0,
                min_importance: 0.1,
            },
            expiry_mid_term: ExpiryRule {
                max_age_days: 90.0,
                min_importance: 0.2,
            },
            expiry_long_term: ExpiryRule {
                max_age_days: 365.0,
                min_importance: 0.3,
            },
            upgrade_short_to_mid: UpgradeRule {
                min_access_count: 10,
                min_access_density: 0.5,
                min_survival_days: 7.0,
            },
            upgrade_mid_to_long: UpgradeRule {
                min_access_count: 50,
                min_access_density: 0.3,
                min_survival_days: 30.0,
            },
            downgrade_long_to_mid: DowngradeRule {
                inactive_days: 90.0,
                max_importance: 0.5,
            },
            downgrade_mid_to_short: DowngradeRule {
                inactive_days: 30.0,
                max_importance: 0.3,
            },
        }
    }
}

/// Lifecycle manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub enabled: bool,
    /// Interval between scheduled evaluations.
    pub interval_ms: u64,
    /// Per-user hard cap on stored records.
    pub max_memories_per_user: usize,
    /// Whether the hard cap is enforced by eviction.
    pub enforce_hard_cap: bool,
    pub thresholds: LifecycleThresholds,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: defaults::DEFAULT_LIFECYCLE_INTERVAL_MS,
            max_memories_per_user: defaults::DEFAULT_MAX_MEMORIES_PER_USER,
            enforce_hard_cap: true,
            thresholds: LifecycleThresholds::default(),
        }
    }
}

impl LifecycleConfig {
    pub(crate) fn apply_env(&mut self) {
        if let Some(v) = super::env_flag("LIFECYCLE_ENABLED") {
            self.enabled = v;
        }
        if let Some(v) = super::env_parse("LIFECYCLE_INTERVAL") {
            self.interval_ms = v;
        }
        if let Some(v) = super::env_parse("LIFECYCLE_MAX_MEMORIES_PER_USER") {
            self.max_memories_per_user = v;
        }
    }
}
