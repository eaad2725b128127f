use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Token-budget configuration. Per-tier ratio overrides are renormalized
/// by the budget manager so allocations always sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Total token budget per user (default 100 000).
    pub token_budget: usize,
    /// Optional per-tier ratio overrides, keyed by tier name
    /// (`pinned`, `profile`, `longTerm`, `midTerm`, `shortTerm`,
    /// `context`, `reserved`).
    pub ratio_overrides: HashMap<String, f64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_budget: defaults::DEFAULT_TOKEN_BUDGET,
            ratio_overrides: HashMap::new(),
        }
    }
}
