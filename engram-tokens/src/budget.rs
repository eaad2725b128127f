use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use engram_core::config::BudgetConfig;
use engram_core::memory::MemoryType;

/// Default allocation ratios per tier. `context` and `reserved` are held
/// back for the surrounding prompt and for headroom.
const DEFAULT_RATIOS: [(&str, f64); 7] = [
    ("pinned", 0.10),
    ("profile", 0.05),
    ("longTerm", 0.30),
    ("midTerm", 0.20),
    ("shortTerm", 0.15),
    ("context", 0.10),
    ("reserved", 0.10),
];

/// A resolved allocation of the global token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub total: usize,
    /// Normalized ratios, summing to 1.0.
    pub ratios: HashMap<String, f64>,
    /// Token counts per tier, derived from the ratios.
    pub tokens: HashMap<String, usize>,
}

impl BudgetAllocation {
    /// Tokens allocated to a memory tier.
    pub fn tokens_for(&self, memory_type: MemoryType) -> usize {
        self.tokens.get(memory_type.as_str()).copied().unwrap_or(0)
    }
}

/// Maps the global token budget to per-tier allocations.
pub struct BudgetManager {
    config: BudgetConfig,
}

impl BudgetManager {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Replace the configuration (e.g. after a runtime override).
    pub fn update_config(&mut self, config: BudgetConfig) {
        self.config = config;
    }

    /// Partition the total budget into tier allocations. Overridden
    /// ratios are renormalized so the result always sums to 1.0.
    pub fn allocate_budget(&self, user_id: &str) -> BudgetAllocation {
        let mut ratios: HashMap<String, f64> = DEFAULT_RATIOS
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();

        for (key, value) in &self.config.ratio_overrides {
            if ratios.contains_key(key) && *value >= 0.0 {
                ratios.insert(key.clone(), *value);
            }
        }

        let sum: f64 = ratios.values().sum();
        if sum > 0.0 {
            for v in ratios.values_mut() {
                *v /= sum;
            }
        }

        let total = self.config.token_budget;
        let tokens = ratios
            .iter()
            .map(|(k, v)| (k.clone(), (total as f64 * v).floor() as usize))
            .collect();

        debug!(user_id, total, "allocated token budget");
        BudgetAllocation {
            total,
            ratios,
            tokens,
        }
    }
}
