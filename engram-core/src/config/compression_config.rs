use serde::{Deserialize, Serialize};

use super::defaults;

/// Compression policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Trigger when estimated tokens exceed this fraction of the budget.
    pub token_threshold_percent: f64,
    /// Trigger when record count exceeds 90% of this limit.
    pub count_limit: usize,
    /// Age trigger threshold in days.
    pub age_days_threshold: i64,
    /// Redundancy trigger threshold on sampled pairwise similarity.
    pub redundancy_threshold: f64,
    /// Run compression automatically after ingestion.
    pub auto: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_threshold_percent: defaults::DEFAULT_COMPRESSION_TOKEN_THRESHOLD_PERCENT,
            count_limit: defaults::DEFAULT_COMPRESSION_COUNT_LIMIT,
            age_days_threshold: defaults::DEFAULT_COMPRESSION_AGE_DAYS,
            redundancy_threshold: defaults::DEFAULT_COMPRESSION_REDUNDANCY_THRESHOLD,
            auto: false,
        }
    }
}

impl CompressionConfig {
    pub(crate) fn apply_env(&mut self) {
        if let Some(v) = super::env_flag("COMPRESSION_ENABLED") {
            self.enabled = v;
        }
        if let Some(v) = super::env_parse("COMPRESSION_TOKEN_THRESHOLD_PERCENT") {
            self.token_threshold_percent = v;
        }
        if let Some(v) = super::env_parse("COMPRESSION_COUNT_LIMIT") {
            self.count_limit = v;
        }
        if let Some(v) = super::env_parse("COMPRESSION_AGE_DAYS") {
            self.age_days_threshold = v;
        }
        if let Some(v) = super::env_parse("COMPRESSION_REDUNDANCY_THRESHOLD") {
            self.redundancy_threshold = v;
        }
        if let Some(v) = super::env_flag("COMPRESSION_AUTO") {
            self.auto = v;
        }
    }
}
