//! Configuration surface. Every field has a serde default so a partial
//! TOML file (or none at all) yields a working config; recognized
//! environment keys override whatever was loaded.

pub mod defaults;

mod budget_config;
mod compression_config;
mod embedding_config;
mod lifecycle_config;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use budget_config::BudgetConfig;
pub use compression_config::CompressionConfig;
pub use embedding_config::{EmbeddingConfig, EmbeddingProviderKind};
pub use lifecycle_config::{
    DowngradeRule, ExpiryRule, LifecycleConfig, LifecycleThresholds, UpgradeRule,
};

/// Top-level configuration for the memory core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngramConfig {
    /// Data directory holding the vector JSON files and SQLite databases.
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub budget: BudgetConfig,
    pub compression: CompressionConfig,
    pub lifecycle: LifecycleConfig,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DEFAULT_DATA_DIR),
            embedding: EmbeddingConfig::default(),
            budget: BudgetConfig::default(),
            compression: CompressionConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl EngramConfig {
    /// Parse a TOML document; missing fields fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Defaults overridden by the recognized environment keys.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply recognized environment keys in place.
    pub fn apply_env(&mut self) {
        if let Some(dir) = env_string("MEMORY_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        self.embedding.apply_env();
        if let Some(v) = env_parse("MEMORY_TOKEN_BUDGET") {
            self.budget.token_budget = v;
        }
        self.compression.apply_env();
        self.lifecycle.apply_env();
    }

    /// Paths of the persisted artifacts, relative to the data directory.
    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("memory_vectors").join("vectors.json")
    }

    pub fn vector_index_path(&self) -> PathBuf {
        self.data_dir.join("memory_vectors").join("index.json")
    }

    pub fn keyword_db_path(&self) -> PathBuf {
        self.data_dir.join("memory_vectors").join("bm25.sqlite")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join("memory").join("graph.sqlite")
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

pub(crate) fn env_flag(key: &str) -> Option<bool> {
    env_string(key).map(|s| {
        matches!(
            s.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_follow_layout() {
        let c = EngramConfig::default();
        assert!(c.vectors_path().ends_with("memory_vectors/vectors.json"));
        assert!(c.vector_index_path().ends_with("memory_vectors/index.json"));
        assert!(c.keyword_db_path().ends_with("memory_vectors/bm25.sqlite"));
        assert!(c.graph_db_path().ends_with("memory/graph.sqlite"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = EngramConfig::from_toml_str(
            r#"
            data_dir = "/tmp/engram"

            [embedding]
            dimensions = 512
            "#,
        )
        .unwrap();
        assert_eq!(c.data_dir, PathBuf::from("/tmp/engram"));
        assert_eq!(c.embedding.dimensions, 512);
        assert_eq!(c.budget.token_budget, defaults::DEFAULT_TOKEN_BUDGET);
        assert_eq!(c.embedding.max_retries, defaults::DEFAULT_EMBEDDING_MAX_RETRIES);
    }
}
