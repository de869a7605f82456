//! Configuration parsing and validation.
//!
//! Codex7 is configured via a TOML file (default: `config/codex7.toml`) with
//! environment-variable overrides for secrets. The config defines the
//! database path, chunking constants, embedding provider settings,
//! retrieval tuning, and default timeouts/pagination.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_migration_strategy")]
    pub migration_strategy: String,
}

fn default_max_connections() -> u32 {
    20
}
fn default_migration_strategy() -> String {
    "auto".to_string()
}

/// Chunking constants from core spec §4.1. Overridable, but the defaults
/// are the exact values named in the specification.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_section_max_tokens")]
    pub section_max_tokens: usize,
    #[serde(default = "default_chunk_target_chars")]
    pub chunk_target_chars: usize,
    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    #[serde(default = "default_fallback_content_chars")]
    pub fallback_content_chars: usize,
    #[serde(default = "default_fallback_code_blocks_max")]
    pub fallback_code_blocks_max: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            section_max_tokens: default_section_max_tokens(),
            chunk_target_chars: default_chunk_target_chars(),
            description_max_chars: default_description_max_chars(),
            min_section_chars: default_min_section_chars(),
            fallback_content_chars: default_fallback_content_chars(),
            fallback_code_blocks_max: default_fallback_code_blocks_max(),
        }
    }
}

fn default_section_max_tokens() -> usize {
    1000
}
fn default_chunk_target_chars() -> usize {
    3000
}
fn default_description_max_chars() -> usize {
    500
}
fn default_min_section_chars() -> usize {
    50
}
fn default_fallback_content_chars() -> usize {
    4000
}
fn default_fallback_code_blocks_max() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_k")]
    pub vector_k: i64,
    #[serde(default = "default_tokens")]
    pub default_tokens: i64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_page_limit")]
    pub default_page_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_k: default_vector_k(),
            default_tokens: default_tokens(),
            min_score: default_min_score(),
            default_page_limit: default_page_limit(),
        }
    }
}

fn default_vector_k() -> i64 {
    30
}
fn default_tokens() -> i64 {
    5000
}
fn default_min_score() -> f64 {
    0.0
}
fn default_page_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub llm_topic_fallback: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            llm_topic_fallback: false,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
/// D=1536 fixed dimensionality (core spec §4.3).
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

/// Default timeouts from core spec §5, all overridable.
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_db_timeout_secs")]
    pub db_query_secs: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_request_secs: u64,
    #[serde(default = "default_mcp_timeout_secs")]
    pub mcp_request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            db_query_secs: default_db_timeout_secs(),
            embedding_request_secs: default_embedding_timeout_secs(),
            mcp_request_secs: default_mcp_timeout_secs(),
        }
    }
}

fn default_db_timeout_secs() -> u64 {
    10
}
fn default_embedding_timeout_secs() -> u64 {
    60
}
fn default_mcp_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Loads and validates a config file, applying the documented `ConfigInvalid`
/// failure semantics (core spec §7: fatal at startup).
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.section_max_tokens == 0 {
        anyhow::bail!("chunking.section_max_tokens must be > 0");
    }
    if config.retrieval.default_tokens < 1000 {
        anyhow::bail!("retrieval.default_tokens must be >= 1000");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.db.migration_strategy.as_str() {
        "auto" | "manual" => {}
        other => anyhow::bail!("db.migration_strategy must be 'auto' or 'manual', got '{other}'"),
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "unknown embedding provider: '{}'. must be disabled or openai.",
            other
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let c = ChunkingConfig::default();
        assert_eq!(c.section_max_tokens, 1000);
        assert_eq!(c.chunk_target_chars, 3000);
        assert_eq!(c.description_max_chars, 500);
        assert_eq!(c.min_section_chars, 50);
        assert_eq!(c.fallback_content_chars, 4000);
        assert_eq!(c.fallback_code_blocks_max, 10);
        assert_eq!(EmbeddingConfig::default().dims, 1536);
    }

    #[test]
    fn rejects_bad_hybrid_inputs() {
        let mut cfg = Config {
            db: DbConfig {
                path: PathBuf::from("/tmp/x.db"),
                max_connections: 20,
                migration_strategy: "auto".to_string(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            timeouts: TimeoutConfig::default(),
            log_level: "info".to_string(),
        };
        cfg.retrieval.min_score = 1.5;
        assert!(validate(&cfg).is_err());
    }
}
