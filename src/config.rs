//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. Key pools (NewsAPI, Gemini)
//! are assembled from numbered env vars: `NAME`, `NAME_2`, `NAME_3`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub providers: ProvidersConfig,
    pub models: ModelsConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub name: String,
    /// Hours between scheduled runs.
    pub interval_hours: u64,
    /// Maximum articles fetched per provider per run.
    pub max_articles_per_provider: usize,
    /// How many days back a run looks for articles.
    pub lookback_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Provider execution order; unavailable providers are skipped.
    pub order: Vec<String>,
    pub newsapi: NewsApiConfig,
    pub rss: RssConfig,
    pub gdelt: GdeltConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsApiConfig {
    pub enabled: bool,
    /// Base env-var name for the key pool (NAME, NAME_2, NAME_3).
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RssConfig {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GdeltConfig {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    /// Local sentiment-classifier sidecar. Unreachable → lexicon fallback.
    pub sentiment_url: Option<String>,
    /// Local embedding sidecar (384-dim). Unreachable → TF-IDF fallback.
    pub embedding_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub model: String,
    /// Base env-var name for the key pool (NAME, NAME_2, NAME_3).
    pub api_key_env: String,
    pub max_output_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    /// Equity symbol correlated against daily sentiment.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Env var holding the Finnhub key; unset disables live fetch.
    #[serde(default = "default_finnhub_env")]
    pub finnhub_key_env: String,
    /// Alignment window in days.
    #[serde(default = "default_window")]
    pub window_days: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            finnhub_key_env: default_finnhub_env(),
            window_days: default_window(),
        }
    }
}

fn default_symbol() -> String {
    "QQQ".to_string()
}

fn default_finnhub_env() -> String {
    "FINNHUB_API_KEY".to_string()
}

fn default_window() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Assemble a key pool from `NAME`, `NAME_2`, `NAME_3`. Missing slots
    /// are skipped; an empty pool means the consumer is unavailable.
    pub fn key_pool(base_env: &str) -> Vec<String> {
        let mut keys = Vec::new();
        for name in [
            base_env.to_string(),
            format!("{base_env}_2"),
            format!("{base_env}_3"),
        ] {
            if let Ok(v) = std::env::var(&name) {
                let v = v.trim().to_string();
                if !v.is_empty() {
                    keys.push(v);
                }
            }
        }
        keys
    }

    /// Base directory for persisted state (`NEWS_FEED_DIR`, default ".").
    pub fn state_dir() -> PathBuf {
        std::env::var("NEWS_FEED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Path of the embedded database file.
    pub fn db_path() -> PathBuf {
        Self::state_dir().join("argus.db")
    }

    /// Path of the legacy JSON feed mirror.
    pub fn feed_path() -> PathBuf {
        Self::state_dir().join("news_feed.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        // This test requires config.toml to be in the working directory.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert_eq!(cfg.pipeline.name, "ARGUS-001");
            assert_eq!(cfg.pipeline.interval_hours, 6);
            assert!(cfg.pipeline.max_articles_per_provider > 0);
            assert!(!cfg.providers.order.is_empty());
            assert_eq!(cfg.providers.order[0], "newsapi");
            assert!(cfg.llm.max_output_tokens > 0);
        }
        // Missing config.toml is acceptable in some test environments.
    }

    #[test]
    fn test_key_pool_skips_missing() {
        // Use an env name nothing else sets.
        std::env::set_var("ARGUS_TEST_POOL", "k1");
        std::env::set_var("ARGUS_TEST_POOL_3", "k3");
        let pool = AppConfig::key_pool("ARGUS_TEST_POOL");
        assert_eq!(pool, vec!["k1".to_string(), "k3".to_string()]);
        std::env::remove_var("ARGUS_TEST_POOL");
        std::env::remove_var("ARGUS_TEST_POOL_3");
    }

    #[test]
    fn test_key_pool_empty() {
        let pool = AppConfig::key_pool("ARGUS_TEST_POOL_UNSET");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_db_path_under_state_dir() {
        let p = AppConfig::db_path();
        assert!(p.to_string_lossy().ends_with("argus.db"));
    }
}
