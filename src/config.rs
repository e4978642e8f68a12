use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SweepError};
use crate::fetcher::FailurePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_modify_chunk_size")]
    pub modify_chunk_size: usize,
    #[serde(default = "default_label_filter")]
    pub label_filter: Vec<String>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            fetch_concurrency: default_fetch_concurrency(),
            modify_chunk_size: default_modify_chunk_size(),
            label_filter: default_label_filter(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_cache_path: default_token_cache_path(),
        }
    }
}

fn default_page_size() -> u32 {
    50
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_modify_chunk_size() -> usize {
    50
}

fn default_label_filter() -> Vec<String> {
    vec!["INBOX".to_string()]
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_cache_path() -> PathBuf {
    PathBuf::from(".inbox-sweep/token.json")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SweepError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SweepError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SweepError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SweepError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| SweepError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Gmail caps messages.list at 500 results per call
        if self.engine.page_size == 0 {
            return Err(SweepError::ConfigError(
                "engine.page_size must be at least 1".to_string(),
            ));
        }
        if self.engine.page_size > 500 {
            return Err(SweepError::ConfigError(
                "engine.page_size cannot exceed 500".to_string(),
            ));
        }

        if self.engine.fetch_concurrency == 0 {
            return Err(SweepError::ConfigError(
                "engine.fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.engine.fetch_concurrency > 50 {
            return Err(SweepError::ConfigError(
                "engine.fetch_concurrency cannot exceed 50 (to stay under Gmail API rate limits)"
                    .to_string(),
            ));
        }

        // batchModify accepts at most 1000 ids
        if self.engine.modify_chunk_size == 0 {
            return Err(SweepError::ConfigError(
                "engine.modify_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.engine.modify_chunk_size > 1000 {
            return Err(SweepError::ConfigError(
                "engine.modify_chunk_size cannot exceed 1000".to_string(),
            ));
        }

        if self.engine.label_filter.iter().any(|l| l.trim().is_empty()) {
            return Err(SweepError::ConfigError(
                "engine.label_filter cannot contain empty labels".to_string(),
            ));
        }

        if self.auth.token_cache_path.as_os_str().is_empty() {
            return Err(SweepError::ConfigError(
                "auth.token_cache_path cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
