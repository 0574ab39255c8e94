
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::gemini::DEFAULT_EMBEDDING_DIMENSION;
use crate::normalize::NormalizeConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    /// API key sent with every provider request. May be left empty in the
    /// config file and supplied through the `GEMINI_API_KEY` environment
    /// variable.
    pub api_key: String,
    pub dimension: u32,
    /// Provider-side input clamp in characters, applied before each call.
    pub max_input_chars: usize,
    /// Delay between consecutive embedding calls, for rate limiting.
    pub pacing_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: "generativelanguage.googleapis.com".to_string(),
            port: 443,
            model: "gemini-embedding-001".to_string(),
            api_key: String::new(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_input_chars: 25_000,
            pacing_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub table_name: String,
    /// Number of entries written to the vector index per upsert request.
    pub batch_size: usize,
    pub title_max_chars: usize,
    pub summary_max_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table_name: "embeddings".to_string(),
            batch_size: 50,
            title_max_chars: 200,
            summary_max_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of related posts kept per document.
    pub top_k: usize,
    /// Wait after a single-post upsert before querying for neighbors,
    /// giving the index time to absorb the write.
    pub settle_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            settle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid provider input limit: {0} (must be between 1000 and 1000000 characters)")]
    InvalidInputCeiling(usize),
    #[error("Invalid pacing delay: {0}ms (must be 60000 or less)")]
    InvalidPacing(u64),
    #[error("Invalid table name: {0} (must be non-empty alphanumeric/underscore)")]
    InvalidTableName(String),
    #[error("Invalid title length cap: {0} (must be between 1 and 1000)")]
    InvalidTitleCap(usize),
    #[error("Invalid summary length cap: {0} (must be between 1 and 2000)")]
    InvalidSummaryCap(usize),
    #[error("Invalid top-k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid settle delay: {0}ms (must be 60000 or less)")]
    InvalidSettleDelay(u64),
    #[error("Invalid body ceiling: {0} (must be between 500 and 20000 characters)")]
    InvalidBodyCeiling(usize),
    #[error("Body ceiling ({0}) must be less than the provider input limit ({1})")]
    BodyCeilingTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedding: EmbeddingConfig::default(),
                index: IndexConfig::default(),
                sync: SyncConfig::default(),
                normalize: NormalizeConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.index.validate()?;
        self.sync.validate()?;
        self.validate_normalize_config()?;
        Ok(())
    }

    fn validate_normalize_config(&self) -> Result<(), ConfigError> {
        let config = &self.normalize;

        if !(500..=20_000).contains(&config.body_max_chars) {
            return Err(ConfigError::InvalidBodyCeiling(config.body_max_chars));
        }

        // The composite text must fit under the provider clamp with room
        // for title, summary, and tags.
        if config.body_max_chars >= self.embedding.max_input_chars {
            return Err(ConfigError::BodyCeilingTooLarge(
                config.body_max_chars,
                self.embedding.max_input_chars,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn provider_url(&self) -> Result<Url, ConfigError> {
        self.embedding.provider_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("config.toml"))
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("corpus.db"))
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("vectors"))
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1000..=1_000_000).contains(&self.max_input_chars) {
            return Err(ConfigError::InvalidInputCeiling(self.max_input_chars));
        }

        if self.pacing_ms > 60_000 {
            return Err(ConfigError::InvalidPacing(self.pacing_ms));
        }

        Ok(())
    }

    pub fn provider_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// The API key, preferring the `GEMINI_API_KEY` environment variable
    /// over the configured value.
    #[inline]
    pub fn resolved_api_key(&self) -> String {
        std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| self.api_key.clone())
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = api_key;
    }

    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.is_empty()
            || !self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.title_max_chars == 0 || self.title_max_chars > 1000 {
            return Err(ConfigError::InvalidTitleCap(self.title_max_chars));
        }

        if self.summary_max_chars == 0 || self.summary_max_chars > 2000 {
            return Err(ConfigError::InvalidSummaryCap(self.summary_max_chars));
        }

        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > 50 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if self.settle_delay_ms > 60_000 {
            return Err(ConfigError::InvalidSettleDelay(self.settle_delay_ms));
        }

        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if top_k == 0 || top_k > 50 {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }
}
