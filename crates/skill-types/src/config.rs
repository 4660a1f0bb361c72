//! Configuration loading for the skill engine.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/skill-engine/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::SkillError;
use crate::tuning::{
    CacheConfig, IndexingConfig, QuotaConfig, RankingConfig, ResponseConfig, ValidationConfig,
    WindowConfig,
};

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to the RocksDB directory holding skills, raw vectors and KV entries
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Approximate index (primary backend) and fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    /// Path to the HNSW index directory. Unset means the primary backend is
    /// unconfigured and every query falls back to the linear scan.
    #[serde(default)]
    pub index_path: Option<String>,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Timeout for the primary backend (ms)
    #[serde(default = "default_primary_timeout")]
    pub primary_timeout_ms: u64,

    /// Timeout for the fallback backend (ms)
    #[serde(default = "default_fallback_timeout")]
    pub fallback_timeout_ms: u64,
}

fn default_dimension() -> usize {
    384
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    200
}

fn default_expansion_search() -> usize {
    100
}

fn default_capacity() -> usize {
    10_000
}

fn default_primary_timeout() -> u64 {
    1_500
}

fn default_fallback_timeout() -> u64 {
    5_000
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            index_path: Some(default_vector_index_path()),
            dimension: default_dimension(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            capacity: default_capacity(),
            primary_timeout_ms: default_primary_timeout(),
            fallback_timeout_ms: default_fallback_timeout(),
        }
    }
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Provider name ("api" or "hash")
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "api".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout() -> u64 {
    10
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            api_base_url: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

/// Completion model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider name (e.g., "openai", "anthropic")
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Request streamed responses
    #[serde(default)]
    pub stream: bool,

    /// Hard wall-clock limit for a whole inference, including draining
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_inference_timeout() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    2
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            api_base_url: None,
            stream: false,
            inference_timeout_secs: default_inference_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// A project-detection rule loaded at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectEntry {
    /// Case-insensitive regex matched against the query
    pub pattern: String,
    /// Canonical project or employer name
    pub name: String,
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub vector: VectorSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub response: ResponseConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "skill-engine")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_vector_index_path() -> String {
    ProjectDirs::from("", "", "skill-engine")
        .map(|p| p.data_local_dir().join("vector-index"))
        .unwrap_or_else(|| PathBuf::from("./vector-index"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageSettings::default(),
            vector: VectorSettings::default(),
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
            quota: QuotaConfig::default(),
            cache: CacheConfig::default(),
            window: WindowConfig::default(),
            ranking: RankingConfig::default(),
            response: ResponseConfig::default(),
            validation: ValidationConfig::default(),
            indexing: IndexingConfig::default(),
            projects: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/skill-engine/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SKILL_*, `__` between sections)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, SkillError> {
        let config_dir = ProjectDirs::from("", "", "skill-engine")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            // 1. Built-in defaults; section defaults come from serde
            .set_default("log_level", default_log_level())
            .map_err(|e| SkillError::Config(e.to_string()))?
            .set_default("storage.db_path", default_db_path())
            .map_err(|e| SkillError::Config(e.to_string()))?
            .set_default("vector.index_path", default_vector_index_path())
            .map_err(|e| SkillError::Config(e.to_string()))?
            // 2. Default config file
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        // 3. CLI-specified config file (higher precedence than default)
        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // 4. Environment variables, e.g. SKILL_QUOTA__DAILY_LIMIT, SKILL_LLM__API_KEY
        builder = builder.add_source(
            Environment::with_prefix("SKILL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| SkillError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| SkillError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SkillError> {
        if self.vector.dimension == 0 {
            return Err(SkillError::Config("vector.dimension must be > 0".into()));
        }
        if self.quota.daily_limit == 0 {
            return Err(SkillError::Config("quota.daily_limit must be > 0".into()));
        }
        self.window.check_hours()?;
        if self.response.max_sentences == 0 {
            return Err(SkillError::Config(
                "response.max_sentences must be > 0".into(),
            ));
        }
        if self.response.medium_confidence > self.response.high_confidence {
            return Err(SkillError::Config(
                "response.medium_confidence must not exceed high_confidence".into(),
            ));
        }
        if self.indexing.batch_size == 0 {
            return Err(SkillError::Config("indexing.batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.storage.db_path)
    }

    /// Expanded HNSW index directory, if configured
    pub fn expanded_index_path(&self) -> Option<PathBuf> {
        self.vector
            .index_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
