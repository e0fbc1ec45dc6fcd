use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog::{default_component_bands, ComponentBand};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub catalog: CatalogConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub index_path: String,
    pub meta_path: String,
    /// Suffix → component mapping used at index build time. National
    /// adaptations override this instead of patching code.
    pub component_bands: Vec<ComponentBand>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// How many candidate codes are retrieved and passed to the prompt.
    pub top_n: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Upper bound on one completion call, connect through last byte.
    pub timeout_secs: u64,
    pub mistral: MistralConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MistralConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            catalog: CatalogConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            log_level: "info".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_app_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "multilingual-e5-base".into(),
            cache_dir,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let dir = default_app_dir();
        Self {
            index_path: dir.join("icpc2.index").to_string_lossy().into_owned(),
            meta_path: dir.join("icpc2_meta.json").to_string_lossy().into_owned(),
            component_bands: default_component_bands(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_n: 40 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 800,
            timeout_secs: 60,
            mistral: MistralConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.mistral.ai/v1".into(),
            model: "mistral-large-latest".into(),
        }
    }
}

/// Returns `~/.icpc-coder/`
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".icpc-coder")
}

/// Returns the default config file path: `~/.icpc-coder/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl AppConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides. The names match the original
    /// deployment environment and are read once at process start.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("EMB_MODEL") {
            self.embedding.model = val;
        }
        if let Ok(val) = std::env::var("INDEX_PATH") {
            self.catalog.index_path = val;
        }
        if let Ok(val) = std::env::var("META_PATH") {
            self.catalog.meta_path = val;
        }
        if let Ok(val) = std::env::var("TOPN_RETRIEVE") {
            if let Ok(n) = val.parse() {
                self.retrieval.top_n = n;
            }
        }
        if let Ok(val) = std::env::var("TEMPERATURE") {
            if let Ok(t) = val.parse() {
                self.llm.temperature = t;
            }
        }
        if let Ok(val) = std::env::var("MAX_TOKENS") {
            if let Ok(n) = val.parse() {
                self.llm.max_tokens = n;
            }
        }
        if let Ok(val) = std::env::var("MISTRAL_API_KEY") {
            self.llm.mistral.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("MISTRAL_BASE") {
            self.llm.mistral.base_url = val;
        }
        if let Ok(val) = std::env::var("MISTRAL_MODEL") {
            self.llm.mistral.model = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("OPENAI_BASE") {
            self.llm.openai.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("OPENAI_MODEL") {
            self.llm.openai.model = Some(val);
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.retrieval.top_n >= 1, "retrieval.top_n must be at least 1");
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.llm.temperature),
            "llm.temperature must be within 0.0–2.0"
        );
        anyhow::ensure!(self.llm.max_tokens >= 1, "llm.max_tokens must be at least 1");
        anyhow::ensure!(self.llm.timeout_secs >= 1, "llm.timeout_secs must be at least 1");
        Ok(())
    }

    /// Resolve the index file path, expanding `~` if needed.
    pub fn resolved_index_path(&self) -> PathBuf {
        expand_tilde(&self.catalog.index_path)
    }

    /// Resolve the catalog metadata path, expanding `~` if needed.
    pub fn resolved_meta_path(&self) -> PathBuf {
        expand_tilde(&self.catalog.meta_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
