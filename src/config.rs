//! TOML configuration parsing and validation.
//!
//! Configuration is read once at startup and passed explicitly to every
//! component that needs it. Nothing is validated or initialized at import
//! time; credential checks happen in [`Credentials::from_env`] when a
//! provider that needs them is constructed.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use convo_sync_core::models::DataType;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub reset: ResetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory holding every index directory and metadata file.
    pub dir: PathBuf,
}

impl DataConfig {
    /// `<dir>/.db_<data_type>/`
    pub fn index_dir(&self, data_type: DataType) -> PathBuf {
        self.dir.join(format!(".db_{}", data_type))
    }

    /// `<dir>/.db_<data_type>_metadata.json`
    pub fn metadata_file(&self, data_type: DataType) -> PathBuf {
        self.dir.join(format!(".db_{}_metadata.json", data_type))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// `html` (saved talk-page snapshots) or `jsonl` (record export).
    pub kind: String,
    /// Snapshot directory, single snapshot file, or JSONL file.
    pub path: PathBuf,
    #[serde(default = "default_read_marker")]
    pub read_marker: String,
}

fn default_read_marker() -> String {
    "既読".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Number of similar messages retrieved as context for a prompt.
    #[serde(default = "default_context_k")]
    pub context_k: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: default_chat_model(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
            context_k: default_context_k(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_context_k() -> usize {
    5
}

/// Deletion retry policy for index resets.
#[derive(Debug, Deserialize, Clone)]
pub struct ResetConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_force_timeout_secs")]
    pub force_timeout_secs: u64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            force_timeout_secs: default_force_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    2000
}
fn default_force_timeout_secs() -> u64 {
    30
}

/// An API key read from the environment (or `.env`) and checked for shape.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Read and validate `OPENAI_API_KEY`.
    ///
    /// Loads `.env` from the working directory first if one exists.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set. Add it to .env as OPENAI_API_KEY=sk-..."))?;
        Self::new(api_key)
    }

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if !api_key.starts_with("sk-") {
            let shown: String = api_key.chars().take(10).collect();
            bail!("Invalid OpenAI API key format (starts with '{}...')", shown);
        }
        Ok(Self { api_key })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.source.kind.as_str() {
        "html" | "jsonl" => {}
        other => bail!("Unknown source kind: '{}'. Must be html or jsonl.", other),
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.reset.max_attempts == 0 {
        bail!("reset.max_attempts must be >= 1");
    }

    Ok(config)
}
