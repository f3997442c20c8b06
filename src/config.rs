//! TOML configuration parsing and validation.
//!
//! Every section has working defaults, so an empty file (or
//! [`Config::default`]) describes a runnable setup against a local Ollama
//! instance. Secrets never live in the file: API keys are read from the
//! environment when a provider is constructed.
//!
//! ```toml
//! [store]
//! data_dir = "./data"
//!
//! [chunking]
//! chunk_size = 2000
//! chunk_overlap = 400
//!
//! [indexer]
//! batch_size = 5
//! batch_delay_secs = 25
//! requests_per_minute = 15
//!
//! [embedding]
//! provider = "gemini"
//! model = "gemini-embedding-001"
//!
//! [chat]
//! provider = "gemini"
//! model = "gemini-1.5-flash"
//! temperature = 0.2
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding one SQLite file per indexed vault.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Maximum number of files read concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            workers: default_workers(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_workers() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of one document.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_chunk_overlap() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    /// Chunks per embedding request.
    #[serde(default = "default_indexer_batch_size")]
    pub batch_size: usize,
    /// Minimum spacing between embedding requests once the burst is spent.
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,
    /// Requests allowed back-to-back before pacing kicks in.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Hard external ceiling the pacing must stay under.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_indexer_batch_size(),
            batch_delay_secs: default_batch_delay_secs(),
            burst: default_burst(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_indexer_batch_size() -> usize {
    5
}
fn default_batch_delay_secs() -> u64 {
    25
}
fn default_burst() -> u32 {
    1
}
fn default_requests_per_minute() -> u32 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateways, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_retries: default_chat_retries(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.2
}
fn default_chat_retries() -> u32 {
    0
}
fn default_chat_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring at or below this cosine similarity are discarded.
    #[serde(default)]
    pub min_score: f32,
    /// Upper bound on the context block handed to the chat model.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_context_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Providers known to both [`crate::embedding`] and [`crate::chat`].
pub const PROVIDERS: &[&str] = &["openai", "gemini", "ollama"];

impl EmbeddingConfig {
    /// Model name, falling back to the provider's usual embedding model.
    pub fn model_or_default(&self) -> &str {
        if let Some(model) = self.model.as_deref() {
            return model;
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small",
            "gemini" => "gemini-embedding-001",
            _ => "nomic-embed-text",
        }
    }
}

impl ChatConfig {
    pub fn model_or_default(&self) -> &str {
        if let Some(model) = self.model.as_deref() {
            return model;
        }
        match self.provider.as_str() {
            "openai" => "gpt-4o-mini",
            "gemini" => "gemini-1.5-flash",
            _ => "llama3.1",
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate loader
    if config.loader.include_globs.is_empty() {
        bail!("loader.include_globs must not be empty");
    }
    if config.loader.workers == 0 {
        bail!("loader.workers must be >= 1");
    }

    // Validate indexer pacing against the external quota
    let indexer = &config.indexer;
    if indexer.batch_size == 0 {
        bail!("indexer.batch_size must be > 0");
    }
    if indexer.burst == 0 {
        bail!("indexer.burst must be >= 1");
    }
    if indexer.requests_per_minute == 0 {
        bail!("indexer.requests_per_minute must be >= 1");
    }
    if indexer.batch_delay_secs == 0 {
        bail!("indexer.batch_delay_secs must be > 0");
    }
    let paced_per_minute = f64::from(indexer.burst) * 60.0 / indexer.batch_delay_secs as f64;
    if paced_per_minute > f64::from(indexer.requests_per_minute) {
        bail!(
            "indexer pacing allows {:.1} requests/minute, above the configured ceiling of {}; \
             raise indexer.batch_delay_secs or lower indexer.burst",
            paced_per_minute,
            indexer.requests_per_minute
        );
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_chars == 0 {
        bail!("retrieval.max_context_chars must be > 0");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }
    // Chunks enter the prompt whole, so a smaller budget would drop every hit.
    if config.retrieval.max_context_chars < config.chunking.chunk_size {
        bail!(
            "retrieval.max_context_chars ({}) must be at least chunking.chunk_size ({})",
            config.retrieval.max_context_chars,
            config.chunking.chunk_size
        );
    }

    // Validate providers
    if !PROVIDERS.contains(&config.embedding.provider.as_str()) {
        bail!(
            "Unknown embedding provider: '{}'. Must be one of: {}.",
            config.embedding.provider,
            PROVIDERS.join(", ")
        );
    }
    if !PROVIDERS.contains(&config.chat.provider.as_str()) {
        bail!(
            "Unknown chat provider: '{}'. Must be one of: {}.",
            config.chat.provider,
            PROVIDERS.join(", ")
        );
    }
    // Retries bypass the indexer's pacer and would spend quota twice.
    if config.embedding.max_retries > 0 {
        bail!(
            "embedding.max_retries must be 0: each indexer batch may cost exactly one request \
             against the provider quota (got {})",
            config.embedding.max_retries
        );
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }
    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!("chat.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
