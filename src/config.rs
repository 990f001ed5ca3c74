//! TOML configuration.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration that talks to Google Drive and OpenAI with the stock
//! settings. Secrets are not read from the file: `OPENAI_API_KEY` comes
//! from the environment (or a `.env` file loaded at startup).
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [drive]
//! credentials_path = "./google_tokens.json"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [retrieval]
//! min_score = 0.1
//! max_documents = 5
//!
//! [answer]
//! context_token_budget = 6000
//! prompt_token_cap = 8000
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use drive_qa_core::answer::AnswerConfig;
use drive_qa_core::retriever::RetrievalParams;
use drive_qa_core::service::ServiceSettings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerSettings,
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
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    /// OAuth token file with `token`, `refresh_token`, `client_id`, `client_secret`.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_drive_api_base")]
    pub drive_api_base: String,
    #[serde(default = "default_docs_api_base")]
    pub docs_api_base: String,
    #[serde(default = "default_oauth_token_url")]
    pub oauth_token_url: String,
    #[serde(default = "default_index_page_size")]
    pub index_page_size: u32,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            drive_api_base: default_drive_api_base(),
            docs_api_base: default_docs_api_base(),
            oauth_token_url: default_oauth_token_url(),
            index_page_size: default_index_page_size(),
            list_page_size: default_list_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("./google_tokens.json")
}
fn default_drive_api_base() -> String {
    "https://www.googleapis.com".to_string()
}
fn default_docs_api_base() -> String {
    "https://docs.googleapis.com".to_string()
}
fn default_oauth_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_index_page_size() -> u32 {
    50
}
fn default_list_page_size() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("text-embedding-3-small".to_string())
}
fn default_embedding_dims() -> Option<usize> {
    Some(1536)
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            url: None,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "openai".to_string()
}
fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_max_documents_cap")]
    pub max_documents_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_documents: default_max_documents(),
            max_documents_cap: default_max_documents_cap(),
        }
    }
}

fn default_min_score() -> f32 {
    0.1
}
fn default_max_documents() -> usize {
    5
}
fn default_max_documents_cap() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerSettings {
    #[serde(default = "default_per_doc_char_cap")]
    pub per_doc_char_cap: usize,
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,
    #[serde(default = "default_prompt_token_cap")]
    pub prompt_token_cap: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// `"approx"` (chars / 4), `"whitespace"`, or `"hf"` (needs `tokenizer_path`).
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            per_doc_char_cap: default_per_doc_char_cap(),
            context_token_budget: default_context_token_budget(),
            prompt_token_cap: default_prompt_token_cap(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            tokenizer: default_tokenizer(),
            tokenizer_path: None,
        }
    }
}

fn default_per_doc_char_cap() -> usize {
    1000
}
fn default_context_token_budget() -> usize {
    6000
}
fn default_prompt_token_cap() -> usize {
    8000
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    512
}
fn default_tokenizer() -> String {
    "approx".to_string()
}

impl Config {
    /// Core service tunables derived from this configuration.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            retrieval: RetrievalParams {
                min_score: self.retrieval.min_score,
                max_count: self.retrieval.max_documents,
                max_count_cap: self.retrieval.max_documents_cap,
            },
            answer: AnswerConfig {
                per_doc_char_cap: self.answer.per_doc_char_cap,
                context_token_budget: self.answer.context_token_budget,
                prompt_token_cap: self.answer.prompt_token_cap,
                temperature: self.answer.temperature,
                max_output_tokens: self.answer.max_output_tokens,
            },
            index_page_size: self.drive.index_page_size,
            list_page_size: self.drive.list_page_size,
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        // Validate drive
        if self.drive.index_page_size == 0 || self.drive.index_page_size > 1000 {
            bail!("drive.index_page_size must be in 1..=1000");
        }
        if self.drive.list_page_size == 0 || self.drive.list_page_size > 1000 {
            bail!("drive.list_page_size must be in 1..=1000");
        }

        // Validate retrieval
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
        if self.retrieval.max_documents == 0 {
            bail!("retrieval.max_documents must be >= 1");
        }
        if self.retrieval.max_documents > self.retrieval.max_documents_cap {
            bail!("retrieval.max_documents must be <= retrieval.max_documents_cap");
        }

        // Validate answer
        if self.answer.per_doc_char_cap == 0 {
            bail!("answer.per_doc_char_cap must be > 0");
        }
        if self.answer.context_token_budget == 0 {
            bail!("answer.context_token_budget must be > 0");
        }
        if self.answer.context_token_budget >= self.answer.prompt_token_cap {
            bail!("answer.context_token_budget must be smaller than answer.prompt_token_cap");
        }
        if !(0.0..=2.0).contains(&self.answer.temperature) {
            bail!("answer.temperature must be in [0.0, 2.0]");
        }
        if self.answer.max_output_tokens == 0 {
            bail!("answer.max_output_tokens must be > 0");
        }
        match self.answer.tokenizer.as_str() {
            "approx" | "whitespace" => {}
            "hf" => {
                if self.answer.tokenizer_path.is_none() {
                    bail!("answer.tokenizer_path must be set when tokenizer is 'hf'");
                }
            }
            other => bail!(
                "Unknown tokenizer: '{}'. Must be approx, whitespace, or hf.",
                other
            ),
        }

        // Validate embedding
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        // Validate completion
        match self.completion.provider.as_str() {
            "openai" | "ollama" => {}
            other => bail!(
                "Unknown completion provider: '{}'. Must be openai or ollama.",
                other
            ),
        }
        if self.completion.model.trim().is_empty() {
            bail!("completion.model must not be empty");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
