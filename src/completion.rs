//! Chat-completion provider implementations.
//!
//! - **[`OpenAIChat`]**: `POST {url}/v1/chat/completions`, key from `OPENAI_API_KEY`.
//! - **[`OllamaChat`]**: `POST {url}/api/chat` with `stream: false`.
//!
//! Both are single-shot: no retries, so an upstream failure turns into a
//! fallback or a 502 right away rather than stalling the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use drive_qa_core::completion::{ChatMessage, CompletionProvider, CompletionRequest};
use drive_qa_core::QaError;

use crate::config::CompletionConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Longest slice of an error body kept in messages and logs.
const SNIPPET_CHARS: usize = 300;

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}

// ============ OpenAI ============

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions client.
pub struct OpenAIChat {
    model: String,
    url_chat: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
        Self::with_key(config, &base, api_key)
    }

    fn with_key(config: &CompletionConfig, base: &str, api_key: String) -> Result<Self> {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("completion.url must start with http:// or https://: {}", base);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url_chat: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key,
            client,
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String> {
        let started = Instant::now();
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "POST {}", self.url_chat
        );

        let resp = self
            .client
            .post(&self.url_chat)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = snippet(&resp.text().await.unwrap_or_default());
            error!(
                %status,
                model = %self.model,
                latency_ms = started.elapsed().as_millis(),
                "chat completion returned non-success status"
            );
            bail!("OpenAI API error {}: {}", status, text);
        }

        let out: ChatCompletionResponse = resp.json().await?;
        let content = parse_openai_chat(out)?;

        debug!(
            model = %self.model,
            latency_ms = started.elapsed().as_millis(),
            chars = content.len(),
            "chat completion finished"
        );
        Ok(content)
    }
}

fn parse_openai_chat(out: ChatCompletionResponse) -> Result<String> {
    out.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("OpenAI response has no choices[0].message.content"))
}

#[async_trait]
impl CompletionProvider for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> drive_qa_core::Result<String> {
        self.send(request)
            .await
            .map_err(|e| QaError::CompletionFailed(format!("{:#}", e)))
    }
}

// ============ Ollama ============

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaOutMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaOutMessage {
    content: String,
}

/// Ollama chat client.
pub struct OllamaChat {
    model: String,
    base: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String> {
        let started = Instant::now();
        let url = format!("{}/api/chat", self.base);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Ollama connection error (is Ollama running at {}?): {}", self.base, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = snippet(&resp.text().await.unwrap_or_default());
            bail!("Ollama API error {}: {}", status, text);
        }

        let data: OllamaChatResponse = resp.json().await?;
        debug!(
            model = %self.model,
            latency_ms = started.elapsed().as_millis(),
            "ollama chat finished"
        );
        data.message
            .map(|m| m.content)
            .ok_or_else(|| anyhow!("Ollama response has no message"))
    }
}

#[async_trait]
impl CompletionProvider for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> drive_qa_core::Result<String> {
        self.send(request)
            .await
            .map_err(|e| QaError::CompletionFailed(format!("{:#}", e)))
    }
}

/// Create the completion provider named in configuration
/// (`"openai"` or `"ollama"`).
pub fn create_completion_provider(
    config: &CompletionConfig,
) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}
