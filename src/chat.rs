//! Chat-completion provider abstraction.
//!
//! The answering engine only needs "prompt in, text out" at a chosen
//! temperature. [`ChatProvider`] captures that capability, and
//! [`create_chat_provider`] selects a backend from the `[chat]` section:
//!
//! | Config Value | Endpoint |
//! |-------------|----------|
//! | `"openai"` | `POST {base}/chat/completions` |
//! | `"gemini"` | `POST {base}/models/{model}:generateContent` |
//! | `"ollama"` | `POST {url}/api/chat` (non-streaming) |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ChatConfig;
use crate::transport::{read_api_key, JsonClient};

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a completion for a single user prompt.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

pub struct OpenAIChat {
    model: String,
    base_url: String,
    api_key: String,
    http: JsonClient,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            model: config.model_or_default().to_string(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: read_api_key(&["OPENAI_API_KEY"])?,
            http: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let auth = format!("Bearer {}", self.api_key);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let json = self
            .http
            .post_json(&url, &[("Authorization", auth.as_str())], &body)
            .await?;
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing text in OpenAI response"))
    }
}

pub struct GeminiChat {
    model: String,
    base_url: String,
    api_key: String,
    http: JsonClient,
}

impl GeminiChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model_or_default()
                .trim_start_matches("models/")
                .to_string(),
            base_url: config.url.clone().unwrap_or_else(|| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            api_key: read_api_key(&["GEMINI_API_KEY", "GOOGLE_API_KEY"])?,
            http: JsonClient::new("Gemini", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl ChatProvider for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature },
        });
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let json = self
            .http
            .post_json(&url, &[("x-goog-api-key", self.api_key.as_str())], &body)
            .await?;
        extract_gemini_text(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_gemini_text(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("missing text in Gemini response"))?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        bail!("missing text in Gemini response");
    }
    Ok(text)
}

pub struct OllamaChat {
    model: String,
    url: String,
    http: JsonClient,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            model: config.model_or_default().to_string(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            http: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": temperature },
            "messages": [{ "role": "user", "content": prompt }],
        });
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let json = self.http.post_json(&url, &[], &body).await?;
        json.pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing text in Ollama response"))
    }
}

pub fn create_chat_provider(config: &ChatConfig) -> Result<Box<dyn ChatProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        "gemini" => Ok(Box::new(GeminiChat::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown chat provider: {}", other),
    }
}
