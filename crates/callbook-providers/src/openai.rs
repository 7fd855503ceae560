//! OpenAI-compatible Chat Completions provider.
//!
//! Talks to `{base_url}/chat/completions`. DeepSeek is the default endpoint;
//! OpenAI itself works with `base_url = "https://api.openai.com/v1"`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use callbook_core::config::LlmConfig;
use callbook_core::error::{CallbookError, Result};

use crate::{ChatMessage, CompletionRequest, LlmProvider};

pub struct OpenAiProvider {
    pub base_url: String,
    pub model: String,
    provider_id: String,
    api_key: String,
    default_temperature: Option<f64>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let provider_id = if base_url.contains("deepseek") {
            "deepseek"
        } else if base_url.contains("openai.com") {
            "openai"
        } else {
            "openai-compatible"
        };
        Self {
            base_url,
            model: model.into(),
            provider_id: provider_id.into(),
            api_key: api_key.into(),
            default_temperature: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build a provider from config. Fails when no API key can be resolved.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            CallbookError::Config("No language model API key configured".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CallbookError::Config(format!("HTTP client: {e}")))?;

        let mut provider = Self::new(&config.base_url, api_key, config.model.clone());
        provider.default_temperature = config.temperature;
        provider.client = client;
        Ok(provider)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            temperature: request.temperature.or(self.default_temperature),
            max_tokens: request.max_tokens,
        }
    }
}

// --- Request/response types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's content out of a chat completions response body.
fn parse_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CallbookError::Generation(format!("malformed completion response: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CallbookError::Generation("completion response had no content".into()))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_body(request);
        debug!(model = %self.model, base_url = %self.base_url, messages = request.messages.len(), "Requesting chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CallbookError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallbookError::Generation(format!("reading response failed: {e}")))?;

        if !status.is_success() {
            return Err(CallbookError::Generation(format!(
                "{} API error {status}: {text}",
                self.provider_id
            )));
        }

        parse_response(&text)
    }
}
