//! OpenAI-compatible chat completions client.

use super::{GenerationRequest, Generator};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use tracing::debug;

pub struct ChatCompletionsGenerator {
    http_client: reqwest::Client,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl ChatCompletionsGenerator {
    pub fn builder() -> ChatCompletionsGeneratorBuilder {
        ChatCompletionsGeneratorBuilder::new()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        let model = request.backend.unwrap_or(self.model.as_str());
        let mut body = serde_json::json!({
            "model": model,
            "messages": request.messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }

        debug!(model, endpoint = self.endpoint.as_str(), "sending chat completion");
        let mut http = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().await?;
        let status = response.status();
        let body_str = response.text().await?;
        if !status.is_success() {
            return Err(Error::Remote {
                status: status.as_u16(),
                message: body_str,
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body_str)?;
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::generation_with_context(
                    "chat completion has no message content",
                    ErrorContext::new()
                        .with_field_path("choices[0].message.content")
                        .with_source("chat_completions"),
                )
            })
    }
}

pub struct ChatCompletionsGeneratorBuilder {
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    timeout_secs: u64,
}

impl ChatCompletionsGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: 120,
        }
    }

    /// Default model used when a request carries no backend.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<ChatCompletionsGenerator> {
        let model = self
            .model
            .ok_or_else(|| Error::configuration("Model must be specified"))?;
        let api_key = self
            .api_key
            .or_else(|| std::env::var("LLM_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        let base_url = self
            .base_url
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        url::Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid generation base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(base_url.clone()),
            )
        })?;
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(ChatCompletionsGenerator {
            http_client,
            model,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

impl Default for ChatCompletionsGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
