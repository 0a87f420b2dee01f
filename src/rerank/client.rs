//! HTTP scorer for Cohere-style rerank endpoints.

use super::scorer::{DocumentScorer, ScoreRequest};
use super::types::RerankResult;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;

/// Scores one document per request against a `/rerank` endpoint.
pub struct HttpRerankScorer {
    http_client: reqwest::Client,
    model: String,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRerankScorer {
    pub fn builder() -> HttpRerankScorerBuilder {
        HttpRerankScorerBuilder::new()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentScorer for HttpRerankScorer {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<f64> {
        let body = serde_json::json!({
            "model": request.backend.unwrap_or(self.model.as_str()),
            "query": request.query,
            "documents": [request.text],
            "top_n": 1,
        });
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
        let results: Vec<RerankResult> = json
            .get("results")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let first = results.into_iter().find(|r| r.index == 0).ok_or_else(|| {
            Error::scoring_with_context(
                "rerank response has no result for the submitted document",
                ErrorContext::new()
                    .with_field_path("results")
                    .with_source("http_rerank"),
            )
        })?;
        Ok(first.relevance_score)
    }
}

pub struct HttpRerankScorerBuilder {
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    endpoint_path: Option<String>,
    timeout_secs: u64,
}

impl HttpRerankScorerBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            api_key: None,
            base_url: None,
            endpoint_path: None,
            timeout_secs: 60,
        }
    }

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

    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = Some(path.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpRerankScorer> {
        let model = self
            .model
            .ok_or_else(|| Error::configuration("Model must be specified"))?;
        let api_key = self
            .api_key
            .or_else(|| std::env::var("RERANK_API_KEY").ok());
        let base_url = self
            .base_url
            .unwrap_or_else(|| "https://api.cohere.com/v2".to_string());
        url::Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid rerank base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(base_url.clone()),
            )
        })?;
        let endpoint_path = self
            .endpoint_path
            .unwrap_or_else(|| "/rerank".to_string());
        let endpoint_path = if endpoint_path.starts_with('/') {
            endpoint_path
        } else {
            format!("/{}", endpoint_path)
        };
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(HttpRerankScorer {
            http_client,
            model,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), endpoint_path),
            api_key,
        })
    }
}

impl Default for HttpRerankScorerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
