//! HTTP client for a vector-store server exposing `/v1/retrieve` and `/v1/inputs`.

use super::{InputsRequest, RetrievalRequest, Retriever};
use crate::types::Document;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::Value;

pub struct VectorStoreClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl VectorStoreClient {
    pub fn builder() -> VectorStoreClientBuilder {
        VectorStoreClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let endpoint = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Remote {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn expect_array(value: Value, source: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(Error::retrieval_with_context(
            "vector store response is not a JSON array",
            ErrorContext::new()
                .with_details(format!("got {}", type_name(&other)))
                .with_source(source.to_string()),
        )),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Retriever for VectorStoreClient {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<Document>> {
        let value = self.post_json("/v1/retrieve", request).await?;
        expect_array(value, "vector_store.retrieve")?
            .into_iter()
            .map(Document::from_value)
            .collect()
    }

    async fn list_documents(&self, request: &InputsRequest) -> Result<Vec<Value>> {
        let value = self.post_json("/v1/inputs", request).await?;
        expect_array(value, "vector_store.inputs")
    }
}

pub struct VectorStoreClientBuilder {
    base_url: Option<String>,
    timeout_secs: u64,
}

impl VectorStoreClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<VectorStoreClient> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("VECTOR_STORE_URL").ok())
            .ok_or_else(|| Error::configuration("Vector store URL required (VECTOR_STORE_URL)"))?;
        url::Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid vector store URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(base_url.clone()),
            )
        })?;
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(VectorStoreClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Default for VectorStoreClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
