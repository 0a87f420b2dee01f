//! Pipeline configuration loaded from YAML.
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```yaml
//! search_top_k: 8
//! rerank_top_k: 3
//! max_concurrency: 16
//! scoring_failure: drop_document
//! context_format: numbered
//! reranker_retry:
//!   backends: [rerank-v3.5, rerank-english-v3.0]
//!   initial_delay_ms: 500
//! ```

use crate::pipeline::{ContextFormat, PromptTemplate, DEFAULT_PROMPT_TEMPLATE};
use crate::resilience::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming the config file read by [`RagConfig::load`].
pub const CONFIG_PATH_ENV: &str = "RAG_CONFIG_PATH";

/// What happens when a document cannot be scored after every backend failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFailurePolicy {
    /// The owning query fails; its siblings are unaffected.
    #[default]
    FailQuery,
    /// The document is dropped and the query continues with the rest.
    DropDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Candidates retrieved per query when the query does not set `k`.
    pub search_top_k: usize,
    /// Documents kept per query; when unset, derived from each query's `k` (or `search_top_k`).
    pub rerank_top_k: Option<usize>,
    /// In-flight scoring and generation calls per stage.
    pub max_concurrency: usize,
    pub scoring_failure: ScoringFailurePolicy,
    pub prompt_template: String,
    pub context_format: ContextFormat,
    pub reranker_retry: Option<RetryConfig>,
    pub llm_retry: Option<RetryConfig>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            search_top_k: 6,
            rerank_top_k: None,
            max_concurrency: 16,
            scoring_failure: ScoringFailurePolicy::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            context_format: ContextFormat::default(),
            reranker_retry: None,
            llm_retry: None,
        }
    }
}

impl RagConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RagConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading rag config");
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: ErrorContext {
                    details: Some(path.display().to_string()),
                    ..context
                },
            },
            other => other,
        })
    }

    /// Read the file named by `RAG_CONFIG_PATH`, or fall back to defaults.
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!(path = %path, "loading rag config from {}", CONFIG_PATH_ENV);
                Self::from_yaml_file(path)
            }
            _ => {
                debug!("{} not set, using default rag config", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_top_k == 0 {
            return Err(field_error("search_top_k must be at least 1", "search_top_k"));
        }
        if self.rerank_top_k == Some(0) {
            return Err(field_error("rerank_top_k must be at least 1", "rerank_top_k"));
        }
        if self.max_concurrency == 0 {
            return Err(field_error(
                "max_concurrency must be at least 1",
                "max_concurrency",
            ));
        }
        PromptTemplate::new(self.prompt_template.as_str())?;
        for (name, retry) in [
            ("reranker_retry", &self.reranker_retry),
            ("llm_retry", &self.llm_retry),
        ] {
            if let Some(retry) = retry {
                retry.validate().map_err(|e| prefix_field(e, name))?;
            }
        }
        Ok(())
    }

    pub fn prompt(&self) -> Result<PromptTemplate> {
        PromptTemplate::new(self.prompt_template.as_str())
    }

    pub fn with_search_top_k(mut self, k: usize) -> Self {
        self.search_top_k = k;
        self
    }

    pub fn with_rerank_top_k(mut self, k: usize) -> Self {
        self.rerank_top_k = Some(k);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_scoring_failure(mut self, policy: ScoringFailurePolicy) -> Self {
        self.scoring_failure = policy;
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_context_format(mut self, format: ContextFormat) -> Self {
        self.context_format = format;
        self
    }

    pub fn with_reranker_retry(mut self, retry: RetryConfig) -> Self {
        self.reranker_retry = Some(retry);
        self
    }

    pub fn with_llm_retry(mut self, retry: RetryConfig) -> Self {
        self.llm_retry = Some(retry);
        self
    }
}

fn field_error(message: &str, field: &str) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("rag_config"),
    )
}

fn prefix_field(err: Error, prefix: &str) -> Error {
    match err {
        Error::Configuration { message, context } => Error::Configuration {
            message,
            context: ErrorContext {
                field_path: Some(match context.field_path {
                    Some(field) => format!("{}.{}", prefix, field),
                    None => prefix.to_string(),
                }),
                ..context
            },
        },
        other => other,
    }
}
