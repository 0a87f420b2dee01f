//! Query records entering the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a query for the duration of a pipeline run.
///
/// Used as the partition key for every per-query grouping and join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    /// Fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for QueryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A user question plus the knobs that travel with it through every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub prompt: String,
    /// Free-form metadata filter handed verbatim to the retriever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
    /// Generation backend requested by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub return_context_docs: bool,
    /// Number of candidates to retrieve; the pipeline default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl Query {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: QueryId::generate(),
            prompt: prompt.into(),
            filters: None,
            model: None,
            return_context_docs: false,
            k: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<QueryId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_context_docs(mut self, return_context_docs: bool) -> Self {
        self.return_context_docs = return_context_docs;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}
