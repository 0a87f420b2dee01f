//! Retrieved documents and their reranked form.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the relevance score is attached to an emitted document.
pub const SCORE_FIELD: &str = "reranker_score";

const METADATA_FIELD: &str = "metadata";

/// A candidate document as returned by the retrieval collaborator.
///
/// Only `text` is interpreted. Every other field, `metadata` included, is kept
/// as raw JSON and carried through untouched, whatever its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn with_metadata(self, metadata: Map<String, Value>) -> Self {
        self.with_field(METADATA_FIELD, Value::Object(metadata))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The `metadata` field when it is a JSON object.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.extra.get(METADATA_FIELD).and_then(Value::as_object)
    }

    pub fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.extra
            .get_mut(METADATA_FIELD)
            .and_then(Value::as_object_mut)
    }

    /// Parse a document from an arbitrary JSON payload, requiring a string `text` field.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.get("text").map(Value::is_string).unwrap_or(false) {
            return Err(Error::validation_with_context(
                "document payload has no string `text` field",
                ErrorContext::new()
                    .with_field_path("text")
                    .with_source("document"),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Look up a string metadata value (e.g. `path`).
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }
}

/// A document with its relevance score.
///
/// `sort_key` is always `-score`, so an ascending sort on it yields
/// descending relevance. Both are fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    document: Document,
    score: f64,
    sort_key: f64,
}

impl ScoredDocument {
    pub fn new(document: Document, score: f64) -> Result<Self> {
        if !score.is_finite() {
            return Err(Error::scoring_with_context(
                format!("score must be finite, got {}", score),
                ErrorContext::new().with_source("scored_document"),
            ));
        }
        Ok(Self {
            document,
            score,
            sort_key: -score,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn sort_key(&self) -> f64 {
        self.sort_key
    }

    /// The document payload with the score attached under [`SCORE_FIELD`].
    pub fn to_value_with_score(&self) -> Value {
        let mut value = serde_json::to_value(&self.document).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.insert(SCORE_FIELD.to_string(), Value::from(self.score));
        }
        value
    }
}
