use crate::types::QueryId;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "reranker_retry.backends", "documents[3].text")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "retry_invoker", "query_aggregator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Retrieval failed: {message}{}", format_context(.context))]
    Retrieval {
        message: String,
        context: ErrorContext,
    },

    #[error("Scoring failed: {message}{}", format_context(.context))]
    Scoring {
        message: String,
        context: ErrorContext,
    },

    #[error("Generation failed: {message}{}", format_context(.context))]
    Generation {
        message: String,
        context: ErrorContext,
    },

    #[error("Remote error: HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn retrieval_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Retrieval {
            message: msg.into(),
            context,
        }
    }

    pub fn scoring_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Scoring {
            message: msg.into(),
            context,
        }
    }

    pub fn generation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Generation {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Retrieval { context, .. }
            | Error::Scoring { context, .. }
            | Error::Generation { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}

/// Stage of the per-query lifecycle at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Retrieval,
    Scoring,
    Aggregation,
    Context,
    Prompt,
    Generation,
    Finalize,
    ListDocuments,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Retrieval => "retrieval",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Aggregation => "aggregation",
            PipelineStage::Context => "context",
            PipelineStage::Prompt => "prompt",
            PipelineStage::Generation => "generation",
            PipelineStage::Finalize => "finalize",
            PipelineStage::ListDocuments => "list_documents",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure scoped to one query of a batch.
///
/// Siblings in the same batch are never affected by a `QueryError`; the
/// caller always receives one result per submitted query.
#[derive(Debug, Error)]
#[error("query {query_id} failed at {stage}: {source}")]
pub struct QueryError {
    pub query_id: QueryId,
    pub stage: PipelineStage,
    #[source]
    pub source: Error,
}

impl QueryError {
    pub fn new(query_id: QueryId, stage: PipelineStage, source: Error) -> Self {
        Self {
            query_id,
            stage,
            source,
        }
    }
}
