//! Transport-facing operations.
//!
//! [`QuestionAnswerer`] exposes the batch operations a web transport would
//! mount at the [`routes`]. Records are plain serde types, so a transport
//! only needs to deserialize a JSON body and serialize the outcome.

use crate::error::{PipelineStage, QueryError};
use crate::pipeline::AnswerPipeline;
use crate::retrieval::{InputsRequest, RetrievalRequest};
use crate::types::{Document, Query, QueryId, RagResponse};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Paths at which a transport should mount each operation.
pub mod routes {
    pub const RETRIEVE: &str = "/v1/retrieve";
    pub const ANSWER: &str = "/v2/answer";
    pub const LIST_DOCUMENTS: &str = "/v2/list_documents";
}

/// Body of a retrieve request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveQuery {
    #[serde(default)]
    pub id: Option<QueryId>,
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub metadata_filter: Option<String>,
    #[serde(default)]
    pub filepath_globpattern: Option<String>,
}

/// Body of an answer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerQuery {
    #[serde(default)]
    pub id: Option<QueryId>,
    pub prompt: String,
    #[serde(default)]
    pub filters: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub return_context_docs: bool,
    #[serde(default)]
    pub k: Option<usize>,
}

impl AnswerQuery {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            filters: None,
            model: None,
            return_context_docs: false,
            k: None,
        }
    }

    /// Intake: the query keeps its id, or receives a fresh one.
    pub fn into_query(self) -> Query {
        Query {
            id: self.id.unwrap_or_else(QueryId::generate),
            prompt: self.prompt,
            filters: self.filters,
            model: self.model,
            return_context_docs: self.return_context_docs,
            k: self.k,
        }
    }
}

/// Body of a list-documents request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputsQuery {
    #[serde(default)]
    pub id: Option<QueryId>,
    #[serde(default)]
    pub metadata_filter: Option<String>,
    #[serde(default)]
    pub filepath_globpattern: Option<String>,
    #[serde(default)]
    pub return_status: bool,
}

pub struct QuestionAnswerer {
    pipeline: AnswerPipeline,
}

impl QuestionAnswerer {
    pub fn new(pipeline: AnswerPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &AnswerPipeline {
        &self.pipeline
    }

    /// Raw retrieval, no scoring or generation.
    pub async fn retrieve(
        &self,
        records: Vec<RetrieveQuery>,
    ) -> Vec<std::result::Result<Vec<Document>, QueryError>> {
        let retriever = self.pipeline.retriever();
        let calls = records.into_iter().map(|r| {
            let id = r.id.unwrap_or_else(QueryId::generate);
            let request = RetrievalRequest::new(r.query, r.k.unwrap_or(self.pipeline.search_top_k()))
                .with_metadata_filter(r.metadata_filter)
                .with_filepath_globpattern(r.filepath_globpattern);
            async move {
                retriever.retrieve(&request).await.map_err(|e| {
                    warn!(query_id = %id, stage = "retrieval", error = %e, "retrieve failed");
                    QueryError::new(id, PipelineStage::Retrieval, e)
                })
            }
        });
        futures::future::join_all(calls).await
    }

    /// Full RAG answers. Fails as a whole only for batch-level problems.
    pub async fn answer_query(
        &self,
        records: Vec<AnswerQuery>,
    ) -> Result<Vec<std::result::Result<RagResponse, QueryError>>> {
        let queries: Vec<Query> = records.into_iter().map(AnswerQuery::into_query).collect();
        debug!(queries = queries.len(), "answer_query");
        let outcomes = self.pipeline.answer_batch(queries).await?;
        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                outcome.and_then(|answer| {
                    let id = answer.query().id.clone();
                    answer.into_result().ok_or_else(|| {
                        QueryError::new(
                            id,
                            PipelineStage::Finalize,
                            crate::Error::validation_with_context(
                                "finalized answer has no response",
                                crate::ErrorContext::new().with_source("question_answerer"),
                            ),
                        )
                    })
                })
            })
            .collect())
    }

    pub async fn list_documents(
        &self,
        records: Vec<InputsQuery>,
    ) -> Vec<std::result::Result<Vec<Value>, QueryError>> {
        let retriever = self.pipeline.retriever();
        let calls = records.into_iter().map(|r| {
            let id = r.id.unwrap_or_else(QueryId::generate);
            let request = InputsRequest {
                metadata_filter: r.metadata_filter,
                filepath_globpattern: r.filepath_globpattern,
                return_status: r.return_status,
            };
            async move {
                retriever.list_documents(&request).await.map_err(|e| {
                    warn!(query_id = %id, stage = "list_documents", error = %e, "list_documents failed");
                    QueryError::new(id, PipelineStage::ListDocuments, e)
                })
            }
        });
        futures::future::join_all(calls).await
    }
}
