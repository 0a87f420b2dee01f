//! # rag-rerank
//!
//! Retrieval-augmented answer pipeline with a reranking stage.
//!
//! ## Overview
//!
//! Given a batch of queries, a retrieval index and a scoring model, the
//! pipeline picks and orders the best documents for each query, builds a
//! prompt from them and asks a language model for the answer. The index,
//! the scoring model and the language model are external collaborators
//! reached through traits; HTTP clients for common wire formats are included.
//!
//! - **Fan-out / fan-in**: one row per retrieved document, regrouped by query id
//! - **Deterministic ordering**: stable sort, ties keep retrieval order
//! - **Bounded concurrency**: scoring and generation never exceed `max_concurrency` in flight
//! - **Backend failover**: [`resilience::RetryableInvoker`] rotates through backends with backoff
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rag_rerank::generation::ChatCompletionsGenerator;
//! use rag_rerank::rerank::HttpRerankScorer;
//! use rag_rerank::retrieval::VectorStoreClient;
//! use rag_rerank::{AnswerPipeline, Query, RagConfig};
//!
//! #[tokio::main]
//! async fn main() -> rag_rerank::Result<()> {
//!     let pipeline = AnswerPipeline::builder()
//!         .retriever(VectorStoreClient::builder().base_url("http://127.0.0.1:8000").build()?)
//!         .scorer(HttpRerankScorer::builder().model("rerank-v3.5").build()?)
//!         .generator(ChatCompletionsGenerator::builder().model("gpt-4o-mini").build()?)
//!         .config(RagConfig::load()?)
//!         .build()?;
//!
//!     for outcome in pipeline.answer_batch(vec![Query::new("What is a borrow checker?")]).await? {
//!         match outcome {
//!             Ok(answer) => println!("{}", answer.response().unwrap_or_default()),
//!             Err(e) => eprintln!("{}", e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Batch orchestration, aggregation, context and prompt building |
//! | [`rerank`] | Per-document scoring |
//! | [`retrieval`] | Retrieval collaborator and metadata post-processing |
//! | [`generation`] | LLM collaborator |
//! | [`resilience`] | Backend-rotating retry |
//! | [`service`] | Transport-facing batch operations |
//! | [`config`] | YAML configuration |
//! | [`types`] | Records flowing through the pipeline |

pub mod config;
pub mod generation;
pub mod pipeline;
pub mod rerank;
pub mod resilience;
pub mod retrieval;
pub mod service;
pub mod types;

pub use config::{RagConfig, ScoringFailurePolicy};
pub use pipeline::{AnswerPipeline, AnswerPipelineBuilder, QueryOutcome};
pub use service::QuestionAnswerer;
pub use types::{AggregatedAnswer, Document, Query, QueryId, RagResponse, ScoredDocument};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, PipelineStage, QueryError};
