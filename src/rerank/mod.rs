//! Rerank module: per-document relevance scoring.
//!
//! [`DocumentScorer`] is the seam the pipeline calls once per candidate
//! document. [`RetrievalRankScorer`] is the no-rerank default,
//! [`HttpRerankScorer`] talks to a Cohere-style endpoint, and
//! [`RetryingScorer`] adds backend rotation to any scorer.

mod client;
mod scorer;
mod types;

pub use client::{HttpRerankScorer, HttpRerankScorerBuilder};
pub use scorer::{DocumentScorer, RetrievalRankScorer, RetryingScorer, ScoreRequest};
pub use types::RerankResult;
