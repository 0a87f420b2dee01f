//! Per-document relevance scoring.

use crate::resilience::RetryableInvoker;
use crate::Result;
use async_trait::async_trait;

/// One (query, document) pair to score.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub query: &'a str,
    pub text: &'a str,
    /// Position of the document in its query's retrieval results.
    pub position: usize,
    /// Backend to use; `None` lets the scorer pick its default.
    pub backend: Option<&'a str>,
}

impl<'a> ScoreRequest<'a> {
    pub fn new(query: &'a str, text: &'a str, position: usize) -> Self {
        Self {
            query,
            text,
            position,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: &'a str) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Computes a relevance score for a single document against a query.
#[async_trait]
pub trait DocumentScorer: Send + Sync {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<f64>;

    /// Whether scores reorder documents (false for retrieval-order passthrough).
    fn reranks(&self) -> bool {
        true
    }
}

#[async_trait]
impl<S: DocumentScorer + ?Sized> DocumentScorer for std::sync::Arc<S> {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<f64> {
        (**self).score(request).await
    }

    fn reranks(&self) -> bool {
        (**self).reranks()
    }
}

/// No-rerank scorer: the retrieval order is the ranking.
///
/// Scores are `-(position)`, strictly decreasing in retrieval order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalRankScorer;

#[async_trait]
impl DocumentScorer for RetrievalRankScorer {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<f64> {
        Ok(-(request.position as f64))
    }

    fn reranks(&self) -> bool {
        false
    }
}

/// Wraps a scorer so every call rotates through the invoker's backends on failure.
pub struct RetryingScorer<S> {
    inner: S,
    invoker: RetryableInvoker,
}

impl<S: DocumentScorer> RetryingScorer<S> {
    pub fn new(inner: S, invoker: RetryableInvoker) -> Self {
        Self { inner, invoker }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: DocumentScorer> DocumentScorer for RetryingScorer<S> {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<f64> {
        let inner = &self.inner;
        self.invoker
            .invoke(|backend| async move {
                inner
                    .score(ScoreRequest {
                        backend: Some(backend.as_str()),
                        ..request
                    })
                    .await
            })
            .await
    }

    fn reranks(&self) -> bool {
        self.inner.reranks()
    }
}
