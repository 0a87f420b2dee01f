//! # Answer Pipeline
//!
//! Turns a batch of queries into one answer per query:
//!
//! ```text
//! Queries ─► Retrieve ─► Explode ─► Score ─► Aggregate ─► Context ─► Prompt ─► Generate ─► Shape
//!   (N)        (N)      (Σ docs)   (Σ docs)     (N)          (N)       (N)        (N)        (N)
//! ```
//!
//! Retrieval fans each query out into one row per candidate document. Rows are
//! scored with bounded concurrency and the whole scoring stage completes
//! before aggregation fans them back in by query id. A failure is scoped to
//! the query that owns it and surfaces as a [`QueryError`]; the other queries
//! of the batch carry on.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AnswerPipeline`] | Runs a batch end to end |
//! | [`AnswerPipelineBuilder`] | Wires collaborators and [`RagConfig`] together |
//! | [`QueryAggregator`] | Group, sort, truncate |
//! | [`PromptTemplate`] | `{context}` / `{query}` template |

mod aggregate;
mod context;

pub use aggregate::{default_top_k, QueryAggregator, ScoredRow};
pub use context::{
    build_context, shape_response, ContextFormat, PromptTemplate, DEFAULT_PROMPT_TEMPLATE,
};

use crate::config::{RagConfig, ScoringFailurePolicy};
use crate::error::{PipelineStage, QueryError};
use crate::generation::{GenerationRequest, Generator, RetryingGenerator};
use crate::rerank::{DocumentScorer, RetrievalRankScorer, RetryingScorer, ScoreRequest};
use crate::resilience::RetryableInvoker;
use crate::retrieval::{RetrievalRequest, Retriever};
use crate::types::{
    single_turn, AggregatedAnswer, Document, Query, QueryId, QueryProgress, QueryState,
    ScoredDocument,
};
use crate::{Error, ErrorContext, Result};
use futures::StreamExt;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Per-query outcome of a batch.
pub type QueryOutcome = std::result::Result<AggregatedAnswer, QueryError>;

pub struct AnswerPipeline {
    retriever: Arc<dyn Retriever>,
    scorer: Arc<dyn DocumentScorer>,
    generator: Arc<dyn Generator>,
    aggregator: QueryAggregator,
    template: PromptTemplate,
    context_format: ContextFormat,
    search_top_k: usize,
    max_concurrency: usize,
    scoring_failure: ScoringFailurePolicy,
}

impl AnswerPipeline {
    pub fn builder() -> AnswerPipelineBuilder {
        AnswerPipelineBuilder::new()
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// Documents `query` keeps after aggregation.
    pub fn top_k_for(&self, query: &Query) -> usize {
        self.aggregator.top_k_for(query)
    }

    pub fn search_top_k(&self) -> usize {
        self.search_top_k
    }

    /// The retrieval request a query produces.
    pub fn retrieval_request(&self, query: &Query) -> RetrievalRequest {
        RetrievalRequest::new(query.prompt.clone(), query.k.unwrap_or(self.search_top_k))
            .with_metadata_filter(query.filters.clone())
    }

    /// Answer every query of the batch.
    ///
    /// The outer error is reserved for batch-level problems (duplicate query
    /// ids). Otherwise the result holds exactly one outcome per input query,
    /// in input order.
    pub async fn answer_batch(&self, queries: Vec<Query>) -> Result<Vec<QueryOutcome>> {
        check_unique_ids(&queries)?;
        let batch_start = Instant::now();
        let queries: Vec<Arc<Query>> = queries.into_iter().map(Arc::new).collect();
        let mut failed: HashMap<QueryId, QueryError> = HashMap::new();
        let mut progress = QueryProgress::default();

        // retrieve
        let retrieved = self
            .retrieve_all(&queries)
            .instrument(info_span!("retrieval", queries = queries.len()))
            .await;
        let mut rows: Vec<(Arc<Query>, usize, Document)> = Vec::new();
        for (query, outcome) in queries.iter().zip(retrieved) {
            match outcome {
                Ok(docs) => {
                    debug!(query_id = %query.id, documents = docs.len(), "retrieved");
                    progress.retrieved(&query.id);
                    rows.extend(
                        docs.into_iter()
                            .enumerate()
                            .map(|(pos, doc)| (Arc::clone(query), pos, doc)),
                    );
                }
                Err(e) => {
                    warn!(query_id = %query.id, stage = "retrieval", error = %e, "query failed");
                    failed.insert(
                        query.id.clone(),
                        QueryError::new(query.id.clone(), PipelineStage::Retrieval, e),
                    );
                }
            }
        }

        // score; this await is the barrier before aggregation
        let scored = self
            .score_all(rows)
            .instrument(info_span!("scoring"))
            .await;
        let mut scored_rows = self.apply_scoring_policy(scored, &mut failed);
        for query in queries.iter() {
            if failed.contains_key(&query.id) {
                continue;
            }
            if let Err(e) = progress.advance(&query.id, QueryState::Scored) {
                failed.insert(
                    query.id.clone(),
                    QueryError::new(query.id.clone(), PipelineStage::Scoring, e),
                );
            }
        }
        scored_rows.retain(|r| !failed.contains_key(&r.query.id));

        let survivors: Vec<Arc<Query>> = queries
            .iter()
            .filter(|q| !failed.contains_key(&q.id))
            .cloned()
            .collect();
        let answers = self.aggregator.aggregate(&survivors, scored_rows);

        let mut prepared = Vec::with_capacity(answers.len());
        for answer in answers {
            let id = answer.query().id.clone();
            let checked = progress
                .advance(&id, QueryState::Aggregated)
                .map_err(|e| QueryError::new(id, PipelineStage::Aggregation, e));
            match checked.and_then(|()| self.prepare_prompt(answer)) {
                Ok(a) => prepared.push(a),
                Err(e) => {
                    failed.insert(e.query_id.clone(), e);
                }
            }
        }

        let generated = self
            .generate_all(prepared)
            .instrument(info_span!("generation"))
            .await;

        let mut done: HashMap<QueryId, QueryOutcome> = HashMap::with_capacity(queries.len());
        for outcome in generated {
            match outcome.and_then(finalize) {
                Ok(answer) => {
                    done.insert(answer.query().id.clone(), Ok(answer));
                }
                Err(e) => {
                    failed.insert(e.query_id.clone(), e);
                }
            }
        }
        for (id, err) in failed {
            done.insert(id, Err(err));
        }

        let mut out = Vec::with_capacity(queries.len());
        for query in &queries {
            let outcome = done.remove(&query.id).unwrap_or_else(|| {
                Err(QueryError::new(
                    query.id.clone(),
                    PipelineStage::Finalize,
                    Error::validation_with_context(
                        "query produced no result",
                        ErrorContext::new().with_source("answer_pipeline"),
                    ),
                ))
            });
            out.push(outcome);
        }

        let failures = out.iter().filter(|o| o.is_err()).count();
        info!(
            queries = out.len(),
            failures,
            duration_ms = batch_start.elapsed().as_millis() as u64,
            "answer batch finished"
        );
        Ok(out)
    }

    async fn retrieve_all(&self, queries: &[Arc<Query>]) -> Vec<Result<Vec<Document>>> {
        let calls = queries.iter().map(|q| {
            let request = self.retrieval_request(q);
            let retriever = &self.retriever;
            async move { retriever.retrieve(&request).await }
        });
        futures::future::join_all(calls).await
    }

    async fn score_all(
        &self,
        rows: Vec<(Arc<Query>, usize, Document)>,
    ) -> Vec<(Arc<Query>, usize, Result<ScoredDocument>)> {
        let start = Instant::now();
        let total = rows.len();
        let scorer = &self.scorer;
        let results: Vec<_> = futures::stream::iter(rows)
            .map(|(query, position, doc)| async move {
                let score = scorer
                    .score(ScoreRequest::new(&query.prompt, &doc.text, position))
                    .await;
                let scored = score.and_then(|s| ScoredDocument::new(doc, s));
                (query, position, scored)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        info!(
            documents = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "scoring finished"
        );
        results
    }

    fn apply_scoring_policy(
        &self,
        scored: Vec<(Arc<Query>, usize, Result<ScoredDocument>)>,
        failed: &mut HashMap<QueryId, QueryError>,
    ) -> Vec<ScoredRow> {
        let mut rows = Vec::with_capacity(scored.len());
        // lowest failing position per query, so the reported error does not depend on completion order
        let mut first_failure: HashMap<QueryId, (usize, Error)> = HashMap::new();

        for (query, position, outcome) in scored {
            match outcome {
                Ok(doc) => rows.push(ScoredRow::new(query, position, doc)),
                Err(e) => match self.scoring_failure {
                    ScoringFailurePolicy::DropDocument => {
                        warn!(
                            query_id = %query.id,
                            position,
                            error = %e,
                            "dropping document that could not be scored"
                        );
                    }
                    ScoringFailurePolicy::FailQuery => match first_failure.entry(query.id.clone()) {
                        Entry::Occupied(mut slot) => {
                            if position < slot.get().0 {
                                slot.insert((position, e));
                            }
                        }
                        Entry::Vacant(slot) => {
                            slot.insert((position, e));
                        }
                    },
                },
            }
        }

        for (id, (position, source)) in first_failure {
            warn!(query_id = %id, stage = "scoring", position, error = %source, "query failed");
            let err = Error::scoring_with_context(
                format!("document {} could not be scored: {}", position, source),
                ErrorContext::new()
                    .with_field_path(format!("documents[{}]", position))
                    .with_source("document_scorer"),
            );
            failed.insert(id.clone(), QueryError::new(id, PipelineStage::Scoring, err));
        }
        rows.retain(|r| !failed.contains_key(&r.query.id));
        rows
    }

    fn prepare_prompt(&self, mut answer: AggregatedAnswer) -> std::result::Result<AggregatedAnswer, QueryError> {
        let id = answer.query().id.clone();
        answer.context = Some(build_context(answer.documents(), self.context_format));
        answer
            .advance(QueryState::Contextualized)
            .map_err(|e| QueryError::new(id.clone(), PipelineStage::Context, e))?;

        let prompt = self
            .template
            .render(answer.context().unwrap_or_default(), &answer.query().prompt);
        answer.prompt = Some(prompt);
        answer
            .advance(QueryState::Prompted)
            .map_err(|e| QueryError::new(id, PipelineStage::Prompt, e))?;
        Ok(answer)
    }

    async fn generate_all(&self, answers: Vec<AggregatedAnswer>) -> Vec<QueryOutcome> {
        let start = Instant::now();
        let total = answers.len();
        let generator = &self.generator;
        let results: Vec<_> = futures::stream::iter(answers)
            .map(|mut answer| async move {
                let id = answer.query().id.clone();
                let messages = single_turn(answer.prompt().unwrap_or_default());
                let request =
                    GenerationRequest::new(&messages).with_backend(answer.query().model.as_deref());
                match generator.generate(request).await {
                    Ok(text) => {
                        answer.response = Some(text);
                        answer
                            .advance(QueryState::Generated)
                            .map(|()| answer)
                            .map_err(|e| QueryError::new(id, PipelineStage::Generation, e))
                    }
                    Err(e) => {
                        warn!(query_id = %id, stage = "generation", error = %e, "query failed");
                        Err(QueryError::new(id, PipelineStage::Generation, e))
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        info!(
            queries = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );
        results
    }
}

fn finalize(mut answer: AggregatedAnswer) -> std::result::Result<AggregatedAnswer, QueryError> {
    let response = answer.response.clone().unwrap_or_default();
    answer.result = Some(shape_response(&answer, response));
    let id = answer.query().id.clone();
    answer
        .advance(QueryState::Finalized)
        .map_err(|e| QueryError::new(id, PipelineStage::Finalize, e))?;
    Ok(answer)
}

fn check_unique_ids(queries: &[Query]) -> Result<()> {
    let mut seen = HashSet::with_capacity(queries.len());
    for (i, q) in queries.iter().enumerate() {
        if !seen.insert(&q.id) {
            return Err(Error::validation_with_context(
                format!("duplicate query id {} in batch", q.id),
                ErrorContext::new()
                    .with_field_path(format!("queries[{}].id", i))
                    .with_source("answer_pipeline"),
            ));
        }
    }
    Ok(())
}

/// Builder for [`AnswerPipeline`].
///
/// The retriever and generator are required. Without a scorer the pipeline
/// keeps retrieval order ([`RetrievalRankScorer`]). Retry sections of the
/// config wrap the scorer and generator in backend rotation.
pub struct AnswerPipelineBuilder {
    retriever: Option<Arc<dyn Retriever>>,
    scorer: Option<Arc<dyn DocumentScorer>>,
    generator: Option<Arc<dyn Generator>>,
    config: RagConfig,
}

impl AnswerPipelineBuilder {
    pub fn new() -> Self {
        Self {
            retriever: None,
            scorer: None,
            generator: None,
            config: RagConfig::default(),
        }
    }

    pub fn retriever(mut self, retriever: impl Retriever + 'static) -> Self {
        self.retriever = Some(Arc::new(retriever));
        self
    }

    pub fn scorer(mut self, scorer: impl DocumentScorer + 'static) -> Self {
        self.scorer = Some(Arc::new(scorer));
        self
    }

    pub fn generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AnswerPipeline> {
        let config = self.config;
        config.validate()?;

        let retriever = self
            .retriever
            .ok_or_else(|| Error::configuration("a retriever is required"))?;
        let generator = self
            .generator
            .ok_or_else(|| Error::configuration("a generator is required"))?;
        let mut scorer: Arc<dyn DocumentScorer> = self
            .scorer
            .unwrap_or_else(|| Arc::new(RetrievalRankScorer));

        if let Some(retry) = config.reranker_retry.clone() {
            scorer = Arc::new(RetryingScorer::new(scorer, RetryableInvoker::new(retry)?));
        }
        let generator: Arc<dyn Generator> = match config.llm_retry.clone() {
            Some(retry) => Arc::new(RetryingGenerator::new(
                generator,
                RetryableInvoker::new(retry)?,
            )),
            None => generator,
        };

        let aggregator = match config.rerank_top_k {
            Some(top_k) => QueryAggregator::new(top_k)?,
            None => QueryAggregator::per_query(config.search_top_k, scorer.reranks())?,
        };

        info!(
            search_top_k = config.search_top_k,
            rerank_top_k = ?config.rerank_top_k,
            reranks = scorer.reranks(),
            max_concurrency = config.max_concurrency,
            scoring_failure = ?config.scoring_failure,
            "answer pipeline ready"
        );

        Ok(AnswerPipeline {
            retriever,
            scorer,
            generator,
            aggregator,
            template: config.prompt()?,
            context_format: config.context_format,
            search_top_k: config.search_top_k,
            max_concurrency: config.max_concurrency,
            scoring_failure: config.scoring_failure,
        })
    }
}

impl Default for AnswerPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
