//! End-to-end batches through the answer pipeline with in-process collaborators.

use async_trait::async_trait;
use rag_rerank::generation::{GenerationRequest, Generator};
use rag_rerank::rerank::{DocumentScorer, ScoreRequest};
use rag_rerank::resilience::RetryConfig;
use rag_rerank::retrieval::{InputsRequest, RetrievalRequest, Retriever};
use rag_rerank::service::{AnswerQuery, InputsQuery, QuestionAnswerer, RetrieveQuery};
use rag_rerank::types::{QueryState, SCORE_FIELD};
use rag_rerank::{
    AnswerPipeline, Document, Error, ErrorContext, PipelineStage, Query, RagConfig, Result,
    ScoringFailurePolicy,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Documents are `"<label>:<score>"`; the scorer reads the score back out of the text.
struct FixtureRetriever {
    by_prompt: HashMap<String, Vec<Document>>,
}

impl FixtureRetriever {
    fn new(entries: Vec<(&str, Vec<&str>)>) -> Self {
        let by_prompt = entries
            .into_iter()
            .map(|(prompt, docs)| {
                let docs = docs
                    .into_iter()
                    .map(|t| {
                        Document::new(t).with_metadata(
                            json!({"path": format!("{}.md", t)})
                                .as_object()
                                .cloned()
                                .unwrap(),
                        )
                    })
                    .collect();
                (prompt.to_string(), docs)
            })
            .collect();
        Self { by_prompt }
    }
}

#[async_trait]
impl Retriever for FixtureRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<Document>> {
        let mut docs = self
            .by_prompt
            .get(&request.query)
            .cloned()
            .unwrap_or_default();
        docs.truncate(request.k);
        Ok(docs)
    }

    async fn list_documents(&self, request: &InputsRequest) -> Result<Vec<Value>> {
        Ok(vec![json!({
            "path": "listed.md",
            "status_requested": request.return_status
        })])
    }
}

/// Parses the score from the text and sleeps inversely to the position so that
/// completions arrive out of order.
struct TextScorer {
    completed: Arc<AtomicUsize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    backends: Mutex<Vec<Option<String>>>,
}

impl TextScorer {
    fn new() -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            backends: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentScorer for TextScorer {
    async fn score(&self, request: ScoreRequest<'_>) -> Result<f64> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.backends
            .lock()
            .unwrap()
            .push(request.backend.map(str::to_string));
        tokio::time::sleep(Duration::from_millis(40 - 10 * request.position.min(3) as u64)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request.backend == Some("rerank-down") {
            return Err(Error::Remote {
                status: 503,
                message: "unavailable".into(),
            });
        }
        let parsed = request
            .text
            .rsplit(':')
            .next()
            .and_then(|s| s.parse::<f64>().ok());
        let result = match parsed {
            Some(score) => Ok(score),
            None => Err(Error::scoring_with_context(
                format!("cannot score {:?}", request.text),
                ErrorContext::new(),
            )),
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Records how many scoring calls had completed when generation started.
struct SnapshotGenerator {
    scored: Arc<AtomicUsize>,
    seen_at_generation: Mutex<Vec<usize>>,
    prompts: Mutex<Vec<String>>,
}

impl SnapshotGenerator {
    fn new(scored: Arc<AtomicUsize>) -> Self {
        Self {
            scored,
            seen_at_generation: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for SnapshotGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        self.seen_at_generation
            .lock()
            .unwrap()
            .push(self.scored.load(Ordering::SeqCst));
        let prompt = request.messages[0].content.clone();
        self.prompts.lock().unwrap().push(prompt);
        match request.backend {
            Some("broken-llm") => Err(Error::generation_with_context(
                "model refused",
                ErrorContext::new(),
            )),
            backend => Ok(format!("answer from {}", backend.unwrap_or("default"))),
        }
    }
}

fn build(
    retriever: FixtureRetriever,
    config: RagConfig,
) -> (AnswerPipeline, Arc<TextScorer>, Arc<SnapshotGenerator>) {
    let scorer = Arc::new(TextScorer::new());
    let generator = Arc::new(SnapshotGenerator::new(Arc::clone(&scorer.completed)));
    let pipeline = AnswerPipeline::builder()
        .retriever(retriever)
        .scorer(Arc::clone(&scorer))
        .generator(Arc::clone(&generator))
        .config(config)
        .build()
        .unwrap();
    (pipeline, scorer, generator)
}

fn texts(answer: &rag_rerank::AggregatedAnswer) -> Vec<String> {
    answer
        .documents()
        .iter()
        .map(|d| d.document().text.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_three_queries_four_documents_top_two() {
    let retriever = FixtureRetriever::new(vec![
        ("alpha", vec!["a0:0.1", "a1:0.9", "a2:0.5", "a3:0.7"]),
        ("beta", vec!["b0:0.8", "b1:0.2", "b2:0.3", "b3:0.6"]),
        ("gamma", vec!["c0:0.05", "c1:0.15", "c2:0.95", "c3:0.85"]),
    ]);
    let (pipeline, _scorer, generator) = build(
        retriever,
        RagConfig::default().with_search_top_k(4).with_rerank_top_k(2),
    );

    let out = pipeline
        .answer_batch(vec![
            Query::new("alpha").with_id("qa"),
            Query::new("beta").with_id("qb").with_context_docs(true),
            Query::new("gamma").with_id("qc"),
        ])
        .await
        .unwrap();

    assert_eq!(out.len(), 3);
    let answers: Vec<_> = out.into_iter().map(|o| o.unwrap()).collect();
    assert_eq!(texts(&answers[0]), vec!["a1:0.9", "a3:0.7"]);
    assert_eq!(texts(&answers[1]), vec!["b0:0.8", "b3:0.6"]);
    assert_eq!(texts(&answers[2]), vec!["c2:0.95", "c3:0.85"]);
    for a in &answers {
        assert_eq!(a.state(), QueryState::Finalized);
        assert_eq!(a.documents().len(), 2);
    }

    // every one of the 12 scoring calls finished before any generation started
    let seen = generator.seen_at_generation.lock().unwrap().clone();
    assert_eq!(seen, vec![12, 12, 12]);

    let echoed = answers[1].result().unwrap().context_docs.clone().unwrap();
    assert_eq!(echoed.len(), 2);
    assert_eq!(echoed[0]["text"], "b0:0.8");
    assert_eq!(echoed[0][SCORE_FIELD], 0.8);
    assert_eq!(echoed[0]["metadata"]["path"], "b0:0.8.md");
    assert!(answers[0].result().unwrap().context_docs.is_none());

    let context = answers[0].context().unwrap();
    assert!(context.starts_with("Source 1 (score 0.9000) [a1:0.9.md]:\na1:0.9"));
    assert!(answers[0].prompt().unwrap().contains("alpha"));
}

#[tokio::test(start_paused = true)]
async fn test_score_ties_keep_retrieval_order() {
    let retriever = FixtureRetriever::new(vec![("tie", vec!["t0:0.5", "t1:0.5", "t2:0.5", "t3:0.9"])]);
    let (pipeline, _, _) = build(
        retriever,
        RagConfig::default().with_search_top_k(4).with_rerank_top_k(3),
    );
    let out = pipeline
        .answer_batch(vec![Query::new("tie").with_id("t")])
        .await
        .unwrap();
    assert_eq!(
        texts(out[0].as_ref().unwrap()),
        vec!["t3:0.9", "t0:0.5", "t1:0.5"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_scoring_failure_fails_only_its_query() {
    let retriever = FixtureRetriever::new(vec![
        ("good", vec!["g0:0.3", "g1:0.4"]),
        ("bad", vec!["x0:0.3", "x1:0.2", "unscorable"]),
    ]);
    let (pipeline, _, generator) = build(retriever, RagConfig::default().with_search_top_k(4));

    let out = pipeline
        .answer_batch(vec![
            Query::new("good").with_id("ok"),
            Query::new("bad").with_id("ko"),
        ])
        .await
        .unwrap();

    assert!(out[0].is_ok());
    let err = out[1].as_ref().unwrap_err();
    assert_eq!(err.query_id.as_str(), "ko");
    assert_eq!(err.stage, PipelineStage::Scoring);
    assert!(err.source.to_string().contains("document 2"));
    assert_eq!(generator.prompts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_document_policy_keeps_siblings() {
    let retriever = FixtureRetriever::new(vec![("mixed", vec!["m0:0.3", "unscorable", "m2:0.6"])]);
    let (pipeline, _, _) = build(
        retriever,
        RagConfig::default()
            .with_search_top_k(4)
            .with_rerank_top_k(4)
            .with_scoring_failure(ScoringFailurePolicy::DropDocument),
    );
    let out = pipeline
        .answer_batch(vec![Query::new("mixed").with_id("m")])
        .await
        .unwrap();
    assert_eq!(texts(out[0].as_ref().unwrap()), vec!["m2:0.6", "m0:0.3"]);
}

#[tokio::test(start_paused = true)]
async fn test_query_without_documents_still_answers() {
    let retriever = FixtureRetriever::new(vec![("full", vec!["f0:0.1"])]);
    let (pipeline, _, generator) = build(retriever, RagConfig::default());
    let out = pipeline
        .answer_batch(vec![
            Query::new("nothing indexed").with_id("empty"),
            Query::new("full").with_id("full"),
        ])
        .await
        .unwrap();

    let empty = out[0].as_ref().unwrap();
    assert!(empty.documents().is_empty());
    assert_eq!(empty.context(), Some(""));
    assert_eq!(empty.state(), QueryState::Finalized);
    assert!(out[1].is_ok());
    assert_eq!(generator.prompts.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_generation_failure_is_reported_per_query() {
    let retriever = FixtureRetriever::new(vec![("q", vec!["d0:0.1"])]);
    let (pipeline, _, _) = build(retriever, RagConfig::default());
    let out = pipeline
        .answer_batch(vec![
            Query::new("q").with_id("fine").with_model("small-llm"),
            Query::new("q").with_id("broken").with_model("broken-llm"),
        ])
        .await
        .unwrap();

    assert_eq!(
        out[0].as_ref().unwrap().response(),
        Some("answer from small-llm")
    );
    let err = out[1].as_ref().unwrap_err();
    assert_eq!(err.query_id.as_str(), "broken");
    assert_eq!(err.stage, PipelineStage::Generation);
}

#[tokio::test(start_paused = true)]
async fn test_scoring_concurrency_is_bounded() {
    let docs: Vec<String> = (0..10).map(|i| format!("d{}:0.{}", i, i)).collect();
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    let retriever = FixtureRetriever::new(vec![("wide", doc_refs.clone()), ("also wide", doc_refs)]);
    let (pipeline, scorer, _) = build(
        retriever,
        RagConfig::default()
            .with_search_top_k(10)
            .with_max_concurrency(3),
    );
    pipeline
        .answer_batch(vec![Query::new("wide"), Query::new("also wide")])
        .await
        .unwrap();
    assert_eq!(scorer.completed.load(Ordering::SeqCst), 20);
    assert!(scorer.max_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test(start_paused = true)]
async fn test_reranker_rotation_recovers_from_failing_backend() {
    let retriever = FixtureRetriever::new(vec![("q", vec!["d0:0.2", "d1:0.4"])]);
    let (pipeline, scorer, _) = build(
        retriever,
        RagConfig::default().with_reranker_retry(
            RetryConfig::new(vec!["rerank-down".into(), "rerank-up".into()])
                .with_initial_delay(Duration::from_millis(100))
                .with_jitter(Duration::ZERO),
        ),
    );
    let out = pipeline
        .answer_batch(vec![Query::new("q").with_id("r")])
        .await
        .unwrap();

    // reranking default top-k is half of search_top_k (6 / 2)
    assert_eq!(pipeline.top_k_for(&Query::new("q")), 3);
    assert_eq!(texts(out[0].as_ref().unwrap()), vec!["d1:0.4", "d0:0.2"]);
    let backends = scorer.backends.lock().unwrap().clone();
    assert_eq!(backends.len(), 4);
    assert_eq!(
        backends
            .iter()
            .filter(|b| b.as_deref() == Some("rerank-up"))
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_reranked_top_k_follows_each_query_k() {
    let wide: Vec<String> = (0..10).map(|i| format!("w{}:0.{}", i, i)).collect();
    let retriever = FixtureRetriever::new(vec![
        ("wide", wide.iter().map(String::as_str).collect()),
        ("plain", vec!["p0:0.1", "p1:0.2", "p2:0.3", "p3:0.4", "p4:0.5", "p5:0.6", "p6:0.7"]),
    ]);
    let (pipeline, _, _) = build(retriever, RagConfig::default());

    let wide_query = Query::new("wide").with_id("w").with_k(10);
    assert_eq!(pipeline.top_k_for(&wide_query), 5);
    let out = pipeline
        .answer_batch(vec![wide_query, Query::new("plain").with_id("p")])
        .await
        .unwrap();

    assert_eq!(
        texts(out[0].as_ref().unwrap()),
        vec!["w9:0.9", "w8:0.8", "w7:0.7", "w6:0.6", "w5:0.5"]
    );
    // no k on the query: six retrieved, three kept
    assert_eq!(
        texts(out[1].as_ref().unwrap()),
        vec!["p5:0.6", "p4:0.5", "p3:0.4"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_question_answerer_operations() {
    let retriever = FixtureRetriever::new(vec![("hello", vec!["h0:0.3", "h1:0.8"])]);
    let (pipeline, _, _) = build(retriever, RagConfig::default());
    let qa = QuestionAnswerer::new(pipeline);

    let answers = qa
        .answer_query(vec![AnswerQuery {
            return_context_docs: true,
            ..AnswerQuery::new("hello")
        }])
        .await
        .unwrap();
    let answer = answers[0].as_ref().unwrap();
    assert_eq!(answer.response, "answer from default");
    assert_eq!(answer.context_docs.as_ref().unwrap()[0]["text"], "h1:0.8");

    let retrieved = qa
        .retrieve(vec![RetrieveQuery {
            id: None,
            query: "hello".into(),
            k: Some(1),
            metadata_filter: None,
            filepath_globpattern: None,
        }])
        .await;
    assert_eq!(retrieved[0].as_ref().unwrap().len(), 1);

    let listed = qa
        .list_documents(vec![InputsQuery {
            return_status: true,
            ..InputsQuery::default()
        }])
        .await;
    assert_eq!(listed[0].as_ref().unwrap()[0]["status_requested"], true);
}
