//! Per-query results assembled by the pipeline.

use super::document::ScoredDocument;
use super::query::{Query, QueryId};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of a query inside the answer pipeline.
///
/// States advance one step at a time; skipping a state is reported as an
/// error. Up to `Aggregated` the state lives in a [`QueryProgress`] kept by
/// the pipeline; from then on the [`AggregatedAnswer`] carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryState {
    Retrieved,
    Scored,
    Aggregated,
    Contextualized,
    Prompted,
    Generated,
    Finalized,
}

impl QueryState {
    pub fn next(self) -> Option<QueryState> {
        use QueryState::*;
        match self {
            Retrieved => Some(Scored),
            Scored => Some(Aggregated),
            Aggregated => Some(Contextualized),
            Contextualized => Some(Prompted),
            Prompted => Some(Generated),
            Generated => Some(Finalized),
            Finalized => None,
        }
    }

    /// `to`, if it is the immediate successor of `self`.
    pub(crate) fn step(self, to: QueryState, query_id: &QueryId) -> Result<QueryState> {
        if self.next() != Some(to) {
            return Err(Error::validation_with_context(
                format!("illegal transition {:?} -> {:?}", self, to),
                ErrorContext::new()
                    .with_details(format!("query {}", query_id))
                    .with_source("query_state"),
            ));
        }
        Ok(to)
    }
}

/// States of the queries of one batch before their answer record exists.
#[derive(Debug, Default)]
pub(crate) struct QueryProgress {
    states: HashMap<QueryId, QueryState>,
}

impl QueryProgress {
    pub(crate) fn retrieved(&mut self, query_id: &QueryId) {
        self.states.insert(query_id.clone(), QueryState::Retrieved);
    }

    pub(crate) fn advance(&mut self, query_id: &QueryId, to: QueryState) -> Result<()> {
        let state = self.states.get_mut(query_id).ok_or_else(|| {
            Error::validation_with_context(
                format!("no recorded state before {:?}", to),
                ErrorContext::new()
                    .with_details(format!("query {}", query_id))
                    .with_source("query_state"),
            )
        })?;
        *state = state.step(to, query_id)?;
        Ok(())
    }
}

/// Final response handed back to the transport for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub response: String,
    /// Selected documents with their scores, only when the query asked for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_docs: Option<Vec<Value>>,
}

/// One record per original query, carrying its selected documents and every
/// artefact built from them.
#[derive(Debug, Clone)]
pub struct AggregatedAnswer {
    query: Arc<Query>,
    documents: Vec<ScoredDocument>,
    state: QueryState,
    pub(crate) context: Option<String>,
    pub(crate) prompt: Option<String>,
    pub(crate) response: Option<String>,
    pub(crate) result: Option<RagResponse>,
}

impl AggregatedAnswer {
    /// Built by the aggregator once every document of the query has been scored.
    pub(crate) fn new(query: Arc<Query>, documents: Vec<ScoredDocument>) -> Self {
        Self {
            query,
            documents,
            state: QueryState::Aggregated,
            context: None,
            prompt: None,
            response: None,
            result: None,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn documents(&self) -> &[ScoredDocument] {
        &self.documents
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn result(&self) -> Option<&RagResponse> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Option<RagResponse> {
        self.result
    }

    /// Move to `to`, which must be the immediate successor of the current state.
    pub(crate) fn advance(&mut self, to: QueryState) -> Result<()> {
        self.state = self.state.step(to, &self.query.id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_advance_in_order() {
        let mut answer = AggregatedAnswer::new(Arc::new(Query::new("q")), Vec::new());
        assert_eq!(answer.state(), QueryState::Aggregated);
        answer.advance(QueryState::Contextualized).unwrap();
        answer.advance(QueryState::Prompted).unwrap();
        answer.advance(QueryState::Generated).unwrap();
        answer.advance(QueryState::Finalized).unwrap();
        assert_eq!(answer.state().next(), None);
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let mut answer = AggregatedAnswer::new(Arc::new(Query::new("q")), Vec::new());
        let err = answer.advance(QueryState::Generated).unwrap_err();
        assert!(err.to_string().contains("illegal transition"));
        assert_eq!(answer.state(), QueryState::Aggregated);
    }

    #[test]
    fn test_progress_walks_retrieved_scored_aggregated() {
        let id = QueryId::from("q1");
        let mut progress = QueryProgress::default();
        progress.retrieved(&id);
        progress.advance(&id, QueryState::Scored).unwrap();
        progress.advance(&id, QueryState::Aggregated).unwrap();
        assert!(progress.advance(&id, QueryState::Aggregated).is_err());
    }

    #[test]
    fn test_progress_rejects_skipping_scored() {
        let id = QueryId::from("q1");
        let mut progress = QueryProgress::default();
        progress.retrieved(&id);
        let err = progress.advance(&id, QueryState::Aggregated).unwrap_err();
        assert!(err.to_string().contains("illegal transition Retrieved -> Aggregated"));
        // the failed step leaves the query where it was
        progress.advance(&id, QueryState::Scored).unwrap();
    }

    #[test]
    fn test_progress_rejects_unknown_query() {
        let mut progress = QueryProgress::default();
        let err = progress
            .advance(&QueryId::from("never-retrieved"), QueryState::Scored)
            .unwrap_err();
        assert!(err.to_string().contains("no recorded state"));
    }

    #[test]
    fn test_context_docs_omitted_when_absent() {
        let r = RagResponse {
            response: "42".into(),
            context_docs: None,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, serde_json::json!({"response": "42"}));
    }
}
