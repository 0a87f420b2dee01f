//! Fan-in of scored documents back to one record per query.

use crate::types::{AggregatedAnswer, Query, QueryId, ScoredDocument};
use crate::{Error, ErrorContext, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One scored document, tagged with its owning query and its retrieval position.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub query: Arc<Query>,
    pub position: usize,
    pub scored: ScoredDocument,
}

impl ScoredRow {
    pub fn new(query: Arc<Query>, position: usize, scored: ScoredDocument) -> Self {
        Self {
            query,
            position,
            scored,
        }
    }
}

/// Top-K used when none is configured, given how many documents were retrieved.
///
/// Reranking retrieves wide and keeps half; without it the retrieval set is kept whole.
pub fn default_top_k(retrieved_k: usize, reranks: bool) -> usize {
    if reranks {
        (retrieved_k / 2).max(1)
    } else {
        retrieved_k.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopK {
    Fixed(usize),
    /// Derived from each query's own `k`, falling back to `search_top_k`.
    PerQuery { search_top_k: usize, reranks: bool },
}

/// Groups scored rows by query id, orders them and keeps the best top-K.
#[derive(Debug, Clone, Copy)]
pub struct QueryAggregator {
    top_k: TopK,
}

impl QueryAggregator {
    /// Keep the same `top_k` for every query.
    pub fn new(top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::configuration_with_context(
                "top_k must be at least 1",
                ErrorContext::new()
                    .with_field_path("rerank_top_k")
                    .with_source("query_aggregator"),
            ));
        }
        Ok(Self {
            top_k: TopK::Fixed(top_k),
        })
    }

    /// Resolve top-K per query with [`default_top_k`] over the number of
    /// documents that query asked the retriever for.
    pub fn per_query(search_top_k: usize, reranks: bool) -> Result<Self> {
        if search_top_k == 0 {
            return Err(Error::configuration_with_context(
                "search_top_k must be at least 1",
                ErrorContext::new()
                    .with_field_path("search_top_k")
                    .with_source("query_aggregator"),
            ));
        }
        Ok(Self {
            top_k: TopK::PerQuery {
                search_top_k,
                reranks,
            },
        })
    }

    pub fn top_k_for(&self, query: &Query) -> usize {
        match self.top_k {
            TopK::Fixed(k) => k,
            TopK::PerQuery {
                search_top_k,
                reranks,
            } => default_top_k(query.k.unwrap_or(search_top_k), reranks),
        }
    }

    /// One answer per query of `queries`, in that order, followed by any query
    /// seen only in `rows` (first-seen order).
    ///
    /// Within a query documents are sorted by `(sort_key, position)` ascending,
    /// so equal scores keep retrieval order.
    pub fn aggregate(&self, queries: &[Arc<Query>], rows: Vec<ScoredRow>) -> Vec<AggregatedAnswer> {
        let mut order: Vec<Arc<Query>> = queries.to_vec();
        let mut groups: HashMap<QueryId, Vec<(usize, ScoredDocument)>> =
            HashMap::with_capacity(queries.len());
        for q in queries {
            groups.entry(q.id.clone()).or_default();
        }

        for row in rows {
            let group = groups.entry(row.query.id.clone()).or_insert_with(|| {
                order.push(Arc::clone(&row.query));
                Vec::new()
            });
            group.push((row.position, row.scored));
        }

        order
            .into_iter()
            .map(|query| {
                let mut docs = groups.remove(&query.id).unwrap_or_default();
                docs.sort_by(|(pa, a), (pb, b)| {
                    a.sort_key().total_cmp(&b.sort_key()).then(pa.cmp(pb))
                });
                let total = docs.len();
                let top_k = self.top_k_for(&query);
                docs.truncate(top_k);
                debug!(
                    query_id = %query.id,
                    top_k,
                    candidates = total,
                    kept = docs.len(),
                    "aggregated query"
                );
                AggregatedAnswer::new(query, docs.into_iter().map(|(_, d)| d).collect())
            })
            .collect()
    }
}
