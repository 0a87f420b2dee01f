//! Retrieval module: the search-index collaborator and its decorators.
//!
//! The index itself lives elsewhere; this module defines the [`Retriever`]
//! seam, an HTTP [`VectorStoreClient`] for a vector-store server, and
//! [`PostProcessedRetriever`], which applies [`MetadataPostProcessor`]s to
//! everything a retriever returns.

mod client;
pub mod metadata;

pub use client::{VectorStoreClient, VectorStoreClientBuilder};
pub use metadata::{fix_parent_folder_path, MetadataPostProcessor, ParentFolderPath};

use crate::types::Document;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Candidate lookup for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub k: usize,
    #[serde(default)]
    pub metadata_filter: Option<String>,
    #[serde(default)]
    pub filepath_globpattern: Option<String>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
            metadata_filter: None,
            filepath_globpattern: None,
        }
    }

    pub fn with_metadata_filter(mut self, filter: Option<String>) -> Self {
        self.metadata_filter = filter;
        self
    }

    pub fn with_filepath_globpattern(mut self, pattern: Option<String>) -> Self {
        self.filepath_globpattern = pattern;
        self
    }
}

/// Introspection of what has been indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputsRequest {
    #[serde(default)]
    pub metadata_filter: Option<String>,
    #[serde(default)]
    pub filepath_globpattern: Option<String>,
    #[serde(default)]
    pub return_status: bool,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ordered candidates for a query, best first.
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<Document>>;

    /// Metadata of the indexed documents matching the request.
    async fn list_documents(&self, request: &InputsRequest) -> Result<Vec<serde_json::Value>>;
}

#[async_trait]
impl<R: Retriever + ?Sized> Retriever for Arc<R> {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<Document>> {
        (**self).retrieve(request).await
    }

    async fn list_documents(&self, request: &InputsRequest) -> Result<Vec<serde_json::Value>> {
        (**self).list_documents(request).await
    }
}

/// Retriever decorator running post-processors over every metadata record.
pub struct PostProcessedRetriever<R> {
    inner: R,
    processors: Vec<Arc<dyn MetadataPostProcessor>>,
}

impl<R: Retriever> PostProcessedRetriever<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            processors: Vec::new(),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn MetadataPostProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    fn apply(&self, metadata: &mut serde_json::Map<String, serde_json::Value>) {
        for p in &self.processors {
            p.process(metadata);
        }
    }
}

#[async_trait]
impl<R: Retriever> Retriever for PostProcessedRetriever<R> {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<Document>> {
        let mut docs = self.inner.retrieve(request).await?;
        for doc in &mut docs {
            if let Some(metadata) = doc.metadata_mut() {
                self.apply(metadata);
            }
        }
        Ok(docs)
    }

    async fn list_documents(&self, request: &InputsRequest) -> Result<Vec<serde_json::Value>> {
        let mut listed = self.inner.list_documents(request).await?;
        for entry in &mut listed {
            if let Some(metadata) = entry.as_object_mut() {
                self.apply(metadata);
            }
        }
        Ok(listed)
    }
}
