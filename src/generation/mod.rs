//! Generation module: the LLM collaborator that turns a prompt into an answer.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Generator`] | Trait called once per query with the built prompt |
//! | [`RetryingGenerator`] | Backend rotation for any generator |
//! | [`ChatCompletionsGenerator`] | OpenAI-compatible `/v1/chat/completions` client |

mod client;

pub use client::{ChatCompletionsGenerator, ChatCompletionsGeneratorBuilder};

use crate::resilience::RetryableInvoker;
use crate::types::Message;
use crate::Result;
use async_trait::async_trait;

/// One generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub messages: &'a [Message],
    /// Model/backend to use; `None` lets the generator pick its default.
    pub backend: Option<&'a str>,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: Option<&'a str>) -> Self {
        self.backend = backend;
        self
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        (**self).generate(request).await
    }
}

/// Generator whose backend is chosen by a [`RetryableInvoker`] on every call.
///
/// The rotation list replaces any backend requested by the query.
pub struct RetryingGenerator<G> {
    inner: G,
    invoker: RetryableInvoker,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, invoker: RetryableInvoker) -> Self {
        Self { inner, invoker }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        let inner = &self.inner;
        self.invoker
            .invoke(|backend| async move {
                inner
                    .generate(GenerationRequest {
                        backend: Some(backend.as_str()),
                        ..request
                    })
                    .await
            })
            .await
    }
}
