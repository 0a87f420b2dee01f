//! Context building, prompt templating and response shaping.

use crate::types::{AggregatedAnswer, RagResponse, ScoredDocument};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUERY_PLACEHOLDER: &str = "{query}";

/// Template used when the configuration does not supply one.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Answer the question using only the sources below. \
Cite sources by their number. If none of the sources contain the answer, reply \
\"No information found.\"\n\n{context}\n\nQuestion: {query}\nAnswer:";

/// How selected documents are rendered into the context string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    /// `Source N (score S) [path]:` header above each text.
    #[default]
    Numbered,
    /// Texts only.
    Plain,
}

/// Concatenate the selected documents into one context string, best first.
///
/// Blocks are separated by a blank line. An empty selection yields an empty string.
pub fn build_context(documents: &[ScoredDocument], format: ContextFormat) -> String {
    let blocks: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, scored)| match format {
            ContextFormat::Plain => scored.document().text.clone(),
            ContextFormat::Numbered => {
                let mut header = format!("Source {} (score {:.4})", i + 1, scored.score());
                if let Some(path) = scored.document().metadata_str("path") {
                    header.push_str(&format!(" [{}]", path));
                }
                format!("{}:\n{}", header, scored.document().text)
            }
        })
        .collect();
    blocks.join("\n\n")
}

/// A prompt template with `{context}` and `{query}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Both placeholders must be present.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(Error::configuration_with_context(
                    format!("prompt template is missing the {} placeholder", placeholder),
                    ErrorContext::new()
                        .with_field_path("prompt_template")
                        .with_source("prompt_template"),
                ));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute the placeholders in a single left-to-right pass.
    ///
    /// Placeholder-like text inside `context` or `query` is never expanded.
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();
        while let Some(idx) = rest.find('{') {
            out.push_str(&rest[..idx]);
            let tail = &rest[idx..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY_PLACEHOLDER) {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Build the transport-facing response for a generated answer.
pub fn shape_response(answer: &AggregatedAnswer, response: String) -> RagResponse {
    let context_docs = answer.query().return_context_docs.then(|| {
        answer
            .documents()
            .iter()
            .map(ScoredDocument::to_value_with_score)
            .collect()
    });
    RagResponse {
        response,
        context_docs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, Query, SCORE_FIELD};
    use serde_json::json;
    use std::sync::Arc;

    fn scored(text: &str, score: f64) -> ScoredDocument {
        ScoredDocument::new(Document::new(text), score).unwrap()
    }

    #[test]
    fn test_numbered_context_includes_score_and_path() {
        let with_path = ScoredDocument::new(
            Document::new("Rust has no GC.").with_metadata(
                json!({"path": "lang/rust.md"}).as_object().cloned().unwrap(),
            ),
            0.9,
        )
        .unwrap();
        let ctx = build_context(&[with_path, scored("Go has a GC.", 0.4)], ContextFormat::Numbered);
        assert_eq!(
            ctx,
            "Source 1 (score 0.9000) [lang/rust.md]:\nRust has no GC.\n\n\
             Source 2 (score 0.4000):\nGo has a GC."
        );
    }

    #[test]
    fn test_plain_context_and_empty_selection() {
        let ctx = build_context(&[scored("a", 2.0), scored("b", 1.0)], ContextFormat::Plain);
        assert_eq!(ctx, "a\n\nb");
        assert_eq!(build_context(&[], ContextFormat::Numbered), "");
    }

    #[test]
    fn test_template_requires_both_placeholders() {
        assert!(PromptTemplate::new("{context} only").is_err());
        assert!(PromptTemplate::new("{query} only").is_err());
        assert!(PromptTemplate::new("{context} / {query}").is_ok());
        assert!(PromptTemplate::new(DEFAULT_PROMPT_TEMPLATE).is_ok());
    }

    #[test]
    fn test_render_does_not_expand_inserted_text() {
        let t = PromptTemplate::new("C={context}; Q={query}; {other}").unwrap();
        let out = t.render("ctx mentions {query}", "why {context}?");
        assert_eq!(out, "C=ctx mentions {query}; Q=why {context}?; {other}");
    }

    #[test]
    fn test_context_docs_only_when_requested() {
        let docs = vec![scored("a", 3.0)];
        let plain = AggregatedAnswer::new(Arc::new(Query::new("q")), docs.clone());
        assert!(shape_response(&plain, "r".into()).context_docs.is_none());

        let echo = AggregatedAnswer::new(Arc::new(Query::new("q").with_context_docs(true)), docs);
        let shaped = shape_response(&echo, "r".into());
        let ctx = shaped.context_docs.unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0][SCORE_FIELD], 3.0);
        assert_eq!(shaped.response, "r");
    }
}
