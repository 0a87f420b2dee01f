//! # Types Module
//!
//! Records that flow through the answer pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Query`] | Incoming question with its per-query knobs |
//! | [`QueryId`] | Partition key used for every grouping and join |
//! | [`Document`] | Candidate returned by the retriever |
//! | [`ScoredDocument`] | Document plus relevance score and derived sort key |
//! | [`AggregatedAnswer`] | One record per query: selected documents, context, prompt, response |
//! | [`RagResponse`] | Response shaped for the transport |
//! | [`Message`] | Chat message sent to the generator |

pub mod answer;
pub mod document;
pub mod message;
pub mod query;

pub use answer::{AggregatedAnswer, QueryState, RagResponse};
pub(crate) use answer::QueryProgress;
pub use document::{Document, ScoredDocument, SCORE_FIELD};
pub use message::{single_turn, Message, MessageRole};
pub use query::{Query, QueryId};
