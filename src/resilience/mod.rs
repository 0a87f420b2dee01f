//! # Resilience Module
//!
//! Retry with backend failover for flaky scoring and generation services.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RetryableInvoker`] | Tries each configured backend once, in order, with backoff between attempts |
//! | [`RetryConfig`] | Backend list, initial delay, backoff factor, jitter bound |
//!
//! ```rust
//! use rag_rerank::resilience::{RetryConfig, RetryableInvoker};
//! use std::time::Duration;
//!
//! let config = RetryConfig::new(vec!["rerank-v3".into(), "rerank-v2".into()])
//!     .with_initial_delay(Duration::from_millis(500))
//!     .with_backoff_factor(2.0)
//!     .with_jitter(Duration::from_millis(100));
//! let invoker = RetryableInvoker::new(config)?;
//! assert_eq!(invoker.backends().len(), 2);
//! # Ok::<(), rag_rerank::Error>(())
//! ```
//!
//! The delay before attempt 2 is the initial delay; every later delay follows
//! `delay = delay * factor + U(0, jitter)`.

pub mod retry;

pub use retry::{RetryConfig, RetryableInvoker};
