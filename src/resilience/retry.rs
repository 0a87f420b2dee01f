//! Backend-rotating retry with exponential backoff and additive jitter.

use crate::{Error, ErrorContext, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for [`RetryableInvoker`].
///
/// Delays are in milliseconds so the struct reads naturally from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Backend identifiers tried in order, one per attempt.
    pub backends: Vec<String>,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    /// Upper bound of the uniform jitter added after each backoff step.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            jitter_ms: 300,
        }
    }
}

impl RetryConfig {
    pub fn new(backends: Vec<String>) -> Self {
        Self {
            backends,
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter_ms = jitter.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::configuration_with_context(
                "at least one backend identifier is required",
                ErrorContext::new()
                    .with_field_path("backends")
                    .with_source("retry_invoker"),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::configuration_with_context(
                format!("backoff_factor must be >= 1, got {}", self.backoff_factor),
                ErrorContext::new()
                    .with_field_path("backoff_factor")
                    .with_source("retry_invoker"),
            ));
        }
        Ok(())
    }
}

/// Per-invocation bookkeeping; never shared between invocations.
#[derive(Debug)]
struct RetryState {
    backend_index: usize,
    delay: Duration,
    attempts: usize,
}

/// Runs an async unit of work against a list of backends, one attempt per
/// backend, sleeping with exponential backoff plus jitter between attempts.
///
/// The i-th attempt receives the i-th backend identifier. When every backend
/// has failed, the error of the last attempt is returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryableInvoker {
    backends: Vec<String>,
    initial_delay: Duration,
    backoff_factor: f64,
    jitter: Duration,
}

impl RetryableInvoker {
    pub fn new(config: RetryConfig) -> Result<Self> {
        config.validate()?;
        info!(
            backends = config.backends.len(),
            initial_delay_ms = config.initial_delay_ms,
            backoff_factor = config.backoff_factor,
            jitter_ms = config.jitter_ms,
            "initializing backend-rotating retry invoker"
        );
        Ok(Self {
            backends: config.backends,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: config.backoff_factor,
            jitter: Duration::from_millis(config.jitter_ms),
        })
    }

    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    /// Invoke `op` with each backend in turn until one succeeds.
    pub async fn invoke<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.backends.is_empty() {
            return Err(Error::configuration_with_context(
                "at least one backend identifier is required",
                ErrorContext::new().with_source("retry_invoker"),
            ));
        }

        let mut state = RetryState {
            backend_index: 0,
            delay: self.initial_delay,
            attempts: 0,
        };

        loop {
            let backend = self.backends[state.backend_index].clone();
            state.attempts += 1;
            debug!(backend = backend.as_str(), attempt = state.attempts, "invoking backend");

            match op(backend.clone()).await {
                Ok(value) => {
                    if state.attempts > 1 {
                        info!(
                            backend = backend.as_str(),
                            attempts = state.attempts,
                            "succeeded after rotating backends"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if state.backend_index + 1 >= self.backends.len() {
                        warn!(
                            backend = backend.as_str(),
                            attempts = state.attempts,
                            error = %err,
                            "all backends failed"
                        );
                        return Err(err);
                    }
                    warn!(
                        backend = backend.as_str(),
                        attempt = state.attempts,
                        delay_ms = state.delay.as_millis() as u64,
                        error = %err,
                        "backend failed, rotating to next"
                    );
                    tokio::time::sleep(state.delay).await;
                    state.delay = self.next_delay(state.delay);
                    state.backend_index += 1;
                }
            }
        }
    }

    /// `delay * factor + U(0, jitter)` using the thread-local RNG.
    pub fn next_delay(&self, current: Duration) -> Duration {
        self.next_delay_with(current, &mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&self, current: Duration, rng: &mut R) -> Duration {
        let grown = current.as_secs_f64() * self.backoff_factor;
        let jitter = if self.jitter.is_zero() {
            0.0
        } else {
            rng.gen::<f64>() * self.jitter.as_secs_f64()
        };
        Duration::try_from_secs_f64(grown + jitter).unwrap_or(Duration::MAX)
    }
}
