// src/provider/retry.rs — Retry with exponential backoff for model providers
//
// Wraps any ModelProvider with automatic retry on transient failures.
// Retries: rate limits (429), server errors (5xx), timeouts, connection resets.
// Does NOT retry: bad request (400), auth errors (401, 403), unparseable bodies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider};
use crate::infra::config::RetrySection;
use crate::infra::errors::CopilotError;

const JITTER_FRACTION: f64 = 0.2;

/// Configuration for retry behavior. `max_attempts` counts the first call.
/// `attempt_timeout` bounds each attempt, not the whole sequence.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySection::default())
    }
}

impl From<&RetrySection> for RetryConfig {
    fn from(cfg: &RetrySection) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            backoff_factor: cfg.backoff_factor,
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_fraction: JITTER_FRACTION,
            attempt_timeout: (cfg.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.attempt_timeout_secs)),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, rate_limit_delay: Option<Duration>) -> Duration {
        // If the server told us how long to wait, use that (with a small buffer).
        if let Some(rl_delay) = rate_limit_delay {
            return (rl_delay + Duration::from_millis(100)).min(self.max_delay);
        }

        let base_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let jitter = deterministic_jitter(attempt, self.jitter_fraction);
        let final_ms = (capped_ms * jitter).max(10.0);

        Duration::from_millis(final_ms as u64)
    }

    /// Await one attempt under `attempt_timeout`; an overrun becomes `on_elapsed(limit)`.
    pub async fn attempt<T, E, Fut>(
        &self,
        fut: Fut,
        on_elapsed: impl FnOnce(Duration) -> E,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(on_elapsed(limit))),
            None => fut.await,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt cap is hit.
    /// Shared by the model and retrieval wrappers.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_retriable: impl Fn(&E) -> bool,
        hint: impl Fn(&E) -> Option<Duration>,
        mut op: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if !is_retriable(&e) || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt - 1, hint(&e));
                    tracing::warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// A provider wrapper that adds retry with exponential backoff.
pub struct RetryProvider {
    inner: Arc<dyn ModelProvider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn with_config(inner: Arc<dyn ModelProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

/// A hung attempt is retriable, unlike a step-level `CopilotError::Timeout`.
fn attempt_timed_out(provider: &str, limit: Duration) -> CopilotError {
    CopilotError::Provider {
        provider: provider.to_string(),
        message: format!("attempt timed out after {}ms", limit.as_millis()),
        retriable: true,
    }
}

/// Extract rate-limit retry delay from the error, if available.
pub(crate) fn rate_limit_delay(error: &CopilotError) -> Option<Duration> {
    match error {
        CopilotError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Deterministic jitter for a given attempt to keep retries reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64; // 0.0..1.0
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl ModelProvider for RetryProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CopilotError> {
        let inner = &self.inner;
        self.config
            .run(
                inner.id(),
                CopilotError::is_retriable,
                rate_limit_delay,
                || {
                    self.config.attempt(inner.chat(request.clone()), |limit| {
                        attempt_timed_out(inner.id(), limit)
                    })
                },
            )
            .await
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CopilotError> {
        let inner = &self.inner;
        self.config
            .run(
                inner.id(),
                CopilotError::is_retriable,
                rate_limit_delay,
                || {
                    self.config
                        .attempt(inner.embed(texts), |limit| attempt_timed_out(inner.id(), limit))
                },
            )
            .await
    }
}
