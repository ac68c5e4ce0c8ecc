// src/retrieval/retry.rs — Backoff wrapper for retrievers

use std::sync::Arc;

use async_trait::async_trait;

use super::{RetrievalError, RetrievedChunk, Retriever};
use crate::provider::retry::RetryConfig;

pub struct RetryingRetriever {
    inner: Arc<dyn Retriever>,
    config: RetryConfig,
}

impl RetryingRetriever {
    pub fn new(inner: Arc<dyn Retriever>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Retriever for RetryingRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let inner = &self.inner;
        self.config
            .run(
                "retrieval",
                RetrievalError::is_transient,
                |_| None,
                || {
                    self.config.attempt(inner.retrieve(query, top_k), |limit| {
                        RetrievalError::Transport(format!(
                            "attempt timed out after {}ms",
                            limit.as_millis()
                        ))
                    })
                },
            )
            .await
    }
}
