// src/retrieval/mod.rs — Retrieval client boundary
//
// The strategist only needs `retrieve(query, top_k)`. Results are advisory:
// callers treat a RetrievalError as "no chunks this iteration".

pub mod memory;
pub mod retry;
pub mod vector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::config::RetrievalSection;
use crate::infra::errors::CopilotError;
use crate::provider::retry::RetryConfig;
use crate::provider::ModelProvider;
use memory::InMemoryRetriever;
use retry::RetryingRetriever;
use vector::VectorIndexRetriever;

/// A scored text snippet with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f64,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("index returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed index response: {0}")]
    BadResponse(String),

    #[error("query embedding failed: {message}")]
    Embedding { message: String, retriable: bool },

    #[error("top_k must be positive")]
    InvalidTopK,
}

impl RetrievalError {
    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Transport(_) => true,
            RetrievalError::Status { status, .. } => *status == 429 || *status >= 500,
            RetrievalError::Embedding { retriable, .. } => *retriable,
            RetrievalError::BadResponse(_) | RetrievalError::InvalidTopK => false,
        }
    }
}

/// Anything that can answer a free-text query with ranked snippets.
/// An empty result set is `Ok(vec![])`, never an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Build the configured backend behind a single retry layer.
///
/// `embedder` must be the bare provider, not a `RetryProvider`: a failed
/// query embedding is retried here, once per retrieval attempt.
pub fn from_config(
    section: &RetrievalSection,
    embedder: Arc<dyn ModelProvider>,
    retry: RetryConfig,
) -> Result<Arc<dyn Retriever>, CopilotError> {
    let backend: Arc<dyn Retriever> = match section.backend.as_str() {
        "memory" => {
            let retriever = if section.corpus.is_empty() {
                InMemoryRetriever::with_default_corpus()
            } else {
                InMemoryRetriever::new(section.corpus.clone())
            };
            tracing::info!(documents = retriever.len(), "Using in-memory retrieval corpus");
            Arc::new(retriever)
        }
        "vector" => {
            let url = section.index_url.as_deref().ok_or_else(|| {
                CopilotError::Config("retrieval.index_url is required for the vector backend".into())
            })?;
            let key = std::env::var(&section.api_key_env).map_err(|_| {
                CopilotError::Config(format!(
                    "Missing index key: set the {} environment variable",
                    section.api_key_env
                ))
            })?;
            tracing::info!(index = %url, "Using remote vector index");
            Arc::new(
                VectorIndexRetriever::new(embedder, url, key)
                    .with_namespace(section.namespace.clone()),
            )
        }
        other => {
            return Err(CopilotError::Config(format!(
                "Unknown retrieval backend '{other}' (expected \"memory\" or \"vector\")"
            )))
        }
    };
    Ok(Arc::new(RetryingRetriever::new(backend, retry)))
}
