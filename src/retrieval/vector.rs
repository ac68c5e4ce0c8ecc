// src/retrieval/vector.rs — Remote vector index client
//
// Embeds the query with the model provider, then asks a Pinecone-style
// index for the nearest chunks: POST {index_url}/query with
// {vector, topK, includeMetadata, namespace?}. Chunk text and provenance
// come from match metadata (`text`, `source`).

use std::sync::Arc;

use async_trait::async_trait;

use super::{RetrievalError, RetrievedChunk, Retriever};
use crate::provider::ModelProvider;

pub struct VectorIndexRetriever {
    embedder: Arc<dyn ModelProvider>,
    client: reqwest::Client,
    index_url: String,
    api_key: String,
    namespace: Option<String>,
}

impl VectorIndexRetriever {
    pub fn new(
        embedder: Arc<dyn ModelProvider>,
        index_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            client: reqwest::Client::new(),
            index_url: index_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    fn query_body(&self, vector: &[f32], top_k: usize) -> serde_json::Value {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(ns) = &self.namespace {
            body["namespace"] = serde_json::json!(ns);
        }
        body
    }
}

/// Convert an index `/query` response into chunks, preserving index order.
pub(crate) fn parse_matches(resp: &serde_json::Value) -> Result<Vec<RetrievedChunk>, RetrievalError> {
    let Some(matches) = resp.get("matches") else {
        return Err(RetrievalError::BadResponse(
            "response has no `matches` field".into(),
        ));
    };
    let Some(matches) = matches.as_array() else {
        return Err(RetrievalError::BadResponse("`matches` is not an array".into()));
    };

    Ok(matches
        .iter()
        .map(|m| {
            let meta = &m["metadata"];
            RetrievedChunk {
                text: meta["text"].as_str().unwrap_or("").to_string(),
                source: meta["source"].as_str().unwrap_or("unknown").to_string(),
                score: m["score"].as_f64().unwrap_or(0.0),
            }
        })
        .collect())
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }

        let embeddings = self
            .embedder
            .embed(&[query])
            .await
            .map_err(|e| RetrievalError::Embedding {
                retriable: e.is_retriable(),
                message: e.to_string(),
            })?;
        let Some(vector) = embeddings.into_iter().next() else {
            return Err(RetrievalError::Embedding {
                message: "embedding provider returned no vectors".into(),
                retriable: false,
            });
        };

        let response = self
            .client
            .post(format!("{}/query", self.index_url))
            .header("Api-Key", &self.api_key)
            .json(&self.query_body(&vector, top_k))
            .send()
            .await
            .map_err(|e| RetrievalError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                message: crate::util::truncate_str(&body, 300).to_string(),
            });
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::BadResponse(e.to_string()))?;

        let mut chunks = parse_matches(&resp)?;
        chunks.truncate(top_k);
        tracing::debug!(query, returned = chunks.len(), "Vector index query complete");
        Ok(chunks)
    }
}
