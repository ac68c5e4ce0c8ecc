// src/retrieval/memory.rs — In-process corpus ranked by word overlap

use std::collections::HashSet;

use async_trait::async_trait;

use super::{RetrievalError, RetrievedChunk, Retriever};
use crate::infra::config::CorpusDocument;

/// Ranks a fixed document set by Jaccard similarity against the query.
/// Used when no vector index is configured, and in tests.
pub struct InMemoryRetriever {
    docs: Vec<CorpusDocument>,
}

impl InMemoryRetriever {
    pub fn new(docs: Vec<CorpusDocument>) -> Self {
        Self { docs }
    }

    /// Lease, building-code and brand excerpts for the Surat pilot store.
    pub fn with_default_corpus() -> Self {
        let doc = |source: &str, text: &str| CorpusDocument {
            source: source.into(),
            text: text.into(),
        };
        Self::new(vec![
            doc(
                "Store_Leasing_Agreement_Surat.pdf",
                "No permanent fixtures on northern wall (from Surat lease). \
                 Tenant may not alter load-bearing walls.",
            ),
            doc(
                "National_Building_Code_Accessibility_Chapter.txt",
                "Aisle width min 1.2m for accessibility (NBC 2016). \
                 Entrance must keep a clear decompression zone.",
            ),
            doc(
                "Blue_Retail_Brand_Book_v4.pdf",
                "Use blue color palette for branding. Hero products sit in the \
                 first zone after the decompression zone to guide customer flow.",
            ),
            doc(
                "Fixture_Catalog_2024.pdf",
                "Fixture catalog: gondola shelving, wall bays, demo tables, \
                 checkout counters. Demo tables need 1.5m clearance.",
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Word-overlap (Jaccard) similarity in [0, 1].
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let words_a = words(a);
    let words_b = words(b);

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    intersection as f64 / union as f64
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }

        let mut scored: Vec<RetrievedChunk> = self
            .docs
            .iter()
            .map(|d| RetrievedChunk {
                text: d.text.clone(),
                source: d.source.clone(),
                score: text_similarity(query, &d.text),
            })
            .filter(|c| c.score > 0.0)
            .collect();

        // stable sort keeps corpus order on ties
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
