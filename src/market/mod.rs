// src/market/mod.rs — Market trend signals

pub mod geo;
pub mod serpapi;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::types::{TrendOrigin, TrendSignal, TrendSummary};
use crate::infra::config::{GeoEntry, MarketConfig};
use crate::infra::errors::CopilotError;
use crate::provider::retry::RetryConfig;
use serpapi::SerpApiTrendSource;

/// Source of keyword interest scores for a region. Injected into the
/// pipeline; implementations must be safe to share across requests.
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn trends(&self, geo: &GeoEntry, keywords: &[String]) -> Result<TrendSummary, CopilotError>;
}

/// Build the trend source named by `market.backend`.
pub fn from_config(
    market: &MarketConfig,
    retry: RetryConfig,
) -> Result<Arc<dyn TrendSource>, CopilotError> {
    match market.backend.as_str() {
        "static" => {
            tracing::warn!("Using the offline static trend table; scores are not live market data");
            Ok(Arc::new(StaticTrendSource::default()))
        }
        "serpapi" => {
            let source = SerpApiTrendSource::from_config(&market.trends, retry)?;
            tracing::info!(timeframe = %market.trends.timeframe, "Using live Google Trends via SerpApi");
            Ok(Arc::new(source))
        }
        other => Err(CopilotError::Config(format!(
            "Unknown market backend '{other}' (expected \"static\" or \"serpapi\")"
        ))),
    }
}

/// Offline placeholder for tests and demos. Fixed scores for a few known
/// keywords, a stable hash-derived score (20–90) for anything else. None
/// of it is market data; summaries are tagged `TrendOrigin::Static`.
#[derive(Debug, Clone)]
pub struct StaticTrendSource {
    known: BTreeMap<String, f64>,
}

impl Default for StaticTrendSource {
    fn default() -> Self {
        let known = [
            ("iphone 15", 95.0),
            ("gaming laptop", 88.0),
            ("noise cancelling headphones", 72.0),
            ("smartwatch", 64.0),
            ("electronics", 80.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { known }
    }
}

impl StaticTrendSource {
    pub fn new(known: BTreeMap<String, f64>) -> Self {
        Self {
            known: known
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .collect(),
        }
    }

    fn score(&self, keyword: &str) -> f64 {
        let key = keyword.trim().to_lowercase();
        if let Some(score) = self.known.get(&key) {
            return *score;
        }
        // FNV-1a, stable across runs and platforms
        let hash = key
            .bytes()
            .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
        20.0 + (hash % 71) as f64
    }
}

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn trends(&self, geo: &GeoEntry, keywords: &[String]) -> Result<TrendSummary, CopilotError> {
        let signals = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| TrendSignal {
                keyword: k.trim().to_string(),
                score: self.score(k),
            })
            .collect();
        let summary = TrendSummary::new(signals).with_origin(TrendOrigin::Static);
        tracing::debug!(
            region = %geo.sub_geo,
            signals = summary.signals.len(),
            "Static trend lookup complete (offline scores)"
        );
        Ok(summary)
    }
}
