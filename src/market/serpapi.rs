// src/market/serpapi.rs — Live Google Trends interest via SerpApi
//
// GET {base_url}?engine=google_trends&data_type=TIMESERIES&q=a,b&geo=IN-GJ
// returns interest_over_time.timeline_data[].values[]{query, extracted_value}.
// Each keyword scores the mean of its trailing `window` points, preferring
// the state series and falling back to the national one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use super::TrendSource;
use crate::core::types::{TrendOrigin, TrendSignal, TrendSummary};
use crate::infra::config::{GeoEntry, TrendsConfig};
use crate::infra::errors::CopilotError;
use crate::provider::retry::{rate_limit_delay, RetryConfig};

const PROVIDER: &str = "serpapi";
/// Google Trends compares at most five queries per request.
const MAX_QUERIES: usize = 5;
const RELATED_LIMIT: usize = 5;

pub struct SerpApiTrendSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeframe: String,
    property: String,
    window: usize,
    related_queries: bool,
    retry: RetryConfig,
}

impl SerpApiTrendSource {
    pub fn new(cfg: &TrendsConfig, api_key: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.clone(),
            api_key: api_key.into(),
            timeframe: cfg.timeframe.clone(),
            property: cfg.property.clone(),
            window: cfg.window.max(1),
            related_queries: cfg.related_queries,
            retry,
        }
    }

    /// Reads the key from `cfg.api_key_env`.
    pub fn from_config(cfg: &TrendsConfig, retry: RetryConfig) -> Result<Self, CopilotError> {
        let key = std::env::var(&cfg.api_key_env).map_err(|_| {
            CopilotError::Config(format!(
                "Missing trends key: set the {} environment variable",
                cfg.api_key_env
            ))
        })?;
        Ok(Self::new(cfg, key, retry))
    }

    fn params(&self, data_type: &str, q: &str, geo: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("engine", "google_trends".to_string()),
            ("data_type", data_type.to_string()),
            ("q", q.to_string()),
            ("geo", geo.to_string()),
            ("date", self.timeframe.clone()),
            ("api_key", self.api_key.clone()),
        ];
        if !self.property.is_empty() {
            params.push(("gprop", self.property.clone()));
        }
        params
    }

    /// One GET, no retry.
    async fn fetch(&self, params: &[(&'static str, String)]) -> Result<Value, CopilotError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| CopilotError::Provider {
                provider: PROVIDER.into(),
                message: e.to_string(),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(0);
            return Err(CopilotError::RateLimited {
                provider: PROVIDER.into(),
                retry_after_ms,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CopilotError::Provider {
                provider: PROVIDER.into(),
                message: format!("HTTP {}: {}", status, crate::util::truncate_str(&body, 300)),
                retriable: status.is_server_error(),
            });
        }

        let body: Value = response.json().await.map_err(|e| CopilotError::Provider {
            provider: PROVIDER.into(),
            message: format!("Failed to parse response: {e}"),
            retriable: false,
        })?;
        check_search_error(&body)?;
        Ok(body)
    }

    async fn get(&self, params: Vec<(&'static str, String)>) -> Result<Value, CopilotError> {
        let params = &params;
        self.retry
            .run(PROVIDER, CopilotError::is_retriable, rate_limit_delay, || {
                self.retry.attempt(self.fetch(params), |limit| CopilotError::Provider {
                    provider: PROVIDER.into(),
                    message: format!("attempt timed out after {}ms", limit.as_millis()),
                    retriable: true,
                })
            })
            .await
    }

    async fn interest(&self, keywords: &[String], geo: &str) -> Result<BTreeMap<String, f64>, CopilotError> {
        let resp = self
            .get(self.params("TIMESERIES", &keywords.join(","), geo))
            .await?;
        Ok(parse_interest(&resp, self.window))
    }

    async fn related(&self, keyword: &str, geo: &str) -> Result<Vec<String>, CopilotError> {
        let resp = self.get(self.params("RELATED_QUERIES", keyword, geo)).await?;
        Ok(parse_related(&resp, RELATED_LIMIT))
    }
}

/// SerpApi reports search failures in a 200 body. "No results" is an empty
/// series, not an error.
fn check_search_error(body: &Value) -> Result<(), CopilotError> {
    match body.get("error").and_then(Value::as_str) {
        Some(msg) if msg.contains("hasn't returned any results") => Ok(()),
        Some(msg) => Err(CopilotError::Provider {
            provider: PROVIDER.into(),
            message: msg.to_string(),
            retriable: false,
        }),
        None => Ok(()),
    }
}

/// Mean interest per lower-cased query over the trailing `window` points.
pub(crate) fn parse_interest(resp: &Value, window: usize) -> BTreeMap<String, f64> {
    let Some(timeline) = resp["interest_over_time"]["timeline_data"].as_array() else {
        return BTreeMap::new();
    };
    let start = timeline.len().saturating_sub(window);

    let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for point in &timeline[start..] {
        for value in point["values"].as_array().into_iter().flatten() {
            let Some(query) = value["query"].as_str() else {
                continue;
            };
            let Some(v) = value["extracted_value"].as_f64() else {
                continue;
            };
            let entry = totals.entry(query.trim().to_lowercase()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(query, (sum, n))| (query, (sum / f64::from(n) * 10.0).round() / 10.0))
        .collect()
}

/// Top related searches, best first.
pub(crate) fn parse_related(resp: &Value, limit: usize) -> Vec<String> {
    resp["related_queries"]["top"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|q| q["query"].as_str())
        .take(limit)
        .map(String::from)
        .collect()
}

#[async_trait]
impl TrendSource for SerpApiTrendSource {
    async fn trends(&self, geo: &GeoEntry, keywords: &[String]) -> Result<TrendSummary, CopilotError> {
        let mut keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.len() > MAX_QUERIES {
            tracing::warn!(
                requested = keywords.len(),
                kept = MAX_QUERIES,
                "Google Trends compares at most five keywords; dropping the rest"
            );
            keywords.truncate(MAX_QUERIES);
        }
        if keywords.is_empty() {
            return Ok(TrendSummary::default().with_origin(TrendOrigin::Live));
        }

        let national = self.interest(&keywords, &geo.geo).await?;
        let regional = self.interest(&keywords, &geo.sub_geo).await?;

        let signals = keywords
            .iter()
            .map(|k| {
                let key = k.to_lowercase();
                let score = regional
                    .get(&key)
                    .or_else(|| national.get(&key))
                    .copied()
                    .unwrap_or(0.0);
                TrendSignal {
                    keyword: k.clone(),
                    score,
                }
            })
            .collect();
        let mut summary = TrendSummary::new(signals).with_origin(TrendOrigin::Live);

        if self.related_queries {
            if let Some(top) = summary.signals.first().map(|s| s.keyword.clone()) {
                match self.related(&top, &geo.sub_geo).await {
                    Ok(related) => summary = summary.with_related(related),
                    // advisory only
                    Err(e) => tracing::warn!(keyword = %top, "Related query lookup failed: {}", e),
                }
            }
        }

        tracing::info!(
            region = %geo.sub_geo,
            signals = summary.signals.len(),
            related = summary.related.len(),
            "Live trend lookup complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for SerpApiTrendSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiTrendSource")
            .field("base_url", &self.base_url)
            .field("timeframe", &self.timeframe)
            .field("property", &self.property)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
