// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub strategist: StrategistSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub retrieval: RetrievalSection,

    #[serde(default)]
    pub market: MarketConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// "openai" (bearer auth, /chat/completions) or "azure" (api-key header, deployments)
    pub provider: String,
    pub base_url: String,
    pub planner_model: String,
    pub reviewer_model: String,
    pub embedding_model: String,
    /// Only used by the azure flavour.
    pub api_version: String,
    pub api_key_env: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            planner_model: "gpt-4.1".into(),
            reviewer_model: "gpt-4.1".into(),
            embedding_model: "text-embedding-3-small".into(),
            api_version: "2024-02-01".into(),
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategistSection {
    pub max_iterations: u32,
    pub acceptance_threshold: f64,
    pub retrieval_top_k: usize,
    pub planner_context_chunks: usize,
    pub trend_entries: usize,
    pub feedback_items: usize,
    pub call_timeout_secs: u64,
    pub loop_timeout_secs: u64,
    pub tool_call_retrieval: bool,
    pub planner_temperature: f32,
    pub reviewer_temperature: f32,
    pub max_tokens: u32,
}

impl Default for StrategistSection {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            acceptance_threshold: 8.5,
            retrieval_top_k: 10,
            planner_context_chunks: 5,
            trend_entries: 3,
            feedback_items: 3,
            call_timeout_secs: 60,
            loop_timeout_secs: 300,
            tool_call_retrieval: false,
            planner_temperature: 0.0,
            reviewer_temperature: 0.0,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// Bound on one remote attempt; an overrun is retried. 0 disables it.
    /// `strategist.call_timeout_secs` bounds the whole retried call.
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 8_000,
            attempt_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    /// "vector" (remote index) or "memory" (inline corpus)
    pub backend: String,
    pub index_url: Option<String>,
    pub api_key_env: String,
    pub namespace: Option<String>,
    pub corpus: Vec<CorpusDocument>,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            index_url: None,
            api_key_env: "PINECONE_API_KEY".into(),
            namespace: None,
            corpus: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoEntry {
    pub geo: String,
    pub sub_geo: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Keyed by lower-case city name.
    pub supported_cities: BTreeMap<String, GeoEntry>,
    pub default_keywords: Vec<String>,
    pub default_store_name: String,
    pub default_entrance_side: String,
    /// "static" (offline table, scores are not live market data) or
    /// "serpapi" (Google Trends via SerpApi)
    pub backend: String,
    pub trends: TrendsConfig,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let mut cities = BTreeMap::new();
        for (city, sub_geo, state) in [
            ("surat", "IN-GJ", "Gujarat"),
            ("ahmedabad", "IN-GJ", "Gujarat"),
            ("mumbai", "IN-MH", "Maharashtra"),
            ("delhi", "IN-DL", "Delhi"),
            ("bangalore", "IN-KA", "Karnataka"),
        ] {
            cities.insert(
                city.to_string(),
                GeoEntry {
                    geo: "IN".into(),
                    sub_geo: sub_geo.into(),
                    state: state.into(),
                },
            );
        }
        Self {
            supported_cities: cities,
            default_keywords: vec!["electronics".into()],
            default_store_name: "Blue Retail Ventures".into(),
            default_entrance_side: "south".into(),
            backend: "static".into(),
            trends: TrendsConfig::default(),
        }
    }
}

/// Live trend lookup settings, used by the "serpapi" market backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    pub base_url: String,
    pub api_key_env: String,
    /// Google Trends date range, e.g. "today 3-m"
    pub timeframe: String,
    /// Google property filter; "froogle" is Shopping, "" is web search
    pub property: String,
    /// Trailing data points averaged into each keyword's score
    pub window: usize,
    pub related_queries: bool,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://serpapi.com/search.json".into(),
            api_key_env: "SERPAPI_API_KEY".into(),
            timeframe: "today 3-m".into(),
            property: "froogle".into(),
            window: 48,
            related_queries: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub dir: Option<PathBuf>,
    pub variant: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            variant: "default".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Env var holding the bearer token. No token configured = open API.
    pub token_env: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            token_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the strategist cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.strategist;
        if s.max_iterations == 0 {
            anyhow::bail!("strategist.max_iterations must be at least 1");
        }
        if !(0.0..=10.0).contains(&s.acceptance_threshold) {
            anyhow::bail!(
                "strategist.acceptance_threshold must be within [0, 10], got {}",
                s.acceptance_threshold
            );
        }
        if s.retrieval_top_k == 0 {
            anyhow::bail!("strategist.retrieval_top_k must be positive");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        match self.market.backend.as_str() {
            "static" | "serpapi" => {}
            other => anyhow::bail!(
                "Unknown market backend '{other}' (expected \"static\" or \"serpapi\")"
            ),
        }
        if self.market.trends.window == 0 {
            anyhow::bail!("market.trends.window must be positive");
        }
        let attempts_budget = self
            .retry
            .attempt_timeout_secs
            .saturating_mul(u64::from(self.retry.max_attempts));
        if self.retry.attempt_timeout_secs > 0 && attempts_budget > s.call_timeout_secs {
            tracing::warn!(
                attempt_timeout_secs = self.retry.attempt_timeout_secs,
                max_attempts = self.retry.max_attempts,
                call_timeout_secs = s.call_timeout_secs,
                "Step timeout may cut off the last retry attempts"
            );
        }
        Ok(())
    }
}
