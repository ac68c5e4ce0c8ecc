// tests/common/mod.rs — Scripted provider and retriever shared by integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use layout_copilot::core::prompts::PromptLibrary;
use layout_copilot::core::strategist::Strategist;
use layout_copilot::core::types::{EntranceSide, StoreRequest, StrategistConfig, TrendSignal, TrendSummary};
use layout_copilot::infra::errors::CopilotError;
use layout_copilot::provider::*;
use layout_copilot::retrieval::{RetrievalError, RetrievedChunk, Retriever};

pub const PLANNER_MODEL: &str = "planner-model";
pub const REVIEWER_MODEL: &str = "reviewer-model";

/// Pops one scripted reply per call; the last reply repeats once the
/// script runs out.
#[derive(Default)]
struct Script(Mutex<VecDeque<String>>);

impl Script {
    fn new(replies: &[String]) -> Self {
        Self(Mutex::new(replies.iter().cloned().collect()))
    }

    fn next(&self) -> String {
        let mut q = self.0.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front().cloned().unwrap_or_default()
        }
    }
}

/// Mock provider routing by model name: planner replies, reviewer replies,
/// and tool calls for requests that offer tools.
#[derive(Default)]
pub struct ScriptedProvider {
    planner: Script,
    reviewer: Script,
    tool_calls: Mutex<Vec<ToolCall>>,
    delay: Option<Duration>,
    pub planner_prompts: Mutex<Vec<String>>,
    pub reviewer_prompts: Mutex<Vec<String>>,
    pub tool_requests: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(planner: &[String], reviewer: &[String]) -> Self {
        Self {
            planner: Script::new(planner),
            reviewer: Script::new(reviewer),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Mutex::new(calls);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn planner_calls(&self) -> usize {
        self.planner_prompts.lock().unwrap().len()
    }

    pub fn reviewer_calls(&self) -> usize {
        self.reviewer_prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CopilotError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if !request.tools.is_empty() {
            *self.tool_requests.lock().unwrap() += 1;
            return Ok(ChatResponse {
                content: "calling the tool".into(),
                tool_calls: self.tool_calls.lock().unwrap().clone(),
                stop_reason: StopReason::ToolUse,
                ..Default::default()
            });
        }

        let content = if request.model == PLANNER_MODEL {
            self.planner_prompts.lock().unwrap().push(prompt);
            self.planner.next()
        } else {
            self.reviewer_prompts.lock().unwrap().push(prompt);
            self.reviewer.next()
        };
        Ok(ChatResponse {
            content,
            stop_reason: StopReason::EndTurn,
            ..Default::default()
        })
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CopilotError> {
        Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
    }
}

/// Returns the same chunks for every query and records what it was asked.
#[derive(Default)]
pub struct RecordingRetriever {
    chunks: Vec<RetrievedChunk>,
    fail: bool,
    pub queries: Mutex<Vec<(String, usize)>>,
}

impl RecordingRetriever {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            chunks: texts
                .iter()
                .enumerate()
                .map(|(i, t)| RetrievedChunk {
                    text: t.to_string(),
                    source: format!("doc-{i}"),
                    score: 1.0 - i as f64 * 0.1,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for RecordingRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.queries.lock().unwrap().push((query.to_string(), top_k));
        if self.fail {
            return Err(RetrievalError::Status {
                status: 503,
                message: "index unavailable".into(),
            });
        }
        Ok(self.chunks.iter().take(top_k).cloned().collect())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────

/// A valid 20x12 m plan wrapped in the `store_layout` envelope.
pub fn plan_json(zone_name: &str) -> String {
    serde_json::json!({
        "store_layout": {
            "store_name": "Blue Retail Ventures - Surat",
            "city": "Surat",
            "dimensions_m": [20, 12],
            "entrance_side": "south",
            "zones": [
                {
                    "name": zone_name,
                    "x": 0, "y": 0, "width": 5, "height": 4,
                    "fixtures": ["Gondola"],
                    "products": ["iPhone 15"]
                },
                {
                    "name": "Checkout",
                    "x": 15, "y": 8, "width": 5, "height": 4,
                    "fixtures": ["Counter"],
                    "products": []
                }
            ],
            "compliance_notes": [],
            "best_practice_score": 0
        }
    })
    .to_string()
}

pub fn review_json(compliant: bool, score: f64, issues: &[&str], suggestions: &[&str]) -> String {
    serde_json::json!({
        "is_compliant": compliant,
        "best_practice_score": score,
        "issues": issues,
        "suggestions": suggestions,
    })
    .to_string()
}

pub fn config(max_iterations: u32) -> StrategistConfig {
    let mut config = StrategistConfig::default();
    config.max_iterations = max_iterations;
    config.planner_model = PLANNER_MODEL.into();
    config.reviewer_model = REVIEWER_MODEL.into();
    config.call_timeout = Duration::from_secs(5);
    config.loop_timeout = Duration::from_secs(10);
    config
}

pub fn strategist(
    provider: Arc<ScriptedProvider>,
    retriever: Arc<RecordingRetriever>,
    config: StrategistConfig,
) -> Strategist {
    let prompts = Arc::new(PromptLibrary::bundled().unwrap());
    Strategist::new(provider, retriever, prompts, config)
}

pub fn store_request() -> StoreRequest {
    let trends = TrendSummary::new(vec![
        TrendSignal {
            keyword: "smartwatch".into(),
            score: 64.0,
        },
        TrendSignal {
            keyword: "iphone 15".into(),
            score: 95.0,
        },
    ]);
    StoreRequest::new("Blue Retail Ventures", "Surat", EntranceSide::South, trends)
        .with_constraints(vec!["No permanent fixtures on the northern wall".into()])
}
