// src/core/strategist.rs — Plan/critique loop
//
//   SEED_QUERY → RETRIEVE → DRAFT → REVIEW → DECIDE ─┬→ ACCEPT
//        ↑                                          └→ REFINE ─┐
//        └─────────────────────────────────────────────────────┘
//
// Terminates on acceptance, when REFINE would exceed `max_iterations`
// (BUDGET_EXCEEDED), or when the wall-clock budget runs out (TIMED_OUT).
// Remote failures and malformed model output never abort the loop; each
// step falls back to its fail-closed default and the loop carries on.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use super::prompts::{PlannerVars, PromptLibrary, RetrievalCallVars, ReviewerVars};
use super::query::seed_query;
use super::types::*;
use crate::generator::{Generated, OutputSchema, SchemaContext, StructuredGenerator};
use crate::infra::errors::CopilotError;
use crate::provider::{ModelProvider, ToolCall, ToolDef};
use crate::retrieval::Retriever;

const RAG_TOOL: &str = "rag_tool";

/// Lifecycle notifications for callers that want live progress (the CLI).
#[derive(Debug, Clone, PartialEq)]
pub enum StrategistEvent {
    IterationStarted { iteration: u32 },
    Retrieved { chunks: usize },
    Drafted { usable: bool },
    Reviewed { compliant: bool, score: f64 },
    Accepted { score: f64 },
    Refining { next_iteration: u32 },
}

type ProgressFn = Arc<dyn Fn(StrategistEvent) + Send + Sync>;

/// Drives one isolated loop run per call to [`Strategist::run`]. The
/// strategist itself holds only shared, immutable collaborators, so one
/// instance can serve concurrent requests.
pub struct Strategist {
    planner: StructuredGenerator,
    reviewer: StructuredGenerator,
    retriever: Arc<dyn Retriever>,
    prompts: Arc<PromptLibrary>,
    config: StrategistConfig,
    on_progress: Option<ProgressFn>,
}

impl Strategist {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        retriever: Arc<dyn Retriever>,
        prompts: Arc<PromptLibrary>,
        config: StrategistConfig,
    ) -> Self {
        let planner = StructuredGenerator::new(provider.clone(), config.planner_model.clone())
            .with_temperature(config.planner_temperature)
            .with_max_tokens(config.max_tokens)
            .with_call_timeout(config.call_timeout);
        let reviewer = StructuredGenerator::new(provider, config.reviewer_model.clone())
            .with_temperature(config.reviewer_temperature)
            .with_max_tokens(config.max_tokens)
            .with_call_timeout(config.call_timeout);

        Self {
            planner,
            reviewer,
            retriever,
            prompts,
            config,
            on_progress: None,
        }
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(StrategistEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(cb));
        self
    }

    pub fn config(&self) -> &StrategistConfig {
        &self.config
    }

    fn emit(&self, event: StrategistEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Run the loop for one store. Only template problems return `Err`;
    /// every other failure is folded into the report.
    pub async fn run(&self, request: &StoreRequest) -> Result<StrategistReport, CopilotError> {
        let started = Instant::now();
        let mut state = LoopState::new(request);

        tracing::info!(
            city = %state.city,
            entrance = %state.entrance_side,
            max_iterations = self.config.max_iterations,
            "Strategist loop starting"
        );

        let outcome = match tokio::time::timeout(self.config.loop_timeout, self.drive(&mut state))
            .await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::warn!(
                    iteration = state.iteration,
                    timeout_secs = self.config.loop_timeout.as_secs(),
                    "Strategist loop timed out"
                );
                state.record(
                    Stage::Decide,
                    AuditKind::TimedOut,
                    format!(
                        "wall-clock budget of {}s exhausted",
                        self.config.loop_timeout.as_secs()
                    ),
                );
                LoopOutcome::TimedOut
            }
        };

        let elapsed = started.elapsed();
        tracing::info!(
            outcome = ?outcome,
            iterations = state.iteration + 1,
            elapsed_ms = elapsed.as_millis() as u64,
            "Strategist loop finished"
        );

        Ok(StrategistReport {
            outcome,
            final_plan: state.final_plan,
            last_draft: state.draft_plan,
            last_review: state.review,
            iterations: state.iteration + 1,
            retrieved: state.retrieved,
            audit: state.audit,
            elapsed,
        })
    }

    async fn drive(&self, state: &mut LoopState) -> Result<LoopOutcome, CopilotError> {
        let budget = self.config.max_iterations.max(1);

        loop {
            self.emit(StrategistEvent::IterationStarted {
                iteration: state.iteration,
            });

            // SEED_QUERY
            let query = seed_query(
                state.iteration,
                &state.store_name,
                &state.city,
                state.review.as_ref(),
                self.config.feedback_items,
            );
            tracing::info!(iteration = state.iteration, stage = "seed_query", %query);
            state.record(Stage::SeedQuery, AuditKind::Step, query.clone());

            // RETRIEVE
            self.retrieve(state, &query).await?;

            // DRAFT
            self.draft(state).await?;

            // REVIEW (short-circuits when no draft exists yet)
            if self.review(state).await? {
                // DECIDE
                if self.decide(state) {
                    return Ok(LoopOutcome::Accepted);
                }
            }

            // REFINE
            if state.iteration + 1 >= budget {
                tracing::warn!(
                    iterations = state.iteration + 1,
                    "No compliant plan within iteration budget"
                );
                state.record(
                    Stage::Refine,
                    AuditKind::BudgetExceeded,
                    format!("no compliant plan after {} iterations", state.iteration + 1),
                );
                return Ok(LoopOutcome::BudgetExceeded);
            }
            state.record(Stage::Refine, AuditKind::Refined, "Refining layout");
            state.iteration += 1;
            self.emit(StrategistEvent::Refining {
                next_iteration: state.iteration,
            });
        }
    }

    // ─── RETRIEVE ───────────────────────────────────────────────

    async fn retrieve(&self, state: &mut LoopState, seeded: &str) -> Result<(), CopilotError> {
        let (query, top_k) = if self.config.tool_call_retrieval {
            self.request_rag_call(state, seeded).await?
        } else {
            (seeded.to_string(), self.config.retrieval_top_k)
        };

        let result = match tokio::time::timeout(
            self.config.call_timeout,
            self.retriever.retrieve(&query, top_k),
        )
        .await
        {
            Ok(r) => r.map_err(CopilotError::from),
            Err(_) => Err(CopilotError::Timeout {
                stage: Stage::Retrieve.to_string(),
                after_ms: self.config.call_timeout.as_millis() as u64,
            }),
        };

        // replaced every iteration, never accumulated
        state.retrieved = match result {
            Ok(chunks) => {
                tracing::info!(
                    iteration = state.iteration,
                    stage = "retrieve",
                    chunks = chunks.len()
                );
                state.record(
                    Stage::Retrieve,
                    AuditKind::Step,
                    format!("retrieved {} chunks (top_k {top_k})", chunks.len()),
                );
                chunks
            }
            Err(e) => {
                tracing::warn!(iteration = state.iteration, error = %e, "Retrieval failed, continuing without context");
                state.record(Stage::Retrieve, AuditKind::RemoteFailure, e.to_string());
                Vec::new()
            }
        };
        self.emit(StrategistEvent::Retrieved {
            chunks: state.retrieved.len(),
        });
        Ok(())
    }

    /// Ask the model to issue the retrieval as a tool call; fall back to the
    /// seeded query when it doesn't.
    async fn request_rag_call(
        &self,
        state: &mut LoopState,
        seeded: &str,
    ) -> Result<(String, usize), CopilotError> {
        let default_top_k = self.config.retrieval_top_k;
        let prompt = self.prompts.retrieval_call(&RetrievalCallVars {
            query: seeded,
            top_k: default_top_k,
        })?;
        let mut request = self.planner.request(&prompt);
        request.tools = vec![rag_tool_def(default_top_k)];

        match self.planner.call(request, Stage::Retrieve).await {
            Ok(response) => {
                if let Some(call) = parse_rag_call(&response.tool_calls, default_top_k) {
                    state.record(
                        Stage::Retrieve,
                        AuditKind::Step,
                        format!("model requested {RAG_TOOL}(\"{}\", {})", call.0, call.1),
                    );
                    return Ok(call);
                }
                state.record(
                    Stage::Retrieve,
                    AuditKind::ModelMessage,
                    response.content,
                );
                state.record(
                    Stage::Retrieve,
                    AuditKind::Step,
                    format!("no usable {RAG_TOOL} call, forcing seeded query"),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Tool-call request failed, forcing seeded query");
                state.record(Stage::Retrieve, AuditKind::RemoteFailure, e.to_string());
            }
        }
        Ok((seeded.to_string(), default_top_k))
    }

    // ─── DRAFT ──────────────────────────────────────────────────

    async fn draft(&self, state: &mut LoopState) -> Result<(), CopilotError> {
        let trends_summary = state.trends.render(self.config.trend_entries);
        let context = planner_context(
            &state.retrieved,
            self.config.planner_context_chunks,
            &state.constraints,
        );
        let format_instructions = LayoutPlan::format_instructions();
        let prompt = self.prompts.planner(&PlannerVars {
            store_name: &state.store_name,
            city: &state.city,
            entrance_side: state.entrance_side.as_str(),
            trends_summary: &trends_summary,
            context: &context,
            format_instructions: &format_instructions,
        })?;

        let ctx = SchemaContext::new(state.store_name.clone(), state.city.clone());
        let iteration = state.iteration;
        let usable = match self
            .planner
            .generate::<LayoutPlan>(&prompt, &ctx, &mut state.audit, iteration, Stage::Draft)
            .await
        {
            Ok(Generated::Success(plan)) => {
                tracing::info!(
                    iteration,
                    stage = "draft",
                    zones = plan.zones.len(),
                    "Draft plan produced"
                );
                if plan.entrance_side != state.entrance_side {
                    tracing::warn!(
                        requested = %state.entrance_side,
                        drafted = %plan.entrance_side,
                        "Draft moved the entrance"
                    );
                }
                state.draft_plan = Some(plan);
                true
            }
            // the generator already logged and audited the raw text
            Ok(Generated::Failure(_)) => false,
            Err(e) => {
                tracing::warn!(iteration, error = %e, "Planner call failed, keeping previous draft");
                state.record(Stage::Draft, AuditKind::RemoteFailure, e.to_string());
                false
            }
        };
        self.emit(StrategistEvent::Drafted { usable });
        Ok(())
    }

    // ─── REVIEW ─────────────────────────────────────────────────

    /// Returns false when there was no draft to review.
    async fn review(&self, state: &mut LoopState) -> Result<bool, CopilotError> {
        let Some(draft) = state.draft_plan.as_ref() else {
            tracing::info!(iteration = state.iteration, "No draft to review, refining");
            state.record(Stage::Review, AuditKind::Step, "no draft available, skipping review");
            return Ok(false);
        };

        let layout_json = serde_json::to_string_pretty(draft)
            .map_err(|e| CopilotError::Other(e.into()))?;
        let context = full_context(&state.retrieved);
        let format_instructions = ReviewResult::format_instructions();
        let prompt = self.prompts.reviewer(&ReviewerVars {
            layout_json: &layout_json,
            context: &context,
            format_instructions: &format_instructions,
        })?;

        let ctx = SchemaContext::new(state.store_name.clone(), state.city.clone());
        let iteration = state.iteration;
        let review = match self
            .reviewer
            .generate::<ReviewResult>(&prompt, &ctx, &mut state.audit, iteration, Stage::Review)
            .await
        {
            Ok(Generated::Success(review)) => review,
            Ok(Generated::Failure(_)) => ReviewResult::fail_closed(),
            Err(e) => {
                tracing::warn!(iteration, error = %e, "Reviewer call failed, failing closed");
                state.record(Stage::Review, AuditKind::RemoteFailure, e.to_string());
                ReviewResult::fail_closed()
            }
        };

        tracing::info!(
            iteration,
            stage = "review",
            compliant = review.is_compliant,
            score = review.best_practice_score,
            issues = review.issues.len()
        );
        self.emit(StrategistEvent::Reviewed {
            compliant: review.is_compliant,
            score: review.best_practice_score,
        });
        state.review = Some(review);
        Ok(true)
    }

    // ─── DECIDE ─────────────────────────────────────────────────

    fn decide(&self, state: &mut LoopState) -> bool {
        let (Some(draft), Some(review)) = (state.draft_plan.as_ref(), state.review.as_ref()) else {
            return false;
        };

        let accepted = is_acceptable(review, self.config.acceptance_threshold);
        let summary = format!(
            "compliant={} score={} threshold={}",
            review.is_compliant, review.best_practice_score, self.config.acceptance_threshold
        );

        if accepted {
            let plan = draft.finalized_with(review);
            let score = plan.best_practice_score;
            tracing::info!(iteration = state.iteration, stage = "decide", score, "Plan accepted");
            state.final_plan = Some(plan);
            state.record(Stage::Decide, AuditKind::Accepted, summary);
            self.emit(StrategistEvent::Accepted { score });
        } else {
            tracing::info!(iteration = state.iteration, stage = "decide", %summary, "Plan rejected");
            state.record(Stage::Decide, AuditKind::Step, summary);
        }
        accepted
    }
}

/// Acceptance rule: compliant AND score at or above the threshold.
pub fn is_acceptable(review: &ReviewResult, threshold: f64) -> bool {
    review.is_compliant && review.best_practice_score >= threshold
}

/// Top `max_chunks` chunk texts, then any caller-supplied constraints.
fn planner_context(chunks: &[RetrievedChunk], max_chunks: usize, constraints: &[String]) -> String {
    let mut parts: Vec<String> = chunks
        .iter()
        .take(max_chunks)
        .map(|c| c.text.clone())
        .collect();
    if !constraints.is_empty() {
        let lines: Vec<String> = constraints.iter().map(|c| format!("- {c}")).collect();
        parts.push(format!("Store requirements:\n{}", lines.join("\n")));
    }
    parts.join("\n\n")
}

fn full_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn rag_tool_def(max_top_k: usize) -> ToolDef {
    ToolDef {
        name: RAG_TOOL.into(),
        description: "Search lease agreements, building codes, brand guidelines and \
                      fixture catalogs for store layout constraints."
            .into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to search for"},
                "top_k": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": max_top_k,
                    "description": "Number of passages"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Pull `(query, top_k)` out of the first well-formed `rag_tool` call.
/// `top_k` is capped at the configured value.
fn parse_rag_call(calls: &[ToolCall], default_top_k: usize) -> Option<(String, usize)> {
    calls.iter().filter(|c| c.name == RAG_TOOL).find_map(|c| {
        let query = c.arguments.get("query")?.as_str()?.trim();
        if query.is_empty() {
            return None;
        }
        let top_k = match c.arguments.get("top_k").and_then(|v| v.as_u64()) {
            Some(k) if k > 0 => usize::try_from(k).unwrap_or(usize::MAX).min(default_top_k),
            _ => default_top_k,
        };
        Some((query.to_string(), top_k))
    })
}
