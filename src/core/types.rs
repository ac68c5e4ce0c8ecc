// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::infra::config::Config;
use crate::infra::errors::CopilotError;
pub use crate::retrieval::RetrievedChunk;

/// Wall of the store the customer entrance sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntranceSide {
    North,
    South,
    East,
    West,
}

impl EntranceSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntranceSide::North => "north",
            EntranceSide::South => "south",
            EntranceSide::East => "east",
            EntranceSide::West => "west",
        }
    }
}

impl fmt::Display for EntranceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntranceSide {
    type Err = CopilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "north" => Ok(EntranceSide::North),
            "south" => Ok(EntranceSide::South),
            "east" => Ok(EntranceSide::East),
            "west" => Ok(EntranceSide::West),
            other => Err(CopilotError::InvalidRequest(format!(
                "entrance side must be one of north, south, east, west (got '{other}')"
            ))),
        }
    }
}

/// A rectangular region of the floor with its fixtures and products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub fixtures: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
}

impl Zone {
    /// True when the rectangle lies inside [0, length] × [0, width].
    pub fn fits_within(&self, length: f64, width: f64) -> bool {
        const EPS: f64 = 1e-6;
        self.x >= -EPS
            && self.y >= -EPS
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= length + EPS
            && self.y + self.height <= width + EPS
    }
}

/// The single canonical layout schema shared by planner, reviewer and renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPlan {
    pub store_name: String,
    pub city: String,
    /// (length, width) in metres.
    pub dimensions_m: (f64, f64),
    pub entrance_side: EntranceSide,
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub compliance_notes: Vec<String>,
    pub best_practice_score: f64,
}

impl LayoutPlan {
    pub fn length(&self) -> f64 {
        self.dimensions_m.0
    }

    pub fn width(&self) -> f64 {
        self.dimensions_m.1
    }

    /// Names of zones whose rectangle leaves the floor.
    pub fn zones_out_of_bounds(&self) -> Vec<&str> {
        self.zones
            .iter()
            .filter(|z| !z.fits_within(self.length(), self.width()))
            .map(|z| z.name.as_str())
            .collect()
    }

    /// The accepted plan: review score replaces ours, review feedback becomes the notes.
    pub fn finalized_with(&self, review: &ReviewResult) -> LayoutPlan {
        let mut plan = self.clone();
        plan.best_practice_score = review.best_practice_score;
        plan.compliance_notes = review.feedback();
        plan
    }
}

/// Reviewer verdict on one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub is_compliant: bool,
    pub best_practice_score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ReviewResult {
    /// Used when the reviewer output is unusable. Never accepts.
    pub fn fail_closed() -> Self {
        Self {
            is_compliant: false,
            best_practice_score: 0.0,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Issues followed by suggestions.
    pub fn feedback(&self) -> Vec<String> {
        self.issues
            .iter()
            .chain(self.suggestions.iter())
            .cloned()
            .collect()
    }
}

/// One keyword's search interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub keyword: String,
    pub score: f64,
}

/// Where trend scores came from. `Static` scores are offline placeholders,
/// not live market data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendOrigin {
    #[default]
    Static,
    Live,
}

/// Market signals handed to the planner, strongest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub signals: Vec<TrendSignal>,
    #[serde(default)]
    pub origin: TrendOrigin,
    /// Top related searches for the leading keyword, when the source has them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
}

impl TrendSummary {
    pub fn new(mut signals: Vec<TrendSignal>) -> Self {
        signals.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self {
            signals,
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin: TrendOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_related(mut self, related: Vec<String>) -> Self {
        self.related = related;
        self
    }

    /// "- keyword: score" lines for the top `n` signals, then related
    /// searches if any.
    pub fn render(&self, n: usize) -> String {
        let mut lines: Vec<String> = self
            .signals
            .iter()
            .take(n)
            .map(|s| format!("- {}: {}", s.keyword, s.score))
            .collect();
        if n > 0 && !self.related.is_empty() {
            lines.push(format!("- related searches: {}", self.related.join(", ")));
        }
        lines.join("\n")
    }
}

/// Everything the strategist needs about the store being planned.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub store_name: String,
    pub city: String,
    pub entrance_side: EntranceSide,
    pub trends: TrendSummary,
    /// Caller-supplied constraints, appended to the planner context.
    pub constraints: Vec<String>,
}

impl StoreRequest {
    pub fn new(
        store_name: impl Into<String>,
        city: impl Into<String>,
        entrance_side: EntranceSide,
        trends: TrendSummary,
    ) -> Self {
        Self {
            store_name: store_name.into(),
            city: city.into(),
            entrance_side,
            trends,
            constraints: Vec::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

// ─── Audit log ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SeedQuery,
    Retrieve,
    Draft,
    Review,
    Decide,
    Refine,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::SeedQuery => "seed_query",
            Stage::Retrieve => "retrieve",
            Stage::Draft => "draft",
            Stage::Review => "review",
            Stage::Decide => "decide",
            Stage::Refine => "refine",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Informational state-machine step.
    Step,
    /// Raw text returned by the model.
    ModelMessage,
    /// Model text that failed to parse or validate.
    Malformed,
    /// Remote call failed after retries (or timed out).
    RemoteFailure,
    Accepted,
    Refined,
    BudgetExceeded,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub iteration: u32,
    pub stage: Stage,
    pub kind: AuditKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Append-only record of everything that happened during one loop run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn record(
        &mut self,
        iteration: u32,
        stage: Stage,
        kind: AuditKind,
        message: impl Into<String>,
    ) {
        self.entries.push(AuditEntry {
            iteration,
            stage,
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn count(&self, kind: AuditKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Loop state ─────────────────────────────────────────────────

/// Mutable record threaded through iterations. One per loop run, never shared.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub store_name: String,
    pub city: String,
    pub entrance_side: EntranceSide,
    pub trends: TrendSummary,
    pub constraints: Vec<String>,
    /// 0-based; only ever incremented by REFINE.
    pub iteration: u32,
    pub draft_plan: Option<LayoutPlan>,
    pub review: Option<ReviewResult>,
    /// Replaced (not accumulated) on every RETRIEVE.
    pub retrieved: Vec<RetrievedChunk>,
    pub audit: AuditLog,
    pub final_plan: Option<LayoutPlan>,
}

impl LoopState {
    pub fn new(request: &StoreRequest) -> Self {
        Self {
            store_name: request.store_name.clone(),
            city: request.city.clone(),
            entrance_side: request.entrance_side,
            trends: request.trends.clone(),
            constraints: request.constraints.clone(),
            iteration: 0,
            draft_plan: None,
            review: None,
            retrieved: Vec::new(),
            audit: AuditLog::default(),
            final_plan: None,
        }
    }

    pub fn record(&mut self, stage: Stage, kind: AuditKind, message: impl Into<String>) {
        let iteration = self.iteration;
        self.audit.record(iteration, stage, kind, message);
    }
}

// ─── Configuration and outcome ──────────────────────────────────

/// Knobs for the plan/critique loop.
#[derive(Debug, Clone)]
pub struct StrategistConfig {
    pub max_iterations: u32,
    pub acceptance_threshold: f64,
    pub retrieval_top_k: usize,
    pub planner_context_chunks: usize,
    pub trend_entries: usize,
    pub feedback_items: usize,
    /// Bounds one model or retrieval step, retries included.
    pub call_timeout: Duration,
    pub loop_timeout: Duration,
    pub tool_call_retrieval: bool,
    pub planner_model: String,
    pub reviewer_model: String,
    pub planner_temperature: f32,
    pub reviewer_temperature: f32,
    pub max_tokens: u32,
}

impl Default for StrategistConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StrategistConfig {
    fn from(cfg: &Config) -> Self {
        let s = &cfg.strategist;
        Self {
            max_iterations: s.max_iterations,
            acceptance_threshold: s.acceptance_threshold,
            retrieval_top_k: s.retrieval_top_k,
            planner_context_chunks: s.planner_context_chunks,
            trend_entries: s.trend_entries,
            feedback_items: s.feedback_items,
            call_timeout: Duration::from_secs(s.call_timeout_secs),
            loop_timeout: Duration::from_secs(s.loop_timeout_secs),
            tool_call_retrieval: s.tool_call_retrieval,
            planner_model: cfg.models.planner_model.clone(),
            reviewer_model: cfg.models.reviewer_model.clone(),
            planner_temperature: s.planner_temperature,
            reviewer_temperature: s.reviewer_temperature,
            max_tokens: s.max_tokens,
        }
    }
}

/// How a loop run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    Accepted,
    BudgetExceeded,
    TimedOut,
}

/// Everything a loop run produced. `final_plan` is set only on acceptance.
#[derive(Debug, Clone)]
pub struct StrategistReport {
    pub outcome: LoopOutcome,
    pub final_plan: Option<LayoutPlan>,
    pub last_draft: Option<LayoutPlan>,
    pub last_review: Option<ReviewResult>,
    /// Iterations started (1-based count).
    pub iterations: u32,
    pub retrieved: Vec<RetrievedChunk>,
    pub audit: AuditLog,
    pub elapsed: Duration,
}

impl StrategistReport {
    pub fn is_accepted(&self) -> bool {
        self.outcome == LoopOutcome::Accepted
    }

    /// The accepted plan, or the matching error for the caller to map.
    pub fn accepted_plan(&self) -> Result<&LayoutPlan, CopilotError> {
        match (self.outcome, &self.final_plan) {
            (LoopOutcome::Accepted, Some(plan)) => Ok(plan),
            _ => Err(self.unaccepted_error()),
        }
    }

    /// Error describing why no plan was accepted.
    pub fn unaccepted_error(&self) -> CopilotError {
        match self.outcome {
            LoopOutcome::TimedOut => CopilotError::LoopTimeout {
                elapsed_ms: self.elapsed.as_millis() as u64,
            },
            _ => CopilotError::BudgetExceeded {
                iterations: self.iterations,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, x: f64, y: f64, w: f64, h: f64) -> Zone {
        Zone {
            name: name.into(),
            x,
            y,
            width: w,
            height: h,
            fixtures: vec![],
            products: vec![],
        }
    }

    fn plan(zones: Vec<Zone>) -> LayoutPlan {
        LayoutPlan {
            store_name: "Blue Retail - Surat".into(),
            city: "Surat".into(),
            dimensions_m: (20.0, 12.0),
            entrance_side: EntranceSide::South,
            zones,
            compliance_notes: vec![],
            best_practice_score: 6.0,
        }
    }

    // ─── EntranceSide ───────────────────────────────────────────

    #[test]
    fn test_entrance_side_parse() {
        assert_eq!("South".parse::<EntranceSide>().unwrap(), EntranceSide::South);
        assert_eq!(" west ".parse::<EntranceSide>().unwrap(), EntranceSide::West);
        assert!("up".parse::<EntranceSide>().is_err());
    }

    #[test]
    fn test_entrance_side_serde() {
        let json = serde_json::to_string(&EntranceSide::North).unwrap();
        assert_eq!(json, "\"north\"");
        assert!(serde_json::from_str::<EntranceSide>("\"diagonal\"").is_err());
    }

    // ─── Zone / LayoutPlan ──────────────────────────────────────

    #[test]
    fn test_zone_fits() {
        assert!(zone("a", 0.0, 0.0, 20.0, 12.0).fits_within(20.0, 12.0));
        assert!(!zone("b", 15.0, 0.0, 6.0, 2.0).fits_within(20.0, 12.0));
        assert!(!zone("c", -1.0, 0.0, 2.0, 2.0).fits_within(20.0, 12.0));
        assert!(!zone("d", 1.0, 1.0, 0.0, 2.0).fits_within(20.0, 12.0));
    }

    #[test]
    fn test_zones_out_of_bounds() {
        let p = plan(vec![
            zone("ok", 1.0, 1.0, 4.0, 4.0),
            zone("spill", 18.0, 10.0, 4.0, 4.0),
        ]);
        assert_eq!(p.zones_out_of_bounds(), vec!["spill"]);
    }

    #[test]
    fn test_finalized_with_review() {
        let p = plan(vec![zone("hero", 1.0, 1.0, 4.0, 4.0)]);
        let review = ReviewResult {
            is_compliant: true,
            best_practice_score: 9.0,
            issues: vec!["minor glare".into()],
            suggestions: vec!["add signage".into()],
        };
        let fin = p.finalized_with(&review);
        assert_eq!(fin.best_practice_score, 9.0);
        assert_eq!(fin.compliance_notes, vec!["minor glare", "add signage"]);
        assert_eq!(fin.zones, p.zones);
    }

    #[test]
    fn test_plan_serde_dimensions_as_array() {
        let p = plan(vec![]);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["dimensions_m"], serde_json::json!([20.0, 12.0]));
    }

    // ─── ReviewResult ───────────────────────────────────────────

    #[test]
    fn test_fail_closed_review() {
        let r = ReviewResult::fail_closed();
        assert!(!r.is_compliant);
        assert_eq!(r.best_practice_score, 0.0);
        assert!(r.feedback().is_empty());
    }

    // ─── TrendSummary ───────────────────────────────────────────

    #[test]
    fn test_trend_summary_sorted_and_rendered() {
        let t = TrendSummary::new(vec![
            TrendSignal {
                keyword: "gaming laptop".into(),
                score: 88.0,
            },
            TrendSignal {
                keyword: "iPhone 15".into(),
                score: 95.0,
            },
            TrendSignal {
                keyword: "earbuds".into(),
                score: 40.0,
            },
        ]);
        assert_eq!(t.render(2), "- iPhone 15: 95\n- gaming laptop: 88");
        assert_eq!(t.render(0), "");
        assert_eq!(t.origin, TrendOrigin::Static);
    }

    #[test]
    fn test_trend_summary_renders_related() {
        let t = TrendSummary::new(vec![TrendSignal {
            keyword: "iphone 15".into(),
            score: 71.5,
        }])
        .with_origin(TrendOrigin::Live)
        .with_related(vec!["iphone 15 pro".into(), "iphone 15 price".into()]);
        assert_eq!(
            t.render(3),
            "- iphone 15: 71.5\n- related searches: iphone 15 pro, iphone 15 price"
        );
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["origin"], "live");
    }

    // ─── AuditLog ───────────────────────────────────────────────

    #[test]
    fn test_audit_log_counts() {
        let mut log = AuditLog::default();
        log.record(0, Stage::Draft, AuditKind::ModelMessage, "{}");
        log.record(0, Stage::Refine, AuditKind::Refined, "refining");
        log.record(1, Stage::Refine, AuditKind::Refined, "refining");
        assert_eq!(log.len(), 3);
        assert_eq!(log.count(AuditKind::Refined), 2);
        assert_eq!(log.entries()[0].stage, Stage::Draft);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::SeedQuery.to_string(), "seed_query");
        assert_eq!(Stage::Review.to_string(), "review");
    }

    // ─── Config / report ────────────────────────────────────────

    #[test]
    fn test_strategist_config_defaults() {
        let c = StrategistConfig::default();
        assert_eq!(c.max_iterations, 5);
        assert!((c.acceptance_threshold - 8.5).abs() < 1e-9);
        assert_eq!(c.retrieval_top_k, 10);
        assert_eq!(c.planner_context_chunks, 5);
        assert_eq!(c.trend_entries, 3);
        assert_eq!(c.call_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_report_budget_exceeded_maps_to_error() {
        let report = StrategistReport {
            outcome: LoopOutcome::BudgetExceeded,
            final_plan: None,
            last_draft: None,
            last_review: None,
            iterations: 2,
            retrieved: vec![],
            audit: AuditLog::default(),
            elapsed: Duration::from_millis(10),
        };
        assert!(!report.is_accepted());
        assert!(matches!(
            report.accepted_plan(),
            Err(CopilotError::BudgetExceeded { iterations: 2 })
        ));
    }
}
