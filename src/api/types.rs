// src/api/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::pipeline::{LayoutJob, LayoutOutcome};
use crate::core::types::{EntranceSide, LayoutPlan, TrendSummary};
use crate::infra::config::GeoEntry;
use crate::infra::errors::CopilotError;
use crate::render::DiagramFormat;

fn default_store_area() -> f64 {
    500.0
}

fn default_design_focus() -> String {
    "optimize customer flow".into()
}

fn default_true() -> bool {
    true
}

/// Request body for POST /api/v1/layouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutRequest {
    pub city: String,
    /// Square metres.
    #[serde(default = "default_store_area")]
    pub store_area: f64,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default = "default_design_focus")]
    pub design_focus: String,
    #[serde(default)]
    pub target_products: Vec<String>,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub entrance_side: Option<String>,
    #[serde(default = "default_true")]
    pub include_diagram: bool,
    #[serde(default)]
    pub allow_draft_fallback: bool,
}

impl LayoutRequest {
    /// Validate and convert into a pipeline job. Caller constraints, design
    /// focus and target area all reach the planner as requirements.
    pub fn to_job(&self) -> Result<LayoutJob, CopilotError> {
        if self.city.trim().is_empty() {
            return Err(CopilotError::InvalidRequest("city is required".into()));
        }
        if !(self.store_area.is_finite() && self.store_area > 0.0) {
            return Err(CopilotError::InvalidRequest(format!(
                "store_area must be positive (got {})",
                self.store_area
            )));
        }
        let entrance_side = self
            .entrance_side
            .as_deref()
            .map(str::parse::<EntranceSide>)
            .transpose()?;

        let mut constraints: Vec<String> = self
            .constraints
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if !self.design_focus.trim().is_empty() {
            constraints.push(format!("Design focus: {}", self.design_focus.trim()));
        }
        constraints.push(format!("Target floor area: about {} sqm", self.store_area));

        Ok(LayoutJob {
            city: self.city.clone(),
            keywords: self.target_products.clone(),
            store_name: self.store_name.clone(),
            entrance_side,
            constraints,
            include_diagram: self.include_diagram,
            allow_draft_fallback: self.allow_draft_fallback,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LayoutMetadata {
    pub city: String,
    pub store_area: f64,
    pub constraints: Vec<String>,
    pub design_focus: String,
    pub geo: GeoEntry,
    pub elapsed_loop_ms: u64,
}

/// Response for a generated layout.
#[derive(Debug, Serialize, Deserialize)]
pub struct LayoutResponse {
    pub success: bool,
    pub layout_id: String,
    /// False only when a draft was returned via `allow_draft_fallback`.
    pub accepted: bool,
    pub layout_data: LayoutPlan,
    /// Base64-encoded diagram.
    pub diagram: Option<String>,
    pub diagram_format: Option<DiagramFormat>,
    pub trends_summary: TrendSummary,
    pub render_time_secs: f64,
    pub generated_at: DateTime<Utc>,
    pub iterations: u32,
    pub metadata: LayoutMetadata,
}

impl LayoutResponse {
    pub fn from_outcome(outcome: LayoutOutcome, request: &LayoutRequest) -> Self {
        Self {
            success: true,
            layout_id: outcome.layout_id,
            accepted: outcome.accepted,
            diagram: outcome.diagram.as_ref().map(|d| d.to_base64()),
            diagram_format: outcome.diagram.as_ref().map(|d| d.format),
            layout_data: outcome.plan,
            trends_summary: outcome.trends,
            render_time_secs: outcome.elapsed.as_secs_f64(),
            generated_at: Utc::now(),
            iterations: outcome.report.iterations,
            metadata: LayoutMetadata {
                city: request.city.trim().to_string(),
                store_area: request.store_area,
                constraints: request.constraints.clone(),
                design_focus: request.design_focus.clone(),
                geo: outcome.geo,
                elapsed_loop_ms: outcome.report.elapsed.as_millis() as u64,
            },
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: error_code.into(),
            retry_after_secs: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}
