// src/core/pipeline.rs — Geo check → trends → strategist → diagram

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::strategist::Strategist;
use super::types::*;
use crate::infra::config::{GeoEntry, MarketConfig};
use crate::infra::errors::CopilotError;
use crate::market::geo::resolve_city;
use crate::market::TrendSource;
use crate::render::{Diagram, DiagramRenderer};

/// A layout job as callers describe it. Optional fields fall back to the
/// `[market]` defaults.
#[derive(Debug, Clone, Default)]
pub struct LayoutJob {
    pub city: String,
    pub keywords: Vec<String>,
    pub store_name: Option<String>,
    pub entrance_side: Option<EntranceSide>,
    pub constraints: Vec<String>,
    pub include_diagram: bool,
    /// Return the last draft instead of failing when no plan is accepted.
    pub allow_draft_fallback: bool,
}

impl LayoutJob {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            include_diagram: true,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct LayoutOutcome {
    pub layout_id: String,
    pub geo: GeoEntry,
    pub trends: TrendSummary,
    /// The accepted plan, or the last draft when falling back.
    pub plan: LayoutPlan,
    pub accepted: bool,
    pub diagram: Option<Diagram>,
    pub report: StrategistReport,
    pub elapsed: Duration,
}

struct Prepared {
    geo: GeoEntry,
    store_name: String,
    entrance_side: EntranceSide,
    keywords: Vec<String>,
}

pub struct LayoutPipeline {
    market: MarketConfig,
    trends: Arc<dyn TrendSource>,
    strategist: Arc<Strategist>,
    renderer: Arc<dyn DiagramRenderer>,
}

impl LayoutPipeline {
    pub fn new(
        market: MarketConfig,
        trends: Arc<dyn TrendSource>,
        strategist: Arc<Strategist>,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> Self {
        Self {
            market,
            trends,
            strategist,
            renderer,
        }
    }

    pub fn market(&self) -> &MarketConfig {
        &self.market
    }

    /// Resolve the job's defaults. Fails fast on unsupported input, before
    /// any remote call.
    fn prepare(&self, job: &LayoutJob) -> Result<Prepared, CopilotError> {
        let geo = resolve_city(&self.market.supported_cities, &job.city)?.clone();

        let entrance_side = match job.entrance_side {
            Some(side) => side,
            None => self.market.default_entrance_side.parse()?,
        };
        let store_name = job
            .store_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.market.default_store_name)
            .to_string();
        let keywords: Vec<String> = if job.keywords.iter().all(|k| k.trim().is_empty()) {
            self.market.default_keywords.clone()
        } else {
            job.keywords.clone()
        };
        Ok(Prepared {
            geo,
            store_name,
            entrance_side,
            keywords,
        })
    }

    pub async fn run(&self, job: LayoutJob) -> Result<LayoutOutcome, CopilotError> {
        let started = Instant::now();
        let layout_id = uuid::Uuid::new_v4().to_string();
        let Prepared {
            geo,
            store_name,
            entrance_side,
            keywords,
        } = self.prepare(&job)?;
        let city = job.city.trim().to_string();

        tracing::info!(request_id = %layout_id, city = %city, region = %geo.sub_geo, "Generating layout");

        let trends = self.trends.trends(&geo, &keywords).await?;

        let request = StoreRequest::new(store_name, city, entrance_side, trends.clone())
            .with_constraints(job.constraints.clone());
        let report = self.strategist.run(&request).await?;

        let (plan, accepted) = match (&report.final_plan, &report.last_draft) {
            (Some(plan), _) => (plan.clone(), true),
            (None, Some(draft)) if job.allow_draft_fallback => {
                tracing::warn!(request_id = %layout_id, outcome = ?report.outcome, "Returning unaccepted draft");
                (draft.clone(), false)
            }
            _ => return Err(report.unaccepted_error()),
        };

        let diagram = if job.include_diagram {
            Some(self.renderer.render(&plan)?)
        } else {
            None
        };

        let elapsed = started.elapsed();
        tracing::info!(
            request_id = %layout_id,
            accepted,
            iterations = report.iterations,
            elapsed_ms = elapsed.as_millis() as u64,
            "Layout generated"
        );

        Ok(LayoutOutcome {
            layout_id,
            geo,
            trends,
            plan,
            accepted,
            diagram,
            report,
            elapsed,
        })
    }
}
