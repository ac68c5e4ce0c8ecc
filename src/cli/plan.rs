// src/cli/plan.rs — One-shot layout generation from the terminal

use crate::core::pipeline::{LayoutJob, LayoutOutcome, LayoutPipeline};
use crate::core::types::{AuditLog, EntranceSide};

use super::PlanArgs;

/// Turn CLI arguments into a pipeline job. Entrance parsing errors surface
/// before any remote call.
pub fn job_from_args(args: &PlanArgs) -> anyhow::Result<LayoutJob> {
    let entrance_side = args
        .entrance
        .as_deref()
        .map(str::parse::<EntranceSide>)
        .transpose()?;
    Ok(LayoutJob {
        city: args.city.clone(),
        keywords: args.keywords.clone(),
        store_name: args.store_name.clone(),
        entrance_side,
        constraints: args.constraints.clone(),
        include_diagram: args.out.is_some(),
        allow_draft_fallback: args.allow_draft,
    })
}

/// Short human summary for stderr.
pub fn summary(outcome: &LayoutOutcome) -> String {
    let mut out = String::new();
    let status = if outcome.accepted { "accepted" } else { "NOT accepted (draft)" };
    out.push_str(&format!(
        "{} in {} iteration(s), score {:.1}/10, {} zone(s)\n",
        status,
        outcome.report.iterations,
        outcome.plan.best_practice_score,
        outcome.plan.zones.len()
    ));
    out.push_str(&format!(
        "region {} ({}), trends: {}\n",
        outcome.geo.sub_geo,
        outcome.geo.state,
        outcome
            .trends
            .signals
            .iter()
            .map(|s| s.keyword.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    if let Some(review) = &outcome.report.last_review {
        for issue in &review.issues {
            out.push_str(&format!("  issue: {issue}\n"));
        }
        for suggestion in &review.suggestions {
            out.push_str(&format!("  suggestion: {suggestion}\n"));
        }
    }
    out
}

pub fn format_audit(audit: &AuditLog) -> String {
    let mut out = String::new();
    for entry in audit.entries() {
        out.push_str(&format!(
            "#{} {:<10} {:<15} {}\n",
            entry.iteration,
            entry.stage.to_string(),
            format!("{:?}", entry.kind),
            crate::util::preview(&entry.message, 160).replace('\n', " ")
        ));
    }
    out
}

/// Run the pipeline and print the plan JSON on stdout.
pub async fn run_plan(pipeline: &LayoutPipeline, args: &PlanArgs) -> anyhow::Result<()> {
    let job = job_from_args(args)?;
    let outcome = pipeline.run(job).await?;

    if args.audit {
        eprint!("{}", format_audit(&outcome.report.audit));
    }
    if !args.quiet {
        eprint!("{}", summary(&outcome));
    }

    if let (Some(path), Some(diagram)) = (&args.out, &outcome.diagram) {
        std::fs::write(path, &diagram.bytes)?;
        if !args.quiet {
            eprintln!("diagram written to {}", path.display());
        }
    }

    println!("{}", serde_json::to_string_pretty(&outcome.plan)?);
    Ok(())
}
