// src/core/query.rs — Retrieval query seeding

use super::types::ReviewResult;

const CONSTRAINT_TOPICS: &[&str] = &[
    "north wall",
    "accessibility",
    "fixture catalog",
    "brand guidelines",
    "decompression zone",
    "aisle width",
    "customer flow",
    "leasing agreement",
];

/// Build the retrieval query for an iteration.
///
/// Iteration 0 asks for the standing constraints of the city. Later
/// iterations target the first `feedback_items` issues and suggestions of
/// the previous review, or fall back to a generic best-practices query.
/// Deterministic for identical inputs.
pub fn seed_query(
    iteration: u32,
    store_name: &str,
    city: &str,
    previous_review: Option<&ReviewResult>,
    feedback_items: usize,
) -> String {
    if iteration == 0 {
        return format!(
            "{store_name} store layout constraints for {city}: {}",
            CONSTRAINT_TOPICS.join(", ")
        );
    }

    let problems: Vec<String> = previous_review
        .map(|r| r.feedback().into_iter().take(feedback_items).collect())
        .unwrap_or_default();

    if problems.is_empty() {
        format!("Improve best practices for {city} store layout")
    } else {
        format!("Fix layout issues in {city}: {}", problems.join("; "))
    }
}
