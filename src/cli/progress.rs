// src/cli/progress.rs — Strategist progress lines on stderr

use crate::core::strategist::StrategistEvent;

/// One line per event. Kept separate from printing so tests can check it.
pub fn format_event(event: &StrategistEvent, max_iterations: u32) -> String {
    match event {
        StrategistEvent::IterationStarted { iteration } => {
            format!("[iter {}/{}] planning...", iteration + 1, max_iterations)
        }
        StrategistEvent::Retrieved { chunks } => format!("  retrieved {chunks} chunk(s)"),
        StrategistEvent::Drafted { usable: true } => "  draft ready".to_string(),
        StrategistEvent::Drafted { usable: false } => {
            "  draft unusable, keeping previous".to_string()
        }
        StrategistEvent::Reviewed { compliant, score } => format!(
            "  review: score={:.1} {}",
            score,
            if *compliant { "compliant" } else { "non-compliant" }
        ),
        StrategistEvent::Accepted { score } => format!("[done] accepted at score={score:.1}"),
        StrategistEvent::Refining { next_iteration } => {
            format!("  refining -> iteration {}", next_iteration + 1)
        }
    }
}

/// Progress callback for `Strategist::with_progress`. Writes to stderr so
/// stdout stays clean for the plan JSON.
pub fn terminal_progress(max_iterations: u32) -> impl Fn(StrategistEvent) + Send + Sync + 'static {
    move |event| eprintln!("{}", format_event(&event, max_iterations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_is_one_based() {
        let line = format_event(&StrategistEvent::IterationStarted { iteration: 0 }, 5);
        assert_eq!(line, "[iter 1/5] planning...");
    }

    #[test]
    fn test_review_line() {
        let line = format_event(
            &StrategistEvent::Reviewed {
                compliant: false,
                score: 6.25,
            },
            5,
        );
        assert!(line.contains("score=6.2") || line.contains("score=6.3"));
        assert!(line.ends_with("non-compliant"));
    }

    #[test]
    fn test_unusable_draft() {
        let line = format_event(&StrategistEvent::Drafted { usable: false }, 5);
        assert!(line.contains("keeping previous"));
    }

    #[test]
    fn test_refining_names_next_iteration() {
        let line = format_event(&StrategistEvent::Refining { next_iteration: 1 }, 5);
        assert_eq!(line, "  refining -> iteration 2");
    }

    #[test]
    fn test_accepted() {
        let line = format_event(&StrategistEvent::Accepted { score: 9.0 }, 5);
        assert_eq!(line, "[done] accepted at score=9.0");
    }
}
