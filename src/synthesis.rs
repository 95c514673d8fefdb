//! Aggregation of step results into one integrated result.
//!
//! Pure functions: `(phase, strategy, results) -> IntegratedResult`. The
//! integrated result is the terminal artifact of a run and is constructed
//! exactly once, whether the run completed, partially failed, or aborted.

use crate::error::OrchestratorError;
use crate::method::ThinkingMethod;
use crate::orchestrator::{OrchestrationStrategy, RunState, StepResult, StepStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Confidence discount applied per failed step.
pub const FAILED_STEP_PENALTY: f64 = 0.1;

/// Maximum entries in `next_steps`.
pub const MAX_NEXT_STEPS: usize = 5;

/// The terminal artifact of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratedResult {
    pub phase: String,
    pub primary_method: ThinkingMethod,
    pub secondary_methods: Vec<ThinkingMethod>,
    /// Per-step results in submission order.
    pub results: Vec<StepResult>,
    /// Human-readable narrative over the completed steps.
    pub synthesis: String,
    pub action_items: Vec<String>,
    /// Mean confidence of completed steps, discounted per failed step,
    /// floored at 0.
    pub confidence: f64,
    pub next_steps: Vec<String>,
    pub timestamp: String,
}

impl IntegratedResult {
    /// Terminal run state derived from the step results.
    pub fn run_state(&self) -> RunState {
        let any_failed = self.results.iter().any(|r| r.status == StepStatus::Failed);
        let any_completed = self
            .results
            .iter()
            .any(|r| r.status == StepStatus::Completed);
        match (any_failed, any_completed) {
            (false, _) => RunState::Completed,
            (true, true) => RunState::PartiallyFailed,
            (true, false) => RunState::Aborted,
        }
    }
}

/// Aggregate step results into an integrated result.
pub fn synthesize(
    phase: &str,
    strategy: &OrchestrationStrategy,
    results: Vec<StepResult>,
) -> IntegratedResult {
    let confidence = aggregate_confidence(&results);
    let synthesis = narrative(&results);
    let action_items = extract_action_items(&results);
    let next_steps = collect_next_steps(phase, &results);

    IntegratedResult {
        phase: phase.to_string(),
        primary_method: strategy.primary,
        secondary_methods: strategy.secondary.clone(),
        results,
        synthesis,
        action_items,
        confidence,
        next_steps,
        timestamp: Utc::now().to_rfc3339(),
    }
}

/// Build the terminal schema-guidance result for an aborted sequence.
///
/// Carries the classified abort error, lists the completed prefix, and
/// instructs the caller to resubmit corrected input for the exact step to
/// resume from, including that method's expected input example.
pub fn schema_guidance(
    phase: &str,
    strategy: &OrchestrationStrategy,
    failing: ThinkingMethod,
    results: Vec<StepResult>,
    abort: &OrchestratorError,
) -> IntegratedResult {
    let completed: Vec<&str> = results
        .iter()
        .filter(|r| r.status == StepStatus::Completed)
        .map(|r| r.method.as_str())
        .collect();
    let completed_text = if completed.is_empty() {
        "none".to_string()
    } else {
        completed.join(", ")
    };

    let synthesis = format!("{}. Completed steps: {}", abort, completed_text);

    let example = serde_json::to_string(&failing.example_input()).unwrap_or_default();
    let action_items = vec![
        format!(
            "Resubmit corrected input for step '{}' and resume the sequence from it",
            failing
        ),
        format!("Expected input shape for '{}', for example: {}", failing, example),
    ];

    let next_steps = vec![format!("Re-run step '{}' with corrected input", failing)];

    IntegratedResult {
        phase: phase.to_string(),
        primary_method: strategy.primary,
        secondary_methods: strategy.secondary.clone(),
        confidence: aggregate_confidence(&results),
        results,
        synthesis,
        action_items,
        next_steps,
        timestamp: Utc::now().to_rfc3339(),
    }
}

/// Mean confidence of completed steps, minus [`FAILED_STEP_PENALTY`] per
/// failed step, clamped to [0, 1]. Zero when nothing completed.
pub fn aggregate_confidence(results: &[StepResult]) -> f64 {
    let completed: Vec<f64> = results
        .iter()
        .filter(|r| r.status == StepStatus::Completed)
        .map(|r| r.confidence)
        .collect();
    let failed = results
        .iter()
        .filter(|r| r.status == StepStatus::Failed)
        .count();

    if completed.is_empty() {
        return 0.0;
    }

    let mean = completed.iter().sum::<f64>() / completed.len() as f64;
    (mean - FAILED_STEP_PENALTY * failed as f64).clamp(0.0, 1.0)
}

fn narrative(results: &[StepResult]) -> String {
    let lines: Vec<String> = results
        .iter()
        .filter(|r| r.status == StepStatus::Completed)
        .map(|r| {
            let one_line = r.reasoning.lines().next().unwrap_or("").trim();
            format!("[{}] {}", r.method, one_line)
        })
        .collect();

    if lines.is_empty() {
        "No steps completed.".to_string()
    } else {
        lines.join("\n")
    }
}

fn extract_action_items(results: &[StepResult]) -> Vec<String> {
    let mut items = Vec::new();
    for result in results {
        let Some(output) = &result.output else {
            continue;
        };
        if result.status != StepStatus::Completed {
            continue;
        }
        match output.get(result.method.action_item_field()) {
            Some(serde_json::Value::Array(values)) => {
                items.extend(values.iter().filter_map(|v| v.as_str()).map(String::from));
            }
            Some(serde_json::Value::String(s)) if !s.is_empty() => {
                items.push(s.clone());
            }
            _ => {}
        }
    }
    dedup_preserving_order(items)
}

fn collect_next_steps(phase: &str, results: &[StepResult]) -> Vec<String> {
    let mut steps = Vec::new();
    for result in results {
        for recommendation in &result.next_recommendations {
            steps.push(format!("Apply {} to the current findings", recommendation));
        }
    }
    steps.extend(phase_hints(phase));
    let mut deduped = dedup_preserving_order(steps);
    deduped.truncate(MAX_NEXT_STEPS);
    deduped
}

/// Static phase-specific follow-up hints.
fn phase_hints(phase: &str) -> Vec<String> {
    let hints: &[&str] = match phase {
        "analysis" => &[
            "Stress-test the conclusions with devilsAdvocate",
            "Trace consequences with secondOrder before acting",
        ],
        "planning" => &[
            "Run swot on the selected plan",
            "Check the plan's feedback loops with systemsThinking",
        ],
        "debugging" => &[
            "Confirm the root cause with a targeted experiment",
            "Apply abductive reasoning to any remaining anomalies",
        ],
        _ => &["Review completed steps and decide the next phase"],
    };
    hints.iter().map(|h| h.to_string()).collect()
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
