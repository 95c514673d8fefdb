//! Orchestration of multi-step thinking runs.
//!
//! The orchestrator executes an ordered (sequential) or independent
//! (parallel) set of generation steps, threading outputs into later inputs,
//! and converts every step-internal failure into a failed [`StepResult`]
//! rather than raising. Sequential runs that hit a failed step abort with a
//! schema-guidance result naming the failing step and the completed prefix.

use crate::error::OrchestratorError;
use crate::generate::{
    GenerationOptions, GenerationOutcome, GenerationRequest, StructuredGenerator,
};
use crate::method::ThinkingMethod;
use crate::provider::ProviderRegistry;
use crate::synthesis::{self, IntegratedResult};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Terminal state of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    PartiallyFailed,
    Aborted,
}

/// Result of one orchestration step. Constructed once, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub method: ThinkingMethod,
    /// The adapted input the step actually ran with.
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Always within [0, 1].
    pub confidence: f64,
    /// Non-empty for failed steps: names the failure class.
    pub reasoning: String,
    pub status: StepStatus,
    pub timestamp: String,
    pub next_recommendations: Vec<String>,
    pub metadata: Value,
}

impl StepResult {
    fn completed(method: ThinkingMethod, input: Value, output: Value) -> Self {
        let confidence = output
            .get("confidence")
            .and_then(|c| c.as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        let reasoning = output
            .get("reasoning")
            .and_then(|r| r.as_str())
            .unwrap_or("completed without stated reasoning")
            .to_string();
        Self {
            method,
            input,
            output: Some(output),
            confidence,
            reasoning,
            status: StepStatus::Completed,
            timestamp: Utc::now().to_rfc3339(),
            next_recommendations: method
                .recommended_next()
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
            metadata: serde_json::json!({"stepId": Uuid::new_v4().to_string()}),
        }
    }

    fn failed(method: ThinkingMethod, input: Value, error: &OrchestratorError) -> Self {
        Self {
            method,
            input,
            output: None,
            confidence: 0.0,
            reasoning: error.to_string(),
            status: StepStatus::Failed,
            timestamp: Utc::now().to_rfc3339(),
            next_recommendations: Vec::new(),
            metadata: serde_json::json!({
                "stepId": Uuid::new_v4().to_string(),
                "failureClass": failure_class(error),
            }),
        }
    }
}

fn failure_class(error: &OrchestratorError) -> &'static str {
    match error {
        OrchestratorError::SchemaViolation { .. } => "schema_violation",
        OrchestratorError::Transport { .. } | OrchestratorError::Request(_) => "transport",
        OrchestratorError::Configuration(_) => "configuration",
        OrchestratorError::ProviderNotFound(_) => "provider_not_found",
        OrchestratorError::AllProvidersExhausted { .. } => "all_providers_exhausted",
        OrchestratorError::SequenceAborted { .. } => "sequence_aborted",
        OrchestratorError::Json(_) => "json",
    }
}

/// Static step-selection configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationStrategy {
    pub primary: ThinkingMethod,
    pub secondary: Vec<ThinkingMethod>,
    /// Explicit step order; `primary` followed by `secondary` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<ThinkingMethod>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl OrchestrationStrategy {
    pub fn new(primary: ThinkingMethod) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
            sequence: None,
            max_iterations: None,
        }
    }

    pub fn with_secondary(mut self, methods: impl IntoIterator<Item = ThinkingMethod>) -> Self {
        self.secondary = methods.into_iter().collect();
        self
    }

    pub fn with_sequence(mut self, sequence: impl IntoIterator<Item = ThinkingMethod>) -> Self {
        self.sequence = Some(sequence.into_iter().collect());
        self
    }

    /// The ordered step list this strategy expands to.
    pub fn steps(&self) -> Vec<ThinkingMethod> {
        match &self.sequence {
            Some(sequence) => sequence.clone(),
            None => {
                let mut steps = vec![self.primary];
                steps.extend(self.secondary.iter().copied());
                steps
            }
        }
    }
}

/// Per-run execution context.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Caller-facing phase label (e.g. `analysis`, `planning`, `debugging`).
    pub phase: String,
    /// Named provider; the registry default when `None`.
    pub provider: Option<String>,
    pub options: GenerationOptions,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            phase: "analysis".to_string(),
            provider: None,
            options: GenerationOptions::default(),
        }
    }
}

impl RunContext {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Executes thinking strategies against a [`StructuredGenerator`].
pub struct Orchestrator {
    generator: StructuredGenerator,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            generator: StructuredGenerator::new(registry),
        }
    }

    pub fn with_generator(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &StructuredGenerator {
        &self.generator
    }

    /// Run one step: adapt the input, generate against the method's schema,
    /// and capture any failure as a failed [`StepResult`]. Never raises.
    pub async fn run_single_step(
        &self,
        method: ThinkingMethod,
        input: &Value,
        ctx: &RunContext,
    ) -> StepResult {
        let adapted = method.adapt_input(input);
        let (system, user) = method.prompts(&adapted);
        let adapted_value = Value::Object(adapted);

        debug!(method = %method, phase = %ctx.phase, "running step");

        let mut request = GenerationRequest::new(method.output_schema(), system, user)
            .with_options(ctx.options.clone().with_schema_name(method.as_str()));
        if let Some(provider) = &ctx.provider {
            request = request.with_provider(provider.clone());
        }

        match self.generator.generate_value(&request).await {
            GenerationOutcome::Success(output) => {
                StepResult::completed(method, adapted_value, output)
            }
            GenerationOutcome::Failure(e) => {
                warn!(method = %method, error = %e, "step failed");
                StepResult::failed(method, adapted_value, &e)
            }
        }
    }

    /// Run steps sequentially, merging each output into the running input
    /// before the next step.
    ///
    /// Step *i+1* never starts before step *i*'s result is fully constructed.
    /// On a failed step the sequence aborts and the result is a
    /// schema-guidance [`IntegratedResult`]: it names the failing step, lists
    /// the completed prefix, and instructs the caller how to resubmit
    /// corrected input for the exact step to resume from.
    pub async fn run_sequence(
        &self,
        strategy: &OrchestrationStrategy,
        initial_input: &Value,
        ctx: &RunContext,
    ) -> IntegratedResult {
        let steps = strategy.steps();
        debug!(phase = %ctx.phase, steps = steps.len(), "sequence running");

        let mut running_input = as_input_object(initial_input);
        let mut results: Vec<StepResult> = Vec::new();

        for method in steps {
            let result = self
                .run_single_step(method, &Value::Object(running_input.clone()), ctx)
                .await;

            if result.status == StepStatus::Failed {
                let abort = OrchestratorError::SequenceAborted {
                    step: method.as_str().to_string(),
                    message: result.reasoning.clone(),
                };
                warn!(phase = %ctx.phase, error = %abort, "sequence aborted");
                results.push(result);
                return synthesis::schema_guidance(&ctx.phase, strategy, method, results, &abort);
            }

            if let Some(output) = &result.output {
                merge_output(&mut running_input, method, output);
            }
            results.push(result);
        }

        debug!(phase = %ctx.phase, "sequence completed");
        synthesis::synthesize(&ctx.phase, strategy, results)
    }

    /// Run all steps concurrently against the same input.
    ///
    /// A step's failure never aborts its siblings; the result array preserves
    /// submission order regardless of completion order.
    pub async fn run_parallel(
        &self,
        strategy: &OrchestrationStrategy,
        input: &Value,
        ctx: &RunContext,
    ) -> IntegratedResult {
        let steps = strategy.steps();
        debug!(phase = %ctx.phase, steps = steps.len(), "parallel run starting");

        let input = Value::Object(as_input_object(input));
        let futures = steps
            .iter()
            .map(|method| self.run_single_step(*method, &input, ctx));
        let results = join_all(futures).await;

        synthesis::synthesize(&ctx.phase, strategy, results)
    }
}

/// Normalize an initial input into an object; bare strings become `problem`.
fn as_input_object(input: &Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map.clone(),
        Value::String(s) => {
            let mut map = Map::new();
            map.insert("problem".into(), Value::String(s.clone()));
            map
        }
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("problem".into(), other.clone());
            map
        }
    }
}

/// Merge a step's output into the running input without replacing it.
///
/// Method-specific fields overwrite same-named keys; `confidence` and
/// `reasoning` stay out of the input. The full output is also kept under
/// `<method>Result` for later steps that want the whole thing.
fn merge_output(running: &mut Map<String, Value>, method: ThinkingMethod, output: &Value) {
    if let Some(obj) = output.as_object() {
        for (key, value) in obj {
            if key == "confidence" || key == "reasoning" {
                continue;
            }
            running.insert(key.clone(), value.clone());
        }
    }
    running.insert(format!("{}Result", method.as_str()), output.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strategy_steps_default_order() {
        let strategy = OrchestrationStrategy::new(ThinkingMethod::FirstPrinciples)
            .with_secondary([ThinkingMethod::DevilsAdvocate, ThinkingMethod::SecondOrder]);
        assert_eq!(
            strategy.steps(),
            vec![
                ThinkingMethod::FirstPrinciples,
                ThinkingMethod::DevilsAdvocate,
                ThinkingMethod::SecondOrder
            ]
        );
    }

    #[test]
    fn test_strategy_explicit_sequence_wins() {
        let strategy = OrchestrationStrategy::new(ThinkingMethod::FirstPrinciples)
            .with_secondary([ThinkingMethod::Swot])
            .with_sequence([ThinkingMethod::RootCause, ThinkingMethod::Abductive]);
        assert_eq!(
            strategy.steps(),
            vec![ThinkingMethod::RootCause, ThinkingMethod::Abductive]
        );
    }

    #[test]
    fn test_input_normalization() {
        let obj = as_input_object(&json!({"problem": "x"}));
        assert_eq!(obj["problem"], "x");

        let from_string = as_input_object(&json!("bare problem"));
        assert_eq!(from_string["problem"], "bare problem");

        assert!(as_input_object(&Value::Null).is_empty());
    }

    #[test]
    fn test_merge_output_keeps_existing_and_adds_result() {
        let mut running = as_input_object(&json!({"problem": "x", "context": "c"}));
        let output = json!({
            "rootCause": "missing index",
            "confidence": 0.9,
            "reasoning": "traced through the why chain"
        });
        merge_output(&mut running, ThinkingMethod::RootCause, &output);

        assert_eq!(running["problem"], "x");
        assert_eq!(running["rootCause"], "missing index");
        assert_eq!(running["rootCauseResult"]["confidence"], 0.9);
        assert!(running.get("confidence").is_none());
        assert!(running.get("reasoning").is_none());
    }

    #[test]
    fn test_failed_step_result_shape() {
        let err = OrchestratorError::AllProvidersExhausted {
            tried: vec!["a".into(), "b".into()],
        };
        let result = StepResult::failed(ThinkingMethod::Socratic, json!({}), &err);
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.reasoning.is_empty());
        assert_eq!(result.metadata["failureClass"], "all_providers_exhausted");
    }

    #[test]
    fn test_completed_step_clamps_confidence() {
        let output = json!({"confidence": 3.0, "reasoning": "over-confident"});
        let result = StepResult::completed(ThinkingMethod::Swot, json!({}), output);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.status, StepStatus::Completed);
    }

    #[test]
    fn test_step_status_serialization() {
        assert_eq!(
            serde_json::to_string(&StepStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}
