//! The nine thinking methods and their per-method tables.
//!
//! Each method carries a fixed input-adaptation rule (total and
//! deterministic), an output schema, a prompt pair, a declarative example
//! input for schema guidance, the field the synthesizer projects action items
//! from, and static next-method recommendations.

use crate::prompt::render;
use crate::schema::restate_requirements;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThinkingMethod {
    FirstPrinciples,
    SystemsThinking,
    RootCause,
    Abductive,
    Lateral,
    Socratic,
    DevilsAdvocate,
    Swot,
    SecondOrder,
}

pub const ALL_METHODS: [ThinkingMethod; 9] = [
    ThinkingMethod::FirstPrinciples,
    ThinkingMethod::SystemsThinking,
    ThinkingMethod::RootCause,
    ThinkingMethod::Abductive,
    ThinkingMethod::Lateral,
    ThinkingMethod::Socratic,
    ThinkingMethod::DevilsAdvocate,
    ThinkingMethod::Swot,
    ThinkingMethod::SecondOrder,
];

impl ThinkingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingMethod::FirstPrinciples => "firstPrinciples",
            ThinkingMethod::SystemsThinking => "systemsThinking",
            ThinkingMethod::RootCause => "rootCause",
            ThinkingMethod::Abductive => "abductive",
            ThinkingMethod::Lateral => "lateral",
            ThinkingMethod::Socratic => "socratic",
            ThinkingMethod::DevilsAdvocate => "devilsAdvocate",
            ThinkingMethod::Swot => "swot",
            ThinkingMethod::SecondOrder => "secondOrder",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThinkingMethod::FirstPrinciples => "first-principles decomposition",
            ThinkingMethod::SystemsThinking => "systems thinking",
            ThinkingMethod::RootCause => "root-cause analysis",
            ThinkingMethod::Abductive => "abductive reasoning",
            ThinkingMethod::Lateral => "lateral thinking",
            ThinkingMethod::Socratic => "socratic questioning",
            ThinkingMethod::DevilsAdvocate => "devil's advocate critique",
            ThinkingMethod::Swot => "SWOT analysis",
            ThinkingMethod::SecondOrder => "second-order effects analysis",
        }
    }

    /// Remap a generic input object into this method's required fields.
    ///
    /// The rule is total: every method resolves every field it needs, walking
    /// a fixed fallback chain and ending in a default prompt.
    pub fn adapt_input(&self, input: &Value) -> Map<String, Value> {
        let mut adapted = Map::new();
        let context = pick(input, &["context"], "");

        match self {
            ThinkingMethod::FirstPrinciples => {
                adapted.insert(
                    "problem".into(),
                    pick(input, &["problem", "claim"], "Describe the problem to analyze"),
                );
            }
            ThinkingMethod::SystemsThinking => {
                adapted.insert(
                    "system".into(),
                    pick(input, &["system", "problem"], "Describe the system to analyze"),
                );
            }
            ThinkingMethod::RootCause => {
                adapted.insert(
                    "problem".into(),
                    pick(input, &["problem", "claim"], "Describe the failure to analyze"),
                );
            }
            ThinkingMethod::Abductive => {
                adapted.insert(
                    "surprisingFact".into(),
                    pick(
                        input,
                        &["surprisingFact", "problem"],
                        "Describe the surprising observation",
                    ),
                );
            }
            ThinkingMethod::Lateral => {
                adapted.insert(
                    "problem".into(),
                    pick(input, &["problem", "claim"], "Describe the problem to rethink"),
                );
            }
            ThinkingMethod::Socratic => {
                adapted.insert(
                    "claim".into(),
                    pick(input, &["claim", "problem"], "State the claim to examine"),
                );
            }
            ThinkingMethod::DevilsAdvocate => {
                adapted.insert(
                    "claim".into(),
                    pick(input, &["claim", "problem"], "State the position to challenge"),
                );
            }
            ThinkingMethod::Swot => {
                adapted.insert(
                    "subject".into(),
                    pick(input, &["subject", "problem"], "Describe the subject to assess"),
                );
            }
            ThinkingMethod::SecondOrder => {
                adapted.insert(
                    "decision".into(),
                    pick(input, &["decision", "problem"], "Describe the decision to trace"),
                );
            }
        }

        adapted.insert("context".into(), context);
        adapted
    }

    /// Output schema this method's generation must conform to.
    ///
    /// Every schema requires `confidence` in [0, 1] and a non-empty
    /// `reasoning` string alongside its method-specific fields.
    pub fn output_schema(&self) -> Value {
        let (fields, required) = match self {
            ThinkingMethod::FirstPrinciples => (
                json!({
                    "fundamentalTruths": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "assumptionsDiscarded": {"type": "array", "items": {"type": "string"}},
                    "rebuiltSolution": {"type": "string"}
                }),
                vec!["fundamentalTruths", "rebuiltSolution"],
            ),
            ThinkingMethod::SystemsThinking => (
                json!({
                    "components": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "feedbackLoops": {"type": "array", "items": {"type": "string"}},
                    "leveragePoints": {"type": "array", "items": {"type": "string"}, "minItems": 1}
                }),
                vec!["components", "leveragePoints"],
            ),
            ThinkingMethod::RootCause => (
                json!({
                    "whyChain": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "rootCause": {"type": "string"},
                    "remediations": {"type": "array", "items": {"type": "string"}}
                }),
                vec!["whyChain", "rootCause"],
            ),
            ThinkingMethod::Abductive => (
                json!({
                    "hypotheses": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "bestExplanation": {"type": "string"},
                    "testsToRun": {"type": "array", "items": {"type": "string"}}
                }),
                vec!["hypotheses", "bestExplanation"],
            ),
            ThinkingMethod::Lateral => (
                json!({
                    "alternatives": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "selectedIdea": {"type": "string"}
                }),
                vec!["alternatives", "selectedIdea"],
            ),
            ThinkingMethod::Socratic => (
                json!({
                    "questions": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "refinedClaim": {"type": "string"},
                    "openIssues": {"type": "array", "items": {"type": "string"}}
                }),
                vec!["questions", "refinedClaim"],
            ),
            ThinkingMethod::DevilsAdvocate => (
                json!({
                    "assumptionChallenges": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "counterArguments": {"type": "array", "items": {"type": "string"}},
                    "revisedPosition": {"type": "string"}
                }),
                vec!["assumptionChallenges", "revisedPosition"],
            ),
            ThinkingMethod::Swot => (
                json!({
                    "strengths": {"type": "array", "items": {"type": "string"}},
                    "weaknesses": {"type": "array", "items": {"type": "string"}},
                    "opportunities": {"type": "array", "items": {"type": "string"}},
                    "threats": {"type": "array", "items": {"type": "string"}},
                    "recommendation": {"type": "string"}
                }),
                vec!["strengths", "weaknesses", "opportunities", "threats"],
            ),
            ThinkingMethod::SecondOrder => (
                json!({
                    "immediateEffects": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "secondOrderEffects": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "mitigations": {"type": "array", "items": {"type": "string"}}
                }),
                vec!["immediateEffects", "secondOrderEffects"],
            ),
        };

        let mut properties = fields.as_object().cloned().unwrap_or_default();
        properties.insert(
            "confidence".into(),
            json!({"type": "number", "minimum": 0.0, "maximum": 1.0}),
        );
        properties.insert("reasoning".into(), json!({"type": "string"}));

        let mut required: Vec<&str> = required;
        required.push("confidence");
        required.push("reasoning");

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    /// Build the system/user prompt pair for an adapted input.
    pub fn prompts(&self, adapted: &Map<String, Value>) -> (String, String) {
        let system = format!(
            "You are a structured reasoning engine applying {}. Respond with a single JSON object and nothing else.\n\n{}",
            self.label(),
            restate_requirements(&self.output_schema())
        );

        let template = match self {
            ThinkingMethod::FirstPrinciples => {
                "Break this problem down to fundamental truths and rebuild a solution from them.\nProblem: {problem}\nContext: {context}"
            }
            ThinkingMethod::SystemsThinking => {
                "Map the components, feedback loops, and leverage points of this system.\nSystem: {system}\nContext: {context}"
            }
            ThinkingMethod::RootCause => {
                "Trace this failure to its root cause by asking why repeatedly.\nProblem: {problem}\nContext: {context}"
            }
            ThinkingMethod::Abductive => {
                "Generate hypotheses that would explain this observation and pick the best one.\nSurprising fact: {surprisingFact}\nContext: {context}"
            }
            ThinkingMethod::Lateral => {
                "Produce deliberately unconventional alternatives to this problem, then select the most promising.\nProblem: {problem}\nContext: {context}"
            }
            ThinkingMethod::Socratic => {
                "Interrogate this claim with probing questions and refine it.\nClaim: {claim}\nContext: {context}"
            }
            ThinkingMethod::DevilsAdvocate => {
                "Challenge every assumption behind this position and argue against it.\nPosition: {claim}\nContext: {context}"
            }
            ThinkingMethod::Swot => {
                "Assess strengths, weaknesses, opportunities, and threats.\nSubject: {subject}\nContext: {context}"
            }
            ThinkingMethod::SecondOrder => {
                "Trace the immediate and second-order consequences of this decision.\nDecision: {decision}\nContext: {context}"
            }
        };

        (system, render(template, adapted))
    }

    /// Declarative example input, used in schema-guidance results so a caller
    /// can resubmit corrected input.
    pub fn example_input(&self) -> Value {
        match self {
            ThinkingMethod::FirstPrinciples => json!({
                "problem": "Our deploy pipeline takes 45 minutes",
                "context": "CI runs on shared runners"
            }),
            ThinkingMethod::SystemsThinking => json!({
                "system": "On-call rotation and incident response process",
                "context": "Team of six engineers"
            }),
            ThinkingMethod::RootCause => json!({
                "problem": "Checkout latency doubled after the last release",
                "context": "No infrastructure changes were deployed"
            }),
            ThinkingMethod::Abductive => json!({
                "surprisingFact": "Error rate drops to zero every day at 3am",
                "context": "Traffic is lowest but not zero at that hour"
            }),
            ThinkingMethod::Lateral => json!({
                "problem": "Users abandon onboarding at the email-verification step",
                "context": "Verification is required for compliance"
            }),
            ThinkingMethod::Socratic => json!({
                "claim": "Rewriting the service in a faster language will fix our latency",
                "context": "Profiling has not been done"
            }),
            ThinkingMethod::DevilsAdvocate => json!({
                "claim": "We should migrate everything to microservices",
                "context": "Current monolith deploys once a week"
            }),
            ThinkingMethod::Swot => json!({
                "subject": "Launching a self-hosted version of the product",
                "context": "Two competitors already offer one"
            }),
            ThinkingMethod::SecondOrder => json!({
                "decision": "Make code review optional for small changes",
                "context": "Review turnaround is the top velocity complaint"
            }),
        }
    }

    /// Output field the synthesizer projects action items from.
    pub fn action_item_field(&self) -> &'static str {
        match self {
            ThinkingMethod::FirstPrinciples => "rebuiltSolution",
            ThinkingMethod::SystemsThinking => "leveragePoints",
            ThinkingMethod::RootCause => "remediations",
            ThinkingMethod::Abductive => "testsToRun",
            ThinkingMethod::Lateral => "selectedIdea",
            ThinkingMethod::Socratic => "openIssues",
            ThinkingMethod::DevilsAdvocate => "assumptionChallenges",
            ThinkingMethod::Swot => "opportunities",
            ThinkingMethod::SecondOrder => "mitigations",
        }
    }

    /// Static follow-up recommendations.
    pub fn recommended_next(&self) -> &'static [ThinkingMethod] {
        match self {
            ThinkingMethod::FirstPrinciples => {
                &[ThinkingMethod::DevilsAdvocate, ThinkingMethod::SecondOrder]
            }
            ThinkingMethod::SystemsThinking => {
                &[ThinkingMethod::SecondOrder, ThinkingMethod::RootCause]
            }
            ThinkingMethod::RootCause => {
                &[ThinkingMethod::FirstPrinciples, ThinkingMethod::SecondOrder]
            }
            ThinkingMethod::Abductive => &[ThinkingMethod::Socratic, ThinkingMethod::RootCause],
            ThinkingMethod::Lateral => &[ThinkingMethod::DevilsAdvocate, ThinkingMethod::Swot],
            ThinkingMethod::Socratic => {
                &[ThinkingMethod::DevilsAdvocate, ThinkingMethod::FirstPrinciples]
            }
            ThinkingMethod::DevilsAdvocate => {
                &[ThinkingMethod::SecondOrder, ThinkingMethod::Socratic]
            }
            ThinkingMethod::Swot => &[ThinkingMethod::SystemsThinking, ThinkingMethod::SecondOrder],
            ThinkingMethod::SecondOrder => &[ThinkingMethod::Swot, ThinkingMethod::SystemsThinking],
        }
    }
}

impl std::fmt::Display for ThinkingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThinkingMethod {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_METHODS
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| {
                crate::error::OrchestratorError::Configuration(format!(
                    "unknown thinking method '{}'",
                    s
                ))
            })
    }
}

fn pick(input: &Value, keys: &[&str], default: &str) -> Value {
    for key in keys {
        if let Some(value) = input.get(*key) {
            if !value.is_null() {
                return value.clone();
            }
        }
    }
    Value::String(default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValidator, SchemaValidator};

    #[test]
    fn test_adaptation_prefers_specific_field() {
        let input = json!({"surprisingFact": "odd", "problem": "general"});
        let adapted = ThinkingMethod::Abductive.adapt_input(&input);
        assert_eq!(adapted["surprisingFact"], "odd");
    }

    #[test]
    fn test_adaptation_falls_back_to_problem() {
        let input = json!({"problem": "general"});
        let adapted = ThinkingMethod::Abductive.adapt_input(&input);
        assert_eq!(adapted["surprisingFact"], "general");

        let adapted = ThinkingMethod::Socratic.adapt_input(&input);
        assert_eq!(adapted["claim"], "general");
    }

    #[test]
    fn test_adaptation_is_total() {
        // Every method must produce a non-empty mapping even for an empty input.
        for method in ALL_METHODS {
            let adapted = method.adapt_input(&json!({}));
            assert!(adapted.len() >= 2, "{} produced too few fields", method);
            for value in adapted.values() {
                assert!(!value.is_null());
            }
        }
    }

    #[test]
    fn test_every_schema_requires_confidence_and_reasoning() {
        for method in ALL_METHODS {
            let schema = method.output_schema();
            let required = schema["required"].as_array().unwrap();
            assert!(required.contains(&json!("confidence")), "{}", method);
            assert!(required.contains(&json!("reasoning")), "{}", method);
        }
    }

    #[test]
    fn test_action_field_exists_in_schema() {
        for method in ALL_METHODS {
            let schema = method.output_schema();
            let field = method.action_item_field();
            assert!(
                schema["properties"].get(field).is_some(),
                "{} action field '{}' not in schema",
                method,
                field
            );
        }
    }

    #[test]
    fn test_example_inputs_adapt_cleanly() {
        for method in ALL_METHODS {
            let adapted = method.adapt_input(&method.example_input());
            // The example must fill the method's primary field, not a default.
            let primary_key = adapted.keys().find(|k| *k != "context").unwrap().clone();
            let primary = adapted[&primary_key].as_str().unwrap_or_default();
            assert!(!primary.starts_with("Describe"), "{}", method);
            assert!(!primary.starts_with("State"), "{}", method);
        }
    }

    #[test]
    fn test_prompts_render_adapted_fields() {
        let input = json!({"claim": "X is always faster", "context": "benchmarks"});
        let adapted = ThinkingMethod::DevilsAdvocate.adapt_input(&input);
        let (system, user) = ThinkingMethod::DevilsAdvocate.prompts(&adapted);
        assert!(system.contains("devil's advocate"));
        assert!(system.contains("\"assumptionChallenges\""));
        assert!(user.contains("X is always faster"));
        assert!(user.contains("benchmarks"));
    }

    #[test]
    fn test_round_trip_names() {
        for method in ALL_METHODS {
            assert_eq!(method.as_str().parse::<ThinkingMethod>().unwrap(), method);
        }
        assert!("unknownMethod".parse::<ThinkingMethod>().is_err());
    }

    #[test]
    fn test_conforming_output_validates() {
        let output = json!({
            "assumptionChallenges": ["assumes latency is language-bound"],
            "counterArguments": ["profiling first is cheaper"],
            "revisedPosition": "profile before rewriting",
            "confidence": 0.8,
            "reasoning": "challenged the unstated premise"
        });
        let schema = ThinkingMethod::DevilsAdvocate.output_schema();
        assert!(DefaultValidator.validate(&schema, &output).is_ok());
    }
}
