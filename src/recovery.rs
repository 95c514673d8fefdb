//! Auto-recovery policy: a pure decision function over failed attempts.
//!
//! Given a classified failure and the state of the current attempt, decides
//! whether the next attempt retries on the same provider (possibly with a
//! mutated prompt or temperature) or hands off to the fallback chain. No I/O
//! happens here; the generator composes this with the actual retry loop.

use crate::error::OrchestratorError;
use crate::schema::restate_requirements;
use serde_json::Value;
use std::time::Duration;

/// Temperature floor applied when cooling down after rate-limit/timeout.
pub const MIN_TEMPERATURE: f64 = 0.1;

/// State of the attempt that just failed.
#[derive(Debug, Clone)]
pub struct AttemptState {
    /// 1-based index of the attempt that failed.
    pub attempt: u32,
    pub max_retries: u32,
    pub auto_recovery: bool,
    /// Temperature the failed attempt ran at.
    pub temperature: f64,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry on the same provider after `backoff`, with the given mutations.
    Retry {
        /// Replacement system prompt (schema violations only).
        system_prompt: Option<String>,
        /// Replacement temperature (rate-limit/timeout only).
        temperature: Option<f64>,
        backoff: Duration,
    },
    /// Hand off to the fallback chain.
    Fallback,
}

/// Decide the next action for a failed attempt.
///
/// The policy, in order:
/// 1. recovery disabled or retries exhausted: fall back
/// 2. schema violation: retry with an augmented system prompt, same temperature
/// 3. rate-limit/timeout: retry with temperature reduced 20% (floor 0.1)
/// 4. anything else: fall back immediately
pub fn next_action(
    error: &OrchestratorError,
    state: &AttemptState,
    schema: &Value,
    current_system: &str,
) -> RecoveryAction {
    if !state.auto_recovery || state.attempt >= state.max_retries {
        return RecoveryAction::Fallback;
    }

    if error.is_schema_violation() {
        return RecoveryAction::Retry {
            system_prompt: Some(augment_system_prompt(current_system, schema, error)),
            temperature: None,
            backoff: backoff_delay(state.attempt),
        };
    }

    if error.is_rate_limit_or_timeout() {
        return RecoveryAction::Retry {
            system_prompt: None,
            temperature: Some(cooled(state.temperature)),
            backoff: backoff_delay(state.attempt),
        };
    }

    RecoveryAction::Fallback
}

/// Exponential backoff before retry `attempt + 1`: `2^(attempt-1)` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt.saturating_sub(1).min(16)))
}

fn cooled(temperature: f64) -> f64 {
    (temperature * 0.8).max(MIN_TEMPERATURE)
}

/// Augment a system prompt with the previous validation failure and a
/// restatement of the schema requirements.
///
/// The prior error text is included verbatim so the model sees exactly what
/// it got wrong.
pub fn augment_system_prompt(current: &str, schema: &Value, error: &OrchestratorError) -> String {
    format!(
        "{}\n\n## Correction required\nYour previous response failed validation:\n{}\n\n{}\nReturn ONLY the corrected JSON object, with no surrounding text.",
        current,
        error,
        restate_requirements(schema)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValidationError;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"conclusion": {"type": "string"}},
            "required": ["conclusion"]
        })
    }

    fn state(attempt: u32) -> AttemptState {
        AttemptState {
            attempt,
            max_retries: 3,
            auto_recovery: true,
            temperature: 0.3,
        }
    }

    fn schema_error() -> OrchestratorError {
        OrchestratorError::SchemaViolation {
            errors: vec![ValidationError::new(
                "conclusion",
                "required field 'conclusion' missing",
                None,
            )],
        }
    }

    #[test]
    fn test_exhausted_retries_fall_back() {
        let action = next_action(&schema_error(), &state(3), &schema(), "sys");
        assert_eq!(action, RecoveryAction::Fallback);
    }

    #[test]
    fn test_disabled_recovery_falls_back() {
        let mut s = state(1);
        s.auto_recovery = false;
        let action = next_action(&schema_error(), &s, &schema(), "sys");
        assert_eq!(action, RecoveryAction::Fallback);
    }

    #[test]
    fn test_schema_violation_retries_with_augmented_prompt() {
        let action = next_action(&schema_error(), &state(1), &schema(), "original sys");
        match action {
            RecoveryAction::Retry {
                system_prompt: Some(prompt),
                temperature: None,
                backoff,
            } => {
                assert!(prompt.starts_with("original sys"));
                assert!(prompt.contains("required field 'conclusion' missing"));
                assert!(prompt.contains("\"conclusion\" (string, required)"));
                assert_eq!(backoff, Duration::from_secs(1));
            }
            other => panic!("expected augmented retry, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_cools_temperature() {
        let err = OrchestratorError::Transport {
            message: "429 rate limit".to_string(),
        };
        let action = next_action(&err, &state(2), &schema(), "sys");
        match action {
            RecoveryAction::Retry {
                system_prompt: None,
                temperature: Some(t),
                backoff,
            } => {
                assert!((t - 0.24).abs() < 1e-9);
                assert_eq!(backoff, Duration::from_secs(2));
            }
            other => panic!("expected cooled retry, got {:?}", other),
        }
    }

    #[test]
    fn test_temperature_floor() {
        assert_eq!(cooled(0.11), MIN_TEMPERATURE);
        assert_eq!(cooled(0.05), MIN_TEMPERATURE);
    }

    #[test]
    fn test_unclassified_transport_falls_back() {
        let err = OrchestratorError::Transport {
            message: "500 internal server error".to_string(),
        };
        let action = next_action(&err, &state(1), &schema(), "sys");
        assert_eq!(action, RecoveryAction::Fallback);
    }

    #[test]
    fn test_backoff_is_exponential() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
    }
}
