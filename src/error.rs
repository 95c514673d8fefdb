use crate::schema::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema validation failed: {}", format_violations(.errors))]
    SchemaViolation { errors: Vec<ValidationError> },

    #[error("provider transport error: {message}")]
    Transport { message: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("provider '{0}' is not registered and no default is set")]
    ProviderNotFound(String),

    #[error("all providers exhausted: tried [{}]", .tried.join(", "))]
    AllProvidersExhausted { tried: Vec<String> },

    #[error("sequence aborted at step '{step}': {message}")]
    SequenceAborted { step: String, message: String },
}

impl OrchestratorError {
    /// True when the failure text indicates a rate-limit or timeout condition,
    /// which the recovery policy retries on the same provider at a lower
    /// temperature.
    pub fn is_rate_limit_or_timeout(&self) -> bool {
        match self {
            OrchestratorError::Transport { message } => {
                let lower = message.to_lowercase();
                lower.contains("timeout") || lower.contains("rate limit")
            }
            OrchestratorError::Request(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self, OrchestratorError::SchemaViolation { .. })
    }

    /// Configuration problems are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Configuration(_) | OrchestratorError::ProviderNotFound(_)
        )
    }
}

fn format_violations(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Transport {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        let err = OrchestratorError::Transport {
            message: "429 Rate limit exceeded".to_string(),
        };
        assert!(err.is_rate_limit_or_timeout());

        let err = OrchestratorError::Transport {
            message: "connection timeout after 30s".to_string(),
        };
        assert!(err.is_rate_limit_or_timeout());

        let err = OrchestratorError::Transport {
            message: "500 internal server error".to_string(),
        };
        assert!(!err.is_rate_limit_or_timeout());
    }

    #[test]
    fn test_schema_violation_display() {
        let err = OrchestratorError::SchemaViolation {
            errors: vec![ValidationError::new(
                "conclusion",
                "required field missing",
                None,
            )],
        };
        let text = err.to_string();
        assert!(text.contains("conclusion"));
        assert!(text.contains("required field missing"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(OrchestratorError::Configuration("bad".into()).is_fatal());
        assert!(OrchestratorError::ProviderNotFound("x".into()).is_fatal());
        assert!(!OrchestratorError::Transport {
            message: "oops".into()
        }
        .is_fatal());
    }
}
