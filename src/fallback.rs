//! Fallback chain: after recovery on the original provider is exhausted,
//! each remaining registered provider gets exactly one conservative attempt.

use crate::backend::ModelRequest;
use crate::error::OrchestratorError;
use crate::generate::{GenerationOutcome, GenerationRequest, StructuredGenerator};
use crate::recovery::MIN_TEMPERATURE;
use serde_json::Value;
use tracing::{debug, warn};

/// Try each registered provider other than `original` once, in registration
/// order, at a reduced temperature. Returns the first success; when every
/// provider has failed the aggregate outcome is `AllProvidersExhausted`.
///
/// Attempts made here never recurse back into recovery: one shot per
/// provider, no prompt mutation.
pub(crate) async fn run_chain(
    generator: &StructuredGenerator,
    original: &str,
    request: &GenerationRequest,
) -> GenerationOutcome<Value> {
    let mut tried = vec![original.to_string()];
    let conservative_temperature = (request.options.temperature * 0.5).max(MIN_TEMPERATURE);

    let names: Vec<String> = generator
        .registry()
        .list()
        .into_iter()
        .map(String::from)
        .collect();

    for name in names {
        if name == original {
            continue;
        }
        let provider = match generator.registry().resolve(Some(name.as_str())) {
            Ok(p) => p,
            Err(_) => continue,
        };

        warn!(provider = %name, "trying fallback provider");

        let model_request = ModelRequest {
            schema: request.schema.clone(),
            system: request.system_prompt.clone(),
            prompt: request.user_prompt.clone(),
            temperature: conservative_temperature,
            max_tokens: request.options.max_tokens,
            mode: request.options.mode,
            schema_name: request.options.schema_name.clone(),
        };

        match generator.attempt_once(provider, &model_request).await {
            GenerationOutcome::Success(value) => {
                debug!(provider = %name, "fallback provider succeeded");
                return GenerationOutcome::Success(value);
            }
            GenerationOutcome::Failure(e) => {
                debug!(provider = %name, error = %e, "fallback provider failed");
                tried.push(name);
            }
        }
    }

    GenerationOutcome::Failure(OrchestratorError::AllProvidersExhausted { tried })
}
