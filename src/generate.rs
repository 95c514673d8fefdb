//! Structured output generation with retry, recovery, and fallback.
//!
//! [`StructuredGenerator`] guarantees that a call either returns data
//! conforming to the caller's schema or fails with a classified error after a
//! bounded number of attempts across the registered providers. Every terminal
//! state is an explicit [`GenerationOutcome`]; nothing escapes as an
//! unclassified panic or ad-hoc error string.

use crate::backend::{ModelRequest, OutputMode};
use crate::error::{OrchestratorError, Result};
use crate::provider::{ProviderRegistry, RegisteredProvider};
use crate::recovery::{self, AttemptState, RecoveryAction};
use crate::fallback;
use crate::schema::{DefaultValidator, SchemaValidator};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A tagged generation result. Every terminal state is explicit; a
/// [`StructuredGenerator`] never raises out of a step.
#[derive(Debug)]
pub enum GenerationOutcome<T> {
    Success(T),
    Failure(OrchestratorError),
}

impl<T> GenerationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            GenerationOutcome::Success(value) => Ok(value),
            GenerationOutcome::Failure(e) => Err(e),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            GenerationOutcome::Success(value) => Some(value),
            GenerationOutcome::Failure(_) => None,
        }
    }
}

/// Options governing one generation attempt chain.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature. Clamped to [0, 1] by the builder; the generator
    /// itself passes it through untouched.
    pub temperature: f64,

    /// Maximum attempts against the originally selected provider.
    pub max_retries: u32,

    /// Whether failed attempts are repaired and retried before fallback.
    pub auto_recovery: bool,

    /// Output-shaping strategy passed through to the backend.
    pub mode: OutputMode,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Name under which the schema is registered for tool-call shaping.
    pub schema_name: Option<String>,

    /// Human-readable description of the expected output.
    pub schema_description: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_retries: 3,
            auto_recovery: true,
            mode: OutputMode::Auto,
            max_tokens: 2048,
            schema_name: None,
            schema_description: None,
        }
    }
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_auto_recovery(mut self, enabled: bool) -> Self {
        self.auto_recovery = enabled;
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self
    }
}

/// One request for schema-conforming output.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub schema: Value,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Named provider; the registry default when `None`.
    pub provider: Option<String>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(
        schema: Value,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            provider: None,
            options: GenerationOptions::default(),
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

/// Generator composing one-shot attempts with the recovery policy and the
/// fallback chain.
pub struct StructuredGenerator {
    registry: Arc<ProviderRegistry>,
    validator: Arc<dyn SchemaValidator>,
}

impl StructuredGenerator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            validator: Arc::new(DefaultValidator),
        }
    }

    /// Swap in a different schema validator.
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// One attempt: invoke the backend once, validate the result.
    pub(crate) async fn attempt_once(
        &self,
        provider: &RegisteredProvider,
        request: &ModelRequest,
    ) -> GenerationOutcome<Value> {
        match provider.backend.invoke(request).await {
            Ok(value) => match self.validator.validate(&request.schema, &value) {
                Ok(()) => GenerationOutcome::Success(value),
                Err(errors) => {
                    GenerationOutcome::Failure(OrchestratorError::SchemaViolation { errors })
                }
            },
            Err(e) => GenerationOutcome::Failure(e),
        }
    }

    /// Generate an untyped value conforming to the request's schema.
    ///
    /// Issues at most `max_retries` attempts against the selected provider,
    /// mutating the prompt or temperature between attempts per the recovery
    /// policy and sleeping the exponential backoff, then hands off to the
    /// fallback chain. Never panics on a step-internal failure; every
    /// terminal state is an explicit outcome.
    pub async fn generate_value(&self, request: &GenerationRequest) -> GenerationOutcome<Value> {
        let provider = match self.registry.resolve(request.provider.as_deref()) {
            Ok(p) => p,
            Err(e) => return GenerationOutcome::Failure(e),
        };

        let opts = &request.options;
        let mut model_request = ModelRequest {
            schema: request.schema.clone(),
            system: request.system_prompt.clone(),
            prompt: request.user_prompt.clone(),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            mode: opts.mode,
            schema_name: opts.schema_name.clone(),
        };

        let mut attempt: u32 = 1;
        loop {
            debug!(
                provider = %provider.name,
                attempt,
                max_retries = opts.max_retries,
                "generation attempt"
            );

            let failure = match self.attempt_once(provider, &model_request).await {
                GenerationOutcome::Success(value) => return GenerationOutcome::Success(value),
                GenerationOutcome::Failure(e) if e.is_fatal() => {
                    return GenerationOutcome::Failure(e)
                }
                GenerationOutcome::Failure(e) => e,
            };

            let state = AttemptState {
                attempt,
                max_retries: opts.max_retries,
                auto_recovery: opts.auto_recovery,
                temperature: model_request.temperature,
            };

            match recovery::next_action(&failure, &state, &request.schema, &model_request.system) {
                RecoveryAction::Retry {
                    system_prompt,
                    temperature,
                    backoff,
                } => {
                    warn!(
                        provider = %provider.name,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %failure,
                        "attempt failed, retrying on same provider"
                    );
                    if let Some(system) = system_prompt {
                        model_request.system = system;
                    }
                    if let Some(t) = temperature {
                        model_request.temperature = t;
                    }
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                RecoveryAction::Fallback => {
                    warn!(
                        provider = %provider.name,
                        attempt,
                        error = %failure,
                        "provider exhausted, entering fallback chain"
                    );
                    return fallback::run_chain(self, &provider.name, request).await;
                }
            }
        }
    }

    /// Generate a typed value conforming to the request's schema.
    pub async fn generate<T: DeserializeOwned>(
        &self,
        request: &GenerationRequest,
    ) -> GenerationOutcome<T> {
        match self.generate_value(request).await {
            GenerationOutcome::Success(value) => match serde_json::from_value(value) {
                Ok(typed) => GenerationOutcome::Success(typed),
                Err(e) => GenerationOutcome::Failure(OrchestratorError::Json(e)),
            },
            GenerationOutcome::Failure(e) => GenerationOutcome::Failure(e),
        }
    }

    /// Convenience surface that errors on terminal failure.
    pub async fn generate_structured_output<T: DeserializeOwned>(
        &self,
        schema: Value,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        provider: Option<&str>,
        options: Option<GenerationOptions>,
    ) -> Result<T> {
        let mut request = GenerationRequest::new(schema, system_prompt, user_prompt);
        if let Some(name) = provider {
            request = request.with_provider(name);
        }
        if let Some(opts) = options {
            request = request.with_options(opts);
        }
        self.generate(&request).await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::provider::ProviderRegistry;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "conclusion": {"type": "string"},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
            },
            "required": ["conclusion", "confidence"]
        })
    }

    fn generator_with(mock: MockBackend) -> StructuredGenerator {
        let mut registry = ProviderRegistry::new();
        registry.register_mock("primary", mock).unwrap();
        StructuredGenerator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mock = MockBackend::new("primary")
            .with_response(json!({"conclusion": "ok", "confidence": 0.9}));
        let generator = generator_with(mock);

        let request = GenerationRequest::new(schema(), "sys", "user");
        let outcome = generator.generate_value(&request).await;
        let value = outcome.into_result().unwrap();
        assert_eq!(value["conclusion"], "ok");
    }

    #[tokio::test]
    async fn test_typed_generation() {
        #[derive(Debug, serde::Deserialize)]
        struct Out {
            conclusion: String,
            confidence: f64,
        }

        let mock = MockBackend::new("primary")
            .with_response(json!({"conclusion": "typed", "confidence": 0.5}));
        let generator = generator_with(mock);

        let out: Out = generator
            .generate(&GenerationRequest::new(schema(), "sys", "user"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.conclusion, "typed");
        assert!((out.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_violation_recovers_on_retry() {
        let mock = MockBackend::new("primary")
            .with_response(json!({"confidence": 0.9}))
            .with_response(json!({"conclusion": "fixed", "confidence": 0.9}));
        let generator = generator_with(mock);

        let request = GenerationRequest::new(schema(), "sys", "user");
        let value = generator
            .generate_value(&request)
            .await
            .into_result()
            .unwrap();
        assert_eq!(value["conclusion"], "fixed");
    }

    #[tokio::test]
    async fn test_unknown_provider_is_fatal() {
        let generator = generator_with(MockBackend::new("primary"));
        let request = GenerationRequest::new(schema(), "sys", "user").with_provider("missing");
        let err = generator
            .generate_value(&request)
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ProviderNotFound(_)));
    }

    #[test]
    fn test_option_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.temperature, 0.3);
        assert_eq!(opts.max_retries, 3);
        assert!(opts.auto_recovery);
        assert_eq!(opts.mode, OutputMode::Auto);
    }

    #[test]
    fn test_temperature_clamped_by_builder() {
        assert_eq!(GenerationOptions::default().with_temperature(1.7).temperature, 1.0);
        assert_eq!(GenerationOptions::default().with_temperature(-0.2).temperature, 0.0);
    }
}
