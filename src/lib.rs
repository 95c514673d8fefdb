//! # Thinking Orchestrator
//!
//! Multi-provider LLM orchestrator for schema-validated structured output,
//! with auto-recovery, fallback chains, and multi-step reasoning sequences.
//!
//! A generation call either returns data conforming to the caller's schema or
//! fails with a classified error after a bounded number of attempts across
//! the registered providers. Orchestration chains such calls into sequential
//! or parallel "thinking" runs whose partial failures are captured per step
//! and synthesized into one integrated result.
//!
//! ## Features
//!
//! - **Structured output** — every response is validated against a JSON
//!   schema before it reaches the caller
//! - **Auto-recovery** — schema violations retry with a corrective prompt;
//!   rate-limits and timeouts retry cooler, with exponential backoff
//! - **Fallback chains** — exhausted providers hand off to the remaining
//!   registered providers, one conservative attempt each
//! - **Nine thinking methods** — first principles, systems thinking,
//!   root cause, abductive, lateral, socratic, devil's advocate, SWOT,
//!   second order
//! - **Sequential & parallel runs** — outputs thread into later inputs, or
//!   independent steps fan out concurrently
//! - **Schema guidance** — an aborted sequence tells the caller exactly
//!   which step to fix and what its input should look like
//! - **Pluggable seams** — swap the backend transport or the schema
//!   validator without touching the core
//!
//! ## Quick Start
//!
//! ```no_run
//! use thinking_orchestrator::{
//!     Orchestrator, OrchestrationStrategy, ProviderConfig, ProviderKind,
//!     ProviderRegistry, RunContext, ThinkingMethod,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ProviderRegistry::new();
//!     registry.register(
//!         "local",
//!         ProviderConfig::new(ProviderKind::Ollama).with_model("llama3.1"),
//!     )?;
//!
//!     let orchestrator = Orchestrator::new(Arc::new(registry));
//!     let strategy = OrchestrationStrategy::new(ThinkingMethod::FirstPrinciples)
//!         .with_secondary([ThinkingMethod::DevilsAdvocate]);
//!
//!     let result = orchestrator
//!         .run_sequence(
//!             &strategy,
//!             &json!({"problem": "Our deploy pipeline takes 45 minutes"}),
//!             &RunContext::new("analysis"),
//!         )
//!         .await;
//!
//!     println!("{}", result.synthesis);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
mod fallback;
pub mod generate;
pub mod method;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod recovery;
pub mod schema;
pub mod synthesis;

pub use backend::{LlmBackend, MockBackend, ModelRequest, OllamaBackend, OpenAiBackend, OutputMode};
pub use error::{OrchestratorError, Result};
pub use generate::{
    GenerationOptions, GenerationOutcome, GenerationRequest, StructuredGenerator,
};
pub use method::{ThinkingMethod, ALL_METHODS};
pub use orchestrator::{
    OrchestrationStrategy, Orchestrator, RunContext, RunState, StepResult, StepStatus,
};
pub use provider::{ProviderConfig, ProviderKind, ProviderRegistry, RegisteredProvider};
pub use recovery::{AttemptState, RecoveryAction};
pub use schema::{DefaultValidator, SchemaValidator, ValidationError};
pub use synthesis::{IntegratedResult, FAILED_STEP_PENALTY, MAX_NEXT_STEPS};
