//! Named provider configurations and the registry that resolves them.
//!
//! The registry is an explicitly-constructed value injected at startup, never
//! ambient global state: tests build their own instance. Registration happens
//! during initialization; afterwards the registry is shared read-only behind
//! an `Arc` by the generator and the fallback chain.

use crate::backend::{LlmBackend, MockBackend, OllamaBackend, OpenAiBackend};
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Supported backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(OrchestratorError::Configuration(format!(
                "unsupported provider type '{}'",
                other
            ))),
        }
    }
}

/// Configuration for one named backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_params: Option<Value>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
            model: None,
            default_params: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A registered provider: its configuration plus the backend built for it.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub name: String,
    pub config: ProviderConfig,
    pub backend: Arc<dyn LlmBackend>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("name", &self.name)
            .field("kind", &self.config.kind)
            .field("model", &self.config.model)
            .finish()
    }
}

/// Insertion-ordered registry of named providers with a default pointer.
///
/// The first successful registration becomes the default unless a default
/// was already set explicitly.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    default: Option<String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .field("default", &self.default)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named provider, building the backend that matches its kind.
    ///
    /// Fails with a configuration error on duplicate names or missing
    /// credentials for the kind.
    pub fn register(&mut self, name: impl Into<String>, config: ProviderConfig) -> Result<()> {
        let backend = build_backend(&config)?;
        self.register_backend(name, config, backend)
    }

    /// Register a provider with a caller-supplied backend.
    ///
    /// This is the injection seam for custom transports and for
    /// [`MockBackend`] in tests.
    pub fn register_backend(
        &mut self,
        name: impl Into<String>,
        config: ProviderConfig,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<()> {
        let name = name.into();
        if self.providers.iter().any(|p| p.name == name) {
            return Err(OrchestratorError::Configuration(format!(
                "provider '{}' is already registered",
                name
            )));
        }
        debug!(provider = %name, kind = config.kind.as_str(), "registered provider");
        self.providers.push(RegisteredProvider {
            name: name.clone(),
            config,
            backend,
        });
        if self.default.is_none() {
            self.default = Some(name);
        }
        Ok(())
    }

    /// Register a mock provider with the given name. Test convenience.
    pub fn register_mock(&mut self, name: impl Into<String>, mock: MockBackend) -> Result<()> {
        self.register_backend(
            name,
            ProviderConfig::new(ProviderKind::Ollama),
            Arc::new(mock),
        )
    }

    /// Resolve a named provider, or the default when no name is given.
    pub fn resolve(&self, name: Option<&str>) -> Result<&RegisteredProvider> {
        let target = match name {
            Some(n) => n,
            None => self
                .default
                .as_deref()
                .ok_or_else(|| OrchestratorError::ProviderNotFound("<default>".to_string()))?,
        };
        self.providers
            .iter()
            .find(|p| p.name == target)
            .ok_or_else(|| OrchestratorError::ProviderNotFound(target.to_string()))
    }

    /// All registered names, insertion order preserved.
    pub fn list(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn set_default(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.providers.iter().any(|p| p.name == name) {
            return Err(OrchestratorError::ProviderNotFound(name));
        }
        self.default = Some(name);
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build a registry from process environment variables, read once at
    /// startup: `OPENAI_API_KEY`/`OPENAI_MODEL`,
    /// `ANTHROPIC_API_KEY`/`ANTHROPIC_MODEL`,
    /// `OLLAMA_BASE_URL`/`OLLAMA_MODEL`, and `DEFAULT_PROVIDER`.
    pub fn from_env() -> Result<Self> {
        let mut registry = Self::new();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let model =
                std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            registry.register(
                "openai",
                ProviderConfig::new(ProviderKind::OpenAi)
                    .with_api_key(key)
                    .with_model(model),
            )?;
        }

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            let model = std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
            registry.register(
                "anthropic",
                ProviderConfig::new(ProviderKind::Anthropic)
                    .with_api_key(key)
                    .with_model(model),
            )?;
        }

        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".to_string());
            registry.register(
                "ollama",
                ProviderConfig::new(ProviderKind::Ollama)
                    .with_base_url(url)
                    .with_model(model),
            )?;
        }

        if let Ok(name) = std::env::var("DEFAULT_PROVIDER") {
            registry.set_default(name)?;
        }

        Ok(registry)
    }
}

fn build_backend(config: &ProviderConfig) -> Result<Arc<dyn LlmBackend>> {
    match config.kind {
        ProviderKind::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            let model = config.model.clone().unwrap_or_else(|| "llama3.1".to_string());
            Ok(Arc::new(OllamaBackend::new(base_url, model)))
        }
        ProviderKind::OpenAi => {
            let key = config.api_key.clone().ok_or_else(|| {
                OrchestratorError::Configuration("openai provider requires an API key".to_string())
            })?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            let mut backend = OpenAiBackend::new(key, model);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url.clone());
            }
            Ok(Arc::new(backend))
        }
        // Anthropic exposes an OpenAI-compatible surface; reuse that backend
        // against its compatibility endpoint.
        ProviderKind::Anthropic => {
            let key = config.api_key.clone().ok_or_else(|| {
                OrchestratorError::Configuration(
                    "anthropic provider requires an API key".to_string(),
                )
            })?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string());
            let base = config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string());
            Ok(Arc::new(OpenAiBackend::new(key, model).with_base_url(base)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_becomes_default() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("local", ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        registry
            .register(
                "cloud",
                ProviderConfig::new(ProviderKind::OpenAi).with_api_key("sk-test"),
            )
            .unwrap();

        assert_eq!(registry.default_name(), Some("local"));
        assert_eq!(registry.resolve(None).unwrap().name, "local");
        assert_eq!(registry.resolve(Some("cloud")).unwrap().name, "cloud");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("local", ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        let err = registry
            .register("local", ProviderConfig::new(ProviderKind::Ollama))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut registry = ProviderRegistry::new();
        let err = registry
            .register("cloud", ProviderConfig::new(ProviderKind::OpenAi))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.resolve(None).unwrap_err(),
            OrchestratorError::ProviderNotFound(_)
        ));
        assert!(matches!(
            registry.resolve(Some("nope")).unwrap_err(),
            OrchestratorError::ProviderNotFound(_)
        ));
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let mut registry = ProviderRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .register(name, ProviderConfig::new(ProviderKind::Ollama))
                .unwrap();
        }
        assert_eq!(registry.list(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_set_default_override() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("a", ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        registry
            .register("b", ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        registry.set_default("b").unwrap();
        assert_eq!(registry.resolve(None).unwrap().name, "b");
        assert!(registry.set_default("missing").is_err());
    }

    #[test]
    fn test_unsupported_kind_string() {
        let err = "cohere".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
    }
}
