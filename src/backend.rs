//! LLM backend abstraction and implementations.
//!
//! [`LlmBackend`] is the single network-facing seam: any backend implementing
//! it is pluggable. Ships with an Ollama backend, an OpenAI-compatible
//! backend, and a scripted [`MockBackend`] for tests.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Output-shaping strategy requested from a backend.
///
/// Opaque to the generator; each backend maps it to whatever its provider
/// supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    Auto,
    Json,
    ToolCall,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Auto => "auto",
            OutputMode::Json => "json",
            OutputMode::ToolCall => "tool-call",
        }
    }
}

/// One fully-resolved model invocation.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// JSON schema the response must conform to (also sent to backends that
    /// support schema-constrained output).
    pub schema: Value,
    pub system: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub mode: OutputMode,
    /// Name used when registering the schema as a tool/function.
    pub schema_name: Option<String>,
}

/// The only network-facing call in the system.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Invoke the model once and return the raw structured value.
    ///
    /// Implementations perform defensive extraction (fenced blocks, think
    /// tags) but never schema validation; that belongs to the generator.
    async fn invoke(&self, request: &ModelRequest) -> Result<Value>;
}

/// Ollama backend using `/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<Value> {
        let mut messages = vec![];
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        // Ollama has no tool-call shaping; every mode maps to JSON format.
        body["format"] = json!("json");

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        debug!(url = %url, model = %self.model, "invoking ollama backend");

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| {
            OrchestratorError::Transport {
                message: format!("failed to connect to LLM at {}: {}", url, e),
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OrchestratorError::Transport {
                message: format!("LLM returned error {}: {}", status, text),
            });
        }

        let json_response: Value = resp.json().await?;
        let raw = json_response
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let (_thinking, cleaned) = extract_thinking(&raw);
        parse_value(&cleaned)
    }
}

/// OpenAI-compatible backend using `/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<Value> {
        let mut messages = vec![];
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        match request.mode {
            OutputMode::ToolCall => {
                let name = request
                    .schema_name
                    .clone()
                    .unwrap_or_else(|| "structured_output".to_string());
                body["tools"] = json!([{
                    "type": "function",
                    "function": {
                        "name": name,
                        "parameters": request.schema,
                    }
                }]);
                body["tool_choice"] = json!("required");
            }
            OutputMode::Json | OutputMode::Auto => {
                body["response_format"] = json!({"type": "json_object"});
            }
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(url = %url, model = %self.model, "invoking openai backend");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Transport {
                message: format!("failed to connect to LLM at {}: {}", url, e),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OrchestratorError::Transport {
                message: format!("LLM returned error {}: {}", status, text),
            });
        }

        let json_response: Value = resp.json().await?;
        let message = json_response
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| OrchestratorError::Transport {
                message: "no choices in provider response".to_string(),
            })?;

        // Tool-call responses carry the structured payload in the arguments.
        let raw = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .and_then(|arr| arr.first())
            .and_then(|call| call.get("function"))
            .and_then(|f| f.get("arguments"))
            .and_then(|a| a.as_str())
            .or_else(|| message.get("content").and_then(|v| v.as_str()))
            .unwrap_or("")
            .to_string();

        let (_thinking, cleaned) = extract_thinking(&raw);
        parse_value(&cleaned)
    }
}

/// Scripted backend for tests: pops one scripted response per call and
/// records every request it receives.
#[derive(Debug, Default)]
pub struct MockBackend {
    name: String,
    script: Mutex<VecDeque<std::result::Result<Value, String>>>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful structured response.
    pub fn with_response(self, value: Value) -> Self {
        self.script.lock().unwrap().push_back(Ok(value));
        self
    }

    /// Queue a transport failure with the given message.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Every request received so far, in call order.
    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<Value> {
        self.calls.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(OrchestratorError::Transport { message }),
            None => Err(OrchestratorError::Transport {
                message: format!("mock backend '{}' has no scripted response", self.name),
            }),
        }
    }
}

/// Extract `<think>...</think>` blocks from a response.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    let think_start = "<think>";
    let think_end = "</think>";

    if let Some(start_idx) = text.find(think_start) {
        let content_start = start_idx + think_start.len();
        // Only a close tag after the open tag counts; a stray one earlier in
        // truncated output must not produce a reversed slice.
        if let Some(rel_end) = text[content_start..].find(think_end) {
            let end_idx = content_start + rel_end;
            let thinking = text[content_start..end_idx].trim().to_string();
            let mut cleaned = String::new();
            cleaned.push_str(&text[..start_idx]);
            cleaned.push_str(&text[end_idx + think_end.len()..]);
            let cleaned = cleaned.trim().to_string();
            let thinking = if thinking.is_empty() {
                None
            } else {
                Some(thinking)
            };
            return (thinking, cleaned);
        }
    }

    (None, text.to_string())
}

/// Parse LLM output text as JSON, with defensive extraction.
///
/// Tries a direct parse, then ```json fenced blocks, then slicing from the
/// first `{` or `[`.
pub fn parse_value(text: &str) -> Result<Value> {
    let trimmed = text.trim();

    if let Ok(val) = serde_json::from_str::<Value>(trimmed) {
        if val.is_object() || val.is_array() {
            return Ok(val);
        }
    }

    if let Some(json_str) = extract_json_block(trimmed) {
        if let Ok(val) = serde_json::from_str::<Value>(&json_str) {
            return Ok(val);
        }
    }

    if let Some(idx) = trimmed.find('{').or_else(|| trimmed.find('[')) {
        let candidate = &trimmed[idx..];
        if let Ok(val) = serde_json::from_str::<Value>(candidate) {
            return Ok(val);
        }
        let open = candidate.as_bytes()[0];
        let close = if open == b'{' { b'}' } else { b']' };
        if let Some(end) = candidate.rfind(close as char) {
            let substr = &candidate[..=end];
            if let Ok(val) = serde_json::from_str::<Value>(substr) {
                return Ok(val);
            }
        }
    }

    // Truncate on a char boundary; raw LLM output is often multibyte.
    let mut cut = trimmed.len().min(200);
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    Err(OrchestratorError::Transport {
        message: format!(
            "failed to parse LLM output as JSON. Raw text: {}",
            &trimmed[..cut]
        ),
    })
}

/// Extract JSON from ```json ... ``` code blocks.
fn extract_json_block(text: &str) -> Option<String> {
    let markers = ["```json", "```JSON", "```"];
    for marker in markers {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_thinking_present() {
        let text = "Before <think>my reasoning here</think> after";
        let (thinking, cleaned) = extract_thinking(text);
        assert_eq!(thinking, Some("my reasoning here".to_string()));
        assert_eq!(cleaned, "Before  after");
    }

    #[test]
    fn test_extract_thinking_absent() {
        let text = "no thinking tags here";
        let (thinking, cleaned) = extract_thinking(text);
        assert!(thinking.is_none());
        assert_eq!(cleaned, "no thinking tags here");
    }

    #[test]
    fn test_parse_value_direct() {
        let val = parse_value(r#"{"x": 1}"#).unwrap();
        assert_eq!(val["x"], 1);
    }

    #[test]
    fn test_parse_value_fenced() {
        let text = "Here is the result:\n```json\n{\"x\": 42}\n```\nDone.";
        let val = parse_value(text).unwrap();
        assert_eq!(val["x"], 42);
    }

    #[test]
    fn test_parse_value_embedded() {
        let text = "Sure! Here is the output: {\"name\": \"test\"} hope that helps.";
        let val = parse_value(text).unwrap();
        assert_eq!(val["name"], "test");
    }

    #[test]
    fn test_parse_value_failure() {
        let result = parse_value("not json at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_value_failure_truncates_on_char_boundary() {
        // A multibyte char straddling the 200-byte mark must not panic.
        let text = format!("{}日本語の応答テキスト", "a".repeat(199));
        let err = parse_value(&text).unwrap_err();
        assert!(matches!(err, OrchestratorError::Transport { .. }));
        assert!(err.to_string().contains("failed to parse LLM output"));
    }

    #[test]
    fn test_extract_thinking_stray_close_tag() {
        let text = "</think>stray <think>late";
        let (thinking, cleaned) = extract_thinking(text);
        assert!(thinking.is_none());
        assert_eq!(cleaned, text);
    }

    #[test]
    fn test_extract_json_block_none() {
        assert_eq!(extract_json_block("no code block"), None);
    }

    #[test]
    fn test_output_mode_strings() {
        assert_eq!(OutputMode::Auto.as_str(), "auto");
        assert_eq!(OutputMode::Json.as_str(), "json");
        assert_eq!(OutputMode::ToolCall.as_str(), "tool-call");
    }

    #[tokio::test]
    async fn test_mock_backend_scripting() {
        let mock = MockBackend::new("mock")
            .with_response(serde_json::json!({"ok": true}))
            .with_failure("rate limit exceeded");

        let req = ModelRequest {
            schema: serde_json::json!({}),
            system: "sys".into(),
            prompt: "user".into(),
            temperature: 0.3,
            max_tokens: 2048,
            mode: OutputMode::Json,
            schema_name: None,
        };

        let first = mock.invoke(&req).await.unwrap();
        assert_eq!(first["ok"], true);

        let second = mock.invoke(&req).await.unwrap_err();
        assert!(second.is_rate_limit_or_timeout());

        // Script exhausted
        assert!(mock.invoke(&req).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.calls()[0].system, "sys");
    }
}
