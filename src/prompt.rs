//! Prompt template helpers.

use serde_json::{Map, Value};

/// Render a template, replacing `{key}` placeholders with values from the
/// input object. String values substitute bare; everything else substitutes
/// as compact JSON. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &Map<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_render_strings_bare() {
        let v = vars(json!({"problem": "slow builds", "depth": 3}));
        let result = render("Analyze {problem} at depth {depth}", &v);
        assert_eq!(result, "Analyze slow builds at depth 3");
    }

    #[test]
    fn test_render_unknown_placeholder_kept() {
        let v = vars(json!({"a": "x"}));
        assert_eq!(render("{a} and {missing}", &v), "x and {missing}");
    }

    #[test]
    fn test_render_object_value_as_json() {
        let v = vars(json!({"context": {"k": 1}}));
        assert_eq!(render("ctx: {context}", &v), "ctx: {\"k\":1}");
    }

    #[test]
    fn test_numbered_list() {
        let items = vec!["First".to_string(), "Second".to_string()];
        assert_eq!(numbered_list(&items), "1. First\n2. Second");
    }

    #[test]
    fn test_numbered_list_empty() {
        assert_eq!(numbered_list(&[]), "");
    }

    #[test]
    fn test_section() {
        assert_eq!(section("Context", "info"), "## Context\ninfo");
    }
}
