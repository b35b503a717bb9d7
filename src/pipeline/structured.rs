//! Structured output extraction and validation
//!
//! Models wrap JSON in code fences, prefix it with prose, or append it to a
//! transcript. Extraction tries the shapes in order of strictness, then the
//! candidate is validated against the task's JSON Schema.

use crate::task::{OutputSchema, SchemaMode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Why a stage's output could not be read as its schema. Logged, never escalated.
#[derive(Debug, Error)]
pub enum SchemaParseError {
    #[error("no JSON object found in response")]
    NotFound,
    #[error("schema '{name}' failed to compile: {message}")]
    Schema { name: String, message: String },
    #[error("response does not match schema '{name}': {message}")]
    Invalid { name: String, message: String },
}

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```").expect("static regex")
});

/// Find the JSON object a response carries for the given mode
pub fn extract_json(text: &str, mode: SchemaMode) -> Option<Value> {
    let trimmed = text.trim();

    if mode == SchemaMode::WholeResponse {
        if let Some(value) = parse_object(trimmed) {
            return Some(value);
        }
    }

    // Last fenced block wins: a trailing block follows the transcript.
    let fenced = FENCED_BLOCK
        .captures_iter(trimmed)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_object(m.as_str().trim()))
        .last();
    if fenced.is_some() {
        return fenced;
    }

    match mode {
        SchemaMode::WholeResponse => outermost_object(trimmed),
        SchemaMode::TrailingBlock => trailing_object(trimmed),
    }
}

/// Extract and validate in one step
pub fn parse_structured(text: &str, schema: &OutputSchema) -> Result<Value, SchemaParseError> {
    let value = extract_json(text, schema.mode).ok_or(SchemaParseError::NotFound)?;
    validate(&value, schema)?;
    Ok(value)
}

pub fn validate(value: &Value, schema: &OutputSchema) -> Result<(), SchemaParseError> {
    let validator =
        jsonschema::validator_for(&schema.schema).map_err(|e| SchemaParseError::Schema {
            name: schema.name.to_string(),
            message: e.to_string(),
        })?;

    validator.validate(value).map_err(|errors| {
        let error_messages: Vec<String> = errors
            .map(|e| format!("At '{}': {}", e.instance_path, e))
            .collect();
        SchemaParseError::Invalid {
            name: schema.name.to_string(),
            message: error_messages.join("; "),
        }
    })
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate)
        .ok()
        .filter(Value::is_object)
}

fn outermost_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end)
        .then(|| parse_object(&text[start..=end]))
        .flatten()
}

/// The last `{...}` that closes at the end of the text
fn trailing_object(text: &str) -> Option<Value> {
    let end = text.rfind('}')?;
    text[..end]
        .match_indices('{')
        .map(|(start, _)| start)
        .find_map(|start| parse_object(&text[start..=end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_whole_response_plain() {
        let value = extract_json(r#"{"decision": "PASS", "reason": "ok"}"#, SchemaMode::WholeResponse);
        assert_eq!(value.unwrap()["decision"], "PASS");
    }

    #[test]
    fn test_whole_response_fenced() {
        let text = "```json\n{\"decision\": \"KILL\", \"reason\": \"exact match\"}\n```";
        let value = extract_json(text, SchemaMode::WholeResponse).unwrap();
        assert_eq!(value["decision"], "KILL");
    }

    #[test]
    fn test_whole_response_with_prose() {
        let text = "Here is my verdict: {\"decision\": \"PASS\", \"reason\": \"clear\"} Thanks.";
        let value = extract_json(text, SchemaMode::WholeResponse).unwrap();
        assert_eq!(value["reason"], "clear");
    }

    #[test]
    fn test_trailing_block_takes_last_fence() {
        let text = "Transcript...\n```json\n{\"example\": true}\n```\nMore debate.\n\
                    ```json\n{\"decision\": \"CONDITIONAL\"}\n```";
        let value = extract_json(text, SchemaMode::TrailingBlock).unwrap();
        assert_eq!(value, json!({"decision": "CONDITIONAL"}));
    }

    #[test]
    fn test_trailing_block_without_fence() {
        let text = "CEO: we debated {briefly}.\nFinal: {\"decision\": \"APPROVED\"}";
        let value = extract_json(text, SchemaMode::TrailingBlock).unwrap();
        assert_eq!(value["decision"], "APPROVED");
    }

    #[test]
    fn test_no_json() {
        assert!(extract_json("KILL SWITCH: PASS", SchemaMode::WholeResponse).is_none());
        assert!(extract_json("", SchemaMode::TrailingBlock).is_none());
    }

    #[test]
    fn test_arrays_are_not_objects() {
        assert!(extract_json("[1, 2, 3]", SchemaMode::WholeResponse).is_none());
    }

    #[test]
    fn test_parse_structured_validates() {
        let schema = OutputSchema::kill_switch();
        let ok = parse_structured(r#"{"decision": "PASS", "reason": "clear"}"#, &schema);
        assert!(ok.is_ok());

        let missing_reason = parse_structured(r#"{"decision": "PASS"}"#, &schema);
        assert!(matches!(missing_reason, Err(SchemaParseError::Invalid { .. })));

        let nothing = parse_structured("no json here", &schema);
        assert!(matches!(nothing, Err(SchemaParseError::NotFound)));
    }
}
