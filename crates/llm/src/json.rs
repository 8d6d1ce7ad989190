use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::errors::LlmError;
use crate::types::ObjectSchema;

/// Pulls the first JSON object out of a model reply: bare, fenced, or inline.
pub fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_symmetric(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    raw.split('{').nth(1).and_then(|rest| {
        let mut depth = 1i32;
        for (idx, ch) in rest.char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let mut candidate = String::from("{");
                        candidate.push_str(&rest[..=idx]);
                        return Some(trim_symmetric(&candidate));
                    }
                }
                _ => {}
            }
        }
        None
    })
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

/// Parses a reply and validates it against `schema` (draft 7).
pub fn parse_structured(raw: Option<&str>, schema: &ObjectSchema) -> Result<Value, LlmError> {
    let raw = raw.ok_or_else(|| LlmError::malformed("model returned no text"))?;
    let json = extract_json_object(raw)
        .ok_or_else(|| LlmError::malformed(format!("no JSON object for '{}'", schema.name)))?;
    let value: Value = serde_json::from_str(&json)
        .map_err(|err| LlmError::malformed(format!("invalid JSON for '{}': {err}", schema.name)))?;
    if !value.is_object() {
        return Err(LlmError::malformed(format!(
            "'{}' must be a JSON object",
            schema.name
        )));
    }
    validate_schema(schema, &value)?;
    Ok(value)
}

fn validate_schema(schema: &ObjectSchema, value: &Value) -> Result<(), LlmError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema.schema)
        .map_err(|err| LlmError::configuration(format!("schema '{}' does not compile: {err}", schema.name)))?;
    if let Err(errors) = compiled.validate(value) {
        let details: Vec<String> = errors
            .take(3)
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path}: {err}")
                }
            })
            .collect();
        return Err(LlmError::malformed(format!(
            "'{}' does not match its schema: {}",
            schema.name,
            details.join("; ")
        )));
    }
    Ok(())
}
