//! Structural summaries for oversized JSON output.
//!
//! When a command prints more JSON than its budget allows, a prefix of the
//! raw document is rarely useful. The manager instead hands the text to a
//! [`JsonAnalyzer`] and shows the model a listing of jq paths with their
//! value types, which it can use to query the cached document precisely.

use serde_json::Value;

/// Produces a model-facing structural description of a JSON document.
///
/// Returning `Err` makes the pipeline fall back to ordinary text truncation.
pub trait JsonAnalyzer: Send + Sync {
    fn analyze(&self, json: &str) -> Result<String, String>;
}

/// Lists every jq path of a document with its value type:
///
/// ```text
/// jq path | data type
/// ==================================================
/// .Buckets[] | array[3]
/// .Buckets[].Name | string
/// .Owner.ID | string
/// ```
///
/// Arrays are described by their length and their first element.
#[derive(Debug, Clone, Copy, Default)]
pub struct JqPathAnalyzer;

impl JsonAnalyzer for JqPathAnalyzer {
    fn analyze(&self, json: &str) -> Result<String, String> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| format!("Invalid JSON format: {e}"))?;
        let mut paths = Vec::new();
        match &value {
            Value::Object(_) => collect_paths(&value, "", &mut paths),
            Value::Array(items) => describe_array(".", items, &mut paths),
            scalar => paths.push(format!(". | {}", type_name(scalar))),
        }
        paths.sort();
        paths.dedup();

        let mut out = vec!["jq path | data type".to_string(), "=".repeat(50)];
        out.extend(paths);
        Ok(out.join("\n"))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn item_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "array_item_null",
        Value::Bool(_) => "array_item_bool",
        Value::Number(n) if n.is_f64() => "array_item_float",
        Value::Number(_) => "array_item_int",
        Value::String(_) => "array_item_str",
        Value::Array(_) => "array_item_array",
        Value::Object(_) => "array_item_object",
    }
}

fn collect_paths(value: &Value, prefix: &str, paths: &mut Vec<String>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, child) in map {
        let path = format!("{prefix}.{}", jq_key(key));
        match child {
            Value::Object(inner) if !inner.is_empty() => collect_paths(child, &path, paths),
            Value::Array(items) => describe_array(&path, items, paths),
            leaf => paths.push(format!("{path} | {}", type_name(leaf))),
        }
    }
}

/// `path` is the array's own path; `"."` for a root array.
fn describe_array(path: &str, items: &[Value], paths: &mut Vec<String>) {
    let item_path = if path == "." {
        ".[]".to_string()
    } else {
        format!("{path}[]")
    };
    paths.push(format!("{item_path} | array[{}]", items.len()));
    let Some(first) = items.first() else {
        return;
    };
    match first {
        Value::Object(_) => collect_paths(first, &item_path, paths),
        Value::Array(inner) => describe_array(&item_path, inner, paths),
        scalar => paths.push(format!("{item_path} | {}", item_type_name(scalar))),
    }
}

/// Quote keys that are not plain identifiers.
fn jq_key(key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        key.to_string()
    } else {
        format!("{key:?}")
    }
}
