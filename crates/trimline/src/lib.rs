//! Output management for shell commands run on behalf of a language model.
//!
//! Shell commands can print far more than a model's context window should
//! hold. `trimline` sits between the command executor and the conversation
//! loop: every command's output goes through a pipeline that bounds what
//! the model sees, caches the full text under a short id, and tells the
//! model how to get the rest back.
//!
//! ```ignore
//! use trimline::prelude::*;
//!
//! let manager = OutputManager::new(OutputConfig::default());
//! let raw = RawOutput::new("npm install", install_log, 0);
//! let processed = manager.process(&raw);
//!
//! // The terminal shows everything; the model gets the bounded view.
//! print!("{}", processed.terminal_text);
//! send_to_model(&processed.model_text);
//!
//! // Later, the model asks for the tail.
//! let tool = GetCachedOutput::new(manager.cache().clone());
//! let tail = tool.lookup("cmd_001", Some("-50"))?;
//! ```
//!
//! # Pipeline
//!
//! raw text → [`normalize`](output::normalize) → progress
//! [`compressor`](output::compressor) → type [`detector`](output::detector)
//! → [`semantic`](output::semantic) tiers → [`cache`](output::cache) put →
//! [`truncator`](output::truncator) → summary.
//!
//! The [`OutputManager`](output::OutputManager) sequences the stages; every
//! decision lives in the stage modules.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`output`] | pipeline stages, [`OutputManager`](output::OutputManager), cache |
//! | [`config`] | [`OutputConfig`](config::OutputConfig): budgets, strategies, toggles |
//! | [`exec`] | run a command with live streaming to a terminal sink |
//! | [`tools`] | `shell` and `get_cached_output` function-calling tools |

pub mod config;
pub mod exec;
pub mod output;
pub mod prelude;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Re-export schemars so downstream crates can derive JsonSchema for tool args.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`, for use as tool parameters.
///
/// ```
/// use trimline::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct LookupArgs {
///     cache_id: String,
///     #[serde(default)]
///     lines: Option<String>,
/// }
///
/// let schema = json_schema_for::<LookupArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"cache_id".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition in the OpenAI function-calling format.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_def_serializes_in_function_format() {
        let def = ToolDef::new(
            "get_cached_output",
            "Retrieve cached output",
            serde_json::json!({"type": "object"}),
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "get_cached_output");
        assert_eq!(json["function"]["parameters"]["type"], "object");
    }
}
