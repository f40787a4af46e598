//! `get_cached_output`: pull full or partial command output back out of the
//! conversation cache.

use crate::ToolDef;
use crate::output::SharedOutputCache;
use crate::output::cache::CachedOutput;
use crate::output::range::{RangeSpec, RangeSpecError};
use crate::tools::core::{Tool, ToolFuture, parse_tool_args};
use crate::tools::spec::ToolSpec;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::trace;

/// Typed arguments for `get_cached_output`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCachedOutputArgs {
    /// Cache id from an output summary (e.g. 'cmd_001').
    pub cache_id: String,
    /// Optional line range: '+N' first N lines, '-N' last N lines,
    /// '+N,-M' first N and last M lines, 'N-M' lines N through M (1-indexed).
    #[serde(default)]
    pub lines: Option<String>,
}

/// Retrieves cached command output by id, optionally narrowed to a range.
#[derive(Debug, Clone)]
pub struct GetCachedOutput {
    cache: SharedOutputCache,
}

impl GetCachedOutput {
    pub fn new(cache: SharedOutputCache) -> Self {
        Self { cache }
    }

    /// Look up `cache_id`. A malformed range is an error; an unknown or
    /// evicted id is `found = false`.
    pub fn lookup(
        &self,
        cache_id: &str,
        lines: Option<&str>,
    ) -> Result<CachedOutput, RangeSpecError> {
        let range = lines
            .filter(|l| !l.trim().is_empty())
            .map(str::parse::<RangeSpec>)
            .transpose()?;
        let result = self.cache.get_range(cache_id.trim(), range.as_ref());
        trace!(cache_id, found = result.found, "Cached output lookup");
        Ok(result)
    }

    fn not_found_message(&self, cache_id: &str) -> String {
        let resident: Vec<String> = self
            .cache
            .entries()
            .iter()
            .map(|e| e.id.to_string())
            .collect();
        let available = if resident.is_empty() {
            "none".to_string()
        } else {
            resident.join(", ")
        };
        format!(
            "Cache ID '{cache_id}' was not found. It may have been evicted or never \
             existed. Available cache IDs: {available}. Re-run the command if you \
             need its output again."
        )
    }
}

impl Tool for GetCachedOutput {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("get_cached_output")
            .purpose("Retrieve the full or partial output of an earlier command from the output cache")
            .when_to_use(
                "When a command summary says output was truncated and you need lines \
                 that were not shown. Use the cache ID from the summary.",
            )
            .when_not_to_use(
                "When the output was shown in full, or to re-run a command. Prefer a \
                 narrow line range over the whole output.",
            )
            .parameters_for::<GetCachedOutputArgs>()
            .example(
                r#"get_cached_output(cache_id="cmd_001", lines="-50")"#,
                "Last 50 lines of the first command's output",
            )
            .example(
                r#"get_cached_output(cache_id="cmd_002", lines="120-180")"#,
                "Lines 120 through 180",
            )
            .output_format("The requested lines, verbatim")
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: GetCachedOutputArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };
            match self.lookup(&args.cache_id, args.lines.as_deref()) {
                Ok(out) if out.found => out.text,
                Ok(_) => self.not_found_message(&args.cache_id),
                Err(e) => format!("Error: {e}"),
            }
        })
    }
}
