//! Convenience re-exports for common `trimline` types.
//!
//! ```ignore
//! use trimline::prelude::*;
//! ```
//!
//! Stage-level functions (`compress`, `detect`, `classify`) are left out;
//! import those from their modules when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ToolDef, json_schema_for};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::config::{ConfigError, OutputConfig};
pub use crate::output::range::{RangeSpec, RangeSpecError};
pub use crate::output::{
    CacheId, OutputCache, OutputCategory, OutputManager, ProcessedOutput, RawOutput,
    SharedOutputCache, Strategy, TruncationResult,
};

// ── Execution ───────────────────────────────────────────────────────
pub use crate::exec::{ExecOptions, StdioSink, TerminalSink, run_command};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::spec::ToolSpec;
pub use crate::tools::{GetCachedOutput, Shell, Tool, ToolFuture, ToolSet, parse_tool_args};
