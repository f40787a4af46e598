//! Tool-call surface over the output pipeline.
//!
//! - [`core`]: [`Tool`] trait and the [`ToolSet`] dispatcher.
//! - [`spec`]: [`ToolSpec`](spec::ToolSpec) builder for structured tool
//!   descriptions.
//! - [`shell`]: run a command and return the bounded view.
//! - [`cached_output`]: retrieve cached output by id
//!   and range.

pub mod cached_output;
pub mod core;
pub mod shell;
pub mod spec;

pub use cached_output::{GetCachedOutput, GetCachedOutputArgs};
pub use core::{Tool, ToolFuture, ToolSet, parse_tool_args, validate_tool_arguments};
pub use shell::{Shell, ShellArgs};
