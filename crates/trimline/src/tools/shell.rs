//! `shell`: run a command, stream it to the terminal, and hand the model
//! the bounded view produced by the output pipeline.

use crate::ToolDef;
use crate::exec::{ExecOptions, NullSink, StdioSink, TerminalSink, run_command};
use crate::output::OutputManager;
use crate::tools::core::{Tool, ToolFuture, parse_tool_args};
use crate::tools::spec::ToolSpec;
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Typed arguments for `shell`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ShellArgs {
    /// Shell command to execute (e.g. 'npm install', 'git log --oneline -20').
    pub command: String,
    /// Kill the command after this many seconds; output captured so far is kept.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Runs commands with `sh -c` in a working directory.
///
/// The terminal (when echo is on) sees everything as it streams; the model
/// sees the truncated text and summary, with the full text cached.
pub struct Shell {
    manager: Arc<OutputManager>,
    workdir: PathBuf,
    timeout: Option<Duration>,
    echo: bool,
}

impl Shell {
    pub fn new(manager: Arc<OutputManager>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            workdir: workdir.into(),
            timeout: None,
            echo: true,
        }
    }

    /// Default timeout when the call does not set one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stream output to this process's stdout/stderr while it runs.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    async fn run(&self, args: ShellArgs) -> String {
        let mut options = ExecOptions::default().workdir(&self.workdir);
        options.timeout = args.timeout_secs.map(Duration::from_secs).or(self.timeout);

        let mut sink: Box<dyn TerminalSink> = if self.echo {
            Box::new(StdioSink)
        } else {
            Box::new(NullSink)
        };
        let raw = match run_command(&args.command, &options, sink.as_mut()).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(command = %args.command, error = %e, "Failed to spawn shell");
                return format!("Error: failed to run command: {e}");
            }
        };
        self.manager.process(&raw).model_text
    }
}

impl Tool for Shell {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("shell")
            .purpose("Run a shell command and return its (possibly truncated) output")
            .when_to_use(
                "When you need to run a build, test, install, search or listing command. \
                 Large output is truncated for you and the full text is cached.",
            )
            .when_not_to_use(
                "To see more of an earlier command's output. Use get_cached_output with \
                 the cache ID from its summary instead of re-running it.",
            )
            .parameters_for::<ShellArgs>()
            .example(
                r#"shell(command="cargo test")"#,
                "Test output, bounded, followed by an output summary with a cache ID",
            )
            .output_format(
                "Command output, then an OUTPUT SUMMARY block when anything was truncated",
            )
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            match parse_tool_args::<ShellArgs>(&arguments) {
                Ok(args) => self.run(args).await,
                Err(e) => e,
            }
        })
    }
}
