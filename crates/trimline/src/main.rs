//! Run shell commands through the output pipeline and show what a model
//! would see.
//!
//! # Examples
//!
//! ```sh
//! # Pipe existing output through the pipeline
//! npm install 2>&1 | trimline process --command "npm install"
//!
//! # Run one command: stream it, then print the model view
//! trimline run -- cargo test --workspace
//!
//! # Interactive session with a shared cache
//! trimline session
//! > ls -R /usr/share
//! > :get cmd_001 -50
//! > :stats
//! ```

use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use trimline::config::OutputConfig;
use trimline::exec::{ExecOptions, StdioSink, run_command};
use trimline::output::{OutputManager, ProcessedOutput, RawOutput};
use trimline::tools::GetCachedOutput;

/// Bound shell command output for a language model.
#[derive(Parser)]
#[command(name = "trimline", version)]
struct Cli {
    /// JSON config file (budgets, strategies, cache size, toggles)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "trimline=trace". Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process already-captured output read from a file or stdin
    Process {
        /// The command that produced the output (drives type detection)
        #[arg(long, default_value = "")]
        command: String,

        /// Exit code of the command
        #[arg(long, default_value_t = 0)]
        exit_code: i32,

        /// Print only the summary block
        #[arg(long)]
        summary_only: bool,

        /// Read output from this file instead of stdin
        file: Option<PathBuf>,
    },
    /// Run one command, stream its output, then print the model view
    Run {
        /// Kill the command after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Working directory for the command
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// The command line, passed to `sh -c`
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Read commands line by line, sharing one cache across them
    Session {
        /// Kill each command after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Working directory for commands
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<OutputConfig, String> {
    match path {
        Some(path) => OutputConfig::from_json_file(path).map_err(|e| e.to_string()),
        None => Ok(OutputConfig::default()),
    }
}

fn exec_options(timeout: Option<u64>, workdir: Option<PathBuf>) -> ExecOptions {
    ExecOptions {
        workdir,
        timeout: timeout.map(Duration::from_secs),
    }
}

fn print_model_view(processed: &ProcessedOutput) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "\n── model view ──────────────────────────────────────────────");
    let _ = writeln!(out, "{}", processed.model_text);
    let _ = out.flush();
}

// ── Subcommands ────────────────────────────────────────────────────

fn cmd_process(
    manager: &OutputManager,
    command: String,
    exit_code: i32,
    summary_only: bool,
    file: Option<PathBuf>,
) -> Result<(), String> {
    let bytes = match &file {
        Some(path) => std::fs::read(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
    };
    let raw = RawOutput::from_bytes(command, &bytes, Some(exit_code));
    let processed = manager.process(&raw);
    if summary_only {
        println!("{}", processed.summary);
    } else {
        println!("{}", processed.model_text);
    }
    Ok(())
}

async fn cmd_run(manager: &OutputManager, command: &str, options: &ExecOptions) -> Result<(), String> {
    let raw = run_command(command, options, &mut StdioSink)
        .await
        .map_err(|e| format!("failed to run '{command}': {e}"))?;
    let processed = manager.process(&raw);
    print_model_view(&processed);
    Ok(())
}

async fn cmd_session(manager: Arc<OutputManager>, options: ExecOptions) -> Result<(), String> {
    let lookup = GetCachedOutput::new(manager.cache().clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Session started");

    loop {
        eprint!("> ");
        let _ = io::stderr().flush();
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| format!("failed to read stdin: {e}"))?
        else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            Some(":quit" | ":q") => break,
            Some(":new") => {
                manager.new_conversation();
                println!("Cache cleared; ids restart at cmd_001.");
            }
            Some(":stats") => {
                let stats = manager.cache().stats();
                let json = serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())?;
                println!("{json}");
            }
            Some(":entries") => {
                for entry in manager.cache().entries() {
                    println!(
                        "{}  {:>8} bytes  {:>6} lines  {}  {}",
                        entry.id,
                        entry.size_bytes,
                        entry.lines,
                        entry.created_at.format("%H:%M:%S"),
                        entry.command
                    );
                }
            }
            Some(":get") => {
                let Some(id) = words.next() else {
                    println!("usage: :get <cache_id> [range]");
                    continue;
                };
                match lookup.lookup(id, words.next()) {
                    Ok(out) if out.found => println!("{}", out.text),
                    Ok(_) => println!("{id}: not found"),
                    Err(e) => println!("Error: {e}"),
                }
            }
            Some(other) if other.starts_with(':') => {
                println!("unknown command {other}; try :get, :stats, :entries, :new, :quit");
            }
            _ => {
                debug!(command = line, "Running session command");
                if let Err(e) = cmd_run(&manager, line, &options).await {
                    eprintln!("Error: {e}");
                }
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_ref())?;
    let manager = Arc::new(OutputManager::new(config));

    match cli.command {
        Command::Process {
            command,
            exit_code,
            summary_only,
            file,
        } => cmd_process(&manager, command, exit_code, summary_only, file),
        Command::Run {
            timeout,
            workdir,
            command,
        } => cmd_run(&manager, &command.join(" "), &exec_options(timeout, workdir)).await,
        Command::Session { timeout, workdir } => {
            cmd_session(manager, exec_options(timeout, workdir)).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
