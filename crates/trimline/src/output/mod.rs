//! Output management pipeline for shell command results.
//!
//! Raw command output flows through a fixed sequence of stages before it
//! reaches the model:
//!
//! 1. [`normalize`] strips trailing line padding and splits carriage-return
//!    status updates into separate lines.
//! 2. [`compressor`] collapses runs of progress-bar lines into their final
//!    state.
//! 3. [`detector`] classifies the output into an [`OutputCategory`].
//! 4. [`semantic`] assigns an [`ImportanceTier`] to every line.
//! 5. [`cache`] stores the full (compressed, untruncated) text under a
//!    sequential `cmd_NNN` id.
//! 6. [`truncator`] cuts the text down to the category budget, keeping every
//!    critical line it can and high-tier lines within their share.
//!
//! [`OutputManager`](manager::OutputManager) sequences the stages and renders
//! the summary the model sees after the bounded text.

pub mod cache;
pub mod compressor;
pub mod detector;
pub mod json;
pub mod manager;
pub mod normalize;
pub mod range;
pub mod semantic;
pub mod truncator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use cache::{CacheId, OutputCache, SharedOutputCache};
pub use manager::{OutputManager, ProcessedOutput};

/// Absolute maximum number of characters ever shown to the model.
pub const DEFAULT_SAFETY_LIMIT: usize = 50_000;

// ── RawOutput ──────────────────────────────────────────────────────

/// The captured result of one command execution.
///
/// Produced by the executor once the command finishes (or is interrupted),
/// consumed by [`OutputManager::process`](manager::OutputManager::process).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// The command string as the user or model issued it.
    pub command: String,
    /// Combined stdout/stderr in arrival order.
    pub output: String,
    /// Process exit code. `None` when the process was killed by a signal or
    /// interrupted before it exited.
    pub exit_code: Option<i32>,
    /// Whether the command was cut short (timeout, cancellation). The
    /// captured prefix is processed exactly like complete output.
    pub interrupted: bool,
}

impl RawOutput {
    pub fn new(command: impl Into<String>, output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            exit_code: Some(exit_code),
            interrupted: false,
        }
    }

    /// Build from raw bytes. Invalid UTF-8 sequences are replaced with
    /// U+FFFD rather than rejected.
    pub fn from_bytes(command: impl Into<String>, bytes: &[u8], exit_code: Option<i32>) -> Self {
        Self {
            command: command.into(),
            output: String::from_utf8_lossy(bytes).into_owned(),
            exit_code,
            interrupted: false,
        }
    }

    /// Mark this output as captured from an interrupted command.
    pub fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }

    /// Whether the command exited cleanly with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.interrupted
    }
}

// ── OutputCategory ─────────────────────────────────────────────────

/// The detected kind of command output. Drives budget and strategy selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    List,
    Search,
    Log,
    Json,
    Install,
    Build,
    Test,
    Default,
}

impl OutputCategory {
    /// Every category, in declaration order.
    pub const ALL: [OutputCategory; 8] = [
        OutputCategory::List,
        OutputCategory::Search,
        OutputCategory::Log,
        OutputCategory::Json,
        OutputCategory::Install,
        OutputCategory::Build,
        OutputCategory::Test,
        OutputCategory::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputCategory::List => "list",
            OutputCategory::Search => "search",
            OutputCategory::Log => "log",
            OutputCategory::Json => "json",
            OutputCategory::Install => "install",
            OutputCategory::Build => "build",
            OutputCategory::Test => "test",
            OutputCategory::Default => "default",
        }
    }

    /// Built-in character budget for this category.
    pub fn default_budget(&self) -> usize {
        match self {
            OutputCategory::List => 5_000,
            OutputCategory::Search => 10_000,
            OutputCategory::Log => 15_000,
            OutputCategory::Json => 20_000,
            OutputCategory::Install => 8_000,
            OutputCategory::Build => 8_000,
            OutputCategory::Test => 15_000,
            OutputCategory::Default => 8_000,
        }
    }

    /// Built-in retention strategy for this category.
    pub fn default_strategy(&self) -> Strategy {
        match self {
            OutputCategory::List | OutputCategory::Search | OutputCategory::Json => {
                Strategy::FirstOnly
            }
            OutputCategory::Log => Strategy::LastOnly,
            OutputCategory::Install
            | OutputCategory::Build
            | OutputCategory::Test
            | OutputCategory::Default => Strategy::FirstLast,
        }
    }
}

impl fmt::Display for OutputCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown output category '{s}'"))
    }
}

// ── Strategy ───────────────────────────────────────────────────────

/// Retention policy applied when output exceeds its category budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Keep a prefix.
    FirstOnly,
    /// Keep a suffix.
    LastOnly,
    /// Keep a head and a tail joined by an omission marker. The split is
    /// set by [`Truncator::head_ratio`](truncator::Truncator).
    FirstLast,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FirstOnly => "first_only",
            Strategy::LastOnly => "last_only",
            Strategy::FirstLast => "first_last",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_only" => Ok(Strategy::FirstOnly),
            "last_only" => Ok(Strategy::LastOnly),
            "first_last" => Ok(Strategy::FirstLast),
            other => Err(format!("unknown truncation strategy '{other}'")),
        }
    }
}

/// Budget and strategy resolved for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub budget: usize,
    pub strategy: Strategy,
}

impl CategoryPolicy {
    pub fn new(budget: usize, strategy: Strategy) -> Self {
        Self { budget, strategy }
    }

    /// The built-in policy for `category`.
    pub fn builtin(category: OutputCategory) -> Self {
        Self::new(category.default_budget(), category.default_strategy())
    }
}

// ── ImportanceTier ─────────────────────────────────────────────────

/// Per-line importance. Ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceTier {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ImportanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportanceTier::Low => "low",
            ImportanceTier::Medium => "medium",
            ImportanceTier::High => "high",
            ImportanceTier::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Line counts per importance tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl TierCounts {
    pub fn tally(tiers: &[ImportanceTier]) -> Self {
        let mut counts = Self::default();
        for tier in tiers {
            match tier {
                ImportanceTier::Critical => counts.critical += 1,
                ImportanceTier::High => counts.high += 1,
                ImportanceTier::Medium => counts.medium += 1,
                ImportanceTier::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

// ── TruncationResult ───────────────────────────────────────────────

/// An optimization that actually changed what the model sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimization {
    /// Progress-bar runs were collapsed before size accounting.
    Compression,
    /// Critical or high-tier lines outside the retained window were spliced
    /// back in.
    SemanticPreservation,
    /// Oversized JSON was replaced by a structural path listing.
    JsonAnalysis,
}

/// Statistics from one progress-compression pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompressionStats {
    pub lines_before: usize,
    pub lines_after: usize,
    /// Runs of two or more progress lines that were collapsed.
    pub sequences_compressed: usize,
}

impl CompressionStats {
    pub fn lines_saved(&self) -> usize {
        self.lines_before.saturating_sub(self.lines_after)
    }
}

/// The bounded text handed to the model and a record of what was cut.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruncationResult {
    /// The text shown to the model (without the summary).
    pub text: String,
    pub total_chars: usize,
    pub total_lines: usize,
    pub shown_chars: usize,
    pub shown_lines: usize,
    pub category: OutputCategory,
    /// Strategy that was applied, or `None` when the output fit its budget.
    pub strategy: Option<Strategy>,
    pub optimizations: Vec<Optimization>,
    pub tiers: TierCounts,
    /// Critical lines that could not be shown because critical lines alone
    /// exceeded the budget.
    pub critical_dropped: usize,
    pub compression: Option<CompressionStats>,
    pub cache_id: Option<CacheId>,
}

impl TruncationResult {
    /// Whether any content was withheld from the model.
    pub fn was_truncated(&self) -> bool {
        self.strategy.is_some() || self.has_optimization(Optimization::JsonAnalysis)
    }

    /// The strategy name for reporting (`"none"` when nothing was cut).
    pub fn strategy_label(&self) -> &'static str {
        self.strategy.map(|s| s.as_str()).unwrap_or("none")
    }

    pub fn has_optimization(&self, optimization: Optimization) -> bool {
        self.optimizations.contains(&optimization)
    }
}

// ── Line helpers ───────────────────────────────────────────────────

/// Split text into lines on `\n`. A single trailing newline does not produce
/// an empty final line; empty text has no lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').collect()
}

/// Number of lines as counted by [`split_lines`].
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.matches('\n').count() + 1
}

/// Number of characters (Unicode scalar values) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Clamp `text` to at most `max_chars` characters, cutting at the last line
/// boundary that fits. If not even the first line fits it is cut mid-line.
pub fn clamp_to_line_boundary(text: &str, max_chars: usize) -> &str {
    let head = take_chars(text, max_chars);
    if head.len() == text.len() {
        return text;
    }
    match head.rfind('\n') {
        Some(nl) if nl > 0 => head.get(..nl).unwrap_or(head),
        _ => head,
    }
}

/// The first `n` characters of `text`.
pub fn take_chars(text: &str, n: usize) -> &str {
    let end = text
        .char_indices()
        .nth(n)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    text.get(..end).unwrap_or(text)
}
