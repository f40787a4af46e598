//! Pipeline orchestration and summary rendering.
//!
//! [`OutputManager::process`] runs one completed command's output through
//! normalization, compression, detection, classification, caching and
//! truncation, and returns both views of it: the untouched text for the
//! terminal and the bounded text plus summary for the model.

use super::cache::{CacheId, OutputCache, SharedOutputCache};
use super::compressor::{self, Compressed};
use super::json::{JqPathAnalyzer, JsonAnalyzer};
use super::truncator::Truncator;
use super::{
    CategoryPolicy, CompressionStats, ImportanceTier, Optimization, OutputCategory, RawOutput,
    Strategy, TierCounts, TruncationResult, char_len, clamp_to_line_boundary, count_lines,
    detector, normalize, semantic, split_lines,
};
use crate::config::OutputConfig;
use tracing::{debug, trace};

const RULE: &str = "───────────────────────────────────────────────────────────";

/// Both views of one processed command.
#[derive(Debug, Clone)]
pub struct ProcessedOutput {
    /// Everything the command printed, untouched.
    pub terminal_text: String,
    /// Bounded text followed by the summary (when enabled).
    pub model_text: String,
    /// Id of the cached full text; `None` when caching is disabled.
    pub cache_id: Option<CacheId>,
    pub summary: String,
    pub result: TruncationResult,
}

/// Sequences the pipeline stages for one conversation.
///
/// The cache is owned per conversation; [`new_conversation`] clears it and
/// restarts ids at `cmd_001`. Clone the [`SharedOutputCache`] handle from
/// [`cache`] to serve retrieval requests concurrently.
///
/// [`new_conversation`]: OutputManager::new_conversation
/// [`cache`]: OutputManager::cache
pub struct OutputManager {
    config: OutputConfig,
    cache: SharedOutputCache,
    truncator: Truncator,
    json_analyzer: Option<Box<dyn JsonAnalyzer>>,
}

impl std::fmt::Debug for OutputManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputManager")
            .field("config", &self.config)
            .field("truncator", &self.truncator)
            .field("json_analyzer", &self.json_analyzer.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for OutputManager {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

impl OutputManager {
    /// Build a manager with its own cache and the built-in jq-path analyzer.
    pub fn new(config: OutputConfig) -> Self {
        let config = config.sanitized();
        let cache = OutputCache::new(config.cache_max_bytes().unwrap_or(0))
            .with_safety_limit(config.safety_limit);
        let truncator = Truncator::new(config.first_last_ratio, config.safety_limit)
            .with_preserve_important(config.semantic);
        Self {
            config,
            cache: SharedOutputCache::new(cache),
            truncator,
            json_analyzer: Some(Box::new(JqPathAnalyzer)),
        }
    }

    /// Use an existing cache handle instead of the manager's own.
    pub fn with_shared_cache(mut self, cache: SharedOutputCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_json_analyzer(mut self, analyzer: impl JsonAnalyzer + 'static) -> Self {
        self.json_analyzer = Some(Box::new(analyzer));
        self
    }

    /// Oversized JSON is truncated as text instead of analyzed.
    pub fn without_json_analyzer(mut self) -> Self {
        self.json_analyzer = None;
        self
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedOutputCache {
        &self.cache
    }

    /// Start a new conversation: drop all cached output and restart ids.
    pub fn new_conversation(&self) {
        self.cache.clear();
    }

    /// Run the pipeline over one command's output.
    pub fn process(&self, raw: &RawOutput) -> ProcessedOutput {
        let normalized = normalize::normalize(&raw.output);

        if !self.config.enabled {
            return self.pass_through(raw, normalized);
        }

        let compressed = if self.config.compression {
            compressor::compress(&normalized)
        } else {
            Compressed {
                stats: CompressionStats {
                    lines_before: count_lines(&normalized),
                    lines_after: count_lines(&normalized),
                    sequences_compressed: 0,
                },
                text: normalized,
            }
        };

        let category = detector::detect(&raw.command, &compressed.text);
        let lines = split_lines(&compressed.text);
        let tiers = semantic::classify(&lines);

        let cache_id = self
            .config
            .cache
            .enabled
            .then(|| self.cache.put(&raw.command, compressed.text.as_str()));

        let policy = self.config.policy_for(category);
        let mut result = if category == OutputCategory::Json
            && char_len(&compressed.text) > self.truncator.bound(policy)
        {
            self.truncate_json(&compressed.text, &lines, &tiers, policy)
        } else {
            self.truncator.truncate(&lines, &tiers, category, policy)
        };

        result.cache_id = cache_id;
        if compressed.applied() {
            result.compression = Some(compressed.stats);
            result.optimizations.insert(0, Optimization::Compression);
        }

        let summary = render_summary(&result, raw, self.config.first_last_ratio);
        let model_text = self.compose_model_text(&result.text, &summary);

        debug!(
            command = %raw.command,
            %category,
            total_chars = result.total_chars,
            shown_chars = result.shown_chars,
            strategy = result.strategy_label(),
            cache_id = ?cache_id.map(|id| id.to_string()),
            "Processed command output"
        );
        trace!(preview = %clamp_to_line_boundary(&result.text, 200), "Model text preview");

        ProcessedOutput {
            terminal_text: raw.output.clone(),
            model_text,
            cache_id,
            summary,
            result,
        }
    }

    fn compose_model_text(&self, shown: &str, summary: &str) -> String {
        if !self.config.show_summary || summary.is_empty() {
            return shown.to_string();
        }
        if shown.is_empty() {
            return summary.to_string();
        }
        format!("{shown}\n\n{summary}")
    }

    /// Oversized JSON: show the analyzer's path listing when the document
    /// parses, otherwise truncate it as ordinary text.
    fn truncate_json(
        &self,
        text: &str,
        lines: &[&str],
        tiers: &[ImportanceTier],
        policy: CategoryPolicy,
    ) -> TruncationResult {
        let listing = match &self.json_analyzer {
            Some(analyzer) => match serde_json::from_str::<serde::de::IgnoredAny>(text) {
                Ok(_) => analyzer.analyze(text).map_err(|e| {
                    debug!(error = %e, "JSON analyzer failed; truncating as text");
                }),
                Err(e) => {
                    debug!(error = %e, "Output is not valid JSON; truncating as text");
                    Err(())
                }
            },
            None => Err(()),
        };

        let Ok(listing) = listing else {
            let fallback = self.config.policy_for(OutputCategory::Default);
            return self.truncator.truncate(
                lines,
                tiers,
                OutputCategory::Default,
                CategoryPolicy::new(fallback.budget, Strategy::FirstLast),
            );
        };

        let mut shown: Vec<&str> = split_lines(&listing);
        let critical: Vec<&str> = lines
            .iter()
            .zip(tiers)
            .filter(|(_, tier)| **tier == ImportanceTier::Critical)
            .map(|(line, _)| line.trim())
            .collect();
        if !critical.is_empty() {
            shown.push("");
            shown.push("Notable lines in the document:");
            shown.extend(critical);
        }
        let shown_tiers = semantic::classify(&shown);
        let mut result = self.truncator.truncate(
            &shown,
            &shown_tiers,
            OutputCategory::Json,
            CategoryPolicy::new(policy.budget, Strategy::FirstOnly),
        );
        result.total_chars = char_len(text);
        result.total_lines = lines.len();
        result.tiers = TierCounts::tally(tiers);
        result.optimizations.insert(0, Optimization::JsonAnalysis);
        result
    }

    fn pass_through(&self, raw: &RawOutput, normalized: String) -> ProcessedOutput {
        let total_chars = char_len(&normalized);
        let total_lines = count_lines(&normalized);
        let shown = clamp_to_line_boundary(&normalized, self.config.safety_limit).to_string();
        let result = TruncationResult {
            total_chars,
            total_lines,
            shown_chars: char_len(&shown),
            shown_lines: count_lines(&shown),
            category: OutputCategory::Default,
            strategy: (shown.len() < normalized.len()).then_some(Strategy::FirstOnly),
            optimizations: Vec::new(),
            tiers: TierCounts::default(),
            critical_dropped: 0,
            compression: None,
            cache_id: None,
            text: shown,
        };
        ProcessedOutput {
            terminal_text: raw.output.clone(),
            model_text: result.text.clone(),
            cache_id: None,
            summary: String::new(),
            result,
        }
    }
}

// ── Summary ────────────────────────────────────────────────────────

/// `12345` → `"12,345"`.
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", thousands(n), if n == 1 { one } else { many })
}

fn strategy_description(result: &TruncationResult, head_ratio_pct: Option<u32>) -> String {
    if result.has_optimization(Optimization::JsonAnalysis) {
        return "json analysis (jq path listing)".to_string();
    }
    match (result.strategy, head_ratio_pct) {
        (Some(Strategy::FirstLast), Some(pct)) => {
            format!("first_last ({pct}% first + {}% last)", 100 - pct)
        }
        (strategy, _) => strategy.map(|s| s.as_str()).unwrap_or("none").to_string(),
    }
}

/// Example retrieval call matching where the shown text was cut.
fn retrieval_hint(result: &TruncationResult, id: CacheId) -> String {
    let (spec, what) = if result.has_optimization(Optimization::JsonAnalysis) {
        ("+50", "the first 50 lines of raw JSON")
    } else {
        match result.strategy {
            Some(Strategy::LastOnly) => ("-200", "the last 200 lines"),
            Some(Strategy::FirstOnly) => ("+200", "the first 200 lines"),
            _ => ("-100", "the last 100 lines"),
        }
    };
    format!("Use get_cached_output(cache_id=\"{id}\", lines=\"{spec}\") to see {what}")
}

fn status_line(raw: &RawOutput) -> Option<String> {
    if raw.interrupted {
        return Some("Status: interrupted; output is partial".to_string());
    }
    match raw.exit_code {
        Some(0) => None,
        Some(code) => Some(format!("Exit code: {code}")),
        None => Some("Status: terminated by signal".to_string()),
    }
}

/// Render the summary block for `result`.
///
/// A compact single line when nothing was altered; the full block
/// otherwise. Both forms state total and shown sizes, the strategy, and the
/// cache id when there is one.
pub fn render_summary(result: &TruncationResult, raw: &RawOutput, head_ratio: f64) -> String {
    let cache = result
        .cache_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "not cached".to_string());

    if !result.was_truncated() && result.optimizations.is_empty() {
        let mut line = format!(
            "[Output: {} ({}), shown in full | Strategy: none | Cache ID: {cache}]",
            plural(result.total_chars, "char", "chars"),
            plural(result.total_lines, "line", "lines"),
        );
        if let Some(status) = status_line(raw) {
            line.push_str(&format!("\n[{status}]"));
        }
        return line;
    }

    let head_pct = result
        .strategy
        .filter(|s| *s == Strategy::FirstLast)
        .map(|_| (head_ratio.clamp(0.0, 1.0) * 100.0).round() as u32);

    let mut out = vec![
        RULE.to_string(),
        "OUTPUT SUMMARY".to_string(),
        RULE.to_string(),
        format!(
            "Total: {} ({}) | Shown: {} ({})",
            plural(result.total_chars, "char", "chars"),
            plural(result.total_lines, "line", "lines"),
            plural(result.shown_chars, "char", "chars"),
            plural(result.shown_lines, "line", "lines"),
        ),
        format!(
            "Category: {} | Strategy: {}",
            result.category,
            strategy_description(result, head_pct)
        ),
    ];

    let mut optimizations = Vec::new();
    if let Some(stats) = result.compression.filter(|s| s.lines_saved() > 0) {
        optimizations.push(format!(
            "Progress bars compressed (saved {})",
            plural(stats.lines_saved(), "line", "lines")
        ));
    }
    if result.has_optimization(Optimization::SemanticPreservation) {
        optimizations.push("important lines preserved outside the retained window".to_string());
    }
    if !optimizations.is_empty() {
        out.push(format!("Optimizations: {}", optimizations.join(", ")));
    }

    let t = &result.tiers;
    if t.total() > 0 {
        out.push(format!(
            "Semantic: {} critical, {} high, {} medium, {} low importance lines",
            t.critical, t.high, t.medium, t.low
        ));
    }
    if result.critical_dropped > 0 {
        out.push(format!(
            "Warning: {} did not fit the budget; retrieve them from the cache",
            plural(result.critical_dropped, "critical line", "critical lines")
        ));
    }
    if let Some(status) = status_line(raw) {
        out.push(status);
    }

    out.push(String::new());
    out.push(format!("Cache ID: {cache}"));
    if let Some(id) = result.cache_id
        && result.was_truncated()
    {
        out.push(retrieval_hint(result, id));
    }
    out.push(RULE.to_string());
    out.join("\n")
}
