//! Per-line importance classification.
//!
//! Every line of (compressed) output is matched against an ordered rule
//! table. The first matching rule assigns the tier; lines matching no rule
//! are [`ImportanceTier::Low`]. Classification applies to all categories,
//! since even a directory listing can carry a permission error.

use super::ImportanceTier;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// One classification rule: a pattern and the tier it assigns.
struct TierRule {
    tier: ImportanceTier,
    pattern: Regex,
}

impl TierRule {
    fn new(tier: ImportanceTier, pattern: &str) -> Self {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|e| panic!("invalid importance pattern {pattern:?}: {e}"));
        Self { tier, pattern }
    }
}

/// Rules in evaluation order. Critical rules come first so a line that is
/// both an error and a summary is kept as critical.
static TIER_RULES: LazyLock<Vec<TierRule>> = LazyLock::new(|| {
    use ImportanceTier::{Critical, High, Medium};
    vec![
        // Failures and exceptions.
        TierRule::new(
            Critical,
            r"\b(error|err|fail|failed|failure|exception|fatal|critical|panic|panicked)\b",
        ),
        TierRule::new(Critical, r"\b(ENOENT|EACCES|EPERM|ECONNREFUSED|ETIMEDOUT)\b"),
        TierRule::new(Critical, r"Traceback\s+\(most\s+recent"),
        // Stack frames: `at fn (file.js:10:5)`.
        TierRule::new(Critical, r"^\s*at\s+.*\(.*:\d+:\d+\)"),
        // Warnings, completion, summaries.
        TierRule::new(High, r"\b(warn|warning|deprecated|caution)\b"),
        TierRule::new(High, r"\b(success|successfully|completed|done|finished)\b"),
        TierRule::new(High, r"\b(summary|total|result|final)\b"),
        TierRule::new(High, r"^\s*\d+\s+(passed|failed|skipped|pending)"),
        TierRule::new(High, r"^\s*=+\s*$"),
        TierRule::new(High, r"^-{3,}$"),
        // Status indicators.
        TierRule::new(Medium, "[\u{2713}\u{2717}\u{274c}\u{2705}\u{26a0}\u{1f534}\u{1f7e2}\u{1f7e1}]"),
        TierRule::new(Medium, r"^\s*\[\s*(OK|FAIL|PASS|SKIP|WARN)\s*\]"),
        TierRule::new(Medium, r"^\s*(PASS|FAIL|OK|ERROR):"),
    ]
});

/// Classify a single line.
pub fn classify_line(line: &str) -> ImportanceTier {
    TIER_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(line))
        .map(|rule| rule.tier)
        .unwrap_or(ImportanceTier::Low)
}

/// Classify every line. The result has the same length and order as `lines`.
pub fn classify<S: AsRef<str>>(lines: &[S]) -> Vec<ImportanceTier> {
    lines.iter().map(|l| classify_line(l.as_ref())).collect()
}

/// Whether `line` would be classified critical.
pub fn is_critical(line: &str) -> bool {
    classify_line(line) == ImportanceTier::Critical
}
