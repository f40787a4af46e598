//! Budgeted truncation with semantic line preservation.
//!
//! The truncator works on whole lines. Given a character budget it selects a
//! retained window according to the category [`Strategy`], then splices every
//! critical line that fell outside the window back in at its original
//! position, separated from its neighbours by an omission marker:
//!
//! ```text
//! head line 1
//! head line 2
//! ... [427 lines (21031 chars) omitted] ...
//! ERROR: connect ECONNREFUSED 10.0.0.1:443
//! ... [380 lines (17602 chars) omitted] ...
//! tail line 1
//! ```
//!
//! High-tier lines (warnings, summaries, pass counts) outside the window are
//! spliced the same way, after the critical ones, but only within
//! [`HIGH_TIER_SHARE`] of the budget the critical lines leave over. Medium
//! and low lines are kept only by position.
//!
//! Room for the spliced lines is reserved up front by pulling the window's
//! inner edges back, so positional lines are given up before any critical or
//! admitted high line and the output never exceeds
//! `min(budget, safety_limit)` characters. When the critical lines alone do
//! not fit, they are admitted in order of appearance until the budget runs
//! out and the rest are counted in [`TruncationResult::critical_dropped`].
//!
//! Lines are never split, with one exception: when not a single line fits
//! the budget, the edge line is cut and suffixed with ` ... [+N chars]`.
//! That marker needs [`MIN_MARKED_BUDGET`] characters; below it the cut is
//! bare, which is why configured budgets are raised to that floor.

use super::{
    CategoryPolicy, DEFAULT_SAFETY_LIMIT, ImportanceTier, Optimization, OutputCategory, Strategy,
    TierCounts, TruncationResult, char_len, clamp_to_line_boundary, count_lines, take_chars,
};
use tracing::trace;

/// Default head share for [`Strategy::FirstLast`].
pub const DEFAULT_HEAD_RATIO: f64 = 0.2;

/// Share of the budget left after critical lines that spliced high-tier
/// lines may use.
pub const HIGH_TIER_SHARE: f64 = 0.3;

/// Smallest budget that still fits a hard-cut line's ` ... [+N chars]`
/// marker for any realistic line length.
pub const MIN_MARKED_BUDGET: usize = 32;

/// Below this many characters of combined head/tail room, `first_last`
/// degrades to a plain prefix.
const MIN_SPLIT_ROOM: usize = 64;

/// Line-oriented truncator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Truncator {
    /// Head share of the window for [`Strategy::FirstLast`], in `(0, 1)`.
    pub head_ratio: f64,
    /// Absolute character ceiling applied on top of every category budget.
    pub safety_limit: usize,
    /// Splice critical and high-tier lines back in when they fall outside
    /// the window.
    pub preserve_important: bool,
}

impl Default for Truncator {
    fn default() -> Self {
        Self {
            head_ratio: DEFAULT_HEAD_RATIO,
            safety_limit: DEFAULT_SAFETY_LIMIT,
            preserve_important: true,
        }
    }
}

/// Retained window: `0..head_end` and `tail_start..len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    head_end: usize,
    tail_start: usize,
}

/// Per-line character lengths with prefix sums for O(1) range costs.
struct LineCosts {
    lens: Vec<usize>,
    prefix: Vec<usize>,
}

impl LineCosts {
    fn new(lines: &[&str]) -> Self {
        let lens: Vec<usize> = lines.iter().map(|l| char_len(l)).collect();
        let mut prefix = Vec::with_capacity(lens.len() + 1);
        prefix.push(0);
        let mut acc = 0;
        for len in &lens {
            acc += len;
            prefix.push(acc);
        }
        Self { lens, prefix }
    }

    fn len(&self) -> usize {
        self.lens.len()
    }

    /// Characters of lines `start..end` joined by newlines.
    fn joined(&self, start: usize, end: usize) -> usize {
        if end <= start {
            return 0;
        }
        self.prefix[end] - self.prefix[start] + (end - start - 1)
    }

    /// Characters of lines `start..end` as omitted content, counting one
    /// newline per line.
    fn omitted(&self, start: usize, end: usize) -> usize {
        self.prefix[end] - self.prefix[start] + (end - start)
    }

    fn total(&self) -> usize {
        self.joined(0, self.len())
    }

    /// Largest `k` such that lines `0..k` fit in `budget`.
    fn longest_prefix(&self, budget: usize) -> usize {
        let n = self.len();
        (0..=n)
            .take_while(|&k| self.joined(0, k) <= budget)
            .last()
            .unwrap_or(0)
    }

    /// Smallest `start >= floor` such that lines `start..n` fit in `budget`.
    fn longest_suffix(&self, budget: usize, floor: usize) -> usize {
        let n = self.len();
        (floor..=n)
            .rev()
            .take_while(|&start| self.joined(start, n) <= budget)
            .last()
            .unwrap_or(n)
    }
}

/// The omission marker placed between two retained runs.
pub fn omission_marker(lines: usize, chars: usize) -> String {
    let noun = if lines == 1 { "line" } else { "lines" };
    format!("... [{lines} {noun} ({chars} chars) omitted] ...")
}

/// Cut a single line to at most `max_chars` characters, marking the cut.
///
/// The marker is dropped when it would not fit, so a bare prefix comes back
/// for `max_chars` under [`MIN_MARKED_BUDGET`].
pub fn hard_truncate_line(line: &str, max_chars: usize) -> String {
    let len = char_len(line);
    if len <= max_chars {
        return line.to_string();
    }
    let suffix_room = format!(" ... [+{len} chars]").chars().count();
    if max_chars <= suffix_room {
        return take_chars(line, max_chars).to_string();
    }
    let keep = max_chars - suffix_room;
    format!("{} ... [+{} chars]", take_chars(line, keep), len - keep)
}

impl Truncator {
    pub fn new(head_ratio: f64, safety_limit: usize) -> Self {
        Self {
            head_ratio,
            safety_limit,
            ..Self::default()
        }
    }

    pub fn with_preserve_important(mut self, preserve: bool) -> Self {
        self.preserve_important = preserve;
        self
    }

    /// Effective bound for a policy: the category budget capped by the
    /// safety ceiling.
    pub fn bound(&self, policy: CategoryPolicy) -> usize {
        policy.budget.min(self.safety_limit)
    }

    /// Truncate `lines` (already compressed) to the policy's budget.
    ///
    /// `tiers` must be parallel to `lines`. The returned result carries no
    /// cache id or compression stats; the manager fills those in.
    pub fn truncate(
        &self,
        lines: &[&str],
        tiers: &[ImportanceTier],
        category: OutputCategory,
        policy: CategoryPolicy,
    ) -> TruncationResult {
        debug_assert_eq!(lines.len(), tiers.len());
        let costs = LineCosts::new(lines);
        let total_chars = costs.total();
        let total_lines = lines.len();
        let bound = self.bound(policy);

        let mut result = TruncationResult {
            text: String::new(),
            total_chars,
            total_lines,
            shown_chars: 0,
            shown_lines: 0,
            category,
            strategy: None,
            optimizations: Vec::new(),
            tiers: TierCounts::tally(tiers),
            critical_dropped: 0,
            compression: None,
            cache_id: None,
        };

        if total_chars <= bound {
            result.text = lines.join("\n");
            result.shown_chars = total_chars;
            result.shown_lines = total_lines;
            return result;
        }

        let strategy = policy.strategy;
        result.strategy = Some(strategy);
        let marker_max = char_len(&omission_marker(total_lines, costs.omitted(0, total_lines)));
        // Cost of one spliced line: its text, the newline before it,
        // and at most one new marker with its newline.
        let splice_cost = |i: usize| costs.lens[i] + 2 + marker_max;

        let of_tier = |tier: ImportanceTier| -> Vec<usize> {
            if !self.preserve_important {
                return Vec::new();
            }
            (0..total_lines).filter(|&i| tiers[i] == tier).collect()
        };
        let criticals = of_tier(ImportanceTier::Critical);
        let highs = of_tier(ImportanceTier::High);

        // Splice cost of the lines in `indices` outside `window`, admitted in
        // order while the running total stays within `cap`.
        let outside_cost = |indices: &[usize], window: Window, cap: usize| -> usize {
            let mut sum = 0usize;
            for &i in indices.iter().filter(|&&i| !window.contains(i)) {
                let cost = splice_cost(i);
                if sum.saturating_add(cost) <= cap {
                    sum += cost;
                }
            }
            sum
        };
        let high_cap = |critical_cost: usize| -> usize {
            (bound.saturating_sub(critical_cost) as f64 * HIGH_TIER_SHARE).floor() as usize
        };

        // Grow the reserve until every critical outside the window, and the
        // high lines within their share, are paid for.
        let mut reserve = 0;
        let mut window;
        loop {
            window = if reserve >= bound {
                Window {
                    head_end: 0,
                    tail_start: total_lines,
                }
            } else {
                self.select_window(&costs, strategy, bound - reserve, marker_max)
            };
            let critical_cost = outside_cost(&criticals, window, usize::MAX);
            let needed = critical_cost + outside_cost(&highs, window, high_cap(critical_cost));
            if needed <= reserve || reserve >= bound {
                break;
            }
            reserve = needed;
        }

        let mut keep = vec![false; total_lines];
        for (i, slot) in keep.iter_mut().enumerate() {
            *slot = window.contains(i);
        }
        let window_cost = costs.joined(0, window.head_end)
            + costs.joined(window.tail_start, total_lines)
            + if window.head_end > 0 && window.tail_start < total_lines {
                marker_max + 2
            } else {
                0
            };

        // Splice criticals first-wins within whatever room the window left.
        let mut spent = window_cost;
        let mut spliced = 0;
        for &i in &criticals {
            if keep[i] {
                continue;
            }
            let cost = if spent == 0 {
                costs.lens[i]
            } else {
                splice_cost(i)
            };
            if spent + cost <= bound {
                keep[i] = true;
                spent += cost;
                spliced += 1;
            } else {
                result.critical_dropped += 1;
            }
        }

        // Then high lines, within their share of what the criticals left.
        let high_room = high_cap(outside_cost(&criticals, window, usize::MAX));
        let mut high_spent = 0;
        let mut high_spliced = 0;
        for &i in &highs {
            if keep[i] {
                continue;
            }
            let cost = if spent == 0 {
                costs.lens[i]
            } else {
                splice_cost(i)
            };
            if high_spent + cost <= high_room && spent + cost <= bound {
                keep[i] = true;
                spent += cost;
                high_spent += cost;
                high_spliced += 1;
            }
        }

        let mut text = assemble(lines, &costs, &keep);
        if text.is_empty() && total_lines > 0 {
            // Not even one whole line fits: cut the edge line, or the first
            // critical line that could not be shown.
            let first_dropped = criticals.iter().copied().find(|&i| !keep[i]);
            let edge = match (first_dropped, strategy) {
                (Some(i), _) => {
                    result.critical_dropped = result.critical_dropped.saturating_sub(1);
                    i
                }
                (None, Strategy::LastOnly) => total_lines - 1,
                (None, _) => 0,
            };
            text = hard_truncate_line(lines[edge], bound);
        }

        let text = clamp_to_line_boundary(&text, bound).to_string();
        if spliced + high_spliced > 0 {
            result.optimizations.push(Optimization::SemanticPreservation);
        }
        result.shown_chars = char_len(&text);
        result.shown_lines = count_lines(&text);
        result.text = text;

        trace!(
            %category,
            strategy = strategy.as_str(),
            bound,
            reserve,
            spliced,
            high_spliced,
            dropped = result.critical_dropped,
            "Truncated output"
        );
        result
    }

    fn select_window(
        &self,
        costs: &LineCosts,
        strategy: Strategy,
        budget: usize,
        marker_max: usize,
    ) -> Window {
        let n = costs.len();
        match strategy {
            Strategy::FirstOnly => Window {
                head_end: costs.longest_prefix(budget),
                tail_start: n,
            },
            Strategy::LastOnly => Window {
                head_end: 0,
                tail_start: costs.longest_suffix(budget, 0),
            },
            Strategy::FirstLast => {
                let room = budget.saturating_sub(marker_max + 2);
                if room < MIN_SPLIT_ROOM {
                    return Window {
                        head_end: costs.longest_prefix(budget),
                        tail_start: n,
                    };
                }
                let ratio = self.head_ratio.clamp(0.0, 1.0);
                let head_room = (room as f64 * ratio).floor() as usize;
                let head_end = costs.longest_prefix(head_room);
                let tail_room = room - costs.joined(0, head_end);
                let tail_start = costs.longest_suffix(tail_room, head_end);
                Window {
                    head_end,
                    tail_start,
                }
            }
        }
    }
}

impl Window {
    fn contains(&self, i: usize) -> bool {
        i < self.head_end || i >= self.tail_start
    }
}

/// Join the kept lines, with an omission marker between non-adjacent runs.
/// Omitted lines before the first and after the last run get no marker.
fn assemble(lines: &[&str], costs: &LineCosts, keep: &[bool]) -> String {
    let mut pieces: Vec<String> = Vec::new();
    let mut last_kept: Option<usize> = None;
    for (i, line) in lines.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        if let Some(prev) = last_kept
            && i > prev + 1
        {
            pieces.push(omission_marker(i - prev - 1, costs.omitted(prev + 1, i)));
        }
        pieces.push((*line).to_string());
        last_kept = Some(i);
    }
    pieces.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::semantic::classify;

    fn run(text: &str, budget: usize, strategy: Strategy) -> TruncationResult {
        let lines: Vec<&str> = text.split('\n').collect();
        let tiers = classify(&lines);
        Truncator::default().truncate(
            &lines,
            &tiers,
            OutputCategory::Default,
            CategoryPolicy::new(budget, strategy),
        )
    }

    fn numbered(n: usize) -> String {
        (1..=n)
            .map(|i| format!("line {i:04} of plain output"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn fitting_output_is_unchanged() {
        let text = numbered(10);
        let result = run(&text, 10_000, Strategy::FirstLast);
        assert_eq!(result.text, text);
        assert_eq!(result.strategy, None);
        assert_eq!(result.strategy_label(), "none");
        assert_eq!(result.shown_lines, 10);
        assert!(result.optimizations.is_empty());
    }

    #[test]
    fn first_only_keeps_whole_line_prefix() {
        let text = numbered(200);
        let result = run(&text, 1_000, Strategy::FirstOnly);
        assert!(result.shown_chars <= 1_000);
        assert!(result.text.starts_with("line 0001"));
        assert!(text.starts_with(&result.text));
        assert!(!result.text.contains("omitted"));
        assert_eq!(result.strategy, Some(Strategy::FirstOnly));
    }

    #[test]
    fn last_only_keeps_whole_line_suffix() {
        let text = numbered(200);
        let result = run(&text, 1_000, Strategy::LastOnly);
        assert!(result.shown_chars <= 1_000);
        assert!(text.ends_with(&result.text));
        assert!(result.text.starts_with("line "));
    }

    #[test]
    fn first_last_splits_head_and_tail() {
        let text = numbered(500);
        let result = run(&text, 2_000, Strategy::FirstLast);
        assert!(result.shown_chars <= 2_000);
        let lines: Vec<&str> = result.text.lines().collect();
        assert_eq!(lines[0], "line 0001 of plain output");
        assert_eq!(*lines.last().unwrap(), "line 0500 of plain output");
        let marker = lines.iter().position(|l| l.contains("omitted")).unwrap();
        // Roughly a 20/80 split around the marker.
        assert!(marker < lines.len() / 3, "marker at {marker} of {}", lines.len());
        assert!(lines[marker].starts_with("... ["));
    }

    #[test]
    fn critical_line_outside_window_is_preserved() {
        let mut lines: Vec<String> = (1..=600).map(|i| format!("fetching module {i}")).collect();
        lines[300] = "ERROR: connect ECONNREFUSED 10.0.0.1:443".into();
        let text = lines.join("\n");

        for strategy in [Strategy::FirstOnly, Strategy::LastOnly, Strategy::FirstLast] {
            let result = run(&text, 2_000, strategy);
            assert!(result.text.contains("ECONNREFUSED"), "{strategy}");
            assert!(result.shown_chars <= 2_000, "{strategy}");
            assert!(result.has_optimization(Optimization::SemanticPreservation));
            assert_eq!(result.critical_dropped, 0);
        }
    }

    #[test]
    fn high_lines_outside_window_are_preserved() {
        let mut lines: Vec<String> = (1..=800)
            .map(|i| format!("compiling src/unit_{i:04}.c -> obj/unit_{i:04}.o"))
            .collect();
        lines[399] = "warning: deprecated API `open_v1` used in src/unit_0400.c".into();
        lines[400] = "Summary: 3 warnings".into();
        let result = run(&lines.join("\n"), 8_000, Strategy::FirstLast);

        assert!(result.shown_chars <= 8_000);
        assert!(result.text.contains("warning: deprecated API"));
        assert!(result.text.contains("\nSummary: 3 warnings\n"));
        assert!(result.text.starts_with("compiling src/unit_0001.c"));
        assert!(result.text.ends_with("obj/unit_0800.o"));
        assert!(result.has_optimization(Optimization::SemanticPreservation));
        // Plain lines around them are still omitted.
        assert!(!result.text.contains("unit_0399.c"));
        assert!(!result.text.contains("unit_0402.c"));
    }

    #[test]
    fn high_lines_never_crowd_out_the_window_or_criticals() {
        let mut lines: Vec<String> = (1..=1_000)
            .map(|i| {
                if i % 2 == 0 {
                    format!("warning: slow query #{i:04} took long")
                } else {
                    format!("row {i:04} plain data")
                }
            })
            .collect();
        lines[500] = "FATAL: disk full on /var".into();
        let result = run(&lines.join("\n"), 3_000, Strategy::FirstLast);

        assert!(result.shown_chars <= 3_000);
        assert!(result.text.contains("FATAL: disk full on /var"));
        assert_eq!(result.critical_dropped, 0);
        assert!(result.text.starts_with("row 0001 plain data"));
        assert!(result.text.ends_with("warning: slow query #1000 took long"));

        // Spliced high lines stay within their share of the budget.
        let shown: Vec<&str> = result.text.split('\n').collect();
        let first_marker = shown.iter().position(|l| l.starts_with("... [")).unwrap();
        let last_marker = shown.iter().rposition(|l| l.starts_with("... [")).unwrap();
        let spliced_high: usize = shown[first_marker..=last_marker]
            .iter()
            .filter(|l| l.starts_with("warning:"))
            .map(|l| l.chars().count())
            .sum();
        assert!(spliced_high > 0);
        assert!(spliced_high as f64 <= 3_000.0 * HIGH_TIER_SHARE, "{spliced_high}");
    }

    #[test]
    fn high_lines_are_not_spliced_when_preservation_is_off() {
        let mut lines: Vec<String> = (1..=600).map(|i| format!("row {i}")).collect();
        lines[300] = "Summary: 12 files changed".into();
        let text = lines.join("\n");
        let split: Vec<&str> = text.split('\n').collect();
        let result = Truncator::default().with_preserve_important(false).truncate(
            &split,
            &classify(&split),
            OutputCategory::Default,
            CategoryPolicy::new(1_000, Strategy::FirstLast),
        );
        assert!(!result.text.contains("Summary"));
    }

    #[test]
    fn critical_inside_window_is_not_an_optimization() {
        let mut lines: Vec<String> = (1..=300).map(|i| format!("row {i}")).collect();
        lines[1] = "error: early".into();
        let result = run(&lines.join("\n"), 500, Strategy::FirstOnly);
        assert!(result.text.contains("error: early"));
        assert!(!result.has_optimization(Optimization::SemanticPreservation));
    }

    #[test]
    fn preservation_can_be_disabled() {
        let mut lines: Vec<String> = (1..=600).map(|i| format!("row {i}")).collect();
        lines[300] = "fatal: bad object".into();
        let text = lines.join("\n");
        let split: Vec<&str> = text.split('\n').collect();
        let result = Truncator::default().with_preserve_important(false).truncate(
            &split,
            &classify(&split),
            OutputCategory::Default,
            CategoryPolicy::new(1_000, Strategy::FirstOnly),
        );
        assert!(!result.text.contains("fatal"));
        assert!(result.optimizations.is_empty());
    }

    #[test]
    fn many_criticals_are_admitted_first_wins_within_bound() {
        let lines: Vec<String> = (1..=400)
            .map(|i| format!("error {i:03}: something broke in a rather verbose way"))
            .collect();
        let text = lines.join("\n");
        let result = run(&text, 1_500, Strategy::LastOnly);
        assert!(result.shown_chars <= 1_500);
        assert!(result.text.starts_with("error 001"));
        assert!(result.critical_dropped > 0);
        assert!(result.critical_dropped < 400);
    }

    #[test]
    fn single_huge_line_is_hard_truncated() {
        let text = "x".repeat(10_000);
        let result = run(&text, 1_000, Strategy::FirstLast);
        assert!(result.shown_chars <= 1_000);
        assert!(result.text.ends_with("chars]"));
        assert!(result.text.starts_with("xxx"));
    }

    #[test]
    fn safety_ceiling_caps_large_budgets() {
        let text = numbered(5_000);
        let lines: Vec<&str> = text.split('\n').collect();
        let result = Truncator::new(0.2, 50_000).truncate(
            &lines,
            &classify(&lines),
            OutputCategory::Default,
            CategoryPolicy::new(1_000_000, Strategy::FirstOnly),
        );
        assert!(result.total_chars > 50_000);
        assert!(result.shown_chars <= 50_000);
    }

    #[test]
    fn never_splits_lines() {
        let text = numbered(1_000);
        let originals: std::collections::HashSet<&str> = text.split('\n').collect();
        for budget in [100, 777, 3_000, 9_999] {
            for strategy in [Strategy::FirstOnly, Strategy::LastOnly, Strategy::FirstLast] {
                let result = run(&text, budget, strategy);
                assert!(result.shown_chars <= budget);
                for line in result.text.split('\n') {
                    assert!(
                        originals.contains(line) || line.starts_with("... ["),
                        "split line {line:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn empty_input() {
        let result = run("", 100, Strategy::FirstLast);
        assert_eq!(result.text, "");
        assert_eq!(result.total_chars, 0);
        assert_eq!(result.strategy, None);
    }

    #[test]
    fn multibyte_lines_are_counted_in_chars() {
        let text = (0..100).map(|_| "日本語のテキスト").collect::<Vec<_>>().join("\n");
        let result = run(&text, 200, Strategy::FirstOnly);
        assert!(result.shown_chars <= 200);
        assert_eq!(result.shown_chars, result.text.chars().count());
    }

    #[test]
    fn marker_wording() {
        assert_eq!(omission_marker(1, 10), "... [1 line (10 chars) omitted] ...");
        assert_eq!(omission_marker(3, 30), "... [3 lines (30 chars) omitted] ...");
    }

    #[test]
    fn hard_truncate_respects_limit() {
        let cut = hard_truncate_line(&"a".repeat(500), 100);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with(" chars]"));
        assert_eq!(hard_truncate_line("short", 100), "short");
        assert_eq!(hard_truncate_line("abcdefgh", 3), "abc");
    }

    #[test]
    fn marker_fits_at_the_minimum_budget() {
        for len in [MIN_MARKED_BUDGET + 1, 5_000, 999_999] {
            let cut = hard_truncate_line(&"z".repeat(len), MIN_MARKED_BUDGET);
            assert!(cut.ends_with(" chars]"), "{len}: {cut}");
            assert!(cut.chars().count() <= MIN_MARKED_BUDGET);
        }
    }
}
