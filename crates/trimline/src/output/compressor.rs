//! Progress-bar compression.
//!
//! Package managers and downloaders emit hundreds of status updates that
//! differ only in a counter or a bar fill level. Once carriage returns have
//! been normalized to newlines those updates arrive as consecutive lines.
//! This pass keeps the final state of each such run and leaves every other
//! line untouched, so it always runs before any size accounting.

use super::CompressionStats;
use super::count_lines;
use super::semantic;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

fn build(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid progress pattern {pattern:?}: {e}"))
}

/// Shapes that mark a line as a progress update.
static PROGRESS_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // 50%, 99.5%
        r"\d{1,3}(\.\d+)?\s?%",
        // [#####     ]
        r"\[\s*#+[\s.\-]*\]",
        // [=====>    ]
        r"\[\s*=+>?[\s.\-]*\]",
        // braille spinners
        "[\u{280b}\u{2819}\u{2839}\u{2838}\u{283c}\u{2834}\u{2826}\u{2827}\u{2807}\u{280f}]",
        // block bars
        "[\u{2588}\u{2593}\u{2592}\u{2591}]{3,}",
        // Downloading 5/10
        r"\b(downloading|fetching|uploading|extracting|resolving)\b.*\d+/\d+",
        // (5/10)
        r"\(\d+/\d+\)",
    ]
    .iter()
    .map(|p| build(p))
    .collect()
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| build(r"\d+(\.\d+)?"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| build(r"\[[^\]]*\]"));
static SPINNER_OR_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    build(
        "[\u{280b}\u{2819}\u{2839}\u{2838}\u{283c}\u{2834}\u{2826}\u{2827}\u{2807}\u{280f}\u{2588}\u{2593}\u{2592}\u{2591}]+",
    )
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| build(r"\s+"));

/// Output of [`compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub text: String,
    pub stats: CompressionStats,
}

impl Compressed {
    /// Whether at least one progress run was collapsed.
    pub fn applied(&self) -> bool {
        self.stats.sequences_compressed > 0
    }
}

/// Whether `line` looks like a progress update. Critical lines never are,
/// even when they carry a percentage.
pub fn is_progress_line(line: &str) -> bool {
    PROGRESS_RULES.iter().any(|re| re.is_match(line)) && !semantic::is_critical(line)
}

/// The part of a progress line that stays fixed while the progress state
/// changes. Two lines belong to the same run only if their skeletons match.
fn skeleton(line: &str) -> String {
    let s = BRACKETED.replace_all(line, "[]");
    let s = SPINNER_OR_BLOCK.replace_all(&s, "");
    let s = NUMBER.replace_all(&s, "0");
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Collapse every run of consecutive, same-shaped progress lines into its
/// final line. Idempotent: `compress(compress(x).text) == compress(x)`.
pub fn compress(text: &str) -> Compressed {
    let lines_before = count_lines(text);
    let mut kept: Vec<&str> = Vec::with_capacity(lines_before);
    let mut sequences_compressed = 0;

    // (skeleton, length) of the run ending at the last kept line.
    let mut run: Option<(String, usize)> = None;

    for line in text.split('\n') {
        if !is_progress_line(line) {
            run = None;
            kept.push(line);
            continue;
        }
        let shape = skeleton(line);
        match run.as_mut() {
            Some((current, len)) if *current == shape => {
                if *len == 1 {
                    sequences_compressed += 1;
                }
                *len += 1;
                if let Some(last) = kept.last_mut() {
                    *last = line;
                }
            }
            _ => {
                run = Some((shape, 1));
                kept.push(line);
            }
        }
    }

    if sequences_compressed == 0 {
        return Compressed {
            text: text.to_string(),
            stats: CompressionStats {
                lines_before,
                lines_after: lines_before,
                sequences_compressed: 0,
            },
        };
    }

    let text = kept.join("\n");
    let lines_after = count_lines(&text);
    tracing::trace!(
        lines_before,
        lines_after,
        sequences_compressed,
        "Compressed progress output"
    );
    Compressed {
        text,
        stats: CompressionStats {
            lines_before,
            lines_after,
            sequences_compressed,
        },
    }
}
