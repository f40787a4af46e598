//! Line-range mini-language for cached output retrieval.
//!
//! | Spec    | Selects                                         |
//! |---------|-------------------------------------------------|
//! | `+N`    | first `N` lines                                 |
//! | `-N`    | last `N` lines                                  |
//! | `+N,-M` | first `N` and last `M` lines, marker in between |
//! | `N-M`   | lines `N` through `M`, 1-indexed, inclusive     |
//!
//! Ranges past either end of the text are clamped, never rejected.

use super::split_lines;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parsed range spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    First(usize),
    Last(usize),
    FirstLast(usize, usize),
    /// 1-indexed inclusive `start..=end`.
    Lines(usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeSpecError {
    #[error("empty range spec")]
    Empty,
    #[error("invalid line count '{0}' in range spec")]
    BadNumber(String),
    #[error("line numbers start at 1 (got '{0}')")]
    ZeroLine(String),
    #[error("range start {start} is after end {end}")]
    Reversed { start: usize, end: usize },
    #[error(
        "unrecognized range spec '{0}' (expected +N, -N, +N,-M, or N-M)"
    )]
    Unrecognized(String),
}

fn number(raw: &str) -> Result<usize, RangeSpecError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeSpecError::BadNumber(raw.to_string()));
    }
    raw.parse()
        .map_err(|_| RangeSpecError::BadNumber(raw.to_string()))
}

impl FromStr for RangeSpec {
    type Err = RangeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(RangeSpecError::Empty);
        }

        if let Some((head, tail)) = spec.split_once(',') {
            let (Some(first), Some(last)) = (
                head.trim().strip_prefix('+'),
                tail.trim().strip_prefix('-'),
            ) else {
                return Err(RangeSpecError::Unrecognized(spec.to_string()));
            };
            return Ok(RangeSpec::FirstLast(number(first)?, number(last)?));
        }
        if let Some(n) = spec.strip_prefix('+') {
            return Ok(RangeSpec::First(number(n)?));
        }
        if let Some(n) = spec.strip_prefix('-') {
            return Ok(RangeSpec::Last(number(n)?));
        }
        if let Some((start, end)) = spec.split_once('-') {
            let (start, end) = (number(start)?, number(end)?);
            if start == 0 {
                return Err(RangeSpecError::ZeroLine(spec.to_string()));
            }
            if start > end {
                return Err(RangeSpecError::Reversed { start, end });
            }
            return Ok(RangeSpec::Lines(start, end));
        }
        Err(RangeSpecError::Unrecognized(spec.to_string()))
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSpec::First(n) => write!(f, "+{n}"),
            RangeSpec::Last(n) => write!(f, "-{n}"),
            RangeSpec::FirstLast(n, m) => write!(f, "+{n},-{m}"),
            RangeSpec::Lines(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

impl RangeSpec {
    /// Select the requested lines of `text`.
    pub fn apply(&self, text: &str) -> String {
        let lines = split_lines(text);
        let total = lines.len();
        match *self {
            RangeSpec::First(n) => lines[..n.min(total)].join("\n"),
            RangeSpec::Last(n) => lines[total - n.min(total)..].join("\n"),
            RangeSpec::FirstLast(n, m) => {
                if n.saturating_add(m) >= total {
                    return lines.join("\n");
                }
                let head = lines[..n].join("\n");
                let tail = lines[total - m..].join("\n");
                let marker = format!("... ({} lines omitted) ...", total - n - m);
                [head, marker, tail]
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
            RangeSpec::Lines(start, end) => {
                let from = start.saturating_sub(1).min(total);
                let to = end.min(total).max(from);
                lines[from..to].join("\n")
            }
        }
    }
}
