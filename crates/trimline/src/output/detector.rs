//! Output category detection.
//!
//! Resolution order:
//!
//! 1. Content sniffing: a JSON document, a test-runner result block, a build
//!    banner, or an install banner.
//! 2. Command matching against known tool invocations.
//! 3. [`OutputCategory::Default`].
//!
//! Content wins so that a command which unexpectedly prints JSON or test
//! results is still budgeted for what it actually printed. Detection is a
//! pure function of `(command, content)`.

use super::OutputCategory;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

struct CategoryRule {
    category: OutputCategory,
    pattern: Regex,
}

impl CategoryRule {
    fn new(category: OutputCategory, pattern: &str) -> Self {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .unwrap_or_else(|e| panic!("invalid detection pattern {pattern:?}: {e}"));
        Self { category, pattern }
    }
}

/// Content rules, after the JSON sniff. Test blocks are checked before build
/// banners because `cargo test` prints both.
static CONTENT_RULES: LazyLock<Vec<CategoryRule>> = LazyLock::new(|| {
    use OutputCategory::{Build, Install, Test};
    vec![
        CategoryRule::new(Test, r"\b\d+\s+(passed|failed|skipped)\b"),
        CategoryRule::new(Test, r"^\s*Tests?:\s+\d+"),
        CategoryRule::new(Test, r"^test result: (ok|FAILED)\."),
        CategoryRule::new(Test, r"^Ran \d+ tests? in "),
        CategoryRule::new(Build, r"\bBuild\s+(succeeded|failed|completed)\b"),
        CategoryRule::new(Build, r"\bCompiled\s+successfully\b"),
        CategoryRule::new(Build, r"\bBUILD\s+(SUCCESS|FAILURE)\b"),
        CategoryRule::new(Build, r"\bwebpack\s+\d+\.\d+"),
        CategoryRule::new(Build, r"^\s*Finished `?\w+`? profile \["),
        CategoryRule::new(Install, r"^added \d+ packages?\b"),
        CategoryRule::new(Install, r"^Successfully installed\s"),
        CategoryRule::new(Install, r"^Installing collected packages:"),
    ]
});

/// Command rules, evaluated in table order against each command segment.
static COMMAND_RULES: LazyLock<Vec<CategoryRule>> = LazyLock::new(|| {
    use OutputCategory::{Build, Install, List, Log, Search, Test};
    vec![
        CategoryRule::new(List, r"^ls\b"),
        CategoryRule::new(List, r"^dir\b"),
        CategoryRule::new(List, r"^tree\b"),
        CategoryRule::new(List, r"\bdocker\s+(ps|images)\b"),
        CategoryRule::new(List, r"\baws\s+\S+\s+list"),
        CategoryRule::new(List, r"\bkubectl\s+get\b"),
        CategoryRule::new(List, r"\bGet-ChildItem\b"),
        CategoryRule::new(Search, r"^grep\b"),
        CategoryRule::new(Search, r"^find\b"),
        CategoryRule::new(Search, r"^rg\b"),
        CategoryRule::new(Search, r"^ag\b"),
        CategoryRule::new(Search, r"\bSelect-String\b"),
        CategoryRule::new(Search, r"\bfindstr\b"),
        CategoryRule::new(Log, r"^tail\b"),
        CategoryRule::new(Log, r"^head\b"),
        CategoryRule::new(Log, r"^cat\s+.*\.log\b"),
        CategoryRule::new(Log, r"\bdocker\s+logs\b"),
        CategoryRule::new(Log, r"\bkubectl\s+logs\b"),
        CategoryRule::new(Log, r"\bjournalctl\b"),
        CategoryRule::new(Log, r"^git\s+log\b"),
        CategoryRule::new(Log, r"\bGet-EventLog\b"),
        CategoryRule::new(Log, r"\bGet-Content\s+.*\.log\b"),
        CategoryRule::new(Install, r"\bnpm\s+(install|i|add|ci)\b"),
        CategoryRule::new(Install, r"\byarn\s+(install|add)\b"),
        CategoryRule::new(Install, r"\bpnpm\s+(install|i|add)\b"),
        CategoryRule::new(Install, r"\bpip3?\s+install\b"),
        CategoryRule::new(Install, r"\bcargo\s+(install|add)\b"),
        CategoryRule::new(Install, r"\bgem\s+install\b"),
        CategoryRule::new(Install, r"\bapt(-get)?\s+install\b"),
        CategoryRule::new(Install, r"\b(yum|dnf|brew|choco)\s+install\b"),
        CategoryRule::new(Build, r"\bnpm\s+run\s+build\b"),
        CategoryRule::new(Build, r"\byarn\s+build\b"),
        CategoryRule::new(Build, r"\bcargo\s+(build|check)\b"),
        CategoryRule::new(Build, r"\bgo\s+build\b"),
        CategoryRule::new(Build, r"\bmvn\s+(compile|package|install)\b"),
        CategoryRule::new(Build, r"\bgradle\s+build\b"),
        CategoryRule::new(Build, r"\bdocker\s+build\b"),
        CategoryRule::new(Build, r"^make\b"),
        CategoryRule::new(Test, r"\bpytest\b"),
        CategoryRule::new(Test, r"\bnpm\s+(test|run\s+test)\b"),
        CategoryRule::new(Test, r"\byarn\s+test\b"),
        CategoryRule::new(Test, r"\b(jest|vitest)\b"),
        CategoryRule::new(Test, r"\bcargo\s+(test|nextest)\b"),
        CategoryRule::new(Test, r"\bgo\s+test\b"),
        CategoryRule::new(Test, r"\bmvn\s+test\b"),
    ]
});

/// Command separators: `&&`, `||`, `;`, `|`.
static SEGMENT_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&&|\|\||;|\|").unwrap_or_else(|e| panic!("invalid separator pattern: {e}"))
});

/// Leading `sudo` and `VAR=value` prefixes that do not change which tool runs.
static COMMAND_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:sudo\s+|\w+=\S*\s+)+")
        .unwrap_or_else(|e| panic!("invalid prefix pattern: {e}"))
});

/// Detect the category of `content` produced by `command`.
pub fn detect(command: &str, content: &str) -> OutputCategory {
    detect_from_content(content)
        .or_else(|| detect_from_command(command))
        .unwrap_or(OutputCategory::Default)
}

/// Content-only detection.
pub fn detect_from_content(content: &str) -> Option<OutputCategory> {
    if content.trim().is_empty() {
        return None;
    }
    if looks_like_json(content) {
        return Some(OutputCategory::Json);
    }
    CONTENT_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(content))
        .map(|rule| rule.category)
}

/// Command-only detection.
///
/// The command is split into segments on shell separators and the segments
/// are tried from last to first, since the last command of a pipeline or
/// chain usually produces what the user reads.
pub fn detect_from_command(command: &str) -> Option<OutputCategory> {
    let segments: Vec<&str> = SEGMENT_SPLIT.split(command).collect();
    segments
        .into_iter()
        .rev()
        .map(|segment| COMMAND_PREFIX.replace(segment.trim(), ""))
        .filter(|segment| !segment.is_empty())
        .find_map(|segment| {
            COMMAND_RULES
                .iter()
                .find(|rule| rule.pattern.is_match(&segment))
                .map(|rule| rule.category)
        })
}

/// Cheap structural check for a top-level JSON object or array. Full parsing
/// is left to the JSON analyzer.
pub fn looks_like_json(content: &str) -> bool {
    let trimmed = content.trim();
    let mut chars = trimmed.chars();
    let (Some(first), Some(last)) = (chars.next(), trimmed.chars().next_back()) else {
        return false;
    };
    match (first, last) {
        ('{', '}') => {
            let rest = chars.as_str().trim_start();
            rest.starts_with('"') || rest.starts_with('}')
        }
        ('[', ']') => {
            let rest = chars.as_str().trim_start();
            match rest.chars().next() {
                Some('{' | '[' | '"' | ']') => true,
                Some(c) if c.is_ascii_digit() || c == '-' => looks_like_number_list(rest),
                Some(_) => ["true", "false", "null"].iter().any(|kw| rest.starts_with(kw)),
                None => false,
            }
        }
        _ => false,
    }
}

/// `[1, 2, 3]` is JSON; `[1/3] Building` is a progress prefix.
fn looks_like_number_list(rest: &str) -> bool {
    rest.chars()
        .take_while(|c| !matches!(c, ',' | ']' | '\n'))
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;
    use OutputCategory::*;

    #[test]
    fn command_patterns() {
        let cases = [
            ("ls -la", List),
            ("docker ps -a", List),
            ("kubectl get pods", List),
            ("aws s3api list-buckets", List),
            ("grep -rn TODO src", Search),
            ("rg foo", Search),
            ("find . -name '*.rs'", Search),
            ("tail -f /var/log/syslog", Log),
            ("cat server.log", Log),
            ("journalctl -u nginx", Log),
            ("git log --oneline", Log),
            ("npm install", Install),
            ("npm i lodash", Install),
            ("pip3 install requests", Install),
            ("sudo apt-get install curl", Install),
            ("cargo build --release", Build),
            ("make -j8", Build),
            ("docker build .", Build),
            ("pytest -q", Test),
            ("cargo test", Test),
            ("npm run test", Test),
            ("echo hello", Default),
        ];
        for (command, expected) in cases {
            assert_eq!(detect(command, "plain output"), expected, "{command}");
        }
    }

    #[test]
    fn chained_commands_use_the_last_recognized_segment() {
        assert_eq!(detect("cd app && npm install", ""), Install);
        assert_eq!(detect("cat app.txt | grep ERROR", ""), Search);
        assert_eq!(detect("npm install; echo done", ""), Install);
        assert_eq!(detect("RUST_LOG=debug cargo test", ""), Test);
    }

    #[test]
    fn anchored_patterns_do_not_match_mid_word() {
        assert_eq!(detect("cmake ..", ""), Default);
        assert_eq!(detect("echo ls", ""), Default);
    }

    #[test]
    fn content_beats_command() {
        assert_eq!(detect("ls", r#"{"files": ["a", "b"]}"#), Json);
        assert_eq!(detect("npm install", "Tests: 3 passed, 3 total"), Test);
        assert_eq!(detect("echo", "webpack 5.88.2 compiled"), Build);
        assert_eq!(detect("./setup.sh", "added 120 packages in 4s"), Install);
    }

    #[test]
    fn test_counters_win_over_build_banners() {
        let cargo = "   Compiling foo v0.1.0\n    Finished `test` profile [unoptimized] target(s)\n\
                     test result: ok. 12 passed; 0 failed; 0 ignored";
        assert_eq!(detect("cargo test", cargo), Test);
    }

    #[test]
    fn json_sniffing() {
        assert!(looks_like_json("  {\"a\": 1}\n"));
        assert!(looks_like_json("[]"));
        assert!(looks_like_json("{}"));
        assert!(looks_like_json("[{\"id\": 1}, {\"id\": 2}]"));
        assert!(looks_like_json("[1, 2, 3]"));
        assert!(!looks_like_json("[INFO] starting server ]"));
        assert!(!looks_like_json("[1/3] Building fresh packages ]"));
        assert!(!looks_like_json("{ not json"));
        assert!(!looks_like_json(""));
    }

    #[test]
    fn invalid_json_with_json_shape_is_still_json_category() {
        assert_eq!(detect("curl api", "{\"truncated\": [1, 2"), Default);
        assert_eq!(detect("curl api", "{\"a\": oops}"), Json);
    }

    #[test]
    fn detection_is_deterministic() {
        let content = "line\n".repeat(100);
        let first = detect("tail -n 100 x", &content);
        for _ in 0..10 {
            assert_eq!(detect("tail -n 100 x", &content), first);
        }
    }

    #[test]
    fn empty_content_falls_through_to_command() {
        assert_eq!(detect("ls", ""), List);
        assert_eq!(detect("", ""), Default);
    }
}
