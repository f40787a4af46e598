//! End-to-end scenarios and property checks for the output pipeline.

use trimline::config::OutputConfig;
use trimline::output::cache::OutputCache;
use trimline::output::compressor::compress;
use trimline::output::detector::detect;
use trimline::output::semantic::{classify, is_critical};
use trimline::output::truncator::Truncator;
use trimline::output::{
    CategoryPolicy, DEFAULT_SAFETY_LIMIT, ImportanceTier, Optimization, OutputCategory,
    OutputManager, RawOutput, SharedOutputCache, Strategy,
};
use trimline::tools::{GetCachedOutput, Tool};

const ERROR_LINE: &str = "ERROR: connect ECONNREFUSED 10.0.0.5:443";

/// 900 lines: fetch chatter, five 40-line download progress runs, one
/// connection error at line 430, and the closing npm banner.
fn install_log() -> String {
    let runs = [(101, "alpha"), (201, "bravo"), (301, "charlie"), (501, "delta"), (601, "echo")];
    let mut lines = Vec::with_capacity(900);
    let mut i = 1;
    while i <= 900 {
        if let Some((_, name)) = runs.iter().find(|(start, _)| *start == i) {
            for k in 0..40 {
                let filled = k / 5;
                let bar = format!("{}{}", "#".repeat(filled), ".".repeat(8 - filled));
                lines.push(format!("Downloading {name} [{bar}] {}%", (k + 1) * 5 / 2));
            }
            i += 40;
            continue;
        }
        let line = match i {
            430 => ERROR_LINE.to_string(),
            900 => "added 512 packages, and audited 513 packages in 9s".to_string(),
            _ => format!("npm http fetch GET 200 https://registry.npmjs.org/pkg-{i:04} 12ms"),
        };
        lines.push(line);
        i += 1;
    }
    assert_eq!(lines.len(), 900);
    lines.join("\n") + "\n"
}

#[test]
fn install_log_keeps_the_error_and_caches_everything() {
    let manager = OutputManager::default();
    let log = install_log();
    let processed = manager.process(&RawOutput::new("npm install", log, 1));
    let result = &processed.result;

    assert_eq!(result.category, OutputCategory::Install);
    assert_eq!(result.strategy, Some(Strategy::FirstLast));
    assert!(result.shown_chars <= 8_000);

    let stats = result.compression.expect("compression stats");
    assert_eq!(stats.lines_before, 900);
    assert_eq!(stats.sequences_compressed, 5);
    assert_eq!(stats.lines_after, 705);
    assert_eq!(result.total_lines, 705);

    // The error sits far outside both the head and the tail window.
    assert!(result.text.lines().any(|l| l == ERROR_LINE));
    assert!(result.has_optimization(Optimization::Compression));
    assert!(result.has_optimization(Optimization::SemanticPreservation));
    assert_eq!(result.critical_dropped, 0);

    let cached = manager.cache().get("cmd_001").expect("cached");
    assert_eq!(cached.lines().count(), 705);
    assert!(cached.contains(ERROR_LINE));
    assert!(cached.starts_with("npm http fetch GET 200"));
    assert!(cached.contains("Downloading charlie [#######.] 100%"));
    assert!(!cached.contains("Downloading charlie [#.......] 15%"));

    let summary = &processed.summary;
    assert!(summary.contains("OUTPUT SUMMARY"));
    assert!(summary.contains("Category: install | Strategy: first_last (20% first + 80% last)"));
    assert!(summary.contains("Progress bars compressed (saved 195 lines)"));
    assert!(summary.contains("Cache ID: cmd_001"));
    assert!(summary.contains("Exit code: 1"));
    assert!(summary.contains(r#"get_cached_output(cache_id="cmd_001", lines="-100")"#));
}

#[tokio::test]
async fn cached_tail_and_missing_id_through_the_tool() {
    let manager = OutputManager::default();
    manager.process(&RawOutput::new("npm install", install_log(), 1));
    let tool = GetCachedOutput::new(manager.cache().clone());

    let cached = manager.cache().get("cmd_001").unwrap();
    let all: Vec<&str> = cached.lines().collect();
    let expected = all[all.len() - 50..].join("\n");

    let tail = tool.lookup("cmd_001", Some("-50")).unwrap();
    assert!(tail.found);
    assert_eq!(tail.text, expected);
    assert_eq!(
        tool.execute(r#"{"cache_id": "cmd_001", "lines": "-50"}"#).await,
        expected
    );

    let missing = tool.lookup("cmd_999", None).unwrap();
    assert!(!missing.found);
    let reply = tool.execute(r#"{"cache_id": "cmd_999"}"#).await;
    assert!(reply.contains("not found"));
}

#[test]
fn directory_listing_is_cut_on_line_boundaries() {
    let entries: Vec<String> = (0..200)
        .map(|i| format!("src/components/widget_panel_{i:03}.tsx"))
        .collect();
    let listing = entries.join("\n") + "\n";
    assert!(listing.chars().count() > 6_500);

    let processed = OutputManager::default().process(&RawOutput::new("ls -1 src/components", listing, 0));
    let result = &processed.result;
    assert_eq!(result.category, OutputCategory::List);
    assert_eq!(result.strategy, Some(Strategy::FirstOnly));
    assert!(result.shown_chars <= 5_000);
    assert!(result.shown_lines < 200);

    let shown: Vec<&str> = result.text.lines().collect();
    assert_eq!(shown.len(), result.shown_lines);
    assert_eq!(shown, entries[..shown.len()].iter().map(String::as_str).collect::<Vec<_>>());

    assert!(processed.summary.contains("(200 lines)"));
    assert!(processed.summary.contains(&format!("({} lines)", result.shown_lines)));
    assert!(processed.summary.contains("Strategy: first_only"));
}

#[test]
fn build_warnings_in_the_middle_survive_truncation() {
    let mut lines: Vec<String> = (1..=800)
        .map(|i| format!("cc -O2 -c src/mod_{i:03}.c -o build/mod_{i:03}.o"))
        .collect();
    lines[399] = "warning: deprecated API 'sock_open_v1' used in src/mod_400.c".into();
    lines[400] = "Summary: 3 warnings".into();

    let processed = OutputManager::default().process(&RawOutput::new("./build.sh", lines.join("\n"), 0));
    let result = &processed.result;
    assert_eq!(result.category, OutputCategory::Default);
    assert_eq!(result.strategy, Some(Strategy::FirstLast));
    assert!(result.shown_chars <= 8_000);
    assert!(result.text.contains("warning: deprecated API 'sock_open_v1'"));
    assert!(result.text.contains("Summary: 3 warnings"));
    assert!(result.has_optimization(Optimization::SemanticPreservation));
    assert_eq!(result.tiers.high, 2);
}

#[test]
fn entry_larger_than_the_whole_cache_is_stored_then_evicted() {
    let cache = SharedOutputCache::new(OutputCache::new(1_000));
    let huge = "x".repeat(5_000);

    let big = cache.put("cat huge.bin", huge.as_str());
    assert_eq!(cache.get(&big.to_string()).as_deref(), Some(huge.as_str()));

    let small = cache.put("echo hi", "hi");
    assert_eq!(cache.get(&big.to_string()), None);
    assert_eq!(cache.get(&small.to_string()).as_deref(), Some("hi"));
    assert_eq!(cache.stats().evictions, 1);
}

// ── Property families ──────────────────────────────────────────────

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> usize {
        (self.next() % n) as usize
    }
}

/// Mixed output with at most three critical lines.
fn generated_output(rng: &mut Lcg) -> String {
    let n = 50 + rng.below(600);
    let mut criticals = 0;
    let mut lines = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        match rng.below(20) {
            0 if criticals < 3 => {
                criticals += 1;
                lines.push(format!("error[E{:04}]: step {i} failed", rng.below(9999)));
            }
            1 => lines.push(format!("warning: slow response on step {i}")),
            2 => {
                let len = 2 + rng.below(12);
                for k in 0..len {
                    lines.push(format!("Fetching index [{}] {}%", "#".repeat(k % 8 + 1), k * 7));
                }
                i += len;
                continue;
            }
            _ => lines.push(format!(
                "step {i}: processed record {} in {} us",
                rng.next() % 100_000,
                rng.below(900)
            )),
        }
        i += 1;
    }
    lines.join("\n")
}

fn is_marker(line: &str) -> bool {
    line.starts_with("... [") && line.ends_with("omitted] ...")
}

#[test]
fn truncation_properties_hold_for_generated_output() {
    let mut rng = Lcg(0x5eed);
    let strategies = [Strategy::FirstOnly, Strategy::LastOnly, Strategy::FirstLast];
    for round in 0..120 {
        let text = generated_output(&mut rng);
        let lines: Vec<&str> = text.split('\n').collect();
        let tiers = classify(&lines);
        let budget = 1_000 + rng.below(9_000);
        let strategy = strategies[round % strategies.len()];
        let result = Truncator::default().truncate(
            &lines,
            &tiers,
            OutputCategory::Default,
            CategoryPolicy::new(budget, strategy),
        );

        // Character limit.
        assert!(result.shown_chars <= budget.min(DEFAULT_SAFETY_LIMIT), "round {round}");
        assert_eq!(result.text.chars().count(), result.shown_chars, "round {round}");

        // Line boundaries: every shown line is an original line or a marker.
        for line in result.text.split('\n') {
            assert!(lines.contains(&line) || is_marker(line), "round {round}: {line:?}");
        }

        // Critical preservation.
        let shown: Vec<&str> = result.text.split('\n').collect();
        for (line, tier) in lines.iter().zip(&tiers) {
            if *tier == ImportanceTier::Critical {
                assert!(shown.contains(line), "round {round}: lost {line:?}");
            }
        }
        assert_eq!(result.critical_dropped, 0);
    }
}

#[test]
fn manager_output_respects_category_budget_and_safety_ceiling() {
    let mut rng = Lcg(42);
    let commands = ["ls -la", "grep -r foo .", "tail -f app.log", "npm install", "make", "pytest", "./run.sh"];
    for round in 0..60 {
        let safety = 2_000 + rng.below(8_000);
        let config = OutputConfig::default().with_safety_limit(safety);
        let manager = OutputManager::new(config.clone());
        let command = commands[round % commands.len()];
        let processed = manager.process(&RawOutput::new(command, generated_output(&mut rng), 0));
        let result = &processed.result;
        let bound = config.policy_for(result.category).budget.min(safety);
        assert!(result.shown_chars <= bound, "round {round}: {command}");
        assert!(processed.summary.contains("cmd_001"));
    }
}

#[test]
fn compression_is_idempotent() {
    let mut rng = Lcg(7);
    for _ in 0..80 {
        let text = generated_output(&mut rng);
        let once = compress(&text);
        let twice = compress(&once.text);
        assert_eq!(twice.text, once.text);
        assert!(!twice.applied());
        // Critical lines are never collapsed away.
        for line in text.split('\n').filter(|l| is_critical(l)) {
            assert!(once.text.split('\n').any(|l| l == line));
        }
    }
}

#[test]
fn cache_round_trip_is_byte_exact() {
    let mut rng = Lcg(99);
    let mut cache = OutputCache::default();
    let mut stored = Vec::new();
    for _ in 0..25 {
        let text = generated_output(&mut rng) + "\n\n  trailing  \r\n";
        let id = cache.put("cmd", text.as_str());
        stored.push((id, text));
    }
    for (id, text) in &stored {
        assert_eq!(cache.get(&id.to_string()).as_deref(), Some(text.as_str()));
    }
}

#[test]
fn detection_is_pure_and_content_first() {
    let cases = [
        ("ls", "{\"name\": \"x\"}"),
        ("npm install", "test result: ok. 3 passed; 0 failed"),
        ("cat build.log", "Compiled successfully in 2.1s"),
        ("grep -rn TODO src", "src/main.rs:10: // TODO"),
        ("./script.sh", "hello"),
        ("", ""),
    ];
    for (command, content) in cases {
        let first = detect(command, content);
        for _ in 0..3 {
            assert_eq!(detect(command, content), first);
        }
    }
    assert_eq!(detect(cases[0].0, cases[0].1), OutputCategory::Json);
    assert_eq!(detect(cases[1].0, cases[1].1), OutputCategory::Test);
    assert_eq!(detect(cases[2].0, cases[2].1), OutputCategory::Build);
    assert_eq!(detect(cases[3].0, cases[3].1), OutputCategory::Search);
    assert_eq!(detect(cases[4].0, cases[4].1), OutputCategory::Default);
}

#[test]
fn invalid_json_falls_back_without_error() {
    let body: String = (0..4_000).map(|i| format!("  \"key{i}\": value{i},\n")).collect();
    let broken = format!("{{\n{body}}}");
    let processed = OutputManager::default().process(&RawOutput::new("curl -s api", broken, 0));
    assert!(!processed.result.has_optimization(Optimization::JsonAnalysis));
    assert!(processed.result.was_truncated());
    assert!(processed.result.shown_chars <= 8_000);
    assert!(processed.summary.contains("Cache ID: cmd_001"));
}
