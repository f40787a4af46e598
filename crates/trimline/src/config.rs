//! Configuration for the output pipeline.
//!
//! Every field has a built-in default, so an empty JSON object (or no file
//! at all) yields a complete configuration. Per-category budgets and
//! strategies are sparse overrides on top of the built-in table; a category
//! that is not mentioned keeps its default.
//!
//! ```json
//! {
//!   "limits": { "log": 30000, "list": 2000 },
//!   "strategies": { "test": "last_only" },
//!   "first_last_ratio": 0.3,
//!   "cache": { "enabled": true, "config": { "max_size_mb": 50 } }
//! }
//! ```
//!
//! Inconsistent values (a zero budget, a ratio outside `(0, 1)`, a zero
//! cache size) are never fatal: [`OutputConfig::sanitized`] replaces them
//! with the built-in default and logs a warning. Budgets too small to hold
//! a hard-cut marker are raised to [`MIN_MARKED_BUDGET`].

use crate::output::cache::DEFAULT_MAX_SIZE_MB;
use crate::output::truncator::{DEFAULT_HEAD_RATIO, MIN_MARKED_BUDGET};
use crate::output::{CategoryPolicy, DEFAULT_SAFETY_LIMIT, OutputCategory, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

// ── Generic toggle ────────────────────────────────────────────────

/// Enabled/disabled wrapper for an optional component's configuration.
/// When `enabled` is `false` the component is skipped regardless of the
/// inner values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle<T: Default> {
    pub enabled: bool,
    pub config: T,
}

impl<T: Default> Toggle<T> {
    /// A disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

/// Output cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Aggregate budget for cached output, in megabytes.
    pub max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ── OutputConfig ───────────────────────────────────────────────────

/// The complete configuration surface of the output pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Master switch. When off, the model sees the normalized output
    /// clamped to the safety ceiling, and nothing is cached.
    pub enabled: bool,
    /// Append the summary block to the model text.
    pub show_summary: bool,
    /// Per-category character budget overrides.
    pub limits: BTreeMap<OutputCategory, usize>,
    /// Per-category strategy overrides.
    pub strategies: BTreeMap<OutputCategory, Strategy>,
    /// Head share for `first_last`.
    pub first_last_ratio: f64,
    /// Absolute ceiling on characters shown to the model.
    pub safety_limit: usize,
    /// Collapse progress-bar runs before accounting.
    pub compression: bool,
    /// Splice critical lines back into truncated output.
    pub semantic: bool,
    pub cache: Toggle<CacheConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_summary: true,
            limits: BTreeMap::new(),
            strategies: BTreeMap::new(),
            first_last_ratio: DEFAULT_HEAD_RATIO,
            safety_limit: DEFAULT_SAFETY_LIMIT,
            compression: true,
            semantic: true,
            cache: Toggle::default(),
        }
    }
}

impl OutputConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.sanitized())
    }

    /// Replace inconsistent values with built-in defaults, warning once per
    /// replacement.
    pub fn sanitized(mut self) -> Self {
        self.limits.retain(|category, budget| {
            if *budget == 0 {
                warn!(%category, "Ignoring zero character budget; using built-in default");
                false
            } else {
                if *budget < MIN_MARKED_BUDGET {
                    warn!(%category, budget = *budget, "Character budget too small; using {MIN_MARKED_BUDGET}");
                    *budget = MIN_MARKED_BUDGET;
                }
                true
            }
        });
        if !(self.first_last_ratio > 0.0 && self.first_last_ratio < 1.0) {
            warn!(
                ratio = self.first_last_ratio,
                "first_last_ratio must be in (0, 1); using {DEFAULT_HEAD_RATIO}"
            );
            self.first_last_ratio = DEFAULT_HEAD_RATIO;
        }
        if self.safety_limit == 0 {
            warn!("safety_limit must be positive; using {DEFAULT_SAFETY_LIMIT}");
            self.safety_limit = DEFAULT_SAFETY_LIMIT;
        } else if self.safety_limit < MIN_MARKED_BUDGET {
            warn!(
                limit = self.safety_limit,
                "safety_limit too small; using {MIN_MARKED_BUDGET}"
            );
            self.safety_limit = MIN_MARKED_BUDGET;
        }
        if self.cache.config.max_size_mb == 0 {
            warn!("cache.max_size_mb must be positive; using {DEFAULT_MAX_SIZE_MB}");
            self.cache.config.max_size_mb = DEFAULT_MAX_SIZE_MB;
        }
        self
    }

    /// Budget and strategy for `category`, falling back to the built-in
    /// table for anything not overridden.
    pub fn policy_for(&self, category: OutputCategory) -> CategoryPolicy {
        let builtin = CategoryPolicy::builtin(category);
        CategoryPolicy {
            budget: self
                .limits
                .get(&category)
                .copied()
                .filter(|b| *b > 0)
                .unwrap_or(builtin.budget),
            strategy: self
                .strategies
                .get(&category)
                .copied()
                .unwrap_or(builtin.strategy),
        }
    }

    /// Cache budget in bytes, or `None` when caching is disabled.
    pub fn cache_max_bytes(&self) -> Option<usize> {
        self.cache
            .enabled
            .then(|| self.cache.config.max_size_mb.saturating_mul(1024 * 1024))
    }

    // ── Builder methods ───────────────────────────────────────────

    pub fn with_limit(mut self, category: OutputCategory, budget: usize) -> Self {
        self.limits.insert(category, budget);
        self
    }

    pub fn with_strategy(mut self, category: OutputCategory, strategy: Strategy) -> Self {
        self.strategies.insert(category, strategy);
        self
    }

    pub fn with_first_last_ratio(mut self, ratio: f64) -> Self {
        self.first_last_ratio = ratio;
        self
    }

    pub fn with_safety_limit(mut self, limit: usize) -> Self {
        self.safety_limit = limit;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_semantic(mut self, enabled: bool) -> Self {
        self.semantic = enabled;
        self
    }

    pub fn with_summary(mut self, show: bool) -> Self {
        self.show_summary = show;
        self
    }

    pub fn with_cache_size_mb(mut self, max_size_mb: usize) -> Self {
        self.cache = Toggle {
            enabled: true,
            config: CacheConfig { max_size_mb },
        };
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = Toggle::disabled();
        self
    }

    /// Pass-through mode: no truncation, summary, or caching.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
