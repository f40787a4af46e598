//! Conversation-scoped cache of full command output.
//!
//! Every processed command stores its full (compressed, untruncated) text
//! here under a sequential id (`cmd_001`, `cmd_002`, ...), so the model can
//! later pull any range back with `get_cached_output`. The cache never holds
//! a truncated copy.
//!
//! The cache is bounded by total bytes. When an insert pushes it over the
//! budget, least-recently-accessed entries are evicted until it fits again.
//! An entry larger than the whole budget is still stored; it becomes the
//! first eviction candidate on the next insert.

use super::range::RangeSpec;
use super::{char_len, clamp_to_line_boundary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

const BYTES_PER_MB: usize = 1024 * 1024;

/// Default aggregate budget in megabytes.
pub const DEFAULT_MAX_SIZE_MB: usize = 100;

// ── CacheId ────────────────────────────────────────────────────────

/// Sequential cache identifier, rendered as `cmd_NNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(u32);

impl CacheId {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd_{:03}", self.0)
    }
}

impl FromStr for CacheId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix("cmd_")
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .map(CacheId)
            .ok_or_else(|| format!("invalid cache id '{s}' (expected e.g. 'cmd_001')"))
    }
}

impl Serialize for CacheId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Entries and stats ──────────────────────────────────────────────

/// A cached command output.
#[derive(Debug, Clone)]
struct CacheEntry {
    text: String,
    command: String,
    created_at: DateTime<Utc>,
    /// Access tick of the last `put` or `get`; lowest is evicted first.
    last_access: u64,
}

impl CacheEntry {
    fn size_bytes(&self) -> usize {
        self.text.len()
    }
}

/// Metadata for one resident entry, as returned by [`OutputCache::entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub id: CacheId,
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: usize,
    pub lines: usize,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub max_size_bytes: usize,
    pub next_id: CacheId,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
}

/// Result of a cache lookup for the tool surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedOutput {
    pub text: String,
    pub found: bool,
}

impl CachedOutput {
    pub fn miss() -> Self {
        Self {
            text: String::new(),
            found: false,
        }
    }
}

// ── OutputCache ────────────────────────────────────────────────────

/// Size-bounded LRU cache keyed by sequential [`CacheId`]s.
#[derive(Debug)]
pub struct OutputCache {
    entries: HashMap<CacheId, CacheEntry>,
    max_bytes: usize,
    total_bytes: usize,
    /// Last id handed out; reset on `clear`.
    counter: u32,
    /// Monotonic access clock for LRU ordering.
    tick: u64,
    safety_limit: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl OutputCache {
    /// Create a cache bounded to `max_bytes` of stored text.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_bytes,
            total_bytes: 0,
            counter: 0,
            tick: 0,
            safety_limit: super::DEFAULT_SAFETY_LIMIT,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Create a cache bounded to `max_size_mb` megabytes.
    pub fn with_max_size_mb(max_size_mb: usize) -> Self {
        Self::new(max_size_mb.saturating_mul(BYTES_PER_MB))
    }

    /// Ceiling applied by unranged [`get_range`](Self::get_range) reads.
    pub fn with_safety_limit(mut self, limit: usize) -> Self {
        self.safety_limit = limit;
        self
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Store `text` and return its id. Evicts least-recently-accessed
    /// entries (never the new one) while the cache is over budget.
    pub fn put(&mut self, command: &str, text: impl Into<String>) -> CacheId {
        self.counter += 1;
        let id = CacheId(self.counter);
        let last_access = self.next_tick();
        let entry = CacheEntry {
            text: text.into(),
            command: command.to_string(),
            created_at: Utc::now(),
            last_access,
        };
        self.total_bytes += entry.size_bytes();
        debug!(%id, bytes = entry.size_bytes(), total = self.total_bytes, "Cached output");
        self.entries.insert(id, entry);
        self.evict_until_within_budget(id);
        id
    }

    fn evict_until_within_budget(&mut self, keep: CacheId) {
        while self.total_bytes > self.max_bytes {
            let Some(victim) = self
                .entries
                .iter()
                .filter(|(id, _)| **id != keep)
                .min_by_key(|(_, e)| e.last_access)
                .map(|(id, _)| *id)
            else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&victim) {
                self.total_bytes -= evicted.size_bytes();
                self.evictions += 1;
                debug!(id = %victim, bytes = evicted.size_bytes(), "Evicted cached output");
            }
        }
    }

    fn lookup(&mut self, id: &str) -> Option<&CacheEntry> {
        let Ok(id) = id.parse::<CacheId>() else {
            self.misses += 1;
            trace!(id, "Cache miss (malformed id)");
            return None;
        };
        let tick = self.next_tick();
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.last_access = tick;
                self.hits += 1;
                trace!(%id, "Cache hit");
                Some(entry)
            }
            None => {
                self.misses += 1;
                trace!(%id, "Cache miss");
                None
            }
        }
    }

    /// The exact text stored under `id`, or `None` if it was never issued
    /// or has been evicted. Counts as an access for LRU.
    pub fn get(&mut self, id: &str) -> Option<String> {
        self.lookup(id).map(|e| e.text.clone())
    }

    /// Retrieve `id` with an optional range. Without a range the full text
    /// is returned, clamped to the safety ceiling with a notice when it
    /// exceeds it.
    pub fn get_range(&mut self, id: &str, range: Option<&RangeSpec>) -> CachedOutput {
        let safety_limit = self.safety_limit;
        let Some(entry) = self.lookup(id) else {
            return CachedOutput::miss();
        };
        let text = match range {
            Some(range) => range.apply(&entry.text),
            None if char_len(&entry.text) > safety_limit => {
                let shown = clamp_to_line_boundary(&entry.text, safety_limit);
                format!("{shown}{}", safety_notice(safety_limit))
            }
            None => entry.text.clone(),
        };
        CachedOutput { text, found: true }
    }

    /// Drop every entry and restart ids at `cmd_001`. Hit/miss counters
    /// are kept.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.total_bytes = 0;
        self.counter = 0;
        debug!(dropped, "Cleared output cache");
    }

    pub fn contains(&self, id: CacheId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            total_size_bytes: self.total_bytes,
            max_size_bytes: self.max_bytes,
            next_id: CacheId(self.counter + 1),
            hits: self.hits,
            misses: self.misses,
            hit_rate: self.hit_rate(),
            evictions: self.evictions,
        }
    }

    /// Resident entries in id order.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let mut infos: Vec<EntryInfo> = self
            .entries
            .iter()
            .map(|(id, e)| EntryInfo {
                id: *id,
                command: e.command.clone(),
                created_at: e.created_at,
                size_bytes: e.size_bytes(),
                lines: super::count_lines(&e.text),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

impl Default for OutputCache {
    fn default() -> Self {
        Self::with_max_size_mb(DEFAULT_MAX_SIZE_MB)
    }
}

fn safety_notice(limit: usize) -> String {
    format!(
        "\n\n[Output truncated to safety limit: {limit} chars]\n\
         Use the lines parameter to retrieve specific sections:\n  \
         - lines='+100' for the first 100 lines\n  \
         - lines='-100' for the last 100 lines\n  \
         - lines='+50,-50' for the first 50 and last 50 lines"
    )
}

// ── SharedOutputCache ──────────────────────────────────────────────

/// A cloneable handle that serializes all cache access behind a mutex.
///
/// The pipeline writes through one handle while tools read through another;
/// `put`, `get` and `clear` never interleave, so eviction cannot be observed
/// half-done.
#[derive(Debug, Clone, Default)]
pub struct SharedOutputCache {
    inner: Arc<Mutex<OutputCache>>,
}

impl SharedOutputCache {
    pub fn new(cache: OutputCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Lock the cache, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, OutputCache> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put(&self, command: &str, text: impl Into<String>) -> CacheId {
        self.lock().put(command, text)
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.lock().get(id)
    }

    pub fn get_range(&self, id: &str, range: Option<&RangeSpec>) -> CachedOutput {
        self.lock().get_range(id, range)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn entries(&self) -> Vec<EntryInfo> {
        self.lock().entries()
    }
}
