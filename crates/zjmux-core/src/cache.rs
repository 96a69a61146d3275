//! Short-lived memo of layout dumps, one entry per session key.
//!
//! Expired and never-set entries look the same to callers. Every
//! layout-mutating command must invalidate its session's entry right after it
//! runs, whether or not it succeeded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_LAYOUT_TTL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct LayoutCacheEntry {
    fetched_at: Instant,
    dump: String,
}

#[derive(Debug)]
pub struct LayoutCache {
    ttl: Duration,
    entries: HashMap<String, LayoutCacheEntry>,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(DEFAULT_LAYOUT_TTL)
    }
}

impl LayoutCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached dump for `key` if it was stored no more than `ttl` before `now`.
    pub fn get(&self, key: &str, now: Instant) -> Option<&str> {
        let entry = self.entries.get(key)?;
        (now.saturating_duration_since(entry.fetched_at) <= self.ttl).then_some(entry.dump.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, dump: impl Into<String>, now: Instant) {
        self.entries.insert(
            key.into(),
            LayoutCacheEntry {
                fetched_at: now,
                dump: dump.into(),
            },
        );
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drop expired entries so abandoned sessions do not accumulate.
    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.fetched_at) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
