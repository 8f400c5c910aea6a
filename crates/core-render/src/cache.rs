//! Render output cache, keyed by `(buffer_state, cursor_state, prompt_state)`.
//!
//! Hashing strategy: `ahash` for cursor/prompt fingerprints, combined with
//! the buffer's own `modification_counter` (already monotonic per mutation,
//! so it doubles as a cheap content fingerprint without re-hashing the
//! whole line on every keystroke). LRU eviction at a configurable capacity.

use ahash::AHasher;
use core_model::RenderOutput;
use core_text::Cursor;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

pub type CacheKey = (u64, u64, u64);

pub fn cursor_fingerprint(cursor: &Cursor) -> u64 {
    let mut hasher = AHasher::default();
    cursor.byte_offset.hash(&mut hasher);
    cursor.grapheme_index.hash(&mut hasher);
    cursor.line_number.hash(&mut hasher);
    cursor.visual_column.hash(&mut hasher);
    hasher.finish()
}

pub fn text_fingerprint(text: &str) -> u64 {
    let mut hasher = AHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

/// LRU cache of assembled render outputs. Expected hit rate is high during
/// cursor-only movement across an unchanged buffer (same key recurs).
pub struct RenderCache {
    capacity: usize,
    entries: HashMap<CacheKey, RenderOutput>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<RenderOutput> {
        if let Some(out) = self.entries.get(key) {
            self.hits += 1;
            self.touch(key);
            Some(out.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    pub fn insert(&mut self, key: CacheKey, output: RenderOutput) {
        if !self.entries.contains_key(&key) {
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
            self.order.push_back(key);
        } else {
            self.touch(&key);
        }
        self.entries.insert(key, output);
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.entries.remove(&oldest);
        }
    }

    /// Drop every cached entry. Used on theme change, resize, and prompt
    /// change, which invalidate every key wholesale rather than just the
    /// current one.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::RenderMetadata;

    fn sample(content_length: usize) -> RenderOutput {
        RenderOutput {
            content_bytes: vec![0u8; content_length],
            content_length,
            cursor_terminal_row: 0,
            cursor_terminal_col: 0,
            dirty_ranges: Vec::new(),
            metadata: RenderMetadata::default(),
        }
    }

    #[test]
    fn hit_after_insert() {
        let mut cache = RenderCache::new(4);
        let key = (1, 2, 3);
        assert!(cache.get(&key).is_none());
        cache.insert(key, sample(5));
        assert!(cache.get(&key).is_some());
        assert!(cache.hit_rate() > 0.0);
    }

    #[test]
    fn lru_eviction_drops_oldest() {
        let mut cache = RenderCache::new(2);
        cache.insert((1, 0, 0), sample(1));
        cache.insert((2, 0, 0), sample(2));
        cache.insert((3, 0, 0), sample(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&(1, 0, 0)).is_none());
        assert!(cache.get(&(2, 0, 0)).is_some());
        assert!(cache.get(&(3, 0, 0)).is_some());
    }

    #[test]
    fn invalidate_all_clears_cache() {
        let mut cache = RenderCache::new(4);
        cache.insert((1, 0, 0), sample(1));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn same_text_same_fingerprint() {
        assert_eq!(text_fingerprint("abc"), text_fingerprint("abc"));
        assert_ne!(text_fingerprint("abc"), text_fingerprint("abd"));
    }
}
