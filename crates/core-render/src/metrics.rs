//! Render pipeline metrics: per-stage timing, cache effectiveness, and
//! fallback/retry counters, kept separate from the engine's control flow.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StageMetrics {
    pub preprocess_ns: AtomicU64,
    pub syntax_ns: AtomicU64,
    pub format_ns: AtomicU64,
    pub compose_ns: AtomicU64,
    pub renders: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub fallbacks: AtomicU64,
    pub submit_retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMetricsSnapshot {
    pub preprocess_ns: u64,
    pub syntax_ns: u64,
    pub format_ns: u64,
    pub compose_ns: u64,
    pub renders: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fallbacks: u64,
    pub submit_retries: u64,
}

impl StageMetrics {
    pub fn record_preprocess(&self, ns: u64) {
        self.preprocess_ns.store(ns, Ordering::Relaxed);
    }
    pub fn record_syntax(&self, ns: u64) {
        self.syntax_ns.store(ns, Ordering::Relaxed);
    }
    pub fn record_format(&self, ns: u64) {
        self.format_ns.store(ns, Ordering::Relaxed);
    }
    pub fn record_compose(&self, ns: u64) {
        self.compose_ns.store(ns, Ordering::Relaxed);
    }
    pub fn record_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_submit_retry(&self) {
        self.submit_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            preprocess_ns: self.preprocess_ns.load(Ordering::Relaxed),
            syntax_ns: self.syntax_ns.load(Ordering::Relaxed),
            format_ns: self.format_ns.load(Ordering::Relaxed),
            compose_ns: self.compose_ns.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            submit_retries: self.submit_retries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_values() {
        let m = StageMetrics::default();
        m.record_preprocess(10);
        m.record_render();
        m.record_cache_hit();
        let snap = m.snapshot();
        assert_eq!(snap.preprocess_ns, 10);
        assert_eq!(snap.renders, 1);
        assert_eq!(snap.cache_hits, 1);
    }
}
