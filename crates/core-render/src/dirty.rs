//! Dirty byte-range tracking.
//!
//! Editing operations record `(start_byte, end_byte)` intervals instead of
//! line indices — a single-line-editor buffer has no viewport to intersect
//! against, so the tracker's only job is deciding full-redraw vs partial
//! repaint.

use std::ops::Range;

const MERGE_PROXIMITY: usize = 64;
const FULL_REDRAW_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyOutcome {
    Full,
    Partial(Vec<Range<usize>>),
}

#[derive(Debug, Default)]
pub struct DirtyTracker {
    ranges: Vec<Range<usize>>,
    memory_pressure: bool,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.ranges.push(start..end);
    }

    /// Flag memory pressure, which forces the next `take` to report `Full`
    /// regardless of dirty ratio.
    pub fn set_memory_pressure(&mut self, pressure: bool) {
        self.memory_pressure = pressure;
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Consume tracked ranges, merging any within `MERGE_PROXIMITY` bytes of
    /// each other, and decide whether the merged dirty span covers more than
    /// half of `buffer_len` (in which case a full redraw is cheaper than a
    /// patchwork of partial writes).
    pub fn take(&mut self, buffer_len: usize) -> DirtyOutcome {
        let pressure = self.memory_pressure;
        self.memory_pressure = false;
        if self.ranges.is_empty() {
            return DirtyOutcome::Partial(Vec::new());
        }
        let mut ranges = std::mem::take(&mut self.ranges);
        ranges.sort_by_key(|r| r.start);
        let merged = merge_ranges(ranges);

        if pressure {
            return DirtyOutcome::Full;
        }
        if buffer_len > 0 {
            let dirty_bytes: usize = merged.iter().map(|r| r.end - r.start).sum();
            if dirty_bytes as f64 / buffer_len as f64 > FULL_REDRAW_RATIO {
                return DirtyOutcome::Full;
            }
        }
        DirtyOutcome::Partial(merged)
    }
}

fn merge_ranges(ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut out: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(last) if r.start <= last.end.saturating_add(MERGE_PROXIMITY) => {
                if r.end > last.end {
                    last.end = r.end;
                }
            }
            _ => out.push(r),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_ranges_merge_within_threshold() {
        let mut t = DirtyTracker::new();
        t.mark(0, 10);
        t.mark(20, 30);
        match t.take(1000) {
            DirtyOutcome::Partial(ranges) => assert_eq!(ranges, vec![0..30]),
            DirtyOutcome::Full => panic!("expected partial"),
        }
    }

    #[test]
    fn distant_ranges_stay_separate() {
        let mut t = DirtyTracker::new();
        t.mark(0, 5);
        t.mark(500, 505);
        match t.take(1000) {
            DirtyOutcome::Partial(ranges) => assert_eq!(ranges, vec![0..5, 500..505]),
            DirtyOutcome::Full => panic!("expected partial"),
        }
    }

    #[test]
    fn majority_dirty_promotes_full() {
        let mut t = DirtyTracker::new();
        t.mark(0, 60);
        match t.take(100) {
            DirtyOutcome::Full => {}
            DirtyOutcome::Partial(_) => panic!("expected full redraw"),
        }
    }

    #[test]
    fn memory_pressure_forces_full() {
        let mut t = DirtyTracker::new();
        t.mark(0, 1);
        t.set_memory_pressure(true);
        match t.take(1000) {
            DirtyOutcome::Full => {}
            DirtyOutcome::Partial(_) => panic!("expected full redraw under pressure"),
        }
    }

    #[test]
    fn empty_tracker_is_empty_partial() {
        let mut t = DirtyTracker::new();
        assert!(t.is_empty());
        assert_eq!(t.take(1000), DirtyOutcome::Partial(Vec::new()));
    }
}
