//! Shared types and collaborator interfaces.
//!
//! This crate has no state of its own — it is the seam between the
//! readline engine and whatever the embedding application supplies: a
//! display surface, a syntax highlighter, a completion source, a history
//! store. The engine calls these traits; it never assumes a concrete
//! implementation, so a shell, a REPL, or a test harness can each plug in
//! their own.

use std::ops::Range;
use std::time::Duration;
use thiserror::Error;

pub use core_terminal::{TerminalCapabilities, TerminalFamily};

/// Errors a collaborator implementation can report back to the engine.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("display controller failed to submit output: {0}")]
    DisplaySubmit(String),
    #[error("completion source failed: {0}")]
    Completion(String),
    #[error("history store failed: {0}")]
    History(String),
}

/// A single highlighted span within a line, in byte offsets relative to
/// that line's start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpan {
    pub start: usize,
    pub end: usize,
    pub style: TextStyle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// What kind of thing a completion candidate names. Distinguishing, say, a
/// shell builtin from an external command of the same name is why
/// deduplication keys on `(text, kind)` rather than on text alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    Builtin,
    Command,
    Filename,
    Directory,
    Variable,
    /// A candidate whose provenance doesn't fit the other kinds (a history
    /// suggestion, an alias, etc).
    Other,
}

/// A single completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Text that replaces `[start_byte, end_byte)` in the buffer.
    pub replacement: String,
    /// What to show the user in a completion list (may differ from
    /// `replacement`, e.g. to show a trailing `/` on directories).
    pub display: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub kind: CompletionKind,
}

/// Flat render surface handed to the display controller each refresh. Not
/// a full-screen grid: a line editor's render surface is a prompt plus a
/// handful of logical lines, not an arbitrary-height viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub content_bytes: Vec<u8>,
    pub content_length: usize,
    pub cursor_terminal_row: u16,
    pub cursor_terminal_col: u16,
    pub dirty_ranges: Vec<Range<usize>>,
    pub metadata: RenderMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderMetadata {
    pub full_redraw: bool,
    pub line_count: usize,
}

/// Submits fully-composed frames to the real terminal (or a test double).
pub trait DisplayController: Send + Sync {
    fn submit(&mut self, output: &RenderOutput) -> Result<(), ModelError>;
    fn capabilities(&self) -> TerminalCapabilities;
}

/// Supplies per-line style spans. Implementations should be fast — this
/// runs on every keystroke's redraw.
pub trait SyntaxHighlighter: Send + Sync {
    fn highlight(&self, line: &str) -> Vec<StyleSpan>;
}

/// A no-op highlighter: every span is the default style. The fallback when
/// no embedder-supplied highlighter is configured.
pub struct PlainHighlighter;
impl SyntaxHighlighter for PlainHighlighter {
    fn highlight(&self, _line: &str) -> Vec<StyleSpan> {
        Vec::new()
    }
}

/// Supplies completion candidates for the text immediately before the
/// cursor.
pub trait CompletionSource: Send + Sync {
    fn complete(&self, buffer_text: &str, cursor_byte: usize) -> Result<Vec<Completion>, ModelError>;
}

/// Persists submitted lines and supports history navigation / search.
pub trait HistoryStore: Send + Sync {
    fn push(&mut self, entry: String) -> Result<(), ModelError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn get(&self, index: usize) -> Option<&str>;
    fn search_prefix(&self, prefix: &str) -> Vec<&str>;
}

/// In-memory `HistoryStore`, the default when an embedder doesn't supply
/// its own (e.g. a persistent, deduplicated, file-backed one).
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Vec<String>,
}

impl HistoryStore for MemoryHistory {
    fn push(&mut self, entry: String) -> Result<(), ModelError> {
        if !entry.is_empty() {
            self.entries.push(entry);
        }
        Ok(())
    }
    fn len(&self) -> usize {
        self.entries.len()
    }
    fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }
    fn search_prefix(&self, prefix: &str) -> Vec<&str> {
        self.entries
            .iter()
            .rev()
            .map(String::as_str)
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

/// Controls how render/parse buffers are sized and grown. Most embedders
/// never need anything beyond the default; it exists as a seam for callers
/// that want to pool or pre-size buffers for predictably-sized input
/// (e.g. a fixed-width embedded terminal).
pub trait Allocator: Send + Sync {
    fn allocate(&self, size_hint: usize) -> Vec<u8>;
}

pub struct DefaultAllocator;
impl Allocator for DefaultAllocator {
    fn allocate(&self, size_hint: usize) -> Vec<u8> {
        Vec::with_capacity(size_hint)
    }
}

/// Fixed-bucket latency histogram for lightweight internal performance
/// probes (render composition time, parser dispatch time). Buckets are
/// upper bounds in microseconds; the last bucket is an overflow catch-all.
pub struct LatencyHistogram {
    bucket_bounds_us: &'static [u64],
    counts: Vec<u64>,
    total: u64,
}

impl LatencyHistogram {
    const DEFAULT_BOUNDS_US: &'static [u64] = &[100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000];

    pub fn new() -> Self {
        Self {
            bucket_bounds_us: Self::DEFAULT_BOUNDS_US,
            counts: vec![0; Self::DEFAULT_BOUNDS_US.len() + 1],
            total: 0,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        let us = latency.as_micros() as u64;
        let idx = self
            .bucket_bounds_us
            .iter()
            .position(|&bound| us <= bound)
            .unwrap_or(self.bucket_bounds_us.len());
        self.counts[idx] += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Approximate the given percentile (0.0..=1.0) as the upper bound of
    /// the bucket containing it. Coarse by design — this is a cheap probe,
    /// not a precision instrument.
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        let target = (p.clamp(0.0, 1.0) * self.total as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (idx, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return Some(
                    self.bucket_bounds_us
                        .get(idx)
                        .copied()
                        .unwrap_or(u64::MAX),
                );
            }
        }
        None
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn memory_history_push_and_search() {
        let mut h = MemoryHistory::default();
        h.push("echo hi".into()).unwrap();
        h.push("echo bye".into()).unwrap();
        h.push("ls -la".into()).unwrap();
        let matches = h.search_prefix("echo");
        assert_eq!(matches, vec!["echo bye", "echo hi"]);
    }

    #[test]
    fn plain_highlighter_produces_no_spans() {
        assert!(PlainHighlighter.highlight("echo hi").is_empty());
    }

    #[test]
    fn histogram_percentile_is_monotonic() {
        let mut hist = LatencyHistogram::new();
        for us in [50, 150, 300, 800, 1_500, 3_000, 50_000] {
            hist.record(Duration::from_micros(us));
        }
        assert_eq!(hist.total(), 7);
        let p50 = hist.percentile(0.5).unwrap();
        let p99 = hist.percentile(0.99).unwrap();
        assert!(p50 <= p99);
    }

    #[test]
    fn default_allocator_respects_size_hint() {
        let buf = DefaultAllocator.allocate(128);
        assert!(buf.capacity() >= 128);
    }
}
