//! The render pipeline: `Preprocess -> Syntax -> Format -> Compose`.
//!
//! Each stage is individually timed into `StageMetrics`. A stage error (in
//! practice, only the externally-supplied syntax highlighter can fail,
//! since the rest of the pipeline is internal and infallible) falls back
//! to a minimal raw-bytes-plus-cursor-at-end render rather than panicking
//! or leaving stale output on screen.

use crate::cache::{cursor_fingerprint, RenderCache};
use crate::dirty::{DirtyOutcome, DirtyTracker};
use crate::metrics::StageMetrics;
use crate::prompt::PromptMetrics;
use core_model::{DisplayController, ModelError, RenderMetadata, RenderOutput, SyntaxHighlighter};
use core_text::{Buffer, Cursor};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("syntax highlighter panicked or failed")]
    Syntax,
}

pub struct RenderEngine {
    cache: RenderCache,
    dirty: DirtyTracker,
    metrics: StageMetrics,
}

impl RenderEngine {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: RenderCache::new(cache_capacity),
            dirty: DirtyTracker::new(),
            metrics: StageMetrics::default(),
        }
    }

    pub fn mark_dirty(&mut self, start_byte: usize, end_byte: usize) {
        self.dirty.mark(start_byte, end_byte);
    }

    /// Set memory-pressure mode: the next render is forced to full-redraw
    /// regardless of dirty ratio.
    pub fn set_memory_pressure(&mut self, pressure: bool) {
        self.dirty.set_memory_pressure(pressure);
    }

    /// Full invalidation: theme change, resize, or prompt change.
    pub fn invalidate(&mut self) {
        self.cache.invalidate_all();
        self.dirty.clear();
    }

    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    pub fn render(
        &mut self,
        buf: &Buffer,
        cursor: Cursor,
        prompt: &PromptMetrics,
        syntax: Option<&dyn SyntaxHighlighter>,
    ) -> RenderOutput {
        let key = (
            buf.modification_counter(),
            cursor_fingerprint(&cursor),
            prompt.fingerprint,
        );
        if let Some(cached) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            return cached;
        }
        self.metrics.record_cache_miss();

        let output = self
            .run_pipeline(buf, cursor, prompt, syntax)
            .unwrap_or_else(|err| {
                warn!(target: "render.pipeline", error = %err, "stage failed, falling back to raw render");
                self.metrics.record_fallback();
                fallback_render(buf, cursor, prompt)
            });
        self.metrics.record_render();
        self.cache.insert(key, output.clone());
        output
    }

    fn run_pipeline(
        &mut self,
        buf: &Buffer,
        cursor: Cursor,
        prompt: &PromptMetrics,
        syntax: Option<&dyn SyntaxHighlighter>,
    ) -> Result<RenderOutput, RenderError> {
        // Preprocess
        let t0 = Instant::now();
        let text = buf.text();
        let dirty_outcome = self.dirty.take(text.len());
        self.metrics
            .record_preprocess(t0.elapsed().as_nanos() as u64);

        // Syntax
        let t1 = Instant::now();
        let _spans = match syntax {
            Some(hl) => panic::catch_unwind(AssertUnwindSafe(|| hl.highlight(&text)))
                .map_err(|_| RenderError::Syntax)?,
            None => Vec::new(),
        };
        self.metrics.record_syntax(t1.elapsed().as_nanos() as u64);

        // Format
        let t2 = Instant::now();
        let content_length = text.len();
        let mut content_bytes = text.into_bytes();
        content_bytes.push(0); // content-framing contract: §4.5.4
        self.metrics.record_format(t2.elapsed().as_nanos() as u64);

        // Compose
        let t3 = Instant::now();
        let full_redraw = matches!(dirty_outcome, DirtyOutcome::Full);
        let dirty_ranges = match dirty_outcome {
            DirtyOutcome::Full => Vec::new(),
            DirtyOutcome::Partial(ranges) => ranges,
        };
        let cursor_terminal_row = prompt.last_line_index + cursor.line_number as u16;
        let cursor_terminal_col = prompt.command_start_col + cursor.visual_column as u16;
        self.metrics.record_compose(t3.elapsed().as_nanos() as u64);

        Ok(RenderOutput {
            content_bytes,
            content_length,
            cursor_terminal_row,
            cursor_terminal_col,
            dirty_ranges,
            metadata: RenderMetadata {
                full_redraw,
                line_count: cursor.line_number + 1,
            },
        })
    }
}

/// Minimal valid render used on pipeline failure: raw buffer bytes,
/// null-terminated, cursor placed at the end of the command.
fn fallback_render(buf: &Buffer, cursor: Cursor, prompt: &PromptMetrics) -> RenderOutput {
    let text = buf.text();
    let content_length = text.len();
    let mut content_bytes = text.into_bytes();
    content_bytes.push(0);
    RenderOutput {
        content_bytes,
        content_length,
        cursor_terminal_row: prompt.last_line_index + cursor.line_number as u16,
        cursor_terminal_col: prompt.command_start_col + cursor.visual_column as u16,
        dirty_ranges: Vec::new(),
        metadata: RenderMetadata {
            full_redraw: true,
            line_count: cursor.line_number + 1,
        },
    }
}

/// Submit a render output to the display controller, retrying once on
/// failure before surfacing the error to the caller (§4.5.7).
pub fn submit(
    controller: &mut dyn DisplayController,
    output: &RenderOutput,
    metrics: &StageMetrics,
) -> Result<(), ModelError> {
    match controller.submit(output) {
        Ok(()) => Ok(()),
        Err(_first_err) => {
            metrics.record_submit_retry();
            controller.submit(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::TerminalCapabilities;

    struct RecordingController {
        submitted: Vec<RenderOutput>,
        fail_times: usize,
    }

    impl DisplayController for RecordingController {
        fn submit(&mut self, output: &RenderOutput) -> Result<(), ModelError> {
            if self.fail_times > 0 {
                self.fail_times -= 1;
                return Err(ModelError::DisplaySubmit("injected failure".into()));
            }
            self.submitted.push(output.clone());
            Ok(())
        }
        fn capabilities(&self) -> TerminalCapabilities {
            TerminalCapabilities::detect()
        }
    }

    #[test]
    fn null_termination_contract_holds_after_shrink() {
        let mut engine = RenderEngine::new(8);
        let prompt = PromptMetrics::new("$ ");
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        let out1 = engine.render(&buf, buf.cursor(), &prompt, None);
        assert_eq!(out1.content_bytes.last(), Some(&0u8));
        assert_eq!(out1.content_length, 3);

        buf.delete_range(2, 3).unwrap();
        engine.mark_dirty(2, 3);
        let out2 = engine.render(&buf, buf.cursor(), &prompt, None);
        assert_eq!(out2.content_length, 2);
        assert_eq!(out2.content_bytes[out2.content_length], 0);
    }

    #[test]
    fn cache_hit_on_repeated_identical_state() {
        let mut engine = RenderEngine::new(8);
        let prompt = PromptMetrics::new("$ ");
        let buf = Buffer::from_str("t", "abc").unwrap();
        engine.render(&buf, buf.cursor(), &prompt, None);
        engine.render(&buf, buf.cursor(), &prompt, None);
        assert!(engine.cache_hit_rate() > 0.0);
        let snap = engine.metrics().snapshot();
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.cache_hits, 1);
    }

    #[test]
    fn cursor_column_accounts_for_themed_prompt() {
        let raw = "\u{1}\x1b[32m\u{2}user@host:\u{1}\x1b[0m\u{2}$ ";
        let prompt = PromptMetrics::new(raw);
        let mut engine = RenderEngine::new(8);
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        buf.move_to(2).unwrap();
        let out = engine.render(&buf, buf.cursor(), &prompt, None);
        assert_eq!(
            out.cursor_terminal_col,
            prompt.command_start_col + buf.cursor().visual_column as u16
        );
    }

    #[test]
    fn submit_retries_once_then_succeeds() {
        let metrics = StageMetrics::default();
        let mut controller = RecordingController {
            submitted: Vec::new(),
            fail_times: 1,
        };
        let output = RenderOutput {
            content_bytes: vec![0],
            content_length: 0,
            cursor_terminal_row: 0,
            cursor_terminal_col: 0,
            dirty_ranges: Vec::new(),
            metadata: RenderMetadata::default(),
        };
        submit(&mut controller, &output, &metrics).unwrap();
        assert_eq!(controller.submitted.len(), 1);
        assert_eq!(metrics.snapshot().submit_retries, 1);
    }
}
