//! Rope-based edit buffer with a five-coordinate cursor, diff-based
//! undo/redo, and shell-aware multiline tracking.
//!
//! The byte store is a `ropey::Rope`. Cursor and index bookkeeping sit on
//! top of it: `Cursor`'s five coordinates (`byte_offset`, `codepoint_index`,
//! `grapheme_index`, `line_number`, `visual_column`) all describe the same
//! logical position, re-derived from `byte_offset` on every move so they
//! cannot drift apart.

use ropey::Rope;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tracing::trace;

pub mod multiline;
pub mod segment;
pub mod width;

pub use multiline::{LineType, MultilineContext, QuoteMode};
pub use width::egc_width;

/// Errors surfaced by buffer mutation APIs (`spec` error taxonomy: invalid
/// argument / UTF-8 error).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    #[error("byte offset {0} is not a UTF-8 boundary")]
    NonUtf8Boundary(usize),
    #[error("byte range [{0}, {1}) does not lie on grapheme boundaries")]
    NonGraphemeBoundary(usize, usize),
    #[error("byte offset {0} is out of range (len={1})")]
    OutOfRange(usize, usize),
}

/// Errors from [`Buffer::validate`] (spec error taxonomy: validation failure).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content at byte {0} is not valid UTF-8")]
    InvalidUtf8(usize),
    #[error("cursor coordinates are mutually inconsistent")]
    CursorInconsistent,
    #[error("line table does not partition the buffer: expected {expected} bytes, lines cover {actual}")]
    LineTableInconsistent { expected: usize, actual: usize },
    #[error("checksum mismatch: recorded {recorded:#x} actual {actual:#x}")]
    ChecksumMismatch { recorded: u64, actual: u64 },
}

/// The cursor's five mutually-consistent coordinates plus a sticky vertical
/// anchor. `byte_offset`, `codepoint_index`, and `grapheme_index` describe
/// the same absolute buffer position in three units; `line_number` and
/// `visual_column` are that same position's 2-D screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub byte_offset: usize,
    pub codepoint_index: usize,
    pub grapheme_index: usize,
    pub line_number: usize,
    pub visual_column: usize,
    pub preferred_column: Option<usize>,
}

/// A single physical line's metadata: byte extent, size in every unit the
/// render layer cares about, and its role in the buffer's shell-
/// continuation structure (plain command line, continuation, inside an
/// open quote, heredoc body, or inside unbalanced `(`/`{` nesting) — what
/// lets the display bridge draw a different continuation marker for each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub start_byte: usize,
    pub end_byte: usize,
    pub byte_length: usize,
    pub codepoint_count: usize,
    pub grapheme_count: usize,
    pub visual_width: usize,
    pub line_type: LineType,
    pub multiline_state: MultilineContext,
    pub indent_level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
}

/// A single undoable mutation. Owns whatever bytes it needs to invert
/// itself (and to re-apply itself on redo); nothing about undo depends on
/// a whole-buffer clone.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub byte_position: usize,
    /// Bytes removed by this change (`Delete`/`Replace`); `None` for a pure
    /// `Insert`. Re-inserted at `byte_position` on undo.
    pub removed_bytes: Option<Vec<u8>>,
    /// Bytes inserted by this change (`Insert`/`Replace`); `None` for a pure
    /// `Delete`. Re-inserted at `byte_position` on redo.
    pub inserted_bytes: Option<Vec<u8>>,
    pub saved_cursor: Cursor,
    pub timestamp: Instant,
}

/// Bounded undo/redo stacks. Every mutation pushes to undo and clears redo;
/// eviction happens at a fixed cap rather than growing unbounded.
pub const UNDO_HISTORY_MAX: usize = 1024;

#[derive(Debug, Default)]
struct UndoEngine {
    undo_stack: VecDeque<Change>,
    redo_stack: Vec<Change>,
}

impl UndoEngine {
    fn push(&mut self, change: Change) {
        self.undo_stack.push_back(change);
        if self.undo_stack.len() > UNDO_HISTORY_MAX {
            self.undo_stack.pop_front();
            trace!(target: "text.undo", "undo_stack_trimmed");
        }
        self.redo_stack.clear();
    }

    fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }
    fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }
}

/// Thin wrapper around ropey's own byte<->char index, kept as an explicit
/// stale-markable cache so the lazy-rebuild contract is observable and
/// testable on its own, even though ropey resolves `byte_to_char` in
/// O(log n) without a separate materialized table.
#[derive(Debug, Default)]
struct Utf8Index {
    stale: bool,
}

impl Utf8Index {
    fn mark_stale(&mut self) {
        self.stale = true;
    }
    fn rebuild_if_stale(&mut self) {
        self.stale = false;
    }
}

/// A UTF-8 edit buffer: the in-scope "Buffer" entity of the data model.
pub struct Buffer {
    rope: Rope,
    cursor: Cursor,
    utf8_index: Utf8Index,
    modification_counter: u64,
    multiline: MultilineContext,
    undo: UndoEngine,
    /// Checksum over the rope's bytes, refreshed on every mutation
    /// alongside `modification_counter`. `validate()` recomputes from the
    /// live rope and compares against this recorded value, catching any
    /// mutation path that edits `rope` without going through the
    /// bookkeeping the rest of the type relies on.
    content_checksum: u64,
    pub name: String,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum CharClass {
    Word,
    Punct,
    Space,
}

fn checksum_of(rope: &Rope) -> u64 {
    let mut h = DefaultHasher::new();
    for chunk in rope.chunks() {
        chunk.hash(&mut h);
    }
    h.finish()
}

fn classify_char(c: char) -> CharClass {
    if c.is_whitespace() {
        CharClass::Space
    } else if c.is_alphanumeric() || c == '_' {
        CharClass::Word
    } else {
        CharClass::Punct
    }
}

impl Buffer {
    pub fn new(name: impl Into<String>) -> Self {
        let rope = Rope::new();
        let content_checksum = checksum_of(&rope);
        Self {
            rope,
            cursor: Cursor::default(),
            utf8_index: Utf8Index::default(),
            modification_counter: 0,
            multiline: MultilineContext::default(),
            undo: UndoEngine::default(),
            content_checksum,
            name: name.into(),
        }
    }

    pub fn from_str(name: impl Into<String>, content: &str) -> Result<Self, TextError> {
        let mut buf = Self::new(name);
        buf.rope = Rope::from_str(content);
        buf.content_checksum = checksum_of(&buf.rope);
        buf.rescan_multiline();
        Ok(buf)
    }

    /// Reset to an empty buffer, as happens between readline sessions.
    pub fn clear(&mut self) {
        self.rope = Rope::new();
        self.cursor = Cursor::default();
        self.utf8_index.mark_stale();
        self.multiline = MultilineContext::default();
        self.undo = UndoEngine::default();
        self.modification_counter = 0;
        self.content_checksum = checksum_of(&self.rope);
    }

    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }
    pub fn len_codepoints(&self) -> usize {
        self.rope.len_chars()
    }
    pub fn len_graphemes(&self) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        self.rope.chunks().flat_map(|c| c.graphemes(true)).count()
    }
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }
    pub fn modification_counter(&self) -> u64 {
        self.modification_counter
    }
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }
    pub fn multiline(&self) -> &MultilineContext {
        &self.multiline
    }
    pub fn is_command_complete(&self) -> bool {
        self.multiline.is_complete()
    }
    pub fn undo_depth(&self) -> usize {
        self.undo.undo_depth()
    }
    pub fn redo_depth(&self) -> usize {
        self.undo.redo_depth()
    }

    /// Entire buffer content as an owned string. Convenience for callers
    /// (the display bridge, the multiline rescan, tests) — buffers in this
    /// system are shell command lines, not multi-megabyte documents, so
    /// materializing the full content is cheap relative to a line editor.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn line_text(&self, idx: usize) -> Option<String> {
        if idx < self.rope.len_lines() {
            Some(self.rope.line(idx).to_string())
        } else {
            None
        }
    }

    /// Line content with any trailing newline stripped.
    pub fn line_content(&self, idx: usize) -> Option<String> {
        self.line_text(idx).map(|mut s| {
            if s.ends_with('\n') {
                s.pop();
            }
            s
        })
    }

    pub fn line_byte_len(&self, idx: usize) -> usize {
        match self.line_content(idx) {
            Some(s) => s.len(),
            None => 0,
        }
    }

    /// Classified metadata for every physical line — the data the render
    /// layer needs to draw a continuation prompt differently depending on
    /// whether the next line is an ordinary command, a backslash
    /// continuation, inside an open quote, a heredoc body, or inside
    /// unbalanced group nesting.
    pub fn line_records(&self) -> Vec<LineRecord> {
        use unicode_segmentation::UnicodeSegmentation;
        let text = self.text();
        let types = multiline::line_types(&text);
        let n_lines = self.rope.len_lines().max(1);
        let mut records = Vec::with_capacity(n_lines);
        let mut start = 0usize;
        for idx in 0..n_lines {
            let raw = self.line_text(idx).unwrap_or_default();
            let content = self.line_content(idx).unwrap_or_default();
            let end = start + raw.len();
            let indent_level = content.chars().take_while(|c| *c == ' ' || *c == '\t').count();
            records.push(LineRecord {
                start_byte: start,
                end_byte: end,
                byte_length: raw.len(),
                codepoint_count: content.chars().count(),
                grapheme_count: content.graphemes(true).count(),
                visual_width: visual_col_with_tabs(&content, content.len()),
                line_type: types.get(idx).copied().unwrap_or(LineType::Command),
                multiline_state: multiline::scan(&text[..end]),
                indent_level,
            });
            start = end;
        }
        records
    }

    fn line_start_byte(&self, line: usize) -> usize {
        let char_idx = self.rope.line_to_char(line.min(self.rope.len_lines().saturating_sub(1)));
        self.rope.char_to_byte(char_idx)
    }

    fn is_byte_boundary(&self, byte_idx: usize) -> bool {
        let len = self.rope.len_bytes();
        if byte_idx == 0 || byte_idx == len {
            return true;
        }
        if byte_idx > len {
            return false;
        }
        match self.rope.bytes_at(byte_idx).next() {
            Some(b) => (b & 0xC0) != 0x80,
            None => true,
        }
    }

    fn is_grapheme_boundary(&self, byte_idx: usize) -> bool {
        use unicode_segmentation::UnicodeSegmentation;
        if !self.is_byte_boundary(byte_idx) {
            return false;
        }
        let line = self.rope.char_to_line(self.rope.byte_to_char(byte_idx));
        let line_start = self.line_start_byte(line);
        let rel = byte_idx - line_start;
        let content = self.line_content(line).unwrap_or_default();
        rel == 0 || rel == content.len() || content.grapheme_indices(true).any(|(i, _)| i == rel)
    }

    fn checksum(&self) -> u64 {
        checksum_of(&self.rope)
    }

    // ---- cursor coordinate derivation --------------------------------

    fn derive_cursor(&mut self, byte_offset: usize, preferred_column: Option<usize>) -> Cursor {
        self.utf8_index.rebuild_if_stale();
        self.compute_cursor(byte_offset, preferred_column)
    }

    /// Re-derive a cursor's coordinates from a byte offset without
    /// mutating the buffer. Shared by `derive_cursor` (used on every
    /// motion/edit) and `validate` (used to cross-check that the stored
    /// cursor hasn't drifted from what its own byte offset implies).
    fn compute_cursor(&self, byte_offset: usize, preferred_column: Option<usize>) -> Cursor {
        let char_idx = self.rope.byte_to_char(byte_offset);
        let line_number = self.rope.char_to_line(char_idx);
        let line_start = self.line_start_byte(line_number);
        let content = self.line_content(line_number).unwrap_or_default();
        let rel = byte_offset.saturating_sub(line_start).min(content.len());
        let visual_column = visual_col_with_tabs(&content, rel);
        let grapheme_index = self.grapheme_index_for_byte(byte_offset);
        Cursor {
            byte_offset,
            codepoint_index: char_idx,
            grapheme_index,
            line_number,
            visual_column,
            preferred_column,
        }
    }

    fn grapheme_index_for_byte(&self, byte_offset: usize) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        let line_number = self.rope.char_to_line(self.rope.byte_to_char(byte_offset));
        let mut count = 0usize;
        for l in 0..line_number {
            count += self.line_text(l).unwrap_or_default().graphemes(true).count();
        }
        let line_start = self.line_start_byte(line_number);
        let content = self.line_content(line_number).unwrap_or_default();
        let rel = byte_offset.saturating_sub(line_start).min(content.len());
        count += content[..rel].graphemes(true).count();
        count
    }

    fn set_cursor_to_byte(&mut self, byte_offset: usize, preferred_column: Option<usize>) {
        self.cursor = self.derive_cursor(byte_offset, preferred_column);
    }

    fn rescan_multiline(&mut self) {
        self.multiline = multiline::scan(&self.text());
    }

    // ---- low-level mutation (no undo bookkeeping) --------------------

    fn raw_insert(&mut self, byte_pos: usize, text: &str) {
        let char_idx = self.rope.byte_to_char(byte_pos);
        self.rope.insert(char_idx, text);
        self.utf8_index.mark_stale();
        self.modification_counter += 1;
        self.content_checksum = self.checksum();
        self.rescan_multiline();
    }

    fn raw_delete(&mut self, start: usize, end: usize) -> String {
        let start_char = self.rope.byte_to_char(start);
        let end_char = self.rope.byte_to_char(end);
        let removed = self.rope.slice(start_char..end_char).to_string();
        self.rope.remove(start_char..end_char);
        self.utf8_index.mark_stale();
        self.modification_counter += 1;
        self.content_checksum = self.checksum();
        self.rescan_multiline();
        removed
    }

    fn adjust_for_insert(&mut self, pos: usize, len: usize) {
        let new_offset = if pos <= self.cursor.byte_offset {
            self.cursor.byte_offset + len
        } else {
            self.cursor.byte_offset
        };
        self.set_cursor_to_byte(new_offset, None);
    }

    fn adjust_for_delete(&mut self, start: usize, end: usize) {
        let old = self.cursor.byte_offset;
        let new_offset = if old >= end {
            old - (end - start)
        } else if old > start {
            start
        } else {
            old
        };
        self.set_cursor_to_byte(new_offset, None);
    }

    // ---- public mutation API ------------------------------------------

    /// Insert `text` at `byte_pos`. Validates the position is a UTF-8
    /// boundary before committing; no partial state change on error.
    pub fn insert(&mut self, byte_pos: usize, text: &str) -> Result<(), TextError> {
        if byte_pos > self.rope.len_bytes() {
            return Err(TextError::OutOfRange(byte_pos, self.rope.len_bytes()));
        }
        if !self.is_byte_boundary(byte_pos) {
            return Err(TextError::NonUtf8Boundary(byte_pos));
        }
        if text.is_empty() {
            return Ok(());
        }
        let saved_cursor = self.cursor;
        self.raw_insert(byte_pos, text);
        self.undo.push(Change {
            kind: ChangeKind::Insert,
            byte_position: byte_pos,
            removed_bytes: None,
            inserted_bytes: Some(text.as_bytes().to_vec()),
            saved_cursor,
            timestamp: Instant::now(),
        });
        self.adjust_for_insert(byte_pos, text.len());
        trace!(target: "text.edit", byte_pos, len = text.len(), "insert");
        Ok(())
    }

    /// Insert `text` at the cursor and move the cursor past it.
    pub fn insert_at_cursor(&mut self, text: &str) -> Result<(), TextError> {
        self.insert(self.cursor.byte_offset, text)
    }

    /// Insert raw keystroke/paste input at the cursor after NFC
    /// normalization and grapheme segmentation, per the input-handling
    /// contract: anything that reaches the buffer from a human or a
    /// terminal paste passes through [`segment::normalize_and_segment`]
    /// first, so override widths and cursor math stay consistent with
    /// what later gets displayed.
    pub fn insert_text_normalized(&mut self, text: &str) -> Result<(), TextError> {
        let (normalized, _segments) = segment::normalize_and_segment(text);
        self.insert_at_cursor(&normalized)
    }

    /// Delete `[start, end)`. Both ends must lie on grapheme boundaries.
    /// Returns the removed text for yank-register / undo integration.
    pub fn delete_range(&mut self, start: usize, end: usize) -> Result<String, TextError> {
        if start > end {
            return Err(TextError::OutOfRange(start, self.rope.len_bytes()));
        }
        if start == end {
            return Ok(String::new());
        }
        if end > self.rope.len_bytes() {
            return Err(TextError::OutOfRange(end, self.rope.len_bytes()));
        }
        if !self.is_grapheme_boundary(start) || !self.is_grapheme_boundary(end) {
            return Err(TextError::NonGraphemeBoundary(start, end));
        }
        let saved_cursor = self.cursor;
        let removed = self.raw_delete(start, end);
        self.undo.push(Change {
            kind: ChangeKind::Delete,
            byte_position: start,
            removed_bytes: Some(removed.clone().into_bytes()),
            inserted_bytes: None,
            saved_cursor,
            timestamp: Instant::now(),
        });
        self.adjust_for_delete(start, end);
        trace!(target: "text.edit", start, end, "delete");
        Ok(removed)
    }

    /// Delete `[start, end)` and insert `text` in its place as one change.
    pub fn replace_range(
        &mut self,
        start: usize,
        end: usize,
        text: &str,
    ) -> Result<String, TextError> {
        if !self.is_grapheme_boundary(start) || !self.is_grapheme_boundary(end) {
            return Err(TextError::NonGraphemeBoundary(start, end));
        }
        let saved_cursor = self.cursor;
        let removed = self.raw_delete(start, end);
        self.raw_insert(start, text);
        self.undo.push(Change {
            kind: ChangeKind::Replace,
            byte_position: start,
            removed_bytes: Some(removed.clone().into_bytes()),
            inserted_bytes: Some(text.as_bytes().to_vec()),
            saved_cursor,
            timestamp: Instant::now(),
        });
        self.set_cursor_to_byte(start + text.len(), None);
        Ok(removed)
    }

    /// Undo the most recent change, moving it to the redo stack.
    pub fn undo(&mut self) -> bool {
        let Some(change) = self.undo.undo_stack.pop_back() else {
            return false;
        };
        if let Some(inserted) = &change.inserted_bytes {
            self.raw_delete(change.byte_position, change.byte_position + inserted.len());
        }
        if let Some(removed) = &change.removed_bytes {
            let text = String::from_utf8_lossy(removed).into_owned();
            self.raw_insert(change.byte_position, &text);
        }
        self.cursor = change.saved_cursor;
        self.undo.redo_stack.push(change);
        trace!(target: "text.undo", depth = self.undo.undo_stack.len(), "undo");
        true
    }

    /// Re-apply the most recently undone change.
    pub fn redo(&mut self) -> bool {
        let Some(change) = self.undo.redo_stack.pop() else {
            return false;
        };
        if let Some(removed) = &change.removed_bytes {
            self.raw_delete(change.byte_position, change.byte_position + removed.len());
        }
        let end_offset = if let Some(inserted) = &change.inserted_bytes {
            let text = String::from_utf8_lossy(inserted).into_owned();
            self.raw_insert(change.byte_position, &text);
            change.byte_position + inserted.len()
        } else {
            change.byte_position
        };
        self.set_cursor_to_byte(end_offset, None);
        trace!(target: "text.undo", depth = self.undo.redo_stack.len(), "redo");
        self.undo.undo_stack.push_back(change);
        true
    }

    /// Checks UTF-8 validity, length consistency, line-table partition
    /// correctness, cursor self-consistency, and the recorded content
    /// checksum. A self-check, not a repair path: any failure here means a
    /// caller bypassed the mutation API and is reported as a typed error
    /// rather than silently patched over.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let text = self.text();
        if std::str::from_utf8(text.as_bytes()).is_err() {
            return Err(ValidationError::InvalidUtf8(0));
        }

        let total_len = self.rope.len_bytes();
        let mut covered = 0usize;
        for idx in 0..self.rope.len_lines() {
            covered += self.line_text(idx).map(|s| s.len()).unwrap_or(0);
        }
        if covered != total_len {
            return Err(ValidationError::LineTableInconsistent {
                expected: total_len,
                actual: covered,
            });
        }

        if self.cursor.byte_offset > total_len {
            return Err(ValidationError::CursorInconsistent);
        }
        let recomputed = self.compute_cursor(self.cursor.byte_offset, self.cursor.preferred_column);
        if recomputed.codepoint_index != self.cursor.codepoint_index
            || recomputed.grapheme_index != self.cursor.grapheme_index
            || recomputed.line_number != self.cursor.line_number
            || recomputed.visual_column != self.cursor.visual_column
        {
            return Err(ValidationError::CursorInconsistent);
        }

        let actual = self.checksum();
        if actual != self.content_checksum {
            return Err(ValidationError::ChecksumMismatch {
                recorded: self.content_checksum,
                actual,
            });
        }

        Ok(())
    }

    // ---- cursor motion --------------------------------------------------

    pub fn move_to(&mut self, byte_offset: usize) -> Result<(), TextError> {
        let clamped = byte_offset.min(self.rope.len_bytes());
        if !self.is_grapheme_boundary(clamped) {
            return Err(TextError::NonGraphemeBoundary(clamped, clamped));
        }
        self.set_cursor_to_byte(clamped, None);
        Ok(())
    }

    pub fn move_left(&mut self) {
        if self.cursor.byte_offset == 0 {
            return;
        }
        let new = self.prev_grapheme_boundary(self.cursor.byte_offset);
        self.set_cursor_to_byte(new, None);
    }

    pub fn move_right(&mut self) {
        let new = self.next_grapheme_boundary(self.cursor.byte_offset);
        self.set_cursor_to_byte(new, None);
    }

    pub fn move_line_start(&mut self) {
        let start = self.line_start_byte(self.cursor.line_number);
        self.set_cursor_to_byte(start, None);
    }

    pub fn move_line_end(&mut self) {
        let start = self.line_start_byte(self.cursor.line_number);
        let len = self.line_byte_len(self.cursor.line_number);
        self.set_cursor_to_byte(start + len, None);
    }

    pub fn move_up(&mut self) {
        if self.cursor.line_number == 0 {
            return;
        }
        let sticky = self
            .cursor
            .preferred_column
            .unwrap_or(self.cursor.visual_column);
        let target_line = self.cursor.line_number - 1;
        let byte = self.byte_for_visual_col(target_line, sticky);
        self.set_cursor_to_byte(byte, Some(sticky));
    }

    pub fn move_down(&mut self) {
        if self.cursor.line_number + 1 >= self.line_count() {
            return;
        }
        let sticky = self
            .cursor
            .preferred_column
            .unwrap_or(self.cursor.visual_column);
        let target_line = self.cursor.line_number + 1;
        let byte = self.byte_for_visual_col(target_line, sticky);
        self.set_cursor_to_byte(byte, Some(sticky));
    }

    fn byte_for_visual_col(&self, line: usize, target_col: usize) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        let start = self.line_start_byte(line);
        let content = self.line_content(line).unwrap_or_default();
        let mut col = 0usize;
        for (b, g) in content.grapheme_indices(true) {
            let w = egc_width(g) as usize;
            if col + w > target_col {
                return start + b;
            }
            col += w;
        }
        start + content.len()
    }

    fn prev_grapheme_boundary(&self, byte_offset: usize) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        let line = self.rope.char_to_line(self.rope.byte_to_char(byte_offset));
        let line_start = self.line_start_byte(line);
        if byte_offset <= line_start {
            if line == 0 {
                return 0;
            }
            // join to end of previous line (newline is one grapheme step)
            return self.line_start_byte(line) - 1;
        }
        let content = self.line_content(line).unwrap_or_default();
        let rel = byte_offset - line_start;
        let mut last = 0usize;
        for (idx, _) in content.grapheme_indices(true) {
            if idx >= rel {
                break;
            }
            last = idx;
        }
        line_start + last
    }

    fn next_grapheme_boundary(&self, byte_offset: usize) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        let total = self.rope.len_bytes();
        if byte_offset >= total {
            return total;
        }
        let line = self.rope.char_to_line(self.rope.byte_to_char(byte_offset));
        let line_start = self.line_start_byte(line);
        let content = self.line_content(line).unwrap_or_default();
        let rel = byte_offset - line_start;
        if rel >= content.len() {
            // move past the newline into the next line
            return (line_start + content.len() + 1).min(total);
        }
        for (idx, _) in content.grapheme_indices(true) {
            if idx > rel {
                return line_start + idx;
            }
        }
        line_start + content.len()
    }

    pub fn word_boundary_before(&self, byte_offset: usize) -> usize {
        let mut idx = self.rope.byte_to_char(byte_offset);
        if idx == 0 {
            return 0;
        }
        let mut cursor = self.rope.chars_at(idx);
        while idx > 0 {
            let c = cursor.prev().expect("idx>0 implies a preceding char");
            if classify_char(c) != CharClass::Space {
                cursor.next();
                break;
            }
            idx -= 1;
        }
        if idx == 0 {
            return 0;
        }
        let class = {
            let c = cursor.prev().expect("idx>0 implies a preceding char");
            cursor.next();
            classify_char(c)
        };
        while idx > 0 {
            let c = cursor.prev().expect("idx>0 implies a preceding char");
            if classify_char(c) != class {
                cursor.next();
                break;
            }
            idx -= 1;
        }
        self.rope.char_to_byte(idx)
    }

    pub fn word_boundary_after(&self, byte_offset: usize) -> usize {
        let total_chars = self.rope.len_chars();
        let mut idx = self.rope.byte_to_char(byte_offset);
        if idx >= total_chars {
            return self.rope.len_bytes();
        }
        let mut cursor = self.rope.chars_at(idx);
        while idx < total_chars {
            let c = cursor.next().expect("idx<total implies a following char");
            if classify_char(c) != CharClass::Space {
                cursor.prev();
                break;
            }
            idx += 1;
        }
        if idx >= total_chars {
            return self.rope.len_bytes();
        }
        let class = {
            let c = cursor.next().expect("idx<total implies a following char");
            cursor.prev();
            classify_char(c)
        };
        while idx < total_chars {
            let c = cursor.next().expect("idx<total implies a following char");
            if classify_char(c) != class {
                cursor.prev();
                break;
            }
            idx += 1;
        }
        self.rope.char_to_byte(idx)
    }
}

fn visual_col_with_tabs(content: &str, byte_rel: usize) -> usize {
    use unicode_segmentation::UnicodeSegmentation;
    let mut col = 0usize;
    for (idx, g) in content.grapheme_indices(true) {
        if idx >= byte_rel {
            break;
        }
        if g == "\t" {
            col = width::advance_tab(col, 8);
        } else {
            col += egc_width(g) as usize;
        }
    }
    col
}

/// Grapheme and width helpers operating on a single line slice. Kept as a
/// standalone module (rather than inherent `Buffer` methods) so callers
/// that already have a line's text in hand (the display bridge) don't need
/// a `Buffer` reference just to measure it.
pub mod grapheme {
    use crate::egc_width;
    use unicode_segmentation::UnicodeSegmentation;

    pub fn iter(line: &str) -> impl Iterator<Item = &str> {
        line.graphemes(true)
    }

    pub fn prev_boundary(line: &str, byte: usize) -> usize {
        if byte == 0 || byte > line.len() {
            return 0;
        }
        let mut last = 0;
        for (idx, _) in line.grapheme_indices(true) {
            if idx >= byte {
                break;
            }
            last = idx;
        }
        last
    }

    pub fn next_boundary(line: &str, byte: usize) -> usize {
        if byte >= line.len() {
            return line.len();
        }
        for (idx, _) in line.grapheme_indices(true) {
            if idx > byte {
                return idx;
            }
        }
        line.len()
    }

    pub fn visual_col(line: &str, byte: usize) -> usize {
        super::visual_col_with_tabs(line, byte)
    }

    pub fn cluster_width(g: &str) -> usize {
        egc_width(g) as usize
    }

    pub fn is_word(g: &str) -> bool {
        g.chars()
            .next()
            .map(|c| c == '_' || c.is_alphanumeric())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_cursor_advances() {
        let mut b = Buffer::from_str("t", "").unwrap();
        b.insert_at_cursor("echo hi").unwrap();
        assert_eq!(b.text(), "echo hi");
        assert_eq!(b.cursor().byte_offset, "echo hi".len());
        assert_eq!(b.cursor().codepoint_index, "echo hi".chars().count());
    }

    #[test]
    fn insert_rejects_non_boundary() {
        let mut b = Buffer::from_str("t", "a😀b").unwrap();
        // byte 2 is inside the 4-byte emoji
        let err = b.insert(2, "X").unwrap_err();
        assert_eq!(err, TextError::NonUtf8Boundary(2));
    }

    #[test]
    fn delete_rejects_non_grapheme_boundary() {
        let mut b = Buffer::from_str("t", "e\u{0301}x").unwrap(); // e + combining acute, single cluster
        let cluster_len = "e\u{0301}".len();
        let err = b.delete_range(1, cluster_len).unwrap_err();
        assert!(matches!(err, TextError::NonGraphemeBoundary(_, _)));
    }

    #[test]
    fn insert_then_delete_restores_buffer_and_cursor() {
        let mut b = Buffer::from_str("t", "abc").unwrap();
        b.move_to(1).unwrap();
        let before = b.cursor();
        b.insert(1, "XY").unwrap();
        b.delete_range(1, 3).unwrap();
        assert_eq!(b.text(), "abc");
        assert_eq!(b.cursor(), before);
    }

    #[test]
    fn undo_redo_is_identity() {
        let mut b = Buffer::from_str("t", "").unwrap();
        b.insert_at_cursor("hello").unwrap();
        let after_insert = b.text();
        b.undo();
        assert_eq!(b.text(), "");
        b.redo();
        assert_eq!(b.text(), after_insert);
    }

    #[test]
    fn undo_n_times_walks_history_back() {
        let mut b = Buffer::from_str("t", "").unwrap();
        b.insert_at_cursor("a").unwrap();
        b.insert_at_cursor("b").unwrap();
        b.insert_at_cursor("c").unwrap();
        assert_eq!(b.text(), "abc");
        b.undo();
        assert_eq!(b.text(), "ab");
        b.undo();
        assert_eq!(b.text(), "a");
        b.undo();
        assert_eq!(b.text(), "");
    }

    #[test]
    fn backspace_one_char_at_a_time() {
        let mut b = Buffer::from_str("t", "").unwrap();
        for c in ["a", "b", "c"] {
            b.insert_at_cursor(c).unwrap();
        }
        assert_eq!(b.text(), "abc");
        for expected in ["ab", "a", ""] {
            let end = b.cursor().byte_offset;
            let start = b.prev_grapheme_boundary(end);
            b.delete_range(start, end).unwrap();
            assert_eq!(b.text(), expected);
        }
    }

    #[test]
    fn word_boundary_motions() {
        let b = Buffer::from_str("t", "echo one two").unwrap();
        let end = b.len_bytes();
        let before_two = b.word_boundary_before(end);
        assert_eq!(&b.text()[before_two..end], "two");
        let after_echo = b.word_boundary_after(0);
        assert_eq!(&b.text()[0..after_echo], "echo");
    }

    #[test]
    fn multiline_double_quote_is_incomplete_until_closed() {
        let b = Buffer::from_str("t", "echo \"hello\nworld\"").unwrap();
        assert!(b.is_command_complete());
        let b2 = Buffer::from_str("t", "echo \"hello\nworld").unwrap();
        assert!(!b2.is_command_complete());
    }

    #[test]
    fn grapheme_family_emoji_boundaries() {
        let s = "👨‍👩‍👧‍👦X";
        let next = grapheme::next_boundary(s, 0);
        assert!(next <= s.len());
        assert!(grapheme::visual_col(s, next) >= 1);
    }

    #[test]
    fn validate_reports_cursor_inconsistency() {
        let b = Buffer::from_str("t", "abc").unwrap();
        assert!(b.validate().is_ok());
    }

    #[test]
    fn validate_detects_checksum_mismatch() {
        let mut b = Buffer::from_str("t", "abc").unwrap();
        b.content_checksum ^= 1;
        assert!(matches!(
            b.validate(),
            Err(ValidationError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn validate_detects_stale_cursor_coordinates() {
        let mut b = Buffer::from_str("t", "abc").unwrap();
        b.cursor.line_number = 99;
        assert!(matches!(
            b.validate(),
            Err(ValidationError::CursorInconsistent)
        ));
    }

    #[test]
    fn line_records_classifies_continuation_line() {
        let b = Buffer::from_str("t", "echo hi \\\nworld").unwrap();
        let records = b.line_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].start_byte, 0);
        assert_eq!(records[0].end_byte, "echo hi \\\n".len());
        assert_eq!(records[0].line_type, LineType::Continuation);
        assert_eq!(records[1].start_byte, "echo hi \\\n".len());
        assert_eq!(records[1].end_byte, b.text().len());
        assert_eq!(records[1].line_type, LineType::Command);
        assert_eq!(records[1].codepoint_count, "world".chars().count());
    }
}
