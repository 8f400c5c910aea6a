//! Free-function edit actions dispatched from a resolved `core_keymap::Action`.
//!
//! The teacher's vi dispatcher resolved a keystroke through an operator /
//! motion / register composition engine (`dispatcher::mod::dispatch`,
//! `PendingContext`) because a modal editor's keystrokes compose. A
//! non-modal line editor has nothing left to compose: `core-keymap`
//! already resolved the keystroke to one concrete `Action`, so dispatch
//! here is a single match over free functions, each taking the same
//! `&mut ActionContext` first parameter — the session's per-keystroke
//! handle, per the design note that the model is "a value passed by
//! reference into the loop and its handlers, first parameter to actions."
//!
//! What does carry over from `dispatcher/edit.rs` is the shape of each
//! handler: mutate the buffer, report whether a redraw is owed, and trace
//! the before/after cursor position at `actions.dispatch`.

use core_keymap::Action;
use core_text::Buffer;
use tracing::trace;

/// Single-slot kill ring. GNU Readline's kill ring is a ring of arbitrary
/// depth (`M-y` cycles through prior kills); this crate implements only
/// the single most-recent slot, since nothing in the keybinding table
/// binds `M-y` (kill-ring-cycle) — there is only ever one entry to yank.
#[derive(Debug, Clone, Default)]
pub struct KillRing {
    last: Option<String>,
}

impl KillRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, text: String) {
        if !text.is_empty() {
            self.last = Some(text);
        }
    }

    pub fn get(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// The per-keystroke handle actions operate on. `core-readline` owns the
/// real `Buffer` and `KillRing` and constructs this transiently on each
/// dispatch; it lives in this crate (not `core-readline`) so the action
/// functions can take it as their first parameter without a dependency
/// cycle (`core-actions` depends on `core-keymap`, not the reverse, and
/// `core-readline` depends on both).
pub struct ActionContext<'a> {
    pub buffer: &'a mut Buffer,
    pub kill_ring: &'a mut KillRing,
}

impl<'a> ActionContext<'a> {
    pub fn new(buffer: &'a mut Buffer, kill_ring: &'a mut KillRing) -> Self {
        Self { buffer, kill_ring }
    }
}

/// Outcome of a dispatched action: whether the buffer changed (so the
/// caller should mark the render pipeline dirty) and whether anything
/// happened at all (an action at a buffer boundary, e.g. backspace at
/// column zero, is a no-op and needn't trigger a render).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionResult {
    pub buffer_mutated: bool,
}

impl ActionResult {
    pub fn dirty() -> Self {
        Self {
            buffer_mutated: true,
        }
    }

    pub fn clean() -> Self {
        Self {
            buffer_mutated: false,
        }
    }
}

/// Resolve an already-looked-up keymap action against the buffer. Plain
/// character insertion never reaches here — it bypasses the keymap table
/// entirely and goes through [`insert_char`] directly from the readline
/// loop.
pub fn dispatch(action: Action, ctx: &mut ActionContext) -> ActionResult {
    match action {
        Action::MoveLeft => move_left(ctx),
        Action::MoveRight => move_right(ctx),
        Action::MoveWordLeft => move_word_left(ctx),
        Action::MoveWordRight => move_word_right(ctx),
        Action::MoveLineStart => move_line_start(ctx),
        Action::MoveLineEnd => move_line_end(ctx),
        Action::MoveUp => move_up(ctx),
        Action::MoveDown => move_down(ctx),
        Action::Backspace => backspace(ctx),
        Action::DeleteForward => delete_forward(ctx),
        Action::KillWordBackward => kill_word_backward(ctx),
        Action::KillWordForward => kill_word_forward(ctx),
        Action::KillToLineEnd => kill_to_line_end(ctx),
        Action::KillToLineStart => kill_to_line_start(ctx),
        Action::Yank => yank(ctx),
        Action::Undo => undo(ctx),
        Action::InsertLiteralNewline => insert_char(ctx, '\n'),
        // Completion and history are resolved against collaborator state
        // (`CompletionSource`/`HistoryStore`) the loop holds, not the
        // buffer alone, so the loop itself handles these two rather than
        // routing them through a buffer-only action function.
        Action::RequestCompletion | Action::HistoryPrev | Action::HistoryNext => {
            ActionResult::clean()
        }
    }
}

pub fn insert_char(ctx: &mut ActionContext, c: char) -> ActionResult {
    let before = ctx.buffer.cursor().byte_offset;
    let mut buf = [0u8; 4];
    let s = c.encode_utf8(&mut buf);
    ctx.buffer
        .insert_text_normalized(s)
        .expect("insert at cursor is always a valid boundary");
    trace!(target: "actions.dispatch", op = "insert_char", before, after = ctx.buffer.cursor().byte_offset, "edit");
    ActionResult::dirty()
}

pub fn insert_text(ctx: &mut ActionContext, text: &str) -> ActionResult {
    if text.is_empty() {
        return ActionResult::clean();
    }
    let before = ctx.buffer.cursor().byte_offset;
    ctx.buffer
        .insert_text_normalized(text)
        .expect("insert at cursor is always a valid boundary");
    trace!(target: "actions.dispatch", op = "insert_text", before, after = ctx.buffer.cursor().byte_offset, len = text.len(), "edit");
    ActionResult::dirty()
}

pub fn move_left(ctx: &mut ActionContext) -> ActionResult {
    let before = ctx.buffer.cursor().byte_offset;
    ctx.buffer.move_left();
    let after = ctx.buffer.cursor().byte_offset;
    trace!(target: "actions.dispatch", op = "move_left", before, after, "motion");
    ActionResult::clean()
}

pub fn move_right(ctx: &mut ActionContext) -> ActionResult {
    let before = ctx.buffer.cursor().byte_offset;
    ctx.buffer.move_right();
    let after = ctx.buffer.cursor().byte_offset;
    trace!(target: "actions.dispatch", op = "move_right", before, after, "motion");
    ActionResult::clean()
}

pub fn move_word_left(ctx: &mut ActionContext) -> ActionResult {
    let before = ctx.buffer.cursor().byte_offset;
    let target = ctx.buffer.word_boundary_before(before);
    ctx.buffer
        .move_to(target)
        .expect("word_boundary_before always returns a grapheme boundary");
    trace!(target: "actions.dispatch", op = "move_word_left", before, after = target, "motion");
    ActionResult::clean()
}

pub fn move_word_right(ctx: &mut ActionContext) -> ActionResult {
    let before = ctx.buffer.cursor().byte_offset;
    let target = ctx.buffer.word_boundary_after(before);
    ctx.buffer
        .move_to(target)
        .expect("word_boundary_after always returns a grapheme boundary");
    trace!(target: "actions.dispatch", op = "move_word_right", before, after = target, "motion");
    ActionResult::clean()
}

pub fn move_line_start(ctx: &mut ActionContext) -> ActionResult {
    ctx.buffer.move_line_start();
    trace!(target: "actions.dispatch", op = "move_line_start", after = ctx.buffer.cursor().byte_offset, "motion");
    ActionResult::clean()
}

pub fn move_line_end(ctx: &mut ActionContext) -> ActionResult {
    ctx.buffer.move_line_end();
    trace!(target: "actions.dispatch", op = "move_line_end", after = ctx.buffer.cursor().byte_offset, "motion");
    ActionResult::clean()
}

pub fn move_up(ctx: &mut ActionContext) -> ActionResult {
    ctx.buffer.move_up();
    trace!(target: "actions.dispatch", op = "move_up", line = ctx.buffer.cursor().line_number, "motion");
    ActionResult::clean()
}

pub fn move_down(ctx: &mut ActionContext) -> ActionResult {
    ctx.buffer.move_down();
    trace!(target: "actions.dispatch", op = "move_down", line = ctx.buffer.cursor().line_number, "motion");
    ActionResult::clean()
}

/// Delete the grapheme before the cursor. A no-op at column zero of the
/// buffer, matching Readline's refusal to delete past the start of line.
pub fn backspace(ctx: &mut ActionContext) -> ActionResult {
    let end = ctx.buffer.cursor().byte_offset;
    if end == 0 {
        return ActionResult::clean();
    }
    ctx.buffer.move_left();
    let start = ctx.buffer.cursor().byte_offset;
    ctx.buffer
        .delete_range(start, end)
        .expect("move_left always lands on the previous grapheme boundary");
    trace!(target: "actions.dispatch", op = "backspace", start, end, "edit");
    ActionResult::dirty()
}

/// Delete the grapheme under/after the cursor.
pub fn delete_forward(ctx: &mut ActionContext) -> ActionResult {
    let start = ctx.buffer.cursor().byte_offset;
    if start == ctx.buffer.len_bytes() {
        return ActionResult::clean();
    }
    ctx.buffer.move_right();
    let end = ctx.buffer.cursor().byte_offset;
    ctx.buffer
        .delete_range(start, end)
        .expect("move_right always lands on the next grapheme boundary");
    trace!(target: "actions.dispatch", op = "delete_forward", start, end, "edit");
    ActionResult::dirty()
}

/// Ctrl-W: kill the word before the cursor into the kill ring.
pub fn kill_word_backward(ctx: &mut ActionContext) -> ActionResult {
    let end = ctx.buffer.cursor().byte_offset;
    let start = ctx.buffer.word_boundary_before(end);
    if start == end {
        return ActionResult::clean();
    }
    let killed = ctx
        .buffer
        .delete_range(start, end)
        .expect("word_boundary_before always returns a grapheme boundary");
    ctx.kill_ring.set(killed);
    trace!(target: "actions.dispatch", op = "kill_word_backward", start, end, "edit");
    ActionResult::dirty()
}

/// Meta-d: kill the word after the cursor into the kill ring.
pub fn kill_word_forward(ctx: &mut ActionContext) -> ActionResult {
    let start = ctx.buffer.cursor().byte_offset;
    let end = ctx.buffer.word_boundary_after(start);
    if start == end {
        return ActionResult::clean();
    }
    let killed = ctx
        .buffer
        .delete_range(start, end)
        .expect("word_boundary_after always returns a grapheme boundary");
    ctx.kill_ring.set(killed);
    trace!(target: "actions.dispatch", op = "kill_word_forward", start, end, "edit");
    ActionResult::dirty()
}

/// Ctrl-K: kill from the cursor to the end of the logical line.
pub fn kill_to_line_end(ctx: &mut ActionContext) -> ActionResult {
    let start = ctx.buffer.cursor().byte_offset;
    let line = ctx.buffer.cursor().line_number;
    ctx.buffer.move_line_end();
    let end = ctx.buffer.cursor().byte_offset;
    ctx.buffer
        .move_to(start)
        .expect("start was the cursor's own byte offset");
    if start == end {
        return ActionResult::clean();
    }
    let killed = ctx
        .buffer
        .delete_range(start, end)
        .expect("move_line_end always lands on a grapheme boundary");
    ctx.kill_ring.set(killed);
    trace!(target: "actions.dispatch", op = "kill_to_line_end", line, start, end, "edit");
    ActionResult::dirty()
}

/// Ctrl-U: kill from the start of the logical line to the cursor.
pub fn kill_to_line_start(ctx: &mut ActionContext) -> ActionResult {
    let end = ctx.buffer.cursor().byte_offset;
    let line = ctx.buffer.cursor().line_number;
    ctx.buffer.move_line_start();
    let start = ctx.buffer.cursor().byte_offset;
    if start == end {
        return ActionResult::clean();
    }
    let killed = ctx
        .buffer
        .delete_range(start, end)
        .expect("move_line_start always lands on a grapheme boundary");
    ctx.kill_ring.set(killed);
    trace!(target: "actions.dispatch", op = "kill_to_line_start", line, start, end, "edit");
    ActionResult::dirty()
}

/// Ctrl-Y: yank the most recently killed text at the cursor.
pub fn yank(ctx: &mut ActionContext) -> ActionResult {
    let Some(text) = ctx.kill_ring.get().map(str::to_owned) else {
        return ActionResult::clean();
    };
    let before = ctx.buffer.cursor().byte_offset;
    ctx.buffer
        .insert_at_cursor(&text)
        .expect("insert at cursor is always a valid boundary");
    trace!(target: "actions.dispatch", op = "yank", before, len = text.len(), "edit");
    ActionResult::dirty()
}

pub fn undo(ctx: &mut ActionContext) -> ActionResult {
    let happened = ctx.buffer.undo();
    trace!(target: "actions.dispatch", op = "undo", happened, depth = ctx.buffer.undo_depth(), "edit");
    if happened {
        ActionResult::dirty()
    } else {
        ActionResult::clean()
    }
}

pub fn redo(ctx: &mut ActionContext) -> ActionResult {
    let happened = ctx.buffer.redo();
    trace!(target: "actions.dispatch", op = "redo", happened, depth = ctx.buffer.redo_depth(), "edit");
    if happened {
        ActionResult::dirty()
    } else {
        ActionResult::clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(buf: &'a mut Buffer, kr: &'a mut KillRing) -> ActionContext<'a> {
        ActionContext::new(buf, kr)
    }

    #[test]
    fn backspace_at_start_is_noop() {
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        buf.move_to(0).unwrap();
        let mut kr = KillRing::new();
        let result = backspace(&mut ctx(&mut buf, &mut kr));
        assert_eq!(result, ActionResult::clean());
        assert_eq!(buf.text(), "abc");
    }

    #[test]
    fn backspace_deletes_previous_grapheme() {
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        let mut kr = KillRing::new();
        let result = backspace(&mut ctx(&mut buf, &mut kr));
        assert_eq!(result, ActionResult::dirty());
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.cursor().byte_offset, 2);
    }

    #[test]
    fn delete_forward_at_end_is_noop() {
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        let mut kr = KillRing::new();
        let result = delete_forward(&mut ctx(&mut buf, &mut kr));
        assert_eq!(result, ActionResult::clean());
    }

    #[test]
    fn kill_word_backward_then_yank_roundtrips() {
        let mut buf = Buffer::from_str("t", "hello world").unwrap();
        let mut kr = KillRing::new();
        kill_word_backward(&mut ctx(&mut buf, &mut kr));
        assert_eq!(buf.text(), "hello ");
        assert_eq!(kr.get(), Some("world"));
        yank(&mut ctx(&mut buf, &mut kr));
        assert_eq!(buf.text(), "hello world");
    }

    #[test]
    fn kill_to_line_end_preserves_cursor_position() {
        let mut buf = Buffer::from_str("t", "hello world").unwrap();
        buf.move_to(5).unwrap();
        let mut kr = KillRing::new();
        kill_to_line_end(&mut ctx(&mut buf, &mut kr));
        assert_eq!(buf.text(), "hello");
        assert_eq!(buf.cursor().byte_offset, 5);
        assert_eq!(kr.get(), Some(" world"));
    }

    #[test]
    fn kill_to_line_start_then_yank() {
        let mut buf = Buffer::from_str("t", "hello world").unwrap();
        buf.move_to(6).unwrap();
        let mut kr = KillRing::new();
        kill_to_line_start(&mut ctx(&mut buf, &mut kr));
        assert_eq!(buf.text(), "world");
        assert_eq!(kr.get(), Some("hello "));
    }

    #[test]
    fn undo_reverts_last_insert() {
        let mut buf = Buffer::from_str("t", "").unwrap();
        let mut kr = KillRing::new();
        insert_char(&mut ctx(&mut buf, &mut kr), 'x');
        assert_eq!(buf.text(), "x");
        let result = undo(&mut ctx(&mut buf, &mut kr));
        assert_eq!(result, ActionResult::dirty());
        assert_eq!(buf.text(), "");
    }

    #[test]
    fn dispatch_routes_move_left_through_action_enum() {
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        let mut kr = KillRing::new();
        let before = buf.cursor().byte_offset;
        dispatch(Action::MoveLeft, &mut ctx(&mut buf, &mut kr));
        assert!(buf.cursor().byte_offset <= before);
    }

    #[test]
    fn yank_with_empty_kill_ring_is_noop() {
        let mut buf = Buffer::from_str("t", "abc").unwrap();
        let mut kr = KillRing::new();
        let result = yank(&mut ctx(&mut buf, &mut kr));
        assert_eq!(result, ActionResult::clean());
        assert_eq!(buf.text(), "abc");
    }
}
