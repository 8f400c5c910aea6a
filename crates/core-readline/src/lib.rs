//! The readline loop: reads terminal bytes, dispatches resolved keystrokes
//! against a buffer, and refreshes the display until the command is
//! accepted, the buffer is discarded, or input ends.
//!
//! This is the orchestration layer the rest of the workspace feeds into:
//! `core-input` turns bytes into events, `core-keymap` resolves events to
//! actions, `core-actions` applies them to the buffer, `core-render`
//! composes and submits the result. What lives here is the loop itself
//! plus the two steps of the submission protocol `core-render` explicitly
//! leaves to the caller (§4.5.6 steps 3-4): publishing a high-priority
//! `RenderRequested` event and draining the dispatcher's pending queue
//! before the next read.

use core_actions::{dispatch, insert_text, ActionContext, KillRing};
use core_events::{Dispatcher, InputEvent, KeyToken, ModMask, NamedKey, Priority};
use core_input::Parser;
use core_keymap::{normalize, Action, KeyBase, KeyBindings};
use core_model::{
    Completion, CompletionKind, CompletionSource, DisplayController, HistoryStore, MemoryHistory,
    ModelError,
    SyntaxHighlighter,
};
use core_render::{submit, PromptMetrics, RenderEngine};
use core_terminal::{signals, CrosstermBackend, RawReader, TerminalCapabilities};
use core_text::Buffer;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum ReadlineError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("display controller failed: {0}")]
    Display(#[from] ModelError),
    #[error("session was interrupted by termination signal")]
    Terminated,
}

/// The prompt text installed for a session, including any invisible CSI
/// color codes or readline bracket markers (`\u{1}`..`\u{2}`) the embedder
/// wraps around them.
pub struct Prompt {
    raw: String,
}

impl Prompt {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

/// Everything the readline loop needs across the lifetime of a process:
/// the terminal backend, the resolved keybinding table, the render
/// pipeline, and the optional collaborators an embedder supplies. One
/// `Session` is built once and reused across many [`readline`] calls, the
/// way a real shell keeps one line editor alive for its whole run.
pub struct Session {
    backend: CrosstermBackend,
    capabilities: TerminalCapabilities,
    reader: RawReader,
    parser: Parser,
    dispatcher: Dispatcher,
    keymap: KeyBindings,
    render: RenderEngine,
    kill_ring: KillRing,
    display: Box<dyn DisplayController>,
    syntax: Option<Box<dyn SyntaxHighlighter>>,
    completion: Option<Box<dyn CompletionSource>>,
    history: Box<dyn HistoryStore>,
    read_timeout: Duration,
    initialized: bool,
}

impl Session {
    pub fn new(display: Box<dyn DisplayController>, render_cache_capacity: usize) -> Self {
        Self {
            backend: CrosstermBackend::new(),
            capabilities: TerminalCapabilities::detect(),
            reader: RawReader::stdin(),
            parser: Parser::new(),
            dispatcher: Dispatcher::new(64),
            keymap: core_keymap::default_bindings(),
            render: RenderEngine::new(render_cache_capacity),
            kill_ring: KillRing::new(),
            display,
            syntax: None,
            completion: None,
            history: Box::new(MemoryHistory::default()),
            read_timeout: Duration::from_millis(100),
            initialized: false,
        }
    }

    pub fn with_syntax_highlighter(mut self, hl: Box<dyn SyntaxHighlighter>) -> Self {
        self.syntax = Some(hl);
        self
    }

    pub fn with_completion_source(mut self, source: Box<dyn CompletionSource>) -> Self {
        self.completion = Some(source);
        self
    }

    pub fn with_history(mut self, history: Box<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_keymap(mut self, keymap: KeyBindings) -> Self {
        self.keymap = keymap;
        self
    }

    pub fn capabilities(&self) -> TerminalCapabilities {
        self.capabilities
    }

    fn ensure_initialized(&mut self) {
        if !self.initialized {
            signals::install();
            self.initialized = true;
            debug!(target: "readline.session", "system_initialized");
        }
    }
}

/// Local in-session history navigation cursor. Not part of `Session`
/// because it only makes sense for the duration of one `readline` call —
/// Up/Down always start from "not navigating" on a fresh prompt.
struct HistoryCursor {
    index: Option<usize>,
    staged: Option<String>,
}

impl HistoryCursor {
    fn new() -> Self {
        Self {
            index: None,
            staged: None,
        }
    }
}

/// Run one line-editing session to completion: reads terminal input,
/// dispatches keystrokes, and refreshes the display until the command is
/// accepted (`Some(line)`), discarded (`None` on EOF or Ctrl-C), or an
/// unrecoverable error occurs.
pub fn readline(session: &mut Session, prompt: &Prompt) -> Result<Option<String>, ReadlineError> {
    session.ensure_initialized();

    let mut buffer = Buffer::from_str("command", "").expect("empty content is always valid");
    let prompt_metrics = PromptMetrics::new(&prompt.raw);
    let mut history_cursor = HistoryCursor::new();
    session.render.invalidate();

    let _guard = session.backend.enter_guard()?;

    refresh(session, &buffer, &prompt_metrics)?;

    loop {
        let snap = signals::drain();
        if snap.int {
            debug!(target: "readline.loop", "sigint_discarding_buffer");
            return Ok(None);
        }
        if snap.term {
            return Err(ReadlineError::Terminated);
        }
        if snap.tstp {
            let _ = session.backend.leave();
        }
        if snap.cont {
            session.backend.enter()?;
        }
        if snap.winch {
            session.capabilities = TerminalCapabilities::detect();
            session.render.invalidate();
            refresh(session, &buffer, &prompt_metrics)?;
        }

        let wait = session
            .parser
            .poll_timeout()
            .unwrap_or(session.read_timeout)
            .min(session.read_timeout);

        let event = match session.reader.read_byte_timeout(wait)? {
            Some(byte) => session.parser.feed(byte),
            None => session.parser.flush_timeout(),
        };

        let Some(event) = event else {
            continue;
        };

        session
            .dispatcher
            .push(core_events::Event::Input(event.clone()), Priority::Normal);
        session.dispatcher.process_pending();

        match dispatch_input_event(session, &mut buffer, &mut history_cursor, event)? {
            LoopOutcome::Accept => {
                buffer
                    .move_to(buffer.len_bytes())
                    .expect("buffer length is always a grapheme boundary");
                refresh(session, &buffer, &prompt_metrics)?;
                let line = buffer.text();
                let _ = session.history.push(line.clone());
                return Ok(Some(line));
            }
            LoopOutcome::Abort => return Ok(None),
            LoopOutcome::Continue => {
                refresh(session, &buffer, &prompt_metrics)?;
            }
        }
    }
}

enum LoopOutcome {
    Continue,
    Accept,
    Abort,
}

fn refresh(
    session: &mut Session,
    buffer: &Buffer,
    prompt_metrics: &PromptMetrics,
) -> Result<(), ReadlineError> {
    let output = session.render.render(
        buffer,
        buffer.cursor(),
        prompt_metrics,
        session.syntax.as_deref(),
    );
    submit(session.display.as_mut(), &output, session.render.metrics())?;
    session
        .dispatcher
        .push(core_events::Event::RenderRequested, Priority::High);
    session.dispatcher.process_pending();
    Ok(())
}

fn dispatch_input_event(
    session: &mut Session,
    buffer: &mut Buffer,
    history_cursor: &mut HistoryCursor,
    event: InputEvent,
) -> Result<LoopOutcome, ReadlineError> {
    match event {
        InputEvent::CtrlC => {
            debug!(target: "readline.loop", "ctrl_c_discarding_buffer");
            Ok(LoopOutcome::Abort)
        }
        InputEvent::KeyPress(ext) => handle_key(session, buffer, history_cursor, ext.token),
        InputEvent::Resize(_, _) => {
            session.render.invalidate();
            Ok(LoopOutcome::Continue)
        }
        InputEvent::PasteChunk(chunk) => {
            let mut ctx = ActionContext::new(buffer, &mut session.kill_ring);
            insert_text(&mut ctx, &chunk);
            Ok(LoopOutcome::Continue)
        }
        InputEvent::TextCommit(text) => {
            let mut ctx = ActionContext::new(buffer, &mut session.kill_ring);
            insert_text(&mut ctx, &text);
            Ok(LoopOutcome::Continue)
        }
        InputEvent::PasteStart | InputEvent::PasteEnd => Ok(LoopOutcome::Continue),
        InputEvent::Mouse(_) | InputEvent::FocusGained | InputEvent::FocusLost => {
            Ok(LoopOutcome::Continue)
        }
        InputEvent::RawBytes(bytes) => {
            warn!(target: "readline.loop", len = bytes.len(), "unrecognized_raw_bytes_ignored");
            Ok(LoopOutcome::Continue)
        }
        InputEvent::Key(_) => Ok(LoopOutcome::Continue),
    }
}

fn handle_key(
    session: &mut Session,
    buffer: &mut Buffer,
    history_cursor: &mut HistoryCursor,
    token: KeyToken,
) -> Result<LoopOutcome, ReadlineError> {
    // Ctrl-D: EOF on an empty buffer, forward-delete otherwise. This
    // depends on buffer state, so (like Enter) it's handled directly by
    // the loop rather than through the flat keybinding table.
    let (base, mods) = normalize(&token);
    if base == KeyBase::Char('d') && mods == ModMask::CTRL {
        if buffer.len_bytes() == 0 {
            debug!(target: "readline.loop", "ctrl_d_eof_on_empty_buffer");
            return Ok(LoopOutcome::Abort);
        }
        let mut ctx = ActionContext::new(buffer, &mut session.kill_ring);
        core_actions::delete_forward(&mut ctx);
        return Ok(LoopOutcome::Continue);
    }

    // Enter's meaning depends on whether the multiline context reports the
    // command complete, so it is never looked up in the keymap table.
    if matches!(token, KeyToken::Named(NamedKey::Enter)) {
        if buffer.is_command_complete() {
            trace!(target: "readline.loop", op = "accept", "enter");
            return Ok(LoopOutcome::Accept);
        }
        let mut ctx = ActionContext::new(buffer, &mut session.kill_ring);
        core_actions::insert_char(&mut ctx, '\n');
        return Ok(LoopOutcome::Continue);
    }

    if let KeyToken::Char(c) = token {
        let mut ctx = ActionContext::new(buffer, &mut session.kill_ring);
        core_actions::insert_char(&mut ctx, c);
        return Ok(LoopOutcome::Continue);
    }

    let Some(action) = session.keymap.lookup(&token) else {
        return Ok(LoopOutcome::Continue);
    };

    match action {
        Action::RequestCompletion => {
            apply_completion(session, buffer);
        }
        Action::HistoryPrev => {
            navigate_history(session, buffer, history_cursor, -1);
        }
        Action::HistoryNext => {
            navigate_history(session, buffer, history_cursor, 1);
        }
        other => {
            let mut ctx = ActionContext::new(buffer, &mut session.kill_ring);
            dispatch(other, &mut ctx);
        }
    }
    Ok(LoopOutcome::Continue)
}

/// Invoke the completion hook and, if it returns exactly one candidate,
/// apply it. Presenting and navigating a multi-candidate menu is out of
/// scope here — the loop only wires the hook (§6.3), it does not own menu
/// state.
fn apply_completion(session: &mut Session, buffer: &mut Buffer) {
    let Some(source) = session.completion.as_deref() else {
        return;
    };
    let text = buffer.text();
    let cursor_byte = buffer.cursor().byte_offset;
    match source.complete(&text, cursor_byte) {
        Ok(candidates) => apply_single_candidate(buffer, dedup_candidates(candidates)),
        Err(err) => warn!(target: "readline.completion", error = %err, "completion_source_failed"),
    }
}

/// Collapse candidates that name the same `(text, kind)` pair, keeping the
/// first occurrence. Text alone isn't enough — a builtin and an external
/// command can share a name and are genuinely different candidates (§6.3).
fn dedup_candidates(candidates: Vec<Completion>) -> Vec<Completion> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.replacement.clone(), c.kind)))
        .collect()
}

fn apply_single_candidate(buffer: &mut Buffer, mut candidates: Vec<Completion>) {
    if candidates.len() != 1 {
        return;
    }
    let candidate = candidates.remove(0);
    if let Err(err) = buffer.replace_range(
        candidate.start_byte,
        candidate.end_byte,
        &candidate.replacement,
    ) {
        warn!(target: "readline.completion", error = %err, "completion_replace_range_failed");
    }
}

/// Up/Down history navigation. `direction` is -1 for previous (older), +1
/// for next (newer). The in-progress buffer is staged before the first
/// navigation so returning past the most recent entry restores it, the
/// way interactive shells do.
fn navigate_history(
    session: &mut Session,
    buffer: &mut Buffer,
    cursor: &mut HistoryCursor,
    direction: i32,
) {
    if session.history.is_empty() {
        return;
    }
    if cursor.index.is_none() {
        if direction >= 0 {
            return; // nothing to do "next"-ing from the in-progress draft
        }
        cursor.staged = Some(buffer.text());
    }
    let len = session.history.len();
    let next_index = match cursor.index {
        None => Some(len - 1),
        Some(i) if direction < 0 => Some(if i == 0 { 0 } else { i - 1 }),
        Some(i) if i + 1 < len => Some(i + 1),
        Some(_) => None, // stepped past the newest entry: restore the draft
    };

    let replacement = match next_index {
        Some(i) => session.history.get(i).map(str::to_owned),
        None => cursor.staged.take(),
    };
    cursor.index = next_index;

    if let Some(text) = replacement {
        *buffer = Buffer::from_str("command", &text).unwrap_or_else(|_| {
            Buffer::from_str("command", "").expect("empty content is always valid")
        });
        let end = buffer.len_bytes();
        buffer
            .move_to(end)
            .expect("buffer length is always a grapheme boundary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::{RenderOutput, TerminalCapabilities as Caps};

    struct RecordingController {
        submissions: Vec<RenderOutput>,
    }

    impl DisplayController for RecordingController {
        fn submit(&mut self, output: &RenderOutput) -> Result<(), ModelError> {
            self.submissions.push(output.clone());
            Ok(())
        }
        fn capabilities(&self) -> Caps {
            Caps::detect()
        }
    }

    #[test]
    fn prompt_stores_raw_text() {
        let p = Prompt::new("$ ");
        assert_eq!(p.raw, "$ ");
    }

    #[test]
    fn session_builder_defaults_to_empty_history() {
        let display = Box::new(RecordingController {
            submissions: Vec::new(),
        });
        let session = Session::new(display, 8);
        assert!(session.history.is_empty());
        assert!(!session.initialized);
    }

    #[test]
    fn ensure_initialized_is_idempotent() {
        let display = Box::new(RecordingController {
            submissions: Vec::new(),
        });
        let mut session = Session::new(display, 8);
        session.ensure_initialized();
        session.ensure_initialized();
        assert!(session.initialized);
    }

    #[test]
    fn navigate_history_prev_then_next_restores_staged_buffer() {
        let display = Box::new(RecordingController {
            submissions: Vec::new(),
        });
        let mut session = Session::new(display, 8);
        session.history.push("first".into()).unwrap();
        session.history.push("second".into()).unwrap();
        let mut buffer = Buffer::from_str("t", "in progress").unwrap();
        let mut cursor = HistoryCursor::new();

        navigate_history(&mut session, &mut buffer, &mut cursor, -1);
        assert_eq!(buffer.text(), "second");
        navigate_history(&mut session, &mut buffer, &mut cursor, -1);
        assert_eq!(buffer.text(), "first");
        navigate_history(&mut session, &mut buffer, &mut cursor, 1);
        assert_eq!(buffer.text(), "second");
        navigate_history(&mut session, &mut buffer, &mut cursor, 1);
        assert_eq!(buffer.text(), "in progress");
    }

    #[test]
    fn apply_single_candidate_replaces_range() {
        let mut buffer = Buffer::from_str("t", "ls /ho").unwrap();
        let candidates = vec![Completion {
            replacement: "/home".to_string(),
            display: "/home".to_string(),
            start_byte: 3,
            end_byte: 7,
            kind: CompletionKind::Directory,
        }];
        apply_single_candidate(&mut buffer, candidates);
        assert_eq!(buffer.text(), "ls /home");
    }

    #[test]
    fn apply_candidate_noop_when_multiple() {
        let mut buffer = Buffer::from_str("t", "ls /ho").unwrap();
        let candidates = vec![
            Completion {
                replacement: "/home".to_string(),
                display: "/home".to_string(),
                start_byte: 3,
                end_byte: 7,
                kind: CompletionKind::Directory,
            },
            Completion {
                replacement: "/hope".to_string(),
                display: "/hope".to_string(),
                start_byte: 3,
                end_byte: 7,
                kind: CompletionKind::Directory,
            },
        ];
        apply_single_candidate(&mut buffer, candidates);
        assert_eq!(buffer.text(), "ls /ho");
    }

    #[test]
    fn dedup_candidates_keeps_distinct_kinds_same_text() {
        let candidates = vec![
            Completion {
                replacement: "echo".to_string(),
                display: "echo".to_string(),
                start_byte: 0,
                end_byte: 2,
                kind: CompletionKind::Builtin,
            },
            Completion {
                replacement: "echo".to_string(),
                display: "echo".to_string(),
                start_byte: 0,
                end_byte: 2,
                kind: CompletionKind::Command,
            },
        ];
        let deduped = dedup_candidates(candidates);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn dedup_candidates_collapses_same_text_and_kind() {
        let candidates = vec![
            Completion {
                replacement: "echo".to_string(),
                display: "echo".to_string(),
                start_byte: 0,
                end_byte: 2,
                kind: CompletionKind::Command,
            },
            Completion {
                replacement: "echo".to_string(),
                display: "echo".to_string(),
                start_byte: 0,
                end_byte: 2,
                kind: CompletionKind::Command,
            },
        ];
        let deduped = dedup_candidates(candidates);
        assert_eq!(deduped.len(), 1);
    }
}
