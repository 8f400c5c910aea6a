//! Event types and the synchronous priority dispatcher that routes them.
//!
//! The line editor runs a single-threaded cooperative loop: input arrives
//! from one source (the terminal), gets classified into an [`Event`], and is
//! pushed onto a priority queue that [`Dispatcher::process_pending`] drains
//! in one call per loop iteration. There is no background task, channel, or
//! async runtime here — that machinery belongs to full-screen editors
//! juggling multiple concurrent producers, not a line-at-a-time prompt.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Instant;
use tracing::trace;

/// Top-level event enum consumed by the readline event loop.
#[derive(Debug, Clone)]
pub enum Event {
    Input(InputEvent),
    Command(CommandEvent),
    RenderRequested,
    Tick,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum CommandEvent {
    Quit,
    Submit,
}

/// Normalized input events surfaced by the terminal byte-stream parser.
#[derive(Debug, Clone)]
pub enum InputEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    CtrlC,
    KeyPress(KeyEventExt),
    /// One or more extended grapheme clusters ready for insertion (already
    /// NFC normalized).
    TextCommit(String),
    PasteStart,
    /// A chunk within a bracketed paste. Never logged verbatim; only the
    /// chunk length should be recorded by instrumentation.
    PasteChunk(String),
    PasteEnd,
    Mouse(MouseEvent),
    FocusGained,
    FocusLost,
    /// Raw uninterpreted bytes (unrecognized escape sequence / terminal
    /// report) surfaced so the parser can keep making forward progress.
    RawBytes(Vec<u8>),
}

/// Rich keypress metadata: logical key identity, auto-repeat flag, and the
/// instant the terminal layer observed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyEventExt {
    pub token: KeyToken,
    pub repeat: bool,
    pub timestamp: Instant,
}

impl KeyEventExt {
    pub fn new(token: KeyToken) -> Self {
        Self::from_parts(token, false, Instant::now())
    }

    pub fn with_repeat(token: KeyToken, repeat: bool) -> Self {
        Self::from_parts(token, repeat, Instant::now())
    }

    pub fn from_parts(token: KeyToken, repeat: bool, timestamp: Instant) -> Self {
        Self {
            token,
            repeat,
            timestamp,
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ModMask: u16 { const CTRL=1; const ALT=2; const SHIFT=4; const META=8; const SUPER=16; }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Esc,
    Backspace,
    Tab,
    F(u8),
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
}

/// Canonical logical key tokens. `Chord` wraps a base token plus a modifier
/// mask so consumers can reconstruct combinations like Ctrl-Left precisely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyToken {
    Char(char),
    Named(NamedKey),
    Chord { base: Box<KeyToken>, mods: ModMask },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub column: u16,
    pub row: u16,
    pub mods: ModMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Down(MouseButton),
    Up(MouseButton),
    Drag(MouseButton),
    ScrollUp,
    ScrollDown,
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct KeyModifiers: u8 {
        const CTRL = 0b0000_0001;
        const ALT  = 0b0000_0010;
        const SHIFT= 0b0000_0100;
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.code, self.mods)
    }
}

/// Hooks observing events at the dispatch boundary. Must not block.
pub trait EventHooks: Send + Sync + 'static {
    fn pre_dispatch(&self, _event: &Event) {}
    fn post_dispatch(&self, _event: &Event) {}
}

pub struct NoopEventHooks;
impl EventHooks for NoopEventHooks {}

/// Priority tier for queued events. `Critical` (Ctrl-C, resize) always
/// drains ahead of ordinary key traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Outcome of running an event through a single filter.
pub enum FilterOutcome {
    Pass,
    Block,
    Transform(Event),
    Error(anyhow::Error),
}

pub trait EventFilter: Send + Sync {
    fn apply(&self, event: &Event) -> FilterOutcome;
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

struct QueuedEvent {
    priority: Priority,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; within a priority, lower seq (older) first —
        // a max-heap naturally does the former, and reversing the seq
        // comparison gives FIFO ordering for the latter.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded priority queue. On overflow the lowest-priority, oldest entry is
/// evicted to make room for the incoming push.
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(256)),
            next_seq: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, event: Event, priority: Priority) {
        if self.heap.len() >= self.capacity {
            self.evict_weakest();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent {
            priority,
            seq,
            event,
        });
    }

    fn evict_weakest(&mut self) {
        // BinaryHeap only exposes a max; find the weakest (lowest priority,
        // then highest/newest seq) by linear scan — the queue is small and
        // bounded, so this stays cheap relative to a full reorder.
        let weakest = self
            .heap
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(i, _)| i);
        if let Some(idx) = weakest {
            let mut items: Vec<_> = self.heap.drain().collect();
            items.remove(idx);
            self.heap = items.into_iter().collect();
            trace!(target: "events.queue", "evicted lowest-priority event on overflow");
        }
    }

    fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }
}

/// Synchronous event router: filter chain, then every registered handler,
/// wrapped by pre/post hooks.
pub struct Dispatcher {
    queue: EventQueue,
    filters: Vec<Box<dyn EventFilter>>,
    handlers: Vec<Box<dyn EventHandler>>,
    hooks: Box<dyn EventHooks>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: EventQueue::new(capacity),
            filters: Vec::new(),
            handlers: Vec::new(),
            hooks: Box::new(NoopEventHooks),
        }
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn EventHooks>) {
        self.hooks = hooks;
    }
    pub fn add_filter(&mut self, filter: Box<dyn EventFilter>) {
        self.filters.push(filter);
    }
    pub fn add_handler(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }
    pub fn push(&mut self, event: Event, priority: Priority) {
        self.queue.push(event, priority);
    }
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain every event currently queued, running the filter chain and then
    /// every handler for each surviving event. Returns the number handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(mut event) = self.queue.pop() {
            let mut blocked = false;
            for filter in &self.filters {
                match filter.apply(&event) {
                    FilterOutcome::Pass => {}
                    FilterOutcome::Block => {
                        blocked = true;
                        break;
                    }
                    FilterOutcome::Transform(new_event) => event = new_event,
                    FilterOutcome::Error(err) => {
                        tracing::warn!(target: "events.dispatch", error = %err, "filter error");
                        blocked = true;
                        break;
                    }
                }
            }
            if blocked {
                continue;
            }
            self.hooks.pre_dispatch(&event);
            for handler in &self.handlers {
                handler.handle(&event);
            }
            self.hooks.post_dispatch(&event);
            handled += 1;
        }
        handled
    }
}
