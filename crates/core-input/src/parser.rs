//! Hand-rolled byte-stream parser for terminal input.
//!
//! Terminals deliver keystrokes, mouse reports, and bracketed-paste markers
//! as a flat byte stream; multi-byte sequences (UTF-8 characters, CSI escape
//! sequences) are inherently ambiguous with a single-character lookahead —
//! `ESC` alone could be the Escape key, or the first byte of an arrow key.
//! The standard resolution (also used by readline implementations reading
//! raw terminal bytes) is a short ambiguity window: if no further bytes
//! arrive within [`ESCAPE_TIMEOUT`], whatever was pending gets resolved on
//! its own.
//!
//! This parser never allocates on the hot path for the common case (plain
//! ASCII / a short CSI sequence) thanks to `smallvec`.

use core_events::{InputEvent, KeyToken, ModMask, MouseButton, MouseEvent, MouseEventKind, NamedKey};
use smallvec::SmallVec;
use std::time::{Duration, Instant};

/// How long the parser waits for a sequence to continue before resolving a
/// lone `ESC` (or an otherwise-stalled escape sequence) on its own.
pub const ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
enum State {
    Ground,
    Escape,
    Ss2,
    Ss3,
    Csi {
        params: SmallVec<[u8; 16]>,
        intermediate: Option<u8>,
    },
    Utf8Continuation {
        expected: usize,
        buf: SmallVec<[u8; 4]>,
    },
    BracketedPaste {
        buf: String,
    },
}

/// Streaming byte-to-event parser. Feed it bytes as they arrive from the
/// terminal; it accumulates partial sequences internally and returns
/// completed events as soon as they're unambiguous.
pub struct Parser {
    state: State,
    pending_since: Option<Instant>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            pending_since: None,
        }
    }

    /// How long the caller should block waiting for more bytes before
    /// calling [`Parser::flush_timeout`]. `None` means there's no pending
    /// ambiguous sequence, so the caller can block indefinitely.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.pending_since
            .map(|since| ESCAPE_TIMEOUT.saturating_sub(since.elapsed()))
    }

    /// Resolve whatever is pending when no further bytes arrived in time.
    /// Only a lone `ESC` resolves to something meaningful; a stalled CSI/UTF8
    /// sequence degrades to `RawBytes` so the parser can't get stuck.
    pub fn flush_timeout(&mut self) -> Option<InputEvent> {
        if self.pending_since.is_none() {
            return None;
        }
        self.pending_since = None;
        match std::mem::replace(&mut self.state, State::Ground) {
            State::Escape => Some(key_press(KeyToken::Named(NamedKey::Esc))),
            State::Csi { .. } | State::Ss2 | State::Ss3 => {
                Some(InputEvent::RawBytes(vec![0x1B]))
            }
            State::Utf8Continuation { buf, .. } => Some(InputEvent::RawBytes(buf.to_vec())),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Feed a single byte; returns a completed event, if this byte finished
    /// one.
    pub fn feed(&mut self, byte: u8) -> Option<InputEvent> {
        match &mut self.state {
            State::Ground => self.feed_ground(byte),
            State::Escape => self.feed_escape(byte),
            State::Ss2 => self.feed_ss(byte, true),
            State::Ss3 => self.feed_ss(byte, false),
            State::Csi { .. } => self.feed_csi(byte),
            State::Utf8Continuation { .. } => self.feed_utf8(byte),
            State::BracketedPaste { .. } => self.feed_paste(byte),
        }
    }

    fn feed_ground(&mut self, byte: u8) -> Option<InputEvent> {
        match byte {
            0x1B => {
                self.state = State::Escape;
                self.pending_since = Some(Instant::now());
                None
            }
            0x0D | 0x0A => Some(key_press(KeyToken::Named(NamedKey::Enter))),
            0x09 => Some(key_press(KeyToken::Named(NamedKey::Tab))),
            0x7F | 0x08 => Some(key_press(KeyToken::Named(NamedKey::Backspace))),
            0x03 => Some(InputEvent::CtrlC),
            0x00..=0x1F => {
                let base = (byte | 0x60) as char;
                Some(key_press(chord(KeyToken::Char(base), ModMask::CTRL)))
            }
            0x20..=0x7E => Some(key_press(KeyToken::Char(byte as char))),
            _ => {
                let expected = utf8_len(byte);
                if expected <= 1 {
                    // Invalid lead byte (stray continuation byte); surface
                    // raw so callers can decide how to degrade.
                    return Some(InputEvent::RawBytes(vec![byte]));
                }
                let mut buf = SmallVec::new();
                buf.push(byte);
                self.state = State::Utf8Continuation {
                    expected,
                    buf,
                };
                None
            }
        }
    }

    fn feed_utf8(&mut self, byte: u8) -> Option<InputEvent> {
        let State::Utf8Continuation { expected, buf } = &mut self.state else {
            unreachable!()
        };
        buf.push(byte);
        if buf.len() < *expected {
            return None;
        }
        let bytes = std::mem::take(buf).to_vec();
        let expected_len = *expected;
        self.state = State::Ground;
        match std::str::from_utf8(&bytes) {
            Ok(s) => s.chars().next().map(|c| key_press(KeyToken::Char(c))),
            Err(_) => {
                let _ = expected_len;
                Some(InputEvent::RawBytes(bytes))
            }
        }
    }

    fn feed_escape(&mut self, byte: u8) -> Option<InputEvent> {
        match byte {
            b'[' => {
                self.state = State::Csi {
                    params: SmallVec::new(),
                    intermediate: None,
                };
                None
            }
            b'O' => {
                self.state = State::Ss3;
                None
            }
            b'N' => {
                self.state = State::Ss2;
                None
            }
            0x0D | 0x0A => {
                self.pending_since = None;
                self.state = State::Ground;
                Some(key_press(chord(KeyToken::Named(NamedKey::Enter), ModMask::ALT)))
            }
            0x20..=0x7E => {
                self.pending_since = None;
                self.state = State::Ground;
                Some(key_press(chord(KeyToken::Char(byte as char), ModMask::ALT)))
            }
            _ => {
                self.pending_since = None;
                self.state = State::Ground;
                Some(InputEvent::RawBytes(vec![0x1B, byte]))
            }
        }
    }

    fn feed_ss(&mut self, byte: u8, ss2: bool) -> Option<InputEvent> {
        self.pending_since = None;
        self.state = State::Ground;
        let token = match byte {
            b'P' => Some(NamedKey::F(1)),
            b'Q' => Some(NamedKey::F(2)),
            b'R' => Some(NamedKey::F(3)),
            b'S' => Some(NamedKey::F(4)),
            b'H' => Some(NamedKey::Home),
            b'F' => Some(NamedKey::End),
            b'A' => Some(NamedKey::Up),
            b'B' => Some(NamedKey::Down),
            b'C' => Some(NamedKey::Right),
            b'D' => Some(NamedKey::Left),
            _ => None,
        };
        match token {
            Some(t) => Some(key_press(KeyToken::Named(t))),
            None => Some(InputEvent::RawBytes(vec![
                0x1B,
                if ss2 { b'N' } else { b'O' },
                byte,
            ])),
        }
    }

    fn feed_csi(&mut self, byte: u8) -> Option<InputEvent> {
        let State::Csi { params, intermediate } = &mut self.state else {
            unreachable!()
        };
        match byte {
            0x30..=0x3F => {
                params.push(byte);
                None
            }
            0x20..=0x2F => {
                *intermediate = Some(byte);
                None
            }
            0x40..=0x7E => {
                self.pending_since = None;
                let params = std::mem::take(params);
                let intermediate = *intermediate;
                self.state = State::Ground;
                self.resolve_csi(&params, intermediate, byte)
            }
            _ => {
                self.pending_since = None;
                self.state = State::Ground;
                Some(InputEvent::RawBytes(vec![byte]))
            }
        }
    }

    fn resolve_csi(
        &mut self,
        params: &[u8],
        intermediate: Option<u8>,
        final_byte: u8,
    ) -> Option<InputEvent> {
        let nums = parse_params(params);

        if intermediate == Some(b'<') && (final_byte == b'M' || final_byte == b'm') {
            return parse_sgr_mouse(&nums, final_byte == b'm');
        }

        let mods = nums.get(1).copied().map(mods_from_xterm_param).unwrap_or(ModMask::empty());

        let named = match final_byte {
            b'A' => Some(NamedKey::Up),
            b'B' => Some(NamedKey::Down),
            b'C' => Some(NamedKey::Right),
            b'D' => Some(NamedKey::Left),
            b'H' => Some(NamedKey::Home),
            b'F' => Some(NamedKey::End),
            b'Z' => return Some(key_press(chord(KeyToken::Named(NamedKey::Tab), ModMask::SHIFT))),
            b'~' => match nums.first().copied().unwrap_or(0) {
                1 | 7 => Some(NamedKey::Home),
                2 => Some(NamedKey::Insert),
                3 => Some(NamedKey::Delete),
                4 | 8 => Some(NamedKey::End),
                5 => Some(NamedKey::PageUp),
                6 => Some(NamedKey::PageDown),
                11 => Some(NamedKey::F(1)),
                12 => Some(NamedKey::F(2)),
                13 => Some(NamedKey::F(3)),
                14 => Some(NamedKey::F(4)),
                15 => Some(NamedKey::F(5)),
                17 => Some(NamedKey::F(6)),
                18 => Some(NamedKey::F(7)),
                19 => Some(NamedKey::F(8)),
                20 => Some(NamedKey::F(9)),
                21 => Some(NamedKey::F(10)),
                23 => Some(NamedKey::F(11)),
                24 => Some(NamedKey::F(12)),
                200 => {
                    self.state = State::BracketedPaste { buf: String::new() };
                    return Some(InputEvent::PasteStart);
                }
                201 => return Some(InputEvent::PasteEnd),
                _ => None,
            },
            b'I' => return Some(InputEvent::FocusGained),
            b'O' => return Some(InputEvent::FocusLost),
            // xterm's `modifyOtherKeys` / "CSI u" protocol: `CSI <keycode> ; <mods> u`
            // reports keys (notably Enter, Tab) together with a modifier that a bare
            // control byte can't carry, e.g. distinguishing Shift-Enter from Enter.
            b'u' => match nums.first().copied().unwrap_or(0) {
                13 => Some(NamedKey::Enter),
                9 => Some(NamedKey::Tab),
                27 => Some(NamedKey::Esc),
                127 => Some(NamedKey::Backspace),
                _ => None,
            },
            _ => None,
        };

        match named {
            Some(n) => {
                let token = if mods.is_empty() {
                    KeyToken::Named(n)
                } else {
                    chord(KeyToken::Named(n), mods)
                };
                Some(key_press(token))
            }
            None => Some(InputEvent::RawBytes(build_raw_csi(params, intermediate, final_byte))),
        }
    }

    fn feed_paste(&mut self, byte: u8) -> Option<InputEvent> {
        const FLUSH_THRESHOLD: usize = 4096;
        let State::BracketedPaste { buf } = &mut self.state else {
            unreachable!()
        };
        // Detect the terminator ESC[201~ byte-by-byte without a nested
        // sub-parser: bracketed-paste bodies are defined not to contain an
        // unescaped ESC, so seeing one always means "end of paste".
        if byte == 0x1B {
            self.state = State::Escape;
            self.pending_since = Some(Instant::now());
            return None;
        }
        buf.push(byte as char);
        if buf.len() >= FLUSH_THRESHOLD {
            let chunk = std::mem::take(buf);
            crate::log_paste_chunk_flush(chunk.len());
            return Some(InputEvent::PasteChunk(chunk));
        }
        None
    }
}

fn key_press(token: KeyToken) -> InputEvent {
    InputEvent::KeyPress(core_events::KeyEventExt::new(token))
}

fn chord(base: KeyToken, mods: ModMask) -> KeyToken {
    KeyToken::Chord {
        base: Box::new(base),
        mods,
    }
}

fn utf8_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        0
    }
}

fn parse_params(raw: &[u8]) -> SmallVec<[i64; 4]> {
    let mut out = SmallVec::new();
    let mut cur: Option<i64> = None;
    for &b in raw {
        if b == b';' {
            out.push(cur.unwrap_or(0));
            cur = None;
        } else if b.is_ascii_digit() {
            cur = Some(cur.unwrap_or(0) * 10 + (b - b'0') as i64);
        }
    }
    out.push(cur.unwrap_or(0));
    out
}

/// xterm's modifier parameter is `1 + bitmask` (Shift=1, Alt=2, Ctrl=4, ...).
fn mods_from_xterm_param(param: i64) -> ModMask {
    let bits = (param - 1).max(0) as u16;
    let mut mods = ModMask::empty();
    if bits & 1 != 0 {
        mods |= ModMask::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= ModMask::ALT;
    }
    if bits & 4 != 0 {
        mods |= ModMask::CTRL;
    }
    if bits & 8 != 0 {
        mods |= ModMask::META;
    }
    mods
}

fn parse_sgr_mouse(nums: &[i64], released: bool) -> Option<InputEvent> {
    let code = *nums.first()?;
    let column = (*nums.get(1)? - 1).max(0) as u16;
    let row = (*nums.get(2)? - 1).max(0) as u16;
    let mut mods = ModMask::empty();
    if code & 4 != 0 {
        mods |= ModMask::SHIFT;
    }
    if code & 8 != 0 {
        mods |= ModMask::ALT;
    }
    if code & 16 != 0 {
        mods |= ModMask::CTRL;
    }
    let button_bits = code & 0x3;
    let is_scroll = code & 0x40 != 0;
    let is_drag = code & 0x20 != 0;
    let kind = if is_scroll {
        if button_bits == 0 {
            MouseEventKind::ScrollUp
        } else {
            MouseEventKind::ScrollDown
        }
    } else {
        let button = match button_bits {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            _ => MouseButton::Right,
        };
        if is_drag {
            MouseEventKind::Drag(button)
        } else if released {
            MouseEventKind::Up(button)
        } else {
            MouseEventKind::Down(button)
        }
    };
    Some(InputEvent::Mouse(MouseEvent {
        kind,
        column,
        row,
        mods,
    }))
}

fn build_raw_csi(params: &[u8], intermediate: Option<u8>, final_byte: u8) -> Vec<u8> {
    let mut out = vec![0x1B, b'['];
    out.extend_from_slice(params);
    if let Some(i) = intermediate {
        out.push(i);
    }
    out.push(final_byte);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(p: &mut Parser, s: &str) -> Vec<InputEvent> {
        let mut out = Vec::new();
        for b in s.bytes() {
            if let Some(e) = p.feed(b) {
                out.push(e);
            }
        }
        out
    }

    #[test]
    fn ascii_passthrough() {
        let mut p = Parser::new();
        let events = feed_str(&mut p, "ab");
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            InputEvent::KeyPress(k) if k.token == KeyToken::Char('a')
        ));
    }

    #[test]
    fn ctrl_a_maps_to_chord() {
        let mut p = Parser::new();
        let ev = p.feed(0x01).unwrap();
        match ev {
            InputEvent::KeyPress(k) => match k.token {
                KeyToken::Chord { base, mods } => {
                    assert_eq!(*base, KeyToken::Char('a'));
                    assert!(mods.contains(ModMask::CTRL));
                }
                other => panic!("expected chord, got {:?}", other),
            },
            other => panic!("expected key press, got {:?}", other),
        }
    }

    #[test]
    fn arrow_key_csi_sequence() {
        let mut p = Parser::new();
        assert!(p.feed(0x1B).is_none());
        assert!(p.feed(b'[').is_none());
        let ev = p.feed(b'A').unwrap();
        assert!(matches!(
            ev,
            InputEvent::KeyPress(k) if k.token == KeyToken::Named(NamedKey::Up)
        ));
    }

    #[test]
    fn tilde_form_delete_key() {
        let mut p = Parser::new();
        for b in [0x1B, b'[', b'3', b'~'] {
            let r = p.feed(b);
            if b == b'~' {
                assert!(matches!(
                    r,
                    Some(InputEvent::KeyPress(k)) if k.token == KeyToken::Named(NamedKey::Delete)
                ));
            }
        }
    }

    #[test]
    fn ctrl_right_arrow_with_modifier_param() {
        let mut p = Parser::new();
        let seq = [0x1B, b'[', b'1', b';', b'5', b'C'];
        let mut last = None;
        for b in seq {
            last = p.feed(b);
        }
        match last.unwrap() {
            InputEvent::KeyPress(k) => match k.token {
                KeyToken::Chord { base, mods } => {
                    assert_eq!(*base, KeyToken::Named(NamedKey::Right));
                    assert!(mods.contains(ModMask::CTRL));
                }
                other => panic!("expected chord, got {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn lone_escape_resolves_on_timeout() {
        let mut p = Parser::new();
        assert!(p.feed(0x1B).is_none());
        assert!(p.pending_since.is_some());
        let ev = p.flush_timeout().unwrap();
        assert!(matches!(
            ev,
            InputEvent::KeyPress(k) if k.token == KeyToken::Named(NamedKey::Esc)
        ));
    }

    #[test]
    fn alt_char_is_escape_then_char() {
        let mut p = Parser::new();
        assert!(p.feed(0x1B).is_none());
        let ev = p.feed(b'b').unwrap();
        match ev {
            InputEvent::KeyPress(k) => match k.token {
                KeyToken::Chord { base, mods } => {
                    assert_eq!(*base, KeyToken::Char('b'));
                    assert!(mods.contains(ModMask::ALT));
                }
                other => panic!("expected chord, got {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn meta_enter_is_escape_then_cr() {
        let mut p = Parser::new();
        assert!(p.feed(0x1B).is_none());
        let ev = p.feed(0x0D).unwrap();
        match ev {
            InputEvent::KeyPress(k) => match k.token {
                KeyToken::Chord { base, mods } => {
                    assert_eq!(*base, KeyToken::Named(NamedKey::Enter));
                    assert!(mods.contains(ModMask::ALT));
                }
                other => panic!("expected chord, got {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shift_enter_via_csi_u_protocol() {
        let mut p = Parser::new();
        let events = feed_str(&mut p, "\x1b[13;2u");
        assert_eq!(events.len(), 1);
        match &events[0] {
            InputEvent::KeyPress(k) => match &k.token {
                KeyToken::Chord { base, mods } => {
                    assert_eq!(**base, KeyToken::Named(NamedKey::Enter));
                    assert!(mods.contains(ModMask::SHIFT));
                }
                other => panic!("expected chord, got {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn utf8_multibyte_char() {
        let mut p = Parser::new();
        let bytes = "é".as_bytes();
        let mut last = None;
        for &b in bytes {
            last = p.feed(b);
        }
        assert!(matches!(
            last.unwrap(),
            InputEvent::KeyPress(k) if k.token == KeyToken::Char('é')
        ));
    }

    #[test]
    fn bracketed_paste_round_trip() {
        let mut p = Parser::new();
        for b in [0x1B, b'[', b'2', b'0', b'0', b'~'] {
            let _ = p.feed(b);
        }
        let start = p.feed(0); // no-op placeholder not needed; re-check via explicit call
        let _ = start;
        // Re-drive properly: the 200~ sequence itself produces PasteStart on '~'.
        let mut p2 = Parser::new();
        let mut events = Vec::new();
        for b in [0x1B, b'[', b'2', b'0', b'0', b'~'] {
            if let Some(e) = p2.feed(b) {
                events.push(e);
            }
        }
        assert!(matches!(events.last(), Some(InputEvent::PasteStart)));
        for b in "hi".bytes() {
            assert!(p2.feed(b).is_none());
        }
        for b in [0x1B, b'[', b'2', b'0', b'1', b'~'] {
            if let Some(e) = p2.feed(b) {
                events.push(e);
            }
        }
        assert!(matches!(events.last(), Some(InputEvent::PasteEnd)));
    }

    #[test]
    fn sgr_mouse_click() {
        let mut p = Parser::new();
        let seq = b"\x1b[<0;10;20M";
        let mut last = None;
        for &b in seq {
            last = p.feed(b);
        }
        match last.unwrap() {
            InputEvent::Mouse(m) => {
                assert_eq!(m.column, 9);
                assert_eq!(m.row, 19);
                assert!(matches!(m.kind, MouseEventKind::Down(MouseButton::Left)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
