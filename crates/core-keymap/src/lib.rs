//! Keybinding table: a flat map from `(key, modifier_mask)` to an action,
//! per the design note that dispatch should be "a flat map... no
//! inheritance, no virtual tables beyond this."
//!
//! This replaces the vi-style `PendingContext`/`MappingTrie` composition
//! engine entirely — a non-modal line editor has no operator-pending
//! state, no counts, no registers, so there is nothing left to compose.
//! What a keystroke means depends only on the key itself and the active
//! modifiers, resolved in one hash lookup.

use core_events::{KeyToken, ModMask, NamedKey};
use std::collections::HashMap;
use tracing::debug;

/// A key's identity with any `Chord` wrapping unwrapped into a flat
/// `(base, mods)` pair, so `Ctrl-Left` and a plain `Left` normalize to
/// comparable keys instead of one being nested inside the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBase {
    Char(char),
    Named(NamedKey),
}

/// Decompose a `KeyToken` into its base key and accumulated modifiers.
pub fn normalize(token: &KeyToken) -> (KeyBase, ModMask) {
    match token {
        KeyToken::Char(c) => (KeyBase::Char(*c), ModMask::empty()),
        KeyToken::Named(n) => (KeyBase::Named(*n), ModMask::empty()),
        KeyToken::Chord { base, mods } => {
            let (b, _) = normalize(base);
            (b, *mods)
        }
    }
}

/// Logical editing actions the readline loop's keybinding table can
/// resolve a keystroke to. Printable-character insertion does not go
/// through this table at all — `InputEvent::Key`/`KeyPress` carrying a
/// plain `Char` with no modifiers is routed straight to the insert
/// handler by the loop, per spec's "Character: route to insert handler"
/// step, which never consults the keymap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MoveLeft,
    MoveRight,
    MoveWordLeft,
    MoveWordRight,
    MoveLineStart,
    MoveLineEnd,
    MoveUp,
    MoveDown,
    Backspace,
    DeleteForward,
    KillWordBackward,
    KillWordForward,
    KillToLineEnd,
    KillToLineStart,
    Yank,
    Undo,
    RequestCompletion,
    HistoryPrev,
    HistoryNext,
    InsertLiteralNewline,
}

/// A flat, immutable keybinding table. Construct with [`default_bindings`]
/// and override individual entries with [`KeyBindings::bind`].
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    map: HashMap<(KeyBase, ModMask), Action>,
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, base: KeyBase, mods: ModMask, action: Action) {
        self.map.insert((base, mods), action);
    }

    pub fn lookup(&self, token: &KeyToken) -> Option<Action> {
        let (base, mods) = normalize(token);
        self.map.get(&(base, mods)).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The bindings required by §4.6 at minimum: grapheme/word cursor motion,
/// Home/End/Ctrl-A/Ctrl-E, Backspace/Delete, Ctrl-W/Ctrl-K/Ctrl-U/Ctrl-Y,
/// Meta-d, Ctrl-_ (and the terminal-equivalent Ctrl-/, which arrives as
/// the same byte) for undo, Tab routed to completion, Up/Down routed to
/// history, and Shift-Enter/Meta-Enter for a literal newline. Enter itself
/// is handled directly by the readline loop (its meaning depends on
/// whether the multiline context reports the command complete), not by
/// this table.
pub fn default_bindings() -> KeyBindings {
    let mut kb = KeyBindings::new();
    let none = ModMask::empty();

    kb.bind(KeyBase::Named(NamedKey::Left), none, Action::MoveLeft);
    kb.bind(KeyBase::Named(NamedKey::Right), none, Action::MoveRight);
    kb.bind(
        KeyBase::Named(NamedKey::Left),
        ModMask::CTRL,
        Action::MoveWordLeft,
    );
    kb.bind(
        KeyBase::Named(NamedKey::Right),
        ModMask::CTRL,
        Action::MoveWordRight,
    );
    kb.bind(KeyBase::Char('b'), ModMask::ALT, Action::MoveWordLeft);
    kb.bind(KeyBase::Char('f'), ModMask::ALT, Action::MoveWordRight);

    kb.bind(KeyBase::Named(NamedKey::Home), none, Action::MoveLineStart);
    kb.bind(KeyBase::Char('a'), ModMask::CTRL, Action::MoveLineStart);
    kb.bind(KeyBase::Named(NamedKey::End), none, Action::MoveLineEnd);
    kb.bind(KeyBase::Char('e'), ModMask::CTRL, Action::MoveLineEnd);

    kb.bind(KeyBase::Named(NamedKey::Up), none, Action::HistoryPrev);
    kb.bind(KeyBase::Named(NamedKey::Down), none, Action::HistoryNext);

    kb.bind(KeyBase::Named(NamedKey::Backspace), none, Action::Backspace);
    kb.bind(KeyBase::Named(NamedKey::Delete), none, Action::DeleteForward);
    kb.bind(KeyBase::Char('w'), ModMask::CTRL, Action::KillWordBackward);
    kb.bind(KeyBase::Char('d'), ModMask::ALT, Action::KillWordForward);
    kb.bind(KeyBase::Char('k'), ModMask::CTRL, Action::KillToLineEnd);
    kb.bind(KeyBase::Char('u'), ModMask::CTRL, Action::KillToLineStart);
    kb.bind(KeyBase::Char('y'), ModMask::CTRL, Action::Yank);

    // Ctrl-_ and Ctrl-/ both arrive as the control byte 0x1F, which the
    // parser's ctrl-byte convention (`byte | 0x60`) resolves to the base
    // character DEL (0x7F) rather than '_' or '/' — there is only one
    // physical binding to make here, not two.
    kb.bind(KeyBase::Char('\u{7f}'), ModMask::CTRL, Action::Undo);

    kb.bind(KeyBase::Named(NamedKey::Tab), none, Action::RequestCompletion);

    kb.bind(
        KeyBase::Named(NamedKey::Enter),
        ModMask::ALT,
        Action::InsertLiteralNewline,
    );
    kb.bind(
        KeyBase::Named(NamedKey::Enter),
        ModMask::SHIFT,
        Action::InsertLiteralNewline,
    );

    debug!(target: "keymap.bindings", count = kb.len(), "default_bindings_built");
    kb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_left_resolves_to_move_left() {
        let kb = default_bindings();
        assert_eq!(
            kb.lookup(&KeyToken::Named(NamedKey::Left)),
            Some(Action::MoveLeft)
        );
    }

    #[test]
    fn ctrl_left_resolves_to_word_motion() {
        let kb = default_bindings();
        let token = KeyToken::Chord {
            base: Box::new(KeyToken::Named(NamedKey::Left)),
            mods: ModMask::CTRL,
        };
        assert_eq!(kb.lookup(&token), Some(Action::MoveWordLeft));
    }

    #[test]
    fn ctrl_underscore_resolves_to_undo() {
        let kb = default_bindings();
        let token = KeyToken::Chord {
            base: Box::new(KeyToken::Char('\u{7f}')),
            mods: ModMask::CTRL,
        };
        assert_eq!(kb.lookup(&token), Some(Action::Undo));
    }

    #[test]
    fn unbound_plain_char_resolves_to_none() {
        let kb = default_bindings();
        assert_eq!(kb.lookup(&KeyToken::Char('x')), None);
    }

    #[test]
    fn shift_enter_and_meta_enter_both_insert_newline() {
        let kb = default_bindings();
        let shift = KeyToken::Chord {
            base: Box::new(KeyToken::Named(NamedKey::Enter)),
            mods: ModMask::SHIFT,
        };
        let meta = KeyToken::Chord {
            base: Box::new(KeyToken::Named(NamedKey::Enter)),
            mods: ModMask::ALT,
        };
        assert_eq!(kb.lookup(&shift), Some(Action::InsertLiteralNewline));
        assert_eq!(kb.lookup(&meta), Some(Action::InsertLiteralNewline));
    }

    #[test]
    fn bare_enter_is_unbound_loop_handles_it_directly() {
        let kb = default_bindings();
        assert_eq!(kb.lookup(&KeyToken::Named(NamedKey::Enter)), None);
    }
}
