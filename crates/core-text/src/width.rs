//! Grapheme cluster display-width engine.
//!
//! A single authoritative function, [`egc_width`], returns the terminal
//! column width for a grapheme cluster (EGC). Width decisions should always
//! flow through this function rather than calling `unicode_width` directly,
//! so that the emoji/combining-mark special cases below stay centralized.
//!
//! Precedence order:
//! 1. Static override table (sequences the classifier alone gets wrong).
//! 2. Classifier (semantic kind -> width mapping).
//! 3. Conservative widen fallback (pictographic signal present but width==1).
//!
//! The classifier is heuristic and biased toward over-estimating width for
//! emoji/pictographic composites: over-estimation costs a harmless blank
//! cell, under-estimation causes visible cursor drift. We intentionally do
//! not depend on a full Unicode property database; small range checks cover
//! the cases a shell line editor actually sees (regional indicators, skin
//! tone modifiers, ZWJ sequences, keycaps, combining marks).

/// Statically embedded width corrections for sequences `classify` alone
/// cannot resolve correctly. Must stay sorted by `seq` for the binary
/// search in [`override_width`].
const OVERRIDES: &[(&str, u16)] = &[
    ("1️⃣", 2),
    ("⚙", 1),
    ("⚙️", 1),
    ("✈️", 2),
    ("🇺🇸", 2),
    ("👍🏻", 2),
    ("👨‍👩‍👧‍👦", 2),
];

/// Semantic classification of a single grapheme cluster (EGC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EgcKind {
    Ascii,
    Narrow,
    Wide,
    EmojiSimple,     // Single pictographic (with optional VS16), no modifiers
    EmojiModifier,   // Emoji + skin tone modifier
    EmojiKeycap,     // Keycap sequence (base + optional VS16 + U+20E3)
    EmojiFlag,       // Regional indicator pair
    EmojiZwj,        // ZWJ sequence combining >=2 pictographic bases
    Combining(bool), // Base + combining mark(s); true => base is wide/emoji
    Other,
}

const ZWJ: char = '\u{200D}';
const VS16: char = '\u{FE0F}';
const KEYCAP_COMBINING: char = '\u{20E3}';

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone_modifier(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

fn is_extended_pictographic(c: char) -> bool {
    ('\u{1F300}'..='\u{1FAFF}').contains(&c) || ('\u{2600}'..='\u{27BF}').contains(&c)
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
        || ('\u{1AB0}'..='\u{1AFF}').contains(&c)
        || ('\u{1DC0}'..='\u{1DFF}').contains(&c)
        || ('\u{20D0}'..='\u{20FF}').contains(&c)
        || ('\u{FE20}'..='\u{FE2F}').contains(&c)
}

/// Binary search the sorted override table for an exact match.
fn override_width(egc: &str) -> Option<u16> {
    let mut lo = 0usize;
    let mut hi = OVERRIDES.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        let (seq, w) = OVERRIDES[mid];
        match seq.cmp(egc) {
            core::cmp::Ordering::Less => lo = mid + 1,
            core::cmp::Ordering::Greater => hi = mid,
            core::cmp::Ordering::Equal => return Some(w),
        }
    }
    None
}

fn classify(egc: &str) -> EgcKind {
    if egc.is_empty() {
        return EgcKind::Other;
    }
    let mut chars = egc.chars().peekable();
    let first = *chars.peek().unwrap();
    let single = egc.chars().count() == 1;

    if single {
        if first.is_ascii() {
            return EgcKind::Ascii;
        }
        let uwidth = unicode_width::UnicodeWidthChar::width(first).unwrap_or(1);
        if is_extended_pictographic(first) {
            return EgcKind::EmojiSimple;
        }
        if uwidth == 2 {
            return EgcKind::Wide;
        }
        return EgcKind::Narrow;
    }

    let mut count_ep = 0usize;
    let mut count_ri = 0usize;
    let mut has_zwj = false;
    let mut has_skin = false;
    let mut has_combining = false;
    let mut keycap_base: Option<char> = None;
    let mut ends_with_keycap = false;
    let mut any_wide = false;
    let mut base_wide_or_emoji = false;
    let mut saw_non_mark_base = false;
    let total = egc.chars().count();

    for (i, c) in egc.chars().enumerate() {
        if is_extended_pictographic(c) {
            count_ep += 1;
        }
        if is_regional_indicator(c) {
            count_ri += 1;
        }
        if c == ZWJ {
            has_zwj = true;
        }
        if c == VS16 {
            // variation selector, emoji-presentation hint only
        }
        if is_skin_tone_modifier(c) {
            has_skin = true;
        }
        if is_combining_mark(c) {
            has_combining = true;
        }
        if c == KEYCAP_COMBINING && i == total - 1 {
            ends_with_keycap = true;
        }
        if keycap_base.is_none() && (c.is_ascii_digit() || c == '#' || c == '*') {
            keycap_base = Some(c);
        }
        if unicode_width::UnicodeWidthChar::width(c).unwrap_or(1) == 2 {
            any_wide = true;
        }
        if !saw_non_mark_base && !is_combining_mark(c) {
            saw_non_mark_base = true;
            if is_extended_pictographic(c)
                || unicode_width::UnicodeWidthChar::width(c).unwrap_or(1) == 2
            {
                base_wide_or_emoji = true;
            }
        }
    }

    if ends_with_keycap && keycap_base.is_some() {
        return EgcKind::EmojiKeycap;
    }
    if count_ri == 2 && total == 2 {
        return EgcKind::EmojiFlag;
    }
    if has_zwj && count_ep >= 2 {
        return EgcKind::EmojiZwj;
    }
    if count_ep >= 1 && has_skin {
        return EgcKind::EmojiModifier;
    }
    if count_ep == 1 && !has_zwj {
        return EgcKind::EmojiSimple;
    }
    if has_combining {
        return EgcKind::Combining(base_wide_or_emoji);
    }
    if any_wide {
        return EgcKind::Wide;
    }
    if count_ep > 0 {
        return EgcKind::EmojiSimple;
    }
    EgcKind::Narrow
}

#[inline]
fn width_for_kind(kind: EgcKind) -> u16 {
    match kind {
        EgcKind::Ascii | EgcKind::Narrow => 1,
        EgcKind::Wide
        | EgcKind::EmojiSimple
        | EgcKind::EmojiModifier
        | EgcKind::EmojiKeycap
        | EgcKind::EmojiFlag
        | EgcKind::EmojiZwj => 2,
        EgcKind::Combining(base_wide) => {
            if base_wide {
                2
            } else {
                1
            }
        }
        EgcKind::Other => 1,
    }
}

/// Display column width of a single grapheme cluster.
///
/// Precondition: `egc` is a single grapheme cluster (callers segment first;
/// this does not re-validate, to avoid a second scan over the text).
#[inline]
pub fn egc_width(egc: &str) -> u16 {
    if egc.is_empty() {
        return 0;
    }
    if let Some(w) = override_width(egc) {
        return w;
    }
    let kind = classify(egc);
    let mut width = width_for_kind(kind);
    if width == 1 {
        let has_signal = egc
            .chars()
            .any(|c| is_extended_pictographic(c) || is_regional_indicator(c));
        if has_signal {
            width = 2;
        }
    }
    width
}

/// Display width assuming `s` is already known to contain exactly one EGC.
#[inline]
pub fn egc_width_str(s: &str) -> u16 {
    egc_width(s)
}

/// Expand tabs to the next multiple of `tab_stop` starting from `col`.
pub fn advance_tab(col: usize, tab_stop: usize) -> usize {
    if tab_stop == 0 {
        return col + 1;
    }
    col + (tab_stop - (col % tab_stop))
}
