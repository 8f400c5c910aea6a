//! Terminal capability classification.
//!
//! Detection runs once at session start and is cheap: no escape-sequence
//! probing or round trips, just the standard `TERM` / `TERM_PROGRAM` /
//! `COLORTERM` environment triage every terminal-aware CLI does.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TerminalFamily {
    Xterm,
    Screen,
    Tmux,
    Linux,
    Dumb,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct TerminalCapabilities {
    pub family: TerminalFamily,
    pub supports_truecolor: bool,
    pub supports_bracketed_paste: bool,
    pub supports_focus_events: bool,
}

impl TerminalCapabilities {
    pub fn detect() -> Self {
        Self::from_env(
            std::env::var("TERM").ok(),
            std::env::var("TERM_PROGRAM").ok(),
            std::env::var("COLORTERM").ok(),
        )
    }

    fn from_env(
        term: Option<String>,
        term_program: Option<String>,
        colorterm: Option<String>,
    ) -> Self {
        let term = term.unwrap_or_default();
        let family = classify_family(&term, term_program.as_deref());
        let dumb = term == "dumb";
        let supports_truecolor = !dumb
            && matches!(colorterm.as_deref(), Some("truecolor") | Some("24bit"));
        let supports_bracketed_paste = !dumb && family != TerminalFamily::Dumb;
        let supports_focus_events = !dumb && family != TerminalFamily::Dumb;
        Self {
            family: if dumb { TerminalFamily::Dumb } else { family },
            supports_truecolor,
            supports_bracketed_paste,
            supports_focus_events,
        }
    }
}

fn classify_family(term: &str, term_program: Option<&str>) -> TerminalFamily {
    if term.is_empty() || term == "dumb" {
        return TerminalFamily::Dumb;
    }
    if term.starts_with("tmux") || term_program == Some("tmux") {
        return TerminalFamily::Tmux;
    }
    if term.starts_with("screen") {
        return TerminalFamily::Screen;
    }
    if term.starts_with("linux") {
        return TerminalFamily::Linux;
    }
    if term.starts_with("xterm") || term.starts_with("rxvt") || term.starts_with("vt1") {
        return TerminalFamily::Xterm;
    }
    TerminalFamily::Other
}
