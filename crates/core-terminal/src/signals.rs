//! Signal-driven state, surfaced as atomic flags drained at the top of the
//! event loop rather than handled inside the signal handler itself — the
//! handler only needs to be async-signal-safe, so it does nothing but flip
//! a flag.

use std::sync::atomic::{AtomicBool, Ordering};

pub static WINCH: AtomicBool = AtomicBool::new(false);
pub static TSTP: AtomicBool = AtomicBool::new(false);
pub static CONT: AtomicBool = AtomicBool::new(false);
pub static INT: AtomicBool = AtomicBool::new(false);
pub static TERM: AtomicBool = AtomicBool::new(false);

extern "C" fn on_winch(_: libc::c_int) {
    WINCH.store(true, Ordering::SeqCst);
}
extern "C" fn on_tstp(_: libc::c_int) {
    TSTP.store(true, Ordering::SeqCst);
}
extern "C" fn on_cont(_: libc::c_int) {
    CONT.store(true, Ordering::SeqCst);
}
extern "C" fn on_int(_: libc::c_int) {
    INT.store(true, Ordering::SeqCst);
}
extern "C" fn on_term(_: libc::c_int) {
    TERM.store(true, Ordering::SeqCst);
}

/// Install handlers for the signals the readline loop cares about. Safe to
/// call more than once (re-installs the same handlers).
pub fn install() {
    unsafe {
        libc::signal(libc::SIGWINCH, on_winch as libc::sighandler_t);
        libc::signal(libc::SIGTSTP, on_tstp as libc::sighandler_t);
        libc::signal(libc::SIGCONT, on_cont as libc::sighandler_t);
        libc::signal(libc::SIGINT, on_int as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_term as libc::sighandler_t);
    }
}

/// Snapshot of which flags are currently set, clearing them atomically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSnapshot {
    pub winch: bool,
    pub tstp: bool,
    pub cont: bool,
    pub int: bool,
    pub term: bool,
}

/// Drain all pending signal flags, returning which fired since the last
/// drain. Call once per event-loop iteration.
pub fn drain() -> SignalSnapshot {
    SignalSnapshot {
        winch: WINCH.swap(false, Ordering::SeqCst),
        tstp: TSTP.swap(false, Ordering::SeqCst),
        cont: CONT.swap(false, Ordering::SeqCst),
        int: INT.swap(false, Ordering::SeqCst),
        term: TERM.swap(false, Ordering::SeqCst),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_clears_flags() {
        WINCH.store(true, Ordering::SeqCst);
        let snap = drain();
        assert!(snap.winch);
        assert!(!WINCH.load(Ordering::SeqCst));
        let snap2 = drain();
        assert!(!snap2.winch);
    }
}
