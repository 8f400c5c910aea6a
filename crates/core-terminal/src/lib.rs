//! Terminal backend: raw-mode lifecycle, capability detection, timed byte
//! reads, window sizing, and signal plumbing.
//!
//! Unlike a full-screen editor, a line editor never takes the alternate
//! screen or hides the cursor on entry — the prompt has to stay inline with
//! the shell's own scrollback. Entering only flips the terminal into raw
//! mode so keystrokes arrive unbuffered and unechoed.

use anyhow::Result;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

pub mod capabilities;
pub mod reader;
pub mod signals;

pub use capabilities::{TerminalCapabilities, TerminalFamily};
pub use reader::{RawReader, window_size};

pub trait TerminalBackend {
    fn enter(&mut self) -> Result<()>;
    fn leave(&mut self) -> Result<()>;
}

pub struct CrosstermBackend {
    entered: bool,
}

/// RAII guard ensuring terminal state restoration even if the caller
/// early-returns or panics mid-session.
pub struct TerminalGuard<'a> {
    backend: &'a mut CrosstermBackend,
    active: bool,
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermBackend {
    pub fn new() -> Self {
        Self { entered: false }
    }

    /// Enter raw mode and return a guard that restores cooked mode on drop.
    pub fn enter_guard(&mut self) -> Result<TerminalGuard<'_>> {
        self.enter()?;
        Ok(TerminalGuard {
            backend: self,
            active: true,
        })
    }
}

impl TerminalBackend for CrosstermBackend {
    fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            self.entered = true;
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if self.entered {
            disable_raw_mode()?;
            self.entered = false;
        }
        Ok(())
    }
}

impl Drop for CrosstermBackend {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

impl<'a> Drop for TerminalGuard<'a> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.backend.leave();
        }
    }
}
