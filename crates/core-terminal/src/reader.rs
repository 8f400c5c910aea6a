//! Non-blocking, timed byte reads from stdin, and window-size queries.
//!
//! `crossterm` doesn't expose raw byte-level timed reads on its own; the
//! parser needs to poll with a short deadline so it can resolve an ambiguous
//! `ESC` sequence (see `core_input::parser::ESCAPE_TIMEOUT`). This mirrors
//! the `libc::poll` + `libc::read` pattern readline implementations use for
//! the same reason.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// A handle to stdin for blocking, timeout-bounded single-byte reads.
pub struct RawReader {
    fd: RawFd,
}

impl RawReader {
    pub fn stdin() -> Self {
        Self { fd: libc::STDIN_FILENO }
    }

    /// Wait up to `timeout` for a byte to become available and read it.
    /// Returns `Ok(None)` on timeout, `Ok(Some(byte))` on success.
    pub fn read_byte_timeout(&self, timeout: Duration) -> io::Result<Option<u8>> {
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let rc = unsafe { libc::poll(&mut pollfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        let n = unsafe { libc::read(self.fd, byte.as_mut_ptr() as *mut libc::c_void, 1) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(err);
        }
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(byte[0]))
    }
}

/// Query the terminal's column/row size: `ioctl(TIOCGWINSZ)` first, then the
/// `COLUMNS`/`LINES` environment variables, then an 80x24 fallback.
pub fn window_size() -> (u16, u16) {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        return (ws.ws_col, ws.ws_row);
    }
    let cols = std::env::var("COLUMNS")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|&c| c > 0);
    let rows = std::env::var("LINES")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|&r| r > 0);
    (cols.unwrap_or(80), rows.unwrap_or(24))
}
