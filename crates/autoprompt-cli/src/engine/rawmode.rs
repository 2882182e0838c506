//! Operator terminal handling: raw mode and geometry.

use std::io::IsTerminal;

use anyhow::{bail, Result};
use tracing::debug;

use crate::engine::pty::TermSize;

/// Puts stdin in raw mode and restores the saved settings on drop.
pub struct RawModeGuard {
    original: libc::termios,
}

impl RawModeGuard {
    /// Enter raw mode. Returns `Ok(None)` when stdin is not a terminal.
    pub fn enter() -> Result<Option<Self>> {
        if !std::io::stdin().is_terminal() {
            debug!("stdin is not a terminal, leaving mode unchanged");
            return Ok(None);
        }

        // SAFETY: termios is plain data; tcgetattr fills it in on success.
        let mut original: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: STDIN_FILENO is a valid descriptor for the life of the process.
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut original) } != 0 {
            bail!(
                "Failed to read terminal settings: {}",
                std::io::Error::last_os_error()
            );
        }

        let mut raw = original;
        // SAFETY: raw is an initialized termios copied from tcgetattr.
        unsafe { libc::cfmakeraw(&mut raw) };
        // SAFETY: raw is a valid termios for STDIN_FILENO.
        if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) } != 0 {
            bail!(
                "Failed to enter raw mode: {}",
                std::io::Error::last_os_error()
            );
        }

        debug!("Entered raw mode");
        Ok(Some(Self { original }))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // SAFETY: original came from tcgetattr on the same descriptor.
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.original);
        }
    }
}

/// Current size of the operator's terminal, if stdout is a terminal.
pub fn terminal_size() -> Option<TermSize> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes a winsize into the provided pointer.
    let ok = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) } == 0;
    (ok && ws.ws_row > 0 && ws.ws_col > 0).then_some(TermSize {
        cols: ws.ws_col,
        rows: ws.ws_row,
    })
}
