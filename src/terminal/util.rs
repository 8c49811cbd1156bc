//! Terminal utilities

use crate::{ReadAloudError, Result};
use log::debug;
use nix::libc;
use nix::sys::termios::{self, SetArg, Termios};
use std::os::unix::io::{BorrowedFd, RawFd};

/// Is `fd` attached to a terminal?
pub fn is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Get the terminal size for the given file descriptor
pub fn get_terminal_size(fd: RawFd) -> (u16, u16) {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };

    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) };

    if result == 0 && ws.ws_col > 0 {
        (ws.ws_col, ws.ws_row)
    } else {
        // Default size if ioctl fails
        (80, 24)
    }
}

/// Raw mode for as long as the guard lives
///
/// Keypresses arrive one at a time and unechoed; Ctrl-C arrives as a byte
/// instead of a signal. Output post-processing stays on so `\n` still
/// returns the carriage.
pub struct RawModeGuard {
    fd: RawFd,
    original: Termios,
}

impl RawModeGuard {
    pub fn new(fd: RawFd) -> Result<Self> {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let original = termios::tcgetattr(borrowed)
            .map_err(|e| ReadAloudError::Other(format!("Failed to read terminal mode: {}", e)))?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        raw.output_flags |= termios::OutputFlags::OPOST;
        termios::tcsetattr(borrowed, SetArg::TCSANOW, &raw)
            .map_err(|e| ReadAloudError::Other(format!("Failed to set raw mode: {}", e)))?;

        debug!("Terminal in raw mode");
        Ok(Self { fd, original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
        if termios::tcsetattr(borrowed, SetArg::TCSANOW, &self.original).is_ok() {
            debug!("Terminal attributes restored");
        }
    }
}
