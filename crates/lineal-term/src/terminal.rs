// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Terminal control — termios, window size, and the cursor-position query.
//
// Safety: this module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), ioctl (TIOCGWINSZ), isatty, poll, and raw fd reads. These
// are the standard POSIX interfaces for terminal control — there is no
// safe alternative. Each unsafe block is minimal.
//
// The editor does NOT put the terminal into full raw mode. It clears only
// ECHO and ICANON: input arrives unbuffered and unechoed, but ICRNL stays
// enabled so the Enter key is delivered as `\n`, and ISIG stays enabled so
// Ctrl-C is delivered as SIGINT rather than a byte (the signal module
// turns it back into an event).

use std::io::{self, Write};

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    /// Number of rows (height in character cells).
    pub rows: u16,
    /// Number of columns (width in character cells).
    pub cols: u16,
}

/// Query the current terminal size via `ioctl(TIOCGWINSZ)`.
///
/// Tries stdout first; if that reports a zero dimension (common when
/// stdout is redirected), retries against `/dev/tty`. Returns `None` when
/// no usable size can be determined.
#[cfg(unix)]
#[must_use]
pub fn window_size() -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };

    if result != 0 || ws.ws_col == 0 || ws.ws_row == 0 {
        let fd = unsafe { libc::open(c"/dev/tty".as_ptr(), libc::O_RDONLY) };
        if fd >= 0 {
            unsafe {
                libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws);
                libc::close(fd);
            }
        }
    }

    if ws.ws_col > 0 && ws.ws_row > 0 {
        Some(Size {
            rows: ws.ws_row,
            cols: ws.ws_col,
        })
    } else {
        None
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn window_size() -> Option<Size> {
    None
}

/// Check whether stdin is connected to a terminal (TTY).
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

// ─── Termios ────────────────────────────────────────────────────────────────

/// Terminal-configurable control characters the editor binds at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialChar {
    /// `VEOF` — end-of-file (typically `^D`).
    Eof,
    /// `VERASE` — erase one character backward (typically `^?`).
    Erase,
    /// `VWERASE` — erase one word backward (typically `^W`).
    WordErase,
    /// `VKILL` — kill the whole line (typically `^U`).
    Kill,
}

/// Opaque wrapper over the platform `termios` structure.
///
/// Fetch the current settings, mutate, apply; keep the original around and
/// apply it again on exit. The wrapper is `Copy` so a snapshot is just an
/// assignment.
#[derive(Clone, Copy)]
pub struct Termios {
    raw: libc::termios,
}

impl Termios {
    /// Read the current terminal settings from stdin.
    ///
    /// # Errors
    ///
    /// Fails with the underlying OS error when stdin is not a terminal.
    pub fn fetch() -> io::Result<Self> {
        let mut raw: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { raw })
    }

    /// Apply these settings to stdin (`TCSANOW`).
    ///
    /// # Errors
    ///
    /// Fails with the underlying OS error when the settings are rejected.
    pub fn apply(&self) -> io::Result<()> {
        if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Clear `ECHO` and `ICANON`, leaving every other flag untouched.
    pub fn clear_echo_and_canonical(&mut self) {
        self.raw.c_lflag &= !(libc::ECHO | libc::ICANON);
    }

    /// The configured control character for `which`.
    #[must_use]
    pub fn special_char(&self, which: SpecialChar) -> u8 {
        let index = match which {
            SpecialChar::Eof => libc::VEOF,
            SpecialChar::Erase => libc::VERASE,
            SpecialChar::WordErase => libc::VWERASE,
            SpecialChar::Kill => libc::VKILL,
        };
        self.raw.c_cc[index]
    }

    /// A zeroed settings block, for tests that need a `Termios` without a
    /// terminal attached.
    #[cfg(test)]
    pub(crate) fn zeroed() -> Self {
        Self {
            raw: unsafe { std::mem::zeroed() },
        }
    }

    #[cfg(test)]
    pub(crate) fn lflag(&self) -> libc::tcflag_t {
        self.raw.c_lflag
    }

    #[cfg(test)]
    pub(crate) fn set_lflag(&mut self, flag: libc::tcflag_t) {
        self.raw.c_lflag = flag;
    }
}

impl std::fmt::Debug for Termios {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Termios")
            .field("c_lflag", &self.raw.c_lflag)
            .finish_non_exhaustive()
    }
}

// ─── Stdin access ───────────────────────────────────────────────────────────

/// Poll stdin for readability with the given timeout in milliseconds.
///
/// A timeout of zero is an instantaneous check.
#[cfg(unix)]
#[must_use]
pub fn stdin_ready_timeout(timeout_ms: i32) -> bool {
    let mut pfd = libc::pollfd {
        fd: libc::STDIN_FILENO,
        events: libc::POLLIN,
        revents: 0,
    };
    unsafe { libc::poll(&mut pfd, 1, timeout_ms) > 0 && (pfd.revents & libc::POLLIN) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn stdin_ready_timeout(_timeout_ms: i32) -> bool {
    true
}

/// Instantaneous check for readable bytes on stdin.
#[inline]
#[must_use]
pub fn stdin_ready() -> bool {
    stdin_ready_timeout(0)
}

/// Read raw bytes from stdin (fd 0), bypassing Rust's buffered stdin.
///
/// # Errors
///
/// Propagates the OS error; `EINTR` surfaces as `ErrorKind::Interrupted`.
#[cfg(unix)]
pub fn read_stdin(buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::cast_sign_loss)] // n >= 0 checked above.
    Ok(n as usize)
}

#[cfg(not(unix))]
pub fn read_stdin(buf: &mut [u8]) -> io::Result<usize> {
    use std::io::Read;
    io::stdin().read(buf)
}

// ─── Cursor position query (DSR) ────────────────────────────────────────────

/// How long [`query_cursor_position`] waits for each report byte.
const DSR_BYTE_TIMEOUT_MS: i32 = 100;

/// Ask the terminal where the cursor is.
///
/// Any bytes already readable on stdin are drained into `junk` first (they
/// are pending user input, not part of the report). The DSR request is then
/// written to stderr and the `ESC [ row ; col R` report parsed one byte at
/// a time; bytes that are not part of the report are also appended to
/// `junk` so the caller can replay them through its input decoder.
///
/// # Errors
///
/// `ErrorKind::WouldBlock` when the report does not arrive within the
/// per-byte timeout (e.g. mid-resize with the terminal busy); otherwise
/// the underlying read error.
pub fn query_cursor_position(junk: &mut Vec<u8>) -> io::Result<(u16, u16)> {
    // Drain pending input so the report is the next structured thing we see.
    let mut buf = [0u8; 16];
    while stdin_ready() {
        let n = read_stdin(&mut buf)?;
        if n == 0 {
            break;
        }
        junk.extend_from_slice(&buf[..n]);
    }

    {
        let mut err = io::stderr().lock();
        super::ansi::request_cursor_position(&mut err)?;
        err.flush()?;
    }

    #[derive(PartialEq)]
    enum State {
        Free,
        SawEsc,
        SawBracket,
        InFirstCoordinate,
        SawSemicolon,
        InSecondCoordinate,
    }

    let mut state = State::Free;
    let mut coordinate = String::new();
    let mut row: u16 = 1;
    let mut col: u16 = 1;

    loop {
        if !stdin_ready_timeout(DSR_BYTE_TIMEOUT_MS) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "cursor position report not readable",
            ));
        }
        let mut byte = [0u8; 1];
        let n = read_stdin(&mut byte)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while reading cursor position report",
            ));
        }
        let c = byte[0];

        match state {
            State::Free => {
                if c == 0x1b {
                    state = State::SawEsc;
                } else {
                    junk.push(c);
                }
            }
            State::SawEsc => {
                if c == b'[' {
                    state = State::SawBracket;
                } else {
                    junk.push(c);
                    state = State::Free;
                }
            }
            State::SawBracket => {
                if c.is_ascii_digit() {
                    coordinate.push(c as char);
                    state = State::InFirstCoordinate;
                } else {
                    junk.push(c);
                    state = State::Free;
                }
            }
            State::InFirstCoordinate => {
                if c.is_ascii_digit() {
                    coordinate.push(c as char);
                } else if c == b';' {
                    row = coordinate.parse().unwrap_or(1);
                    coordinate.clear();
                    state = State::SawSemicolon;
                } else {
                    junk.push(c);
                    state = State::Free;
                    coordinate.clear();
                }
            }
            State::SawSemicolon => {
                if c.is_ascii_digit() {
                    coordinate.push(c as char);
                    state = State::InSecondCoordinate;
                } else {
                    junk.push(c);
                    state = State::Free;
                }
            }
            State::InSecondCoordinate => {
                if c.is_ascii_digit() {
                    coordinate.push(c as char);
                } else if c == b'R' {
                    col = coordinate.parse().unwrap_or(1);
                    return Ok((row, col));
                } else {
                    junk.push(c);
                    state = State::Free;
                    coordinate.clear();
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Size ──────────────────────────────────────────────────────────

    #[test]
    fn size_equality() {
        assert_eq!(Size { rows: 24, cols: 80 }, Size { rows: 24, cols: 80 });
        assert_ne!(Size { rows: 24, cols: 80 }, Size { rows: 40, cols: 80 });
    }

    #[test]
    fn size_is_copy() {
        let a = Size { rows: 24, cols: 80 };
        let b = a;
        assert_eq!(a, b);
    }

    // ── Terminal queries ──────────────────────────────────────────────

    #[test]
    fn window_size_does_not_panic() {
        let _ = window_size();
    }

    #[test]
    fn is_tty_does_not_panic() {
        let _ = is_tty();
    }

    #[test]
    fn stdin_ready_zero_timeout_does_not_block() {
        let _ = stdin_ready();
    }

    // ── Termios ───────────────────────────────────────────────────────

    #[test]
    fn fetch_is_fallible_not_panicking() {
        // In a test harness stdin is usually not a terminal; either
        // outcome is acceptable, panicking is not.
        let _ = Termios::fetch();
    }

    #[test]
    fn clear_echo_and_canonical_clears_only_those_bits() {
        let mut t = Termios::zeroed();
        t.set_lflag(libc::ECHO | libc::ICANON | libc::ISIG);
        t.clear_echo_and_canonical();
        assert_eq!(t.lflag() & libc::ECHO, 0);
        assert_eq!(t.lflag() & libc::ICANON, 0);
        assert_ne!(t.lflag() & libc::ISIG, 0, "ISIG must survive");
    }

    #[test]
    fn special_chars_read_from_cc_array() {
        let t = Termios::zeroed();
        // A zeroed block reports NUL for everything; the point is that
        // each variant indexes without panicking.
        assert_eq!(t.special_char(SpecialChar::Eof), 0);
        assert_eq!(t.special_char(SpecialChar::Erase), 0);
        assert_eq!(t.special_char(SpecialChar::WordErase), 0);
        assert_eq!(t.special_char(SpecialChar::Kill), 0);
    }
}
