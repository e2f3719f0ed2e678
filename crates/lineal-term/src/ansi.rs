// SPDX-License-Identifier: MIT
//
// ANSI escape sequence generation.
//
// Pure functions that write escape sequences to any `impl Write`. No state,
// no decisions about when to emit — that's the refresh algorithm's job.
// This module just knows the byte-level encoding of every terminal command
// the editor needs.
//
// Coordinates are 1-indexed, matching the VT convention: the terminal's
// home position is (1, 1) and that is also how the editor tracks its
// origin.
//
// All functions return `io::Result` propagated from the underlying writer.
// In practice they never fail when writing to the refresh output buffer
// (backed by a Vec).

use std::io::{self, Write};

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor to `(row, col)` using the CUP (Cursor Position) sequence.
#[inline]
pub fn move_absolute(w: &mut impl Write, row: usize, col: usize) -> io::Result<()> {
    write!(w, "\x1b[{row};{col}H")
}

/// Move the cursor relative to its current position.
///
/// Positive `rows` moves down (CUD), negative up (CUU); positive `cols`
/// moves right (CUF), negative left (CUB). A zero delta emits nothing.
pub fn move_relative(w: &mut impl Write, rows: i64, cols: i64) -> io::Result<()> {
    if rows > 0 {
        write!(w, "\x1b[{rows}B")?;
    } else if rows < 0 {
        write!(w, "\x1b[{}A", -rows)?;
    }
    if cols > 0 {
        write!(w, "\x1b[{cols}C")?;
    } else if cols < 0 {
        write!(w, "\x1b[{}D", -cols)?;
    }
    Ok(())
}

/// Save the cursor position (`ESC [ s`).
#[inline]
pub fn save_cursor(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[s")
}

/// Restore the cursor position saved by [`save_cursor`] (`ESC [ u`).
#[inline]
pub fn restore_cursor(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[u")
}

// ─── Clearing ────────────────────────────────────────────────────────────────

/// Clear whole lines around the cursor.
///
/// With both counts zero, clears the current line (`ESC [ 2K`). Otherwise
/// moves down `count_below` lines and clears upward one line at a time,
/// covering `count_above + count_below + 1` lines total and leaving the
/// cursor on the topmost cleared line.
pub fn clear_lines(w: &mut impl Write, count_above: usize, count_below: usize) -> io::Result<()> {
    if count_above + count_below == 0 {
        return w.write_all(b"\x1b[2K");
    }
    if count_below > 0 {
        write!(w, "\x1b[{count_below}B")?;
    }
    let mut remaining = count_above + count_below;
    while remaining > 0 {
        w.write_all(b"\x1b[2K")?;
        if remaining != 1 {
            w.write_all(b"\x1b[A")?;
        }
        remaining -= 1;
    }
    Ok(())
}

/// Clear from the cursor to the end of the line (`ESC [ K`).
#[inline]
pub fn clear_to_end_of_line(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[K")
}

/// Clear the screen and the scrollback, then home the cursor.
///
/// `ESC [ 3J` drops the scrollback, `ESC [ H` homes, `ESC [ 2J` wipes the
/// visible screen.
#[inline]
pub fn clear_screen_and_scrollback(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[3J\x1b[H\x1b[2J")
}

/// Scroll the screen contents up by `n` lines (`ESC [ n S`).
#[inline]
pub fn scroll_up(w: &mut impl Write, n: usize) -> io::Result<()> {
    write!(w, "\x1b[{n}S")
}

// ─── Modes & queries ────────────────────────────────────────────────────────

/// Enable bracketed paste mode (DEC 2004).
///
/// Pasted text arrives wrapped in `ESC [ 200 ~` / `ESC [ 201 ~`, letting
/// the decoder distinguish typed input from clipboard paste.
#[inline]
pub fn enable_bracketed_paste(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2004h")
}

/// Disable bracketed paste mode.
#[inline]
pub fn disable_bracketed_paste(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2004l")
}

/// Request a cursor position report (DSR, `ESC [ 6 n`).
///
/// The terminal answers on stdin with `ESC [ row ; col R`.
#[inline]
pub fn request_cursor_position(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[6n")
}

/// Ring the terminal bell.
#[inline]
pub fn bell(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x07")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: run an ANSI function and return its output as a string.
    fn emit<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    // ── Cursor ──────────────────────────────────────────────────────────

    #[test]
    fn move_absolute_home() {
        assert_eq!(emit(|w| move_absolute(w, 1, 1)), "\x1b[1;1H");
    }

    #[test]
    fn move_absolute_position() {
        assert_eq!(emit(|w| move_absolute(w, 21, 11)), "\x1b[21;11H");
    }

    #[test]
    fn move_relative_down_right() {
        assert_eq!(emit(|w| move_relative(w, 2, 3)), "\x1b[2B\x1b[3C");
    }

    #[test]
    fn move_relative_up_left() {
        assert_eq!(emit(|w| move_relative(w, -4, -1)), "\x1b[4A\x1b[1D");
    }

    #[test]
    fn move_relative_zero_emits_nothing() {
        assert_eq!(emit(|w| move_relative(w, 0, 0)), "");
    }

    #[test]
    fn move_relative_rows_only() {
        assert_eq!(emit(|w| move_relative(w, -3, 0)), "\x1b[3A");
    }

    #[test]
    fn save_restore_sequences() {
        assert_eq!(emit(|w| save_cursor(w)), "\x1b[s");
        assert_eq!(emit(|w| restore_cursor(w)), "\x1b[u");
    }

    // ── Clearing ────────────────────────────────────────────────────────

    #[test]
    fn clear_lines_current_only() {
        assert_eq!(emit(|w| clear_lines(w, 0, 0)), "\x1b[2K");
    }

    #[test]
    fn clear_lines_below_then_up() {
        // Two below: move down 2, clear, up, clear, up, clear.
        assert_eq!(
            emit(|w| clear_lines(w, 0, 2)),
            "\x1b[2B\x1b[2K\x1b[A\x1b[2K\x1b[A\x1b[2K"
        );
    }

    #[test]
    fn clear_lines_above_only() {
        assert_eq!(emit(|w| clear_lines(w, 1, 0)), "\x1b[2K\x1b[A\x1b[2K");
    }

    #[test]
    fn clear_to_eol_sequence() {
        assert_eq!(emit(|w| clear_to_end_of_line(w)), "\x1b[K");
    }

    #[test]
    fn full_clear_sequence() {
        assert_eq!(
            emit(|w| clear_screen_and_scrollback(w)),
            "\x1b[3J\x1b[H\x1b[2J"
        );
    }

    #[test]
    fn scroll_up_sequence() {
        assert_eq!(emit(|w| scroll_up(w, 5)), "\x1b[5S");
    }

    // ── Modes & queries ─────────────────────────────────────────────────

    #[test]
    fn bracketed_paste_toggle() {
        assert_eq!(emit(|w| enable_bracketed_paste(w)), "\x1b[?2004h");
        assert_eq!(emit(|w| disable_bracketed_paste(w)), "\x1b[?2004l");
    }

    #[test]
    fn dsr_request_sequence() {
        assert_eq!(emit(|w| request_cursor_position(w)), "\x1b[6n");
    }

    #[test]
    fn bell_is_bel_byte() {
        assert_eq!(emit(|w| bell(w)), "\x07");
    }

    // ── Composition ─────────────────────────────────────────────────────

    #[test]
    fn sequences_compose() {
        let mut buf = Vec::new();
        move_absolute(&mut buf, 3, 1).unwrap();
        clear_to_end_of_line(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "\x1b[3;1H\x1b[K");
    }
}
