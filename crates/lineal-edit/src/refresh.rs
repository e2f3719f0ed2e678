//! The refresh algorithm — keeps the terminal display consistent with
//! the buffer.
//!
//! After [`Editor::refresh_display`] returns, the terminal shows exactly
//! the current buffer rendered through masks and spans, the cursor sits
//! at its buffer position, and no stale glyphs remain from prior frames.
//!
//! The steps, in order: resize reconciliation, scroll protection, the
//! pure-cursor-movement fast path, the embedder's refresh hook, the
//! append-only fast path, the incremental tail redraw, and finally the
//! full reflow. All output for one refresh is accumulated in a single
//! buffer and written to stderr at once.

use std::io::{self, Write};

use lineal_term::ansi;

use crate::editor::Editor;
use crate::mask::MaskMode;
use crate::metrics::measure;
use crate::style::{apply_style, Style};

impl Editor {
    /// Run one refresh cycle; emits to stderr atomically.
    pub(crate) fn refresh_display(&mut self) {
        let mut out: Vec<u8> = Vec::new();
        self.refresh_display_into(&mut out);
        let mut err = io::stderr().lock();
        let _ = err.write_all(&out);
        let _ = err.flush();
    }

    fn refresh_display_into(&mut self, out: &mut Vec<u8>) {
        let mut has_cleaned_up = false;

        // Resize reconciliation: when the column count changed, clean up
        // the old layout using the old width before drawing with the new
        // one.
        if self.was_resized {
            if self.previous_num_columns != self.num_columns {
                self.cached_prompt_valid = false;
                self.refresh_needed = true;
                std::mem::swap(&mut self.num_columns, &mut self.previous_num_columns);
                self.recalculate_origin();
                self.cleanup(out);
                std::mem::swap(&mut self.num_columns, &mut self.previous_num_columns);
                has_cleaned_up = true;
            }
            self.was_resized = false;
        }

        // Scroll protection: refreshing at the bottom of the screen will
        // scroll, so reserve the rows and bias the origin up.
        let current_num_lines = self.num_lines();
        if self.origin_row + current_num_lines > self.num_lines {
            if current_num_lines > self.num_lines {
                for _ in 0..self.num_lines {
                    out.push(b'\n');
                }
                self.origin_row = 0;
            } else {
                let old_origin_row = self.origin_row;
                self.origin_row = self.num_lines - current_num_lines + 1;
                for _ in 0..old_origin_row.saturating_sub(self.origin_row) {
                    out.push(b'\n');
                }
            }
        }

        // Fast path: pure cursor movement. The refresh hook is not
        // invoked for this.
        if self.cached_prompt_valid && !self.refresh_needed && self.pending_chars.is_empty() {
            self.reposition_cursor(out, false);
            let line = self.line();
            self.cached_buffer_metrics = measure(&line, &self.current_masks);
            self.drawn_end_of_line_offset = self.buffer.len();
            return;
        }

        if let Some(mut hook) = self.on_refresh.take() {
            hook(self);
            self.on_refresh = Some(hook);
        }

        // Append-only fast path: the new bytes are exactly the pending
        // characters; write them and move on.
        if self.cached_prompt_valid
            && !self.refresh_needed
            && self.cursor == self.buffer.len()
        {
            out.extend_from_slice(&self.pending_chars);
            self.pending_chars.clear();
            self.drawn_cursor = self.cursor;
            self.drawn_end_of_line_offset = self.buffer.len();
            let line = self.line();
            self.cached_buffer_metrics = measure(&line, &self.current_masks);
            self.drawn_spans = self.current_spans.clone();
            return;
        }

        // Incremental tail redraw: nothing before the drawn region
        // changed, and the spans on screen still cover what is current.
        if !self.always_refresh
            && self.cached_prompt_valid
            && self.chars_touched_in_the_middle == 0
            && self
                .drawn_spans
                .contains_up_to_offset(&self.current_spans, self.drawn_cursor)
        {
            let initial_style = self
                .current_spans
                .find_applicable_style(self.drawn_end_of_line_offset);
            let _ = apply_style(out, &initial_style, true);

            for i in self.drawn_end_of_line_offset..self.buffer.len() {
                self.apply_styles_at(out, i);
                self.print_character_at(out, i);
            }

            let _ = apply_style(out, &Style::reset(), true);
            self.pending_chars.clear();
            self.refresh_needed = false;
            let line = self.line();
            self.cached_buffer_metrics = measure(&line, &self.current_masks);
            self.chars_touched_in_the_middle = 0;
            self.drawn_cursor = self.cursor;
            self.drawn_end_of_line_offset = self.buffer.len();
            // The cursor is already where the redraw left it.
            return;
        }

        // Full reflow.
        if !has_cleaned_up {
            self.cleanup(out);
        }

        let _ = ansi::move_absolute(out, self.origin_row, self.origin_column);
        out.extend_from_slice(self.new_prompt.as_bytes());
        let _ = ansi::clear_to_end_of_line(out);

        for i in 0..self.buffer.len() {
            self.apply_styles_at(out, i);
            self.print_character_at(out, i);
        }

        // Don't bleed styles to the end of the line.
        let _ = apply_style(out, &Style::reset(), true);

        self.pending_chars.clear();
        self.refresh_needed = false;
        let line = self.line();
        self.cached_buffer_metrics = measure(&line, &self.current_masks);
        self.chars_touched_in_the_middle = 0;
        self.drawn_spans = self.current_spans.clone();
        self.drawn_end_of_line_offset = self.buffer.len();
        self.cached_prompt_valid = true;

        self.reposition_cursor(out, false);
    }

    /// Close the spans ending at `i`, re-establish what still applies,
    /// then open the spans starting at `i`.
    fn apply_styles_at(&self, out: &mut Vec<u8>, i: usize) {
        if let Some(ends) = self.current_spans.ending.get(&i) {
            if !ends.is_empty() {
                let mut closing = Style::default();
                for style in ends.values() {
                    closing.unify_with(style);
                }
                let _ = apply_style(out, &closing, false);

                let still_applicable = self.current_spans.find_applicable_style(i);
                let _ = apply_style(out, &still_applicable, true);
            }
        }
        if let Some(starts) = self.current_spans.starting.get(&i) {
            if !starts.is_empty() {
                let mut opening = Style::default();
                for style in starts.values() {
                    opening.unify_with(style);
                }
                let _ = apply_style(out, &opening, true);
            }
        }
    }

    /// Print the glyphs for buffer position `i`, honoring masks and
    /// rendering control characters in reverse-video caret notation.
    fn print_character_at(&self, out: &mut Vec<u8>, i: usize) {
        fn print_single(out: &mut Vec<u8>, c: char) {
            let masked = c == '\x7f' || ((c as u32) < 0x20 && c != '\n');
            let caret = masked && (c as u32) < 64;
            if masked {
                out.extend_from_slice(b"\x1b[7m");
            }
            if caret {
                out.push(b'^');
                out.push((c as u8) + 64);
            } else if masked {
                let _ = write!(out, "\\x{:x}", c as u32);
            } else {
                let mut bytes = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut bytes).as_bytes());
            }
            if masked {
                out.extend_from_slice(b"\x1b[27m");
            }
        }

        if let Some(active) = self.current_masks.active_at(i) {
            let replacement = active.mask.replacement_view();
            match active.mask.mode() {
                MaskMode::ReplaceEntireSelection => {
                    // One replacement glyph per covered position; the
                    // region's last position flushes whatever remains, so
                    // the replacement renders exactly once.
                    let offset = i - active.start;
                    let region_end = active.end.unwrap_or(self.drawn_end_of_line_offset);
                    if i + 1 == region_end {
                        if offset < replacement.len() {
                            for &c in &replacement[offset..] {
                                print_single(out, c);
                            }
                        }
                    } else if offset < replacement.len() {
                        print_single(out, replacement[offset]);
                    }
                }
                MaskMode::ReplaceEachCodePoint => {
                    for &c in replacement {
                        print_single(out, c);
                    }
                }
            }
        } else {
            print_single(out, self.buffer[i]);
        }
    }

    // -- Geometry ----------------------------------------------------------

    /// Terminal row of the cursor within the prompt+buffer block,
    /// 1-based.
    pub(crate) fn cursor_line(&self) -> usize {
        let cursor = self.drawn_cursor.min(self.cursor);
        let prefix: String = self.buffer[..cursor.min(self.buffer.len())].iter().collect();
        let metrics = measure(&prefix, &self.current_masks);
        self.current_prompt_metrics()
            .lines_with_addition(&metrics, self.num_columns)
    }

    /// Terminal column of the cursor within its wrapped row, 0-based.
    pub(crate) fn offset_in_line(&self) -> usize {
        let cursor = self.drawn_cursor.min(self.cursor);
        let prefix: String = self.buffer[..cursor.min(self.buffer.len())].iter().collect();
        let metrics = measure(&prefix, &self.current_masks);
        self.current_prompt_metrics()
            .offset_with_addition(&metrics, self.num_columns)
    }

    /// Move the terminal cursor to the buffer cursor (or the buffer
    /// end), scrolling if the target row lies below the screen.
    pub(crate) fn reposition_cursor(&mut self, out: &mut impl Write, to_end: bool) {
        let saved_cursor = self.cursor;
        let cursor = if to_end { self.buffer.len() } else { self.cursor };
        self.cursor = cursor;
        self.drawn_cursor = cursor;

        let line = self.cursor_line().saturating_sub(1);
        let column = self.offset_in_line();

        self.ensure_free_lines_from_origin(line, out);
        let _ = ansi::move_absolute(out, line + self.origin_row, column + self.origin_column);

        self.cursor = saved_cursor;
    }

    /// Make sure `count` rows below the origin fit on screen, scrolling
    /// the display and biasing the origin up if they do not.
    pub(crate) fn ensure_free_lines_from_origin(&mut self, count: usize, out: &mut impl Write) {
        let count = count.min(self.num_lines);
        if self.origin_row + count <= self.num_lines {
            return;
        }

        let diff = self.origin_row + count - self.num_lines - 1;
        if diff > 0 {
            let _ = ansi::scroll_up(out, diff);
            self.origin_row -= diff;
        }
        self.refresh_needed = false;
        self.chars_touched_in_the_middle = 0;
    }

    /// A narrower terminal makes the prompt taller; compensate the
    /// origin for the extra wraps.
    pub(crate) fn recalculate_origin(&mut self) {
        if self.num_columns > 0 && self.cached_prompt_metrics.max_line_length >= self.num_columns {
            self.origin_row +=
                (self.cached_prompt_metrics.max_line_length + 1) / self.num_columns - 1;
        }
        // The cursor position is recomputed at the next refresh cycle.
    }

    /// Erase the rows currently occupied by the prompt and buffer
    /// (including rows vacated by deleted newlines), leaving the cursor
    /// at the buffer position.
    pub(crate) fn cleanup(&mut self, out: &mut impl Write) {
        let line = self.line();
        let current_buffer_metrics = measure(&line, &self.current_masks);
        let new_lines = self
            .current_prompt_metrics()
            .lines_with_addition(&current_buffer_metrics, self.num_columns);
        let shown_lines = self.num_lines();
        if new_lines < shown_lines {
            self.extra_forward_lines = (shown_lines - new_lines).max(self.extra_forward_lines);
        }

        self.reposition_cursor(out, true);
        let current_line = self.num_lines();
        let _ = ansi::clear_lines(out, current_line, self.extra_forward_lines);
        self.extra_forward_lines = 0;
        self.reposition_cursor(out, false);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
