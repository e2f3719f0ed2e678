//! The suggestion pager — paginates and renders the completion list.
//!
//! On first display the list is walked computing cumulative column
//! usage: when the next column would exceed the terminal width the row
//! wraps, and when the accumulated rows plus the prompt's rows at
//! suggestion initiation would exceed the terminal height a new page
//! starts. Pages are cached until the geometry changes.
//!
//! Two layouts: *span-entire-line* when the longest suggestion is at
//! least `columns - 2` (each suggestion on its own line, with space
//! reserved by pre-scrolling), and *columnar* (fixed-width cells of the
//! longest byte length plus a two-space gap, display trivia appended
//! after the gap). The selected suggestion is drawn in blue once the
//! manager reports that the last shown suggestion was committed. A
//! `< page X of Y >` indicator trails multi-page lists, with the arrows
//! suppressed at the first and last page.

use std::io::{self, Write};
use std::ops::Range;

use lineal_term::ansi;

use crate::metrics::{LineMetrics, StringMetrics};
use crate::style::{apply_style, Color, Style, XtermColor};
use crate::suggest::SuggestionManager;

/// Pager state: geometry, cached pages, and the rows used by the last
/// render (so they can be cleared).
#[derive(Debug, Default)]
pub(crate) struct SuggestionDisplay {
    origin_row: usize,
    origin_column: usize,
    is_showing_suggestions: bool,

    lines_used_for_last_suggestion: usize,
    num_lines: usize,
    num_columns: usize,
    prompt_lines_at_suggestion_initiation: usize,
    pages: Vec<Range<usize>>,
}

impl SuggestionDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_vt_size(&mut self, lines: usize, columns: usize) {
        self.num_lines = lines;
        self.num_columns = columns;
        self.pages.clear();
    }

    pub fn set_origin(&mut self, row: usize, column: usize) {
        self.origin_row = row;
        self.origin_column = column;
    }

    pub fn origin_row(&self) -> usize {
        self.origin_row
    }

    pub fn set_initial_prompt_lines(&mut self, lines: usize) {
        self.prompt_lines_at_suggestion_initiation = lines;
    }

    /// Drop the cached pages (the list is gone).
    pub fn finish(&mut self) {
        self.pages.clear();
    }

    /// Erase the rows used by the last render. Returns whether anything
    /// was actually cleared.
    pub fn cleanup(&mut self, w: &mut impl Write) -> bool {
        self.is_showing_suggestions = false;
        if self.lines_used_for_last_suggestion != 0 {
            let _ = ansi::clear_lines(w, 0, self.lines_used_for_last_suggestion);
            self.lines_used_for_last_suggestion = 0;
            return true;
        }
        false
    }

    /// Re-paginate and redraw after a geometry change, if visible.
    pub fn redisplay(
        &mut self,
        manager: &mut SuggestionManager,
        lines: usize,
        columns: usize,
        w: &mut impl Write,
    ) {
        if self.is_showing_suggestions {
            self.cleanup(w);
            self.set_vt_size(lines, columns);
            let _ = self.display(manager, w);
        } else {
            self.set_vt_size(lines, columns);
        }
    }

    /// Render the page containing the current selection.
    pub fn display(&mut self, manager: &mut SuggestionManager, w: &mut impl Write) -> io::Result<()> {
        self.is_showing_suggestions = true;

        let mut longest_suggestion_length = 0;
        let mut longest_suggestion_byte_length = 0;
        let mut longest_suggestion_byte_length_without_trivia = 0;
        manager.set_start_index(0);
        for suggestion in manager.suggestions() {
            longest_suggestion_length = longest_suggestion_length
                .max(suggestion.text_view.len() + suggestion.display_trivia_view.len());
            longest_suggestion_byte_length = longest_suggestion_byte_length
                .max(suggestion.text.len() + suggestion.display_trivia.len());
            longest_suggestion_byte_length_without_trivia =
                longest_suggestion_byte_length_without_trivia.max(suggestion.text.len());
        }

        let mut num_printed = 0;
        let mut lines_used = 1usize;

        ansi::save_cursor(w)?;
        ansi::clear_lines(w, 0, self.lines_used_for_last_suggestion)?;
        ansi::restore_cursor(w)?;

        // How many rows the prompt plus the widest suggestion line wrap to.
        let mut lines = vec![LineMetrics::default(); self.prompt_lines_at_suggestion_initiation.saturating_sub(1)];
        lines.push(LineMetrics {
            length: longest_suggestion_length,
            masked_chars: Vec::new(),
        });
        let metrics = StringMetrics {
            line_metrics: lines,
            total_length: 0,
            max_line_length: 0,
        };
        let max_line_count = metrics.lines_with_addition(&StringMetrics::default(), self.num_columns);

        let mut spans_entire_line = false;
        if longest_suggestion_length >= self.num_columns.saturating_sub(2) {
            spans_entire_line = true;
            // Reserve enough rows for the widest entry below the prompt.
            let start = max_line_count.saturating_sub(self.prompt_lines_at_suggestion_initiation);
            for _ in start..max_line_count {
                w.write_all(b"\n")?;
            }
            lines_used += max_line_count;
            longest_suggestion_length = 0;
        }

        ansi::move_absolute(w, max_line_count + self.origin_row, 1)?;

        if self.pages.is_empty() {
            self.paginate(manager, longest_suggestion_length, spans_entire_line);
        }

        let page_index = self.page_containing(manager.next_index());
        let page = self.pages[page_index].clone();
        manager.set_start_index(page.start);

        for (index, suggestion) in manager
            .suggestions()
            .iter()
            .enumerate()
            .skip(manager.start_index())
        {
            let next_column = num_printed + suggestion.text_view.len() + longest_suggestion_length + 2;
            if next_column > self.num_columns {
                let wrapped = suggestion.text_view.len().div_ceil(self.num_columns.max(1));
                lines_used += wrapped;
                w.write_all(b"\n")?;
                num_printed = 0;
            }

            // Show just enough to fill the screen without scrolling the
            // prompt out of view.
            if lines_used + self.prompt_lines_at_suggestion_initiation >= self.num_lines {
                break;
            }

            let selected =
                manager.is_current_suggestion_complete() && index == manager.next_index();
            if selected {
                apply_style(
                    w,
                    &Style::foreground(Color::Xterm(XtermColor::Blue)),
                    true,
                )?;
            }

            if spans_entire_line {
                num_printed += self.num_columns;
                w.write_all(suggestion.text.as_bytes())?;
                w.write_all(suggestion.display_trivia.as_bytes())?;
            } else {
                let field = format!(
                    "{:<width$}  {}",
                    suggestion.text,
                    suggestion.display_trivia,
                    width = longest_suggestion_byte_length_without_trivia
                );
                write!(
                    w,
                    "{:<width$}",
                    field,
                    width = longest_suggestion_byte_length + 2
                )?;
                num_printed += longest_suggestion_byte_length + 2;
            }

            if selected {
                apply_style(w, &Style::reset(), true)?;
            }
        }

        self.lines_used_for_last_suggestion = lines_used;

        // The prompt's last line shares a row with the buffer's first.
        lines_used += self.prompt_lines_at_suggestion_initiation.saturating_sub(1);
        if self.origin_row + lines_used >= self.num_lines {
            self.origin_row = self.num_lines.saturating_sub(lines_used);
        }

        if self.pages.len() > 1 {
            let left = if page_index == 0 { ' ' } else { '<' };
            let right = if page_index == self.pages.len() - 1 {
                ' '
            } else {
                '>'
            };
            let indicator = format!("{left} page {} of {} {right}", page_index + 1, self.pages.len());
            if indicator.len() > self.num_columns.saturating_sub(1) {
                // Would overflow into the next line; skip the indicator.
                return Ok(());
            }
            ansi::move_absolute(
                w,
                self.origin_row + lines_used,
                self.num_columns - indicator.len() - 1,
            )?;
            apply_style(
                w,
                &Style {
                    background: Color::Xterm(XtermColor::Green),
                    ..Style::default()
                },
                true,
            )?;
            w.write_all(indicator.as_bytes())?;
            apply_style(w, &Style::reset(), true)?;
        }

        Ok(())
    }

    /// Walk the list once, caching page boundaries for the current
    /// geometry.
    fn paginate(
        &mut self,
        manager: &SuggestionManager,
        longest_suggestion_length: usize,
        spans_entire_line: bool,
    ) {
        let mut num_printed = 0;
        let mut lines_used = 1usize;
        let mut page_start = 0;

        for (index, suggestion) in manager.suggestions().iter().enumerate() {
            let next_column = num_printed + suggestion.text_view.len() + longest_suggestion_length + 2;
            if next_column > self.num_columns {
                lines_used += suggestion.text_view.len().div_ceil(self.num_columns.max(1));
                num_printed = 0;
            }

            if lines_used + self.prompt_lines_at_suggestion_initiation >= self.num_lines {
                self.pages.push(page_start..index);
                page_start = index;
                lines_used = 1;
                num_printed = 0;
            }

            num_printed += if spans_entire_line {
                self.num_columns
            } else {
                longest_suggestion_length + 2
            };
        }
        self.pages.push(page_start..manager.count());
    }

    /// The page whose range contains `selection_index`.
    fn page_containing(&self, selection_index: usize) -> usize {
        self.pages
            .iter()
            .position(|page| page.contains(&selection_index))
            .unwrap_or(self.pages.len().saturating_sub(1))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
