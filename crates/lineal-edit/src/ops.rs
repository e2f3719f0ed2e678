//! Editing operations — the named transforms key bindings dispatch to.
//!
//! Every operation takes the editor by mutable reference and maintains
//! the shared invariants: the cursor stays within `[0, len]`, the inline
//! search cursor follows it, damage before the end of the buffer bumps
//! `chars_touched_in_the_middle`, and a no-op at a buffer boundary rings
//! the bell.
//!
//! Word semantics: a word is a contiguous run of ASCII alphanumerics, so
//! `foo=bar baz` is three words. The whitespace-delimited variant (bound
//! to the terminal's `VWERASE`) treats any non-space as word content.

use std::io::{self, Write};

use lineal_term::ansi;

use crate::editor::{Editor, SearchOffsetState};

fn is_alphanumeric(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n' || c == '\r'
}

fn bell() {
    let _ = ansi::bell(&mut io::stderr());
}

// ---------------------------------------------------------------------------
// Motion
// ---------------------------------------------------------------------------

pub(crate) fn cursor_left_character(editor: &mut Editor) {
    if editor.cursor > 0 {
        editor.cursor -= 1;
    }
    editor.inline_search_cursor = editor.cursor;
}

pub(crate) fn cursor_left_word(editor: &mut Editor) {
    if editor.cursor > 0 {
        let mut skipped_at_least_one_character = false;
        loop {
            if editor.cursor == 0 {
                break;
            }
            if skipped_at_least_one_character && is_alphanumeric(editor.buffer[editor.cursor - 1])
            {
                break;
            }
            skipped_at_least_one_character = true;
            editor.cursor -= 1;
        }
    }
    editor.inline_search_cursor = editor.cursor;
}

pub(crate) fn cursor_right_character(editor: &mut Editor) {
    if editor.cursor < editor.buffer.len() {
        editor.cursor += 1;
    }
    editor.inline_search_cursor = editor.cursor;
    editor.search_offset = 0;
}

pub(crate) fn cursor_right_word(editor: &mut Editor) {
    if editor.cursor < editor.buffer.len() {
        // A sentinel space at the end simplifies the stop condition.
        editor.buffer.push(' ');
        loop {
            if editor.cursor >= editor.buffer.len() {
                break;
            }
            editor.cursor += 1;
            if !is_alphanumeric(editor.buffer[editor.cursor]) {
                break;
            }
        }
        editor.buffer.pop();
    }
    editor.inline_search_cursor = editor.cursor;
    editor.search_offset = 0;
}

pub(crate) fn go_home(editor: &mut Editor) {
    editor.cursor = 0;
    editor.inline_search_cursor = editor.cursor;
    editor.search_offset = 0;
}

pub(crate) fn go_end(editor: &mut Editor) {
    editor.cursor = editor.buffer.len();
    editor.inline_search_cursor = editor.cursor;
    editor.search_offset = 0;
}

// ---------------------------------------------------------------------------
// Erasure
// ---------------------------------------------------------------------------

pub(crate) fn erase_character_backwards(editor: &mut Editor) {
    if editor.is_searching {
        return;
    }
    if editor.cursor == 0 {
        bell();
        return;
    }
    editor.remove_at_index(editor.cursor - 1);
    editor.cursor -= 1;
    editor.inline_search_cursor = editor.cursor;
    editor.refresh_needed = true;
}

pub(crate) fn erase_character_forwards(editor: &mut Editor) {
    if editor.cursor == editor.buffer.len() {
        bell();
        return;
    }
    editor.remove_at_index(editor.cursor);
    editor.refresh_needed = true;
}

pub(crate) fn erase_alnum_word_backwards(editor: &mut Editor) {
    let mut has_seen_alnum = false;
    while editor.cursor > 0 {
        if is_alphanumeric(editor.buffer[editor.cursor - 1]) {
            has_seen_alnum = true;
        } else if has_seen_alnum {
            break;
        }
        erase_character_backwards(editor);
    }
}

pub(crate) fn erase_alnum_word_forwards(editor: &mut Editor) {
    let mut has_seen_alnum = false;
    while editor.cursor < editor.buffer.len() {
        if is_alphanumeric(editor.buffer[editor.cursor]) {
            has_seen_alnum = true;
        } else if has_seen_alnum {
            break;
        }
        erase_character_forwards(editor);
    }
}

pub(crate) fn erase_word_backwards(editor: &mut Editor) {
    let mut has_seen_non_space = false;
    while editor.cursor > 0 {
        if is_space(editor.buffer[editor.cursor - 1]) {
            if has_seen_non_space {
                break;
            }
        } else {
            has_seen_non_space = true;
        }
        erase_character_backwards(editor);
    }
}

pub(crate) fn erase_to_end(editor: &mut Editor) {
    while editor.cursor < editor.buffer.len() {
        erase_character_forwards(editor);
    }
}

pub(crate) fn kill_line(editor: &mut Editor) {
    for _ in 0..editor.cursor {
        editor.remove_at_index(0);
    }
    editor.cursor = 0;
    editor.inline_search_cursor = 0;
    editor.refresh_needed = true;
}

// ---------------------------------------------------------------------------
// Transformation
// ---------------------------------------------------------------------------

pub(crate) fn transpose_characters(editor: &mut Editor) {
    if editor.cursor > 0 && editor.buffer.len() >= 2 {
        if editor.cursor < editor.buffer.len() {
            editor.cursor += 1;
        }
        editor.buffer.swap(editor.cursor - 1, editor.cursor - 2);
        editor.refresh_needed = true;
        editor.chars_touched_in_the_middle += 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseChangeOp {
    Capital,
    Lower,
    Upper,
}

fn case_change_word(editor: &mut Editor, op: CaseChangeOp) {
    // A word here is contiguous alnums.
    while editor.cursor < editor.buffer.len()
        && !is_alphanumeric(editor.buffer[editor.cursor])
    {
        editor.cursor += 1;
    }
    let start = editor.cursor;
    while editor.cursor < editor.buffer.len() && is_alphanumeric(editor.buffer[editor.cursor]) {
        let c = editor.buffer[editor.cursor];
        let changed = if op == CaseChangeOp::Upper
            || (op == CaseChangeOp::Capital && editor.cursor == start)
        {
            c.to_uppercase().next().unwrap_or(c)
        } else {
            c.to_lowercase().next().unwrap_or(c)
        };
        editor.buffer[editor.cursor] = changed;
        editor.cursor += 1;
        editor.refresh_needed = true;
    }
    editor.chars_touched_in_the_middle += editor.cursor.saturating_sub(start);
}

pub(crate) fn capitalize_word(editor: &mut Editor) {
    case_change_word(editor, CaseChangeOp::Capital);
}

pub(crate) fn lowercase_word(editor: &mut Editor) {
    case_change_word(editor, CaseChangeOp::Lower);
}

pub(crate) fn uppercase_word(editor: &mut Editor) {
    case_change_word(editor, CaseChangeOp::Upper);
}

pub(crate) fn insert_last_words(editor: &mut Editor) {
    if editor.history.is_empty() {
        return;
    }
    // TODO: a quoted last argument (`"foo bar"`) should insert the whole
    // argument, not just the final space-delimited token.
    let last_entry = editor.history[editor.history.len() - 1].entry.clone();
    if let Some(last_word) = last_entry.split(' ').next_back() {
        editor.insert_string(last_word);
    }
}

// ---------------------------------------------------------------------------
// Screen & session
// ---------------------------------------------------------------------------

pub(crate) fn clear_screen(editor: &mut Editor) {
    {
        let mut err = io::stderr().lock();
        let _ = ansi::clear_screen_and_scrollback(&mut err);
        let _ = ansi::move_absolute(&mut err, 1, 1);
        let _ = err.flush();
    }
    editor.set_origin_value(1, 1);
    editor.refresh_needed = true;
    editor.cached_prompt_valid = false;
}

pub(crate) fn finish(editor: &mut Editor) {
    editor.finish();
}

/// End-of-file on an empty buffer: announce and cancel the read.
pub(crate) fn finish_edit(editor: &mut Editor) {
    let _ = io::stdout().write_all(b"<EOF>\n");
    let _ = io::stdout().flush();
    if !editor.always_refresh {
        editor.input_error = Some(crate::error::Error::Canceled);
        editor.finish();
    }
}

// ---------------------------------------------------------------------------
// History navigation (inline search)
// ---------------------------------------------------------------------------

pub(crate) fn search_forwards(editor: &mut Editor) {
    let original_inline_cursor = editor.inline_search_cursor;
    let phrase: String = editor.buffer[..editor.inline_search_cursor.min(editor.buffer.len())]
        .iter()
        .collect();

    if editor.search_offset_state == SearchOffsetState::Backwards {
        editor.search_offset = editor.search_offset.saturating_sub(1);
    }

    if editor.search_offset > 0 {
        let original_offset = editor.search_offset;
        editor.search_offset -= 1;
        if editor.search(&phrase, true, true) {
            editor.search_offset_state = SearchOffsetState::Forwards;
        } else {
            editor.search_offset_state = SearchOffsetState::Unbiased;
            editor.search_offset = original_offset;
        }
    } else {
        editor.search_offset_state = SearchOffsetState::Unbiased;
        editor.chars_touched_in_the_middle = editor.buffer.len();
        editor.cursor = 0;
        editor.buffer.clear();
        editor.insert_string(&phrase);
        editor.refresh_needed = true;
    }

    editor.inline_search_cursor = original_inline_cursor;
}

pub(crate) fn search_backwards(editor: &mut Editor) {
    let original_inline_cursor = editor.inline_search_cursor;
    let phrase: String = editor.buffer[..editor.inline_search_cursor.min(editor.buffer.len())]
        .iter()
        .collect();

    if editor.search_offset_state == SearchOffsetState::Forwards {
        editor.search_offset += 1;
    }

    if editor.search(&phrase, true, true) {
        editor.search_offset_state = SearchOffsetState::Backwards;
        editor.search_offset += 1;
    } else {
        editor.search_offset_state = SearchOffsetState::Unbiased;
        editor.search_offset = editor.search_offset.saturating_sub(1);
    }

    editor.inline_search_cursor = original_inline_cursor;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
