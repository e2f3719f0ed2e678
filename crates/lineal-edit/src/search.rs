//! Reverse incremental search — a nested editor drives the `search:`
//! prompt.
//!
//! Entering search snapshots the buffer and cursor, reserves a terminal
//! row below the outer prompt, and runs a second [`Editor`] instance with
//! signal handling disabled and `always_refresh` on. The inner editor's
//! special bindings (Ctrl-R cycle, Ctrl-C abort, Tab accept, Ctrl-L
//! clear) communicate through request flags on the inner editor itself;
//! the driver loop here performs the outer-side work between inner input
//! processing and inner repainting — run the history search, refresh the
//! outer display, and re-anchor the inner prompt below the outer's last
//! line. The two editors share no mutable state.

use std::io::{self, Write};
use std::rc::Rc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use lineal_term::ansi;
use lineal_term::reader::StdinWatcher;
use lineal_term::signal;

use crate::editor::Editor;
use crate::key::{ctrl, Key};
use crate::mask::MaskSet;
use crate::metrics::measure;

const SEARCH_PROMPT: &str = "\x1b[32msearch:\x1b[0m ";

/// Enter reverse incremental search (bound to Ctrl-R).
pub(crate) fn enter_search(editor: &mut Editor) {
    // Entering search while already searching is a programming error.
    debug_assert!(!editor.is_searching, "already searching");
    if editor.is_searching {
        return;
    }

    editor.is_searching = true;
    editor.search_offset = 0;
    editor.pre_search_buffer = editor.buffer.clone();
    editor.pre_search_cursor = editor.cursor;

    {
        let mut err = io::stderr().lock();
        let reserve = editor.num_lines() + 1;
        editor.ensure_free_lines_from_origin(reserve, &mut err);
        let _ = err.flush();
    }

    // While the search editor is active, the outer editor takes no
    // editing events.
    editor.is_editing = false;

    let mut inner = Editor::new();
    inner.enable_signal_handling = false;
    inner.always_refresh = true;
    inner.initialize();
    install_search_bindings(&mut inner);

    run_search_session(editor, &mut inner);

    let search_end_row = inner.origin_row;
    let aborted = inner.search_abort_requested;
    let accepted = inner.search_accept_requested;
    let result = std::mem::take(&mut inner.returned_line);
    let inner_error = inner.input_error.take();
    drop(inner);

    editor.is_searching = false;
    editor.is_editing = true;
    editor.search_offset = 0;

    if let Some(error) = inner_error {
        editor.input_error = Some(error);
        editor.finish();
        return;
    }

    // Manually clean up the search line.
    {
        let mut err = io::stderr().lock();
        editor.reposition_cursor(&mut err, false);
        let search_metrics = measure(&result, &MaskSet::new());
        let prompt_metrics = measure(SEARCH_PROMPT, &MaskSet::new());
        let search_lines = prompt_metrics.lines_with_addition(&search_metrics, editor.num_columns)
            + search_end_row.saturating_sub(editor.origin_row + 1);
        let _ = ansi::clear_lines(&mut err, 0, search_lines);
        editor.reposition_cursor(&mut err, false);
        let _ = err.flush();
    }

    editor.refresh_needed = true;
    editor.cached_prompt_valid = false;
    editor.chars_touched_in_the_middle = 1;

    if aborted {
        editor.reset_buffer_on_search_end = true;
        editor.end_search();
        return;
    }
    if accepted {
        // Keep the matched buffer, resume editing without a newline.
        editor.reset_buffer_on_search_end = false;
        editor.end_search();
        return;
    }
    if search_metrics_empty(&result) {
        editor.end_search();
        return;
    }

    // A non-empty newline-finish commits the matched buffer.
    editor.finish();
}

fn search_metrics_empty(result: &str) -> bool {
    measure(result, &MaskSet::new()).total_length == 0
}

/// The inner editor's bindings only raise request flags; the driver loop
/// translates them into outer-editor actions.
fn install_search_bindings(inner: &mut Editor) {
    // ^R: cycle to the next older match.
    inner.register_keybinding_rc(
        &[Key::new(ctrl('R'))],
        Rc::new(|editor: &mut Editor, _: &[Key]| {
            editor.search_cycle_requested = true;
            editor.refresh_needed = true;
            false
        }),
    );

    // ^C: cancel the search, restoring the pre-search buffer.
    inner.register_keybinding_rc(
        &[Key::new(ctrl('C'))],
        Rc::new(|editor: &mut Editor, _: &[Key]| {
            editor.search_abort_requested = true;
            editor.finish();
            false
        }),
    );

    // ^L: clear the screen; the outer prompt must repaint before ours.
    inner.register_keybinding_rc(
        &[Key::new(ctrl('L'))],
        Rc::new(|editor: &mut Editor, _: &[Key]| {
            editor.clear_screen_requested = true;
            false
        }),
    );

    // Tab: accept the current match without finishing the outer line.
    inner.register_keybinding_rc(
        &[Key::new('\t')],
        Rc::new(|editor: &mut Editor, _: &[Key]| {
            editor.search_accept_requested = true;
            editor.finish();
            false
        }),
    );
}

/// Drive the inner editor's session, interleaving the outer-side search
/// work between inner input handling and inner repainting.
fn run_search_session(outer: &mut Editor, inner: &mut Editor) {
    inner.is_editing = true;
    inner.get_terminal_size();
    inner.set_prompt(SEARCH_PROMPT);
    inner.reset();
    inner.strip_styles();

    // Anchor the search prompt below the outer's current last line.
    anchor_inner(outer, inner);
    inner.refresh_display();

    let (mut watcher, wake_rx) = StdinWatcher::spawn();

    loop {
        // Outer signals are still routed while the inner editor runs.
        if outer.enable_signal_handling {
            if signal::take_resize() {
                outer.resized();
                inner.get_terminal_size();
                inner.refresh_needed = true;
            }
            if signal::take_interrupt() {
                inner.was_interrupted = true;
            }
        }

        if inner.was_interrupted {
            inner.handle_interrupt_event();
        }

        match wake_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(_) => inner.handle_read_event(),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if inner.search_cycle_requested {
            inner.search_cycle_requested = false;
            outer.search_offset += 1;
        }

        if inner.clear_screen_requested {
            inner.clear_screen_requested = false;
            {
                let mut err = io::stderr().lock();
                let _ = ansi::clear_screen_and_scrollback(&mut err);
                let _ = err.flush();
            }
            outer.always_refresh = true;
            outer.set_origin_value(1, 1);
            outer.refresh_needed = true;
            outer.refresh_display();
            outer.always_refresh = false;
            anchor_inner(outer, inner);
            inner.refresh_needed = true;
        }

        // The refresh hook equivalent: remove the inner prompt, update
        // the outer display from the current phrase, then re-anchor and
        // repaint the inner prompt.
        {
            let mut err = io::stderr().lock();
            inner.cleanup(&mut err);
            let _ = err.flush();
        }

        let phrase = inner.line();
        if !outer.search(&phrase, false, false) {
            outer.chars_touched_in_the_middle = outer.buffer.len();
            outer.refresh_needed = true;
            outer.buffer.clear();
            outer.cursor = 0;
        }
        outer.refresh_display();

        anchor_inner(outer, inner);
        inner.refresh_needed = true;
        inner.refresh_display();

        if inner.finish {
            inner.quit_event_loop();
            break;
        }
        if inner.loop_exit.take().is_some() {
            break;
        }
    }

    drop(wake_rx);
    watcher.stop();
}

/// Move the inner editor's origin to the row below the outer's last
/// rendered line.
fn anchor_inner(outer: &Editor, inner: &mut Editor) {
    let prompt_end_line = outer
        .current_prompt_metrics()
        .lines_with_addition(&outer.cached_buffer_metrics, outer.num_columns);
    inner.set_origin_value(prompt_end_line + outer.origin_row, 1);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_prompt_renders_eight_columns() {
        let metrics = measure(SEARCH_PROMPT, &MaskSet::new());
        assert_eq!(metrics.total_length, 8);
    }

    #[test]
    fn empty_result_detection_ignores_escapes() {
        assert!(search_metrics_empty(""));
        assert!(search_metrics_empty("\x1b[32m\x1b[0m"));
        assert!(!search_metrics_empty("x"));
    }

    #[test]
    fn end_search_restores_pre_search_buffer_when_asked() {
        let mut editor = Editor::new();
        editor.insert_string("original");
        editor.pre_search_buffer = editor.buffer.clone();
        editor.pre_search_cursor = 8;
        editor.buffer = "match".chars().collect();
        editor.cursor = 5;
        editor.is_searching = true;

        editor.reset_buffer_on_search_end = true;
        editor.end_search();
        assert_eq!(editor.line(), "original");
        assert_eq!(editor.cursor, 8);
        assert!(!editor.is_searching);
        assert!(editor.reset_buffer_on_search_end, "flag re-arms");
    }

    #[test]
    fn end_search_keeps_match_when_not_asked() {
        let mut editor = Editor::new();
        editor.pre_search_buffer = "original".chars().collect();
        editor.buffer = "match".chars().collect();
        editor.cursor = 5;
        editor.is_searching = true;

        editor.reset_buffer_on_search_end = false;
        editor.end_search();
        assert_eq!(editor.line(), "match");
    }

    #[test]
    fn search_bindings_raise_flags_without_processing() {
        let mut inner = Editor::new();
        install_search_bindings(&mut inner);

        assert!(!inner.dispatch_key(Key::new(ctrl('R'))));
        assert!(inner.search_cycle_requested);

        assert!(!inner.dispatch_key(Key::new('\t')));
        assert!(inner.search_accept_requested);
        assert!(inner.finish);

        inner.finish = false;
        assert!(!inner.dispatch_key(Key::new(ctrl('C'))));
        assert!(inner.search_abort_requested);
        assert!(inner.finish);

        assert!(!inner.dispatch_key(Key::new(ctrl('L'))));
        assert!(inner.clear_screen_requested);
    }
}
