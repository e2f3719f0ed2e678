//! The editor engine — owns everything and runs the line-editing loop.
//!
//! [`Editor::get_line`] puts the terminal into uncooked mode (ECHO and
//! ICANON off), emits the prompt, anchors the *origin* via a
//! cursor-position report, and then multiplexes three activation
//! sources: wake tokens from the stdin readiness watcher, signal flags
//! (window change, interrupt), and a queue of self-posted "later"
//! events used for deferred resize reconciliation. Only the loop
//! mutates editor state; the watcher and the signal handlers are pure
//! producers.
//!
//! Input handling: raw bytes are carried across reads (a UTF-8 sequence
//! may split), decoded one code point at a time through the decoder
//! state machine, dispatched through the key-binding machine, and —
//! when unbound — inserted into the buffer. Tab and reverse-tab feed
//! the completion state machine instead.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use lineal_term::ansi;
use lineal_term::reader::{StdinWatcher, Wake};
use lineal_term::signal;
use lineal_term::terminal::{self, Size, SpecialChar, Termios};

use crate::decode::{parse_csi_parameters, Decoder, InputState};
use crate::error::{Error, Result};
use crate::history::{self, HistoryEntry};
use crate::key::{ctrl, Key, Modifiers};
use crate::keymap::{KeyCallbackMachine, KeyPress, KeybindingCallback};
use crate::mask::MaskSet;
use crate::metrics::{measure, StringMetrics};
use crate::ops;
use crate::pager::SuggestionDisplay;
use crate::search;
use crate::span::Spans;
use crate::style::Style;
use crate::suggest::{Completion, CompletionMode, SuggestionManager};

// ---------------------------------------------------------------------------
// Public auxiliary types
// ---------------------------------------------------------------------------

/// How a [`Span`]'s offsets are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanMode {
    /// Byte offsets into the UTF-8 buffer; translated on use.
    Byte,
    /// Code-point offsets.
    Rune,
}

/// A range of the buffer, for [`Editor::stylize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub mode: SpanMode,
}

/// Produces the completion list for the current buffer.
pub type TabCompletionHandler = dyn FnMut(&mut Editor) -> Vec<Completion>;
/// Receives bracketed-paste payloads instead of buffer insertion.
pub type PasteHandler = dyn FnMut(&str, &mut Editor);
/// Runs on Ctrl-C; may call [`Editor::finish`] to keep the buffer.
pub type InterruptHandler = dyn FnMut(&mut Editor);
/// Runs inside every refresh, before painting; may restyle the buffer.
pub type RefreshHandler = dyn FnMut(&mut Editor);

// ---------------------------------------------------------------------------
// Internal state enums
// ---------------------------------------------------------------------------

/// Bias of the history search offset after the last navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SearchOffsetState {
    #[default]
    Unbiased,
    Forwards,
    Backwards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum TabDirection {
    #[default]
    Forward,
    Backward,
}

/// Self-posted events handled before blocking on the wake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaterEvent {
    /// Re-run resize reconciliation; the flag says whether the origin
    /// still needs a (deferred) cursor-position query.
    HandleResizeEvent { reset_origin: bool },
    TryUpdateOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// Return the line (or error) to the caller.
    Exit,
    /// Start a fresh `get_line` round (interrupt-and-retry).
    Retry,
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// A readline-style interactive line editor.
///
/// Construction does not touch the terminal; `get_line` (or an explicit
/// [`initialize`](Self::initialize)) captures termios and installs the
/// default key bindings.
#[allow(clippy::struct_excessive_bools)] // The engine is one big state machine.
pub struct Editor {
    // Buffer & cursor.
    pub(crate) buffer: Vec<char>,
    pub(crate) cursor: usize,
    pub(crate) inline_search_cursor: usize,
    pub(crate) chars_touched_in_the_middle: usize,
    pub(crate) drawn_cursor: usize,
    pub(crate) drawn_end_of_line_offset: usize,
    pub(crate) pending_chars: Vec<u8>,
    pub(crate) incomplete_data: Vec<u8>,
    pub(crate) input_error: Option<Error>,
    pub(crate) returned_line: String,

    // Prompt & geometry.
    pub(crate) new_prompt: String,
    pub(crate) cached_prompt_metrics: StringMetrics,
    pub(crate) old_prompt_metrics: StringMetrics,
    pub(crate) cached_buffer_metrics: StringMetrics,
    pub(crate) cached_prompt_valid: bool,
    pub(crate) num_columns: usize,
    pub(crate) num_lines: usize,
    pub(crate) previous_num_columns: usize,
    pub(crate) extra_forward_lines: usize,
    pub(crate) origin_row: usize,
    pub(crate) origin_column: usize,
    pub(crate) has_origin_reset_scheduled: bool,
    pub(crate) prompt_lines_at_suggestion_initiation: usize,

    // Styling.
    pub(crate) current_spans: Spans,
    pub(crate) drawn_spans: Spans,
    pub(crate) current_masks: MaskSet,

    // History.
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) history_cursor: usize,
    pub(crate) history_dirty: bool,

    // Search.
    pub(crate) is_searching: bool,
    pub(crate) reset_buffer_on_search_end: bool,
    pub(crate) search_offset: usize,
    pub(crate) search_offset_state: SearchOffsetState,
    pub(crate) pre_search_cursor: usize,
    pub(crate) pre_search_buffer: Vec<char>,
    // Request flags set by a search editor's own bindings, consumed by
    // the search driver.
    pub(crate) search_cycle_requested: bool,
    pub(crate) search_abort_requested: bool,
    pub(crate) search_accept_requested: bool,
    pub(crate) clear_screen_requested: bool,

    // Completion.
    pub(crate) suggestion_manager: SuggestionManager,
    pub(crate) suggestion_display: SuggestionDisplay,
    pub(crate) remembered_suggestion_static_data: Vec<char>,
    pub(crate) times_tab_pressed: usize,
    pub(crate) tab_direction: TabDirection,

    // Input decoding.
    pub(crate) decoder: Decoder,
    pub(crate) paste_buffer: Vec<char>,

    // Bindings & handlers.
    pub(crate) keymap: KeyCallbackMachine,
    pub(crate) tab_completion_handler: Option<Box<TabCompletionHandler>>,
    pub(crate) paste_handler: Option<Box<PasteHandler>>,
    pub(crate) on_interrupt_handled: Option<Box<InterruptHandler>>,
    pub(crate) on_refresh: Option<Box<RefreshHandler>>,

    // Terminal settings.
    pub(crate) termios: Option<Termios>,
    pub(crate) default_termios: Option<Termios>,
    pub(crate) initialized: bool,

    // Flags.
    pub(crate) finish: bool,
    pub(crate) is_editing: bool,
    pub(crate) always_refresh: bool,
    pub(crate) refresh_needed: bool,
    pub(crate) was_interrupted: bool,
    pub(crate) previous_interrupt_was_handled_as_interrupt: bool,
    pub(crate) was_resized: bool,
    pub(crate) enable_signal_handling: bool,
    pub(crate) enable_bracketed_paste: bool,
    pub(crate) in_interrupt_handler: bool,
    pub(crate) interrupt_handler_requested_finish: bool,
    pub(crate) prohibit_input_processing: bool,
    pub(crate) have_unprocessed_read_event: bool,

    // Loop plumbing.
    pub(crate) later_queue: VecDeque<LaterEvent>,
    pub(crate) loop_exit: Option<LoopExit>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    /// Create an editor. Does not touch the terminal beyond querying its
    /// size.
    #[must_use]
    pub fn new() -> Self {
        let mut editor = Self {
            buffer: Vec::new(),
            cursor: 0,
            inline_search_cursor: 0,
            chars_touched_in_the_middle: 0,
            drawn_cursor: 0,
            drawn_end_of_line_offset: 0,
            pending_chars: Vec::new(),
            incomplete_data: Vec::new(),
            input_error: None,
            returned_line: String::new(),

            new_prompt: String::new(),
            cached_prompt_metrics: StringMetrics::default(),
            old_prompt_metrics: StringMetrics::default(),
            cached_buffer_metrics: StringMetrics::default(),
            cached_prompt_valid: false,
            num_columns: 0,
            num_lines: 0,
            previous_num_columns: 0,
            extra_forward_lines: 0,
            origin_row: 0,
            origin_column: 0,
            has_origin_reset_scheduled: false,
            prompt_lines_at_suggestion_initiation: 0,

            current_spans: Spans::default(),
            drawn_spans: Spans::default(),
            current_masks: MaskSet::new(),

            history: Vec::new(),
            history_cursor: 0,
            history_dirty: false,

            is_searching: false,
            reset_buffer_on_search_end: true,
            search_offset: 0,
            search_offset_state: SearchOffsetState::Unbiased,
            pre_search_cursor: 0,
            pre_search_buffer: Vec::new(),
            search_cycle_requested: false,
            search_abort_requested: false,
            search_accept_requested: false,
            clear_screen_requested: false,

            suggestion_manager: SuggestionManager::new(),
            suggestion_display: SuggestionDisplay::new(),
            remembered_suggestion_static_data: Vec::new(),
            times_tab_pressed: 0,
            tab_direction: TabDirection::Forward,

            decoder: Decoder::new(),
            paste_buffer: Vec::new(),

            keymap: KeyCallbackMachine::new(),
            tab_completion_handler: None,
            paste_handler: None,
            on_interrupt_handled: None,
            on_refresh: None,

            termios: None,
            default_termios: None,
            initialized: false,

            finish: false,
            is_editing: false,
            always_refresh: false,
            refresh_needed: false,
            was_interrupted: false,
            previous_interrupt_was_handled_as_interrupt: false,
            was_resized: false,
            enable_signal_handling: true,
            enable_bracketed_paste: false,
            in_interrupt_handler: false,
            interrupt_handler_requested_finish: false,
            prohibit_input_processing: false,
            have_unprocessed_read_event: false,

            later_queue: VecDeque::new(),
            loop_exit: None,
        };
        editor.get_terminal_size();
        editor
            .suggestion_display
            .set_vt_size(editor.num_lines, editor.num_columns);
        editor
    }

    // -- Embedder configuration ------------------------------------------

    pub fn register_keybinding<F>(&mut self, keys: &[Key], callback: F)
    where
        F: Fn(&mut Editor, &[Key]) -> bool + 'static,
    {
        self.keymap.register(keys.to_vec(), Rc::new(callback));
    }

    pub(crate) fn register_keybinding_rc(&mut self, keys: &[Key], callback: Rc<KeybindingCallback>) {
        self.keymap.register(keys.to_vec(), callback);
    }

    pub fn set_tab_completion_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Editor) -> Vec<Completion> + 'static,
    {
        self.tab_completion_handler = Some(Box::new(handler));
    }

    pub fn set_paste_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str, &mut Editor) + 'static,
    {
        self.paste_handler = Some(Box::new(handler));
    }

    pub fn set_interrupt_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Editor) + 'static,
    {
        self.on_interrupt_handled = Some(Box::new(handler));
    }

    pub fn set_refresh_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Editor) + 'static,
    {
        self.on_refresh = Some(Box::new(handler));
    }

    /// Toggle bracketed-paste negotiation for subsequent `get_line`
    /// sessions.
    pub fn set_enable_bracketed_paste(&mut self, enable: bool) {
        self.enable_bracketed_paste = enable;
    }

    // -- Buffer access ----------------------------------------------------

    /// The whole buffer as a `String`.
    #[must_use]
    pub fn line(&self) -> String {
        self.line_up_to(self.buffer.len())
    }

    /// The first `n` code points of the buffer.
    #[must_use]
    pub fn line_up_to(&self, n: usize) -> String {
        self.buffer[..n.min(self.buffer.len())].iter().collect()
    }

    /// Replace the buffer, clamping the cursor.
    pub fn set_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        self.inline_search_cursor = self.cursor.min(chars.len());
        self.cursor = self.inline_search_cursor;
        self.chars_touched_in_the_middle = self.buffer.len();
        self.refresh_needed = true;
        self.cached_buffer_metrics = measure(line, &MaskSet::new());
        self.buffer = chars;
    }

    pub fn insert_string(&mut self, text: &str) {
        for ch in text.chars() {
            self.insert_char(ch);
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut bytes = [0u8; 4];
        self.pending_chars
            .extend_from_slice(ch.encode_utf8(&mut bytes).as_bytes());

        if self.cursor == self.buffer.len() {
            self.buffer.push(ch);
            self.cursor = self.buffer.len();
            self.inline_search_cursor = self.cursor;
            return;
        }

        self.buffer.insert(self.cursor, ch);
        self.chars_touched_in_the_middle += 1;
        self.cursor += 1;
        self.inline_search_cursor = self.cursor;
    }

    /// Remove one code point, tracking mid-buffer damage. Removing a
    /// newline leaves a vacated terminal row for cleanup to erase.
    pub(crate) fn remove_at_index(&mut self, index: usize) {
        if index >= self.buffer.len() {
            return;
        }
        let removed = self.buffer.remove(index);
        if removed == '\n' {
            self.extra_forward_lines += 1;
        }
        self.chars_touched_in_the_middle += 1;
    }

    // -- Prompt & metrics --------------------------------------------------

    pub fn set_prompt(&mut self, prompt: &str) {
        if self.cached_prompt_valid {
            self.old_prompt_metrics = self.cached_prompt_metrics.clone();
        }
        self.cached_prompt_valid = false;
        self.cached_prompt_metrics = measure(prompt, &MaskSet::new());
        self.new_prompt = prompt.to_string();
    }

    /// The prompt metrics the next refresh should reason about: the
    /// cached ones when valid, the previous ones for one cycle after a
    /// prompt change.
    pub(crate) fn current_prompt_metrics(&self) -> &StringMetrics {
        if self.cached_prompt_valid {
            &self.cached_prompt_metrics
        } else {
            &self.old_prompt_metrics
        }
    }

    /// Rendered metrics of an arbitrary string (no masks).
    #[must_use]
    pub fn actual_rendered_string_metrics(&self, line: &str) -> StringMetrics {
        measure(line, &MaskSet::new())
    }

    /// Terminal rows consumed by the prompt plus the current buffer.
    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.current_prompt_metrics()
            .lines_with_addition(&self.cached_buffer_metrics, self.num_columns)
    }

    /// The terminal dimensions as last queried.
    #[must_use]
    pub fn terminal_size(&self) -> Size {
        #[allow(clippy::cast_possible_truncation)]
        Size {
            rows: self.num_lines as u16,
            cols: self.num_columns as u16,
        }
    }

    pub(crate) fn get_terminal_size(&mut self) {
        if let Some(size) = terminal::window_size() {
            self.num_columns = size.cols as usize;
            self.num_lines = size.rows as usize;
        }
        if self.num_columns == 0 {
            self.num_columns = 80;
        }
        if self.num_lines == 0 {
            self.num_lines = 24;
        }
    }

    // -- Styling -----------------------------------------------------------

    /// Overlay `style` on a span of the buffer. A style carrying a mask
    /// installs the mask over the span instead of (as well as) colors.
    pub fn stylize(&mut self, span: Span, style: Style) {
        if style.is_empty() {
            return;
        }
        let (mut start, mut end) = (span.start, span.end);
        if start == end {
            return;
        }
        if span.mode == SpanMode::Byte {
            let (s, e) = self.byte_offset_range_to_code_point_offset_range(start, end, 0, false);
            start = s;
            end = e;
        }

        let mut style = style;
        if let Some(mask) = style.mask.take() {
            self.current_masks.insert(start, end, mask);
            self.refresh_needed = true;
        }
        if style.is_empty() {
            return;
        }
        if self.current_spans.insert(start, end, style) {
            self.refresh_needed = true;
        }
    }

    /// Drop every span and mask.
    pub fn strip_styles(&mut self) {
        self.current_spans.clear();
        self.current_masks.clear();
        self.refresh_needed = true;
    }

    /// Normalize completion offsets expressed in bytes to code points.
    ///
    /// Returns `(static_offset, invariant_offset)` in code points,
    /// resolved against the buffer content left of the cursor.
    #[must_use]
    pub fn transform_suggestion_offsets(
        &self,
        invariant: usize,
        static_offset: usize,
        mode: SpanMode,
    ) -> (usize, usize) {
        if mode == SpanMode::Byte {
            let (start, end) = self.byte_offset_range_to_code_point_offset_range(
                static_offset,
                invariant + static_offset,
                self.cursor.saturating_sub(1),
                true,
            );
            (start, end - start)
        } else {
            (static_offset, invariant)
        }
    }

    /// Translate a byte range into a code-point range against the buffer.
    ///
    /// Forward mode scans from `scan_code_point_offset` towards the end;
    /// reverse mode scans backwards from it (used to resolve offsets that
    /// are relative to the cursor).
    pub(crate) fn byte_offset_range_to_code_point_offset_range(
        &self,
        start_byte_offset: usize,
        end_byte_offset: usize,
        scan_code_point_offset: usize,
        reverse: bool,
    ) -> (usize, usize) {
        let mut start = 0;
        let mut end = 0;
        let mut byte_offset = 0;
        let mut code_point_offset = if reverse {
            scan_code_point_offset + 1
        } else {
            scan_code_point_offset
        };

        loop {
            if reverse {
                if code_point_offset == 0 {
                    break;
                }
            } else if code_point_offset >= self.buffer.len() {
                break;
            }

            if byte_offset >= end_byte_offset {
                break;
            }

            if byte_offset < start_byte_offset {
                start += 1;
            }
            if byte_offset < end_byte_offset {
                end += 1;
            }

            let index = if reverse {
                code_point_offset -= 1;
                code_point_offset
            } else {
                let index = code_point_offset;
                code_point_offset += 1;
                index
            };
            byte_offset += self.buffer[index].len_utf8();
        }

        (start, end)
    }

    // -- History -----------------------------------------------------------

    pub fn add_to_history(&mut self, line: &str) {
        self.history.push(HistoryEntry::now(line.to_string()));
        self.history_dirty = true;
    }

    /// Load plain-text history, one entry per line.
    pub fn load_history(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        for line in history::load_entries(path.as_ref())? {
            self.add_to_history(&line);
        }
        Ok(())
    }

    /// Save plain-text history, one entry per line.
    pub fn save_history(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        history::save_entries(path.as_ref(), &self.history)?;
        self.history_dirty = false;
        Ok(())
    }

    /// Search history backwards from the history cursor for `phrase`,
    /// skipping `search_offset` matches. On a hit the buffer is replaced
    /// with the matched entry.
    pub(crate) fn search(&mut self, phrase: &str, allow_empty: bool, from_beginning: bool) -> bool {
        let mut matched_index = None;

        if allow_empty || !phrase.is_empty() {
            let mut search_offset = self.search_offset;
            for i in (0..self.history_cursor.min(self.history.len())).rev() {
                let entry = &self.history[i].entry;
                let contains = if from_beginning {
                    entry.starts_with(phrase)
                } else {
                    entry.contains(phrase)
                };
                if contains {
                    if search_offset == 0 {
                        matched_index = Some(i);
                        break;
                    }
                    search_offset -= 1;
                }
            }

            if matched_index.is_none() {
                let _ = ansi::bell(&mut io::stderr());
            }
        }

        if let Some(index) = matched_index {
            // The whole buffer is about to be replaced.
            self.chars_touched_in_the_middle = self.buffer.len();
            self.buffer.clear();
            self.cursor = 0;
            let matched = self.history[index].entry.clone();
            self.insert_string(&matched);
            self.refresh_needed = true;
        }

        matched_index.is_some()
    }

    /// Leave search mode, restoring the pre-search buffer when requested.
    pub(crate) fn end_search(&mut self) {
        self.is_searching = false;
        self.refresh_needed = true;
        self.search_offset = 0;
        if self.reset_buffer_on_search_end {
            self.buffer = self.pre_search_buffer.clone();
            self.cursor = self.pre_search_cursor;
            self.inline_search_cursor = self.cursor.min(self.buffer.len());
        }
        self.reset_buffer_on_search_end = true;
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Capture termios, clear ECHO and ICANON, and install the default
    /// key bindings. Idempotent.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }

        if let Ok(saved) = Termios::fetch() {
            self.default_termios = Some(saved);
            let mut active = saved;
            active.clear_echo_and_canonical();
            let _ = active.apply();
            self.termios = Some(active);
        }

        self.get_terminal_size();
        self.set_default_keybinds();
        self.initialized = true;
    }

    /// Restore the saved termios and paste mode.
    pub(crate) fn restore(&mut self) {
        if let Some(saved) = self.default_termios {
            let _ = saved.apply();
        }
        if self.enable_bracketed_paste {
            let mut err = io::stderr().lock();
            let _ = ansi::disable_bracketed_paste(&mut err);
            let _ = err.flush();
        }
        self.initialized = false;
    }

    /// Request loop exit. Inside an interrupt handler this only records
    /// the request; the loop acts on it at the end of input processing.
    pub fn finish(&mut self) {
        if self.in_interrupt_handler {
            self.interrupt_handler_requested_finish = true;
        }
        self.finish = true;
    }

    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    /// Reset per-session state (buffer metrics, cursors, spans, errors).
    pub fn reset(&mut self) {
        self.cached_buffer_metrics.reset();
        self.cached_prompt_valid = false;
        self.cursor = 0;
        self.drawn_cursor = 0;
        self.inline_search_cursor = 0;
        self.search_offset = 0;
        self.search_offset_state = SearchOffsetState::Unbiased;
        self.old_prompt_metrics = self.cached_prompt_metrics.clone();
        self.set_origin_value(0, 0);
        self.prompt_lines_at_suggestion_initiation = 0;
        self.refresh_needed = true;
        self.input_error = None;
        self.returned_line.clear();
        self.chars_touched_in_the_middle = 0;
        self.drawn_end_of_line_offset = 0;
        self.drawn_spans = Spans::default();
        self.paste_buffer.clear();
    }

    fn set_default_keybinds(&mut self) {
        fn internal(f: fn(&mut Editor)) -> Rc<KeybindingCallback> {
            Rc::new(move |editor: &mut Editor, _keys: &[Key]| {
                f(editor);
                false
            })
        }

        self.register_keybinding_rc(&[Key::new(ctrl('N'))], internal(ops::search_forwards));
        self.register_keybinding_rc(&[Key::new(ctrl('P'))], internal(ops::search_backwards));
        self.register_keybinding_rc(&[Key::new(ctrl('A'))], internal(ops::go_home));
        self.register_keybinding_rc(&[Key::new(ctrl('B'))], internal(ops::cursor_left_character));
        self.register_keybinding_rc(&[Key::new(ctrl('D'))], internal(ops::erase_character_forwards));
        self.register_keybinding_rc(&[Key::new(ctrl('E'))], internal(ops::go_end));
        self.register_keybinding_rc(&[Key::new(ctrl('F'))], internal(ops::cursor_right_character));
        // ^H, and DEL for the terminals that send it instead.
        self.register_keybinding_rc(&[Key::new(ctrl('H'))], internal(ops::erase_character_backwards));
        self.register_keybinding_rc(&[Key::new('\x7f')], internal(ops::erase_character_backwards));
        self.register_keybinding_rc(&[Key::new(ctrl('K'))], internal(ops::erase_to_end));
        self.register_keybinding_rc(&[Key::new(ctrl('L'))], internal(ops::clear_screen));
        self.register_keybinding_rc(&[Key::new(ctrl('R'))], internal(search::enter_search));
        self.register_keybinding_rc(&[Key::new(ctrl('T'))], internal(ops::transpose_characters));
        self.register_keybinding_rc(&[Key::new('\n')], internal(ops::finish));

        // M-.: insert the last word of the previous history entry.
        self.register_keybinding_rc(&[Key::alt('.')], internal(ops::insert_last_words));
        self.register_keybinding_rc(&[Key::alt('b')], internal(ops::cursor_left_character));
        self.register_keybinding_rc(&[Key::alt('f')], internal(ops::cursor_right_character));
        // M-backspace: backward delete word.
        self.register_keybinding_rc(&[Key::alt('\x08')], internal(ops::erase_alnum_word_backwards));
        self.register_keybinding_rc(&[Key::alt('d')], internal(ops::erase_alnum_word_forwards));
        self.register_keybinding_rc(&[Key::alt('c')], internal(ops::capitalize_word));
        self.register_keybinding_rc(&[Key::alt('l')], internal(ops::lowercase_word));
        self.register_keybinding_rc(&[Key::alt('u')], internal(ops::uppercase_word));

        // Terminal-configurable control characters.
        let werase = self.special_char_or(SpecialChar::WordErase, 0x17);
        let kill = self.special_char_or(SpecialChar::Kill, 0x15);
        let erase = self.special_char_or(SpecialChar::Erase, 0x7f);
        self.register_keybinding_rc(&[Key::new(werase as char)], internal(ops::erase_word_backwards));
        self.register_keybinding_rc(&[Key::new(kill as char)], internal(ops::kill_line));
        self.register_keybinding_rc(&[Key::new(erase as char)], internal(ops::erase_character_backwards));
    }

    pub(crate) fn special_char_or(&self, which: SpecialChar, fallback: u8) -> u8 {
        self.termios.map_or(fallback, |t| {
            let value = t.special_char(which);
            if value == 0 {
                fallback
            } else {
                value
            }
        })
    }

    // -- The main loop -----------------------------------------------------

    /// Run the editor until a line is finished or input fails.
    ///
    /// # Errors
    ///
    /// [`Error::Canceled`] when input was canceled (EOF on an empty
    /// buffer, zero-byte read); [`Error::Io`] when reading failed.
    pub fn get_line(&mut self, prompt: &str) -> Result<String> {
        loop {
            self.initialize();
            self.is_editing = true;

            let old_columns = self.num_columns;
            let old_lines = self.num_lines;
            self.get_terminal_size();
            if self.num_columns != old_columns || self.num_lines != old_lines {
                self.refresh_needed = true;
            }

            if self.enable_bracketed_paste {
                let mut err = io::stderr().lock();
                let _ = ansi::enable_bracketed_paste(&mut err);
                let _ = err.flush();
            }

            self.set_prompt(prompt);
            self.reset();
            self.strip_styles();

            // A multi-line prompt needs its rows reserved before the
            // origin is measured.
            let prompt_lines = self.current_prompt_metrics().line_metrics.len().max(1) - 1;
            {
                let mut err = io::stderr().lock();
                for _ in 0..prompt_lines {
                    let _ = err.write_all(b"\n");
                }
                #[allow(clippy::cast_possible_wrap)]
                let _ = ansi::move_relative(&mut err, -(prompt_lines as i64), 0);
                let _ = err.flush();
            }

            if !self.set_origin(true) {
                self.restore();
                return Err(self.input_error.take().unwrap_or(Error::Canceled));
            }

            self.history_cursor = self.history.len();
            self.refresh_display();

            if self.enable_signal_handling {
                signal::install();
            }

            let (mut watcher, wake_rx) = StdinWatcher::spawn();
            if !self.incomplete_data.is_empty() {
                self.later_queue.push_back(LaterEvent::TryUpdateOnce);
            }

            let exit = self.run_loop(&wake_rx);
            drop(wake_rx);
            watcher.stop();

            match exit {
                LoopExit::Exit => {
                    self.finish = false;
                    return match self.input_error.take() {
                        Some(error) => Err(error),
                        None => Ok(std::mem::take(&mut self.returned_line)),
                    };
                }
                LoopExit::Retry => {
                    tracing::debug!("interrupt handled, retrying get_line");
                }
            }
        }
    }

    /// Multiplex later events, signal flags, and wake tokens until an
    /// exit code is posted.
    fn run_loop(&mut self, wake_rx: &Receiver<Wake>) -> LoopExit {
        loop {
            if let Some(exit) = self.loop_exit.take() {
                return exit;
            }

            if let Some(event) = self.later_queue.pop_front() {
                if !self.finish {
                    match event {
                        LaterEvent::HandleResizeEvent { reset_origin } => {
                            self.handle_resize_event(reset_origin);
                        }
                        LaterEvent::TryUpdateOnce => self.try_update_once(),
                    }
                }
                continue;
            }

            if self.enable_signal_handling {
                if signal::take_resize() {
                    self.resized();
                    continue;
                }
                if signal::take_interrupt() {
                    self.interrupted();
                    continue;
                }
            }

            match wake_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(Wake) => self.try_update_once(),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.input_error = Some(Error::Canceled);
                    self.loop_exit = Some(LoopExit::Exit);
                }
            }
        }
    }

    /// One loop tick: interrupts, input, refresh, quit-if-finished.
    pub(crate) fn try_update_once(&mut self) {
        if self.was_interrupted {
            self.handle_interrupt_event();
        }

        self.handle_read_event();

        if self.always_refresh {
            self.refresh_needed = true;
        }

        self.refresh_display();

        if self.finish {
            self.quit_event_loop();
        }
    }

    /// Leave the loop: park the cursor after the buffer, take the line,
    /// restore the terminal.
    pub(crate) fn quit_event_loop(&mut self) {
        {
            let mut err = io::stderr().lock();
            self.reposition_cursor(&mut err, true);
            let _ = err.write_all(b"\r\n");
            let _ = err.flush();
        }

        self.returned_line = self.line();
        self.buffer.clear();
        self.chars_touched_in_the_middle = 0;

        if self.initialized {
            self.restore();
        }

        self.loop_exit = Some(LoopExit::Exit);
    }

    // -- Signals -----------------------------------------------------------

    /// A SIGINT arrived (flag consumed by the loop).
    pub(crate) fn interrupted(&mut self) {
        if self.is_searching {
            // The search driver routes interrupts to the inner editor.
            return;
        }
        if !self.is_editing {
            return;
        }

        self.was_interrupted = true;
        self.handle_interrupt_event();
        if self.interrupt_handler_requested_finish {
            self.interrupt_handler_requested_finish = false;
            self.finish = false;
            self.quit_event_loop();
            return;
        }

        if !self.finish || !self.previous_interrupt_was_handled_as_interrupt {
            return;
        }

        self.finish = false;

        {
            let mut err = io::stderr().lock();
            self.reposition_cursor(&mut err, true);
            let cleaned = self.suggestion_display.cleanup(&mut err);
            if cleaned {
                self.reposition_cursor(&mut err, true);
            }
            let _ = err.write_all(b"\n");
            let _ = err.flush();
        }

        self.buffer.clear();
        self.chars_touched_in_the_middle = 0;
        self.is_editing = false;
        self.restore();
        self.loop_exit = Some(LoopExit::Retry);
    }

    /// Run the interrupt protocol: the Ctrl-C binding, the `^C` echo,
    /// the user handler, and — unless the handler requested finish —
    /// clearing the buffer.
    pub(crate) fn handle_interrupt_event(&mut self) {
        self.was_interrupted = false;
        self.previous_interrupt_was_handled_as_interrupt = false;

        let should_process = match self.keymap.interrupted() {
            Some((keys, callback)) => callback(self, &keys),
            None => true,
        };
        if !should_process {
            return;
        }

        self.previous_interrupt_was_handled_as_interrupt = true;

        let _ = io::stderr().write_all(b"^C");

        if let Some(mut handler) = self.on_interrupt_handled.take() {
            self.in_interrupt_handler = true;
            self.interrupt_handler_requested_finish = false;
            handler(self);
            self.on_interrupt_handled = Some(handler);
            self.in_interrupt_handler = false;
        }

        if self.interrupt_handler_requested_finish {
            return;
        }

        self.buffer.clear();
        self.chars_touched_in_the_middle = 0;
        self.cursor = 0;

        self.finish();
    }

    /// A SIGWINCH arrived: re-query geometry now, and reconcile the
    /// origin as soon as the terminal answers a position report.
    pub(crate) fn resized(&mut self) {
        self.was_resized = true;
        self.previous_num_columns = self.num_columns;
        self.get_terminal_size();

        if !self.has_origin_reset_scheduled {
            if self.set_origin(false) {
                self.handle_resize_event(false);
            } else {
                self.later_queue.push_back(LaterEvent::HandleResizeEvent {
                    reset_origin: false,
                });
                self.has_origin_reset_scheduled = true;
            }
        }
    }

    pub(crate) fn handle_resize_event(&mut self, reset_origin: bool) {
        self.has_origin_reset_scheduled = false;
        if reset_origin && !self.set_origin(false) {
            self.has_origin_reset_scheduled = true;
            self.later_queue.push_back(LaterEvent::HandleResizeEvent {
                reset_origin: true,
            });
            return;
        }

        self.set_origin_value(self.origin_row, 1);
        {
            let mut err = io::stderr().lock();
            self.reposition_cursor(&mut err, true);
            self.suggestion_display.redisplay(
                &mut self.suggestion_manager,
                self.num_lines,
                self.num_columns,
                &mut err,
            );
            self.origin_row = self.suggestion_display.origin_row();
            self.reposition_cursor(&mut err, true);
            let _ = err.flush();
        }
    }

    /// Anchor the origin via a cursor-position report. Bytes that arrive
    /// ahead of the report are replayed through the decoder.
    pub(crate) fn set_origin(&mut self, quit_on_error: bool) -> bool {
        let mut junk = Vec::new();
        let result = terminal::query_cursor_position(&mut junk);
        self.incomplete_data.extend_from_slice(&junk);
        match result {
            Ok((row, col)) => {
                self.set_origin_value(row as usize, col as usize);
                true
            }
            Err(error) => {
                tracing::debug!(%error, "cursor position query failed");
                if quit_on_error {
                    self.input_error = Some(Error::Io(error));
                    self.finish();
                }
                false
            }
        }
    }

    pub(crate) fn set_origin_value(&mut self, row: usize, column: usize) {
        self.origin_row = row;
        self.origin_column = column;
        self.suggestion_display.set_origin(row, column);
    }

    // -- Input -------------------------------------------------------------

    /// Read available bytes and decode them. Reentrant calls (from a
    /// nested refresh) only note that a read is pending.
    pub(crate) fn handle_read_event(&mut self) {
        if self.prohibit_input_processing {
            self.have_unprocessed_read_event = true;
            return;
        }
        self.prohibit_input_processing = true;
        self.handle_read_event_inner();
        self.prohibit_input_processing = false;
    }

    fn handle_read_event_inner(&mut self) {
        let had_carry = !self.incomplete_data.is_empty();

        if terminal::stdin_ready() {
            let mut key_buf = [0u8; 16];
            match terminal::read_stdin(&mut key_buf) {
                Ok(0) => {
                    if !had_carry {
                        self.input_error = Some(Error::Canceled);
                        self.finish();
                        return;
                    }
                }
                Ok(n) => {
                    // A bare ^C sneaks past the signal path when it was
                    // queued before termios changed hands.
                    if !had_carry && n == 1 && key_buf[0] == ctrl('C') as u8 {
                        self.handle_interrupt_event();
                        return;
                    }
                    self.incomplete_data.extend_from_slice(&key_buf[..n]);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    if !self.was_interrupted {
                        if self.was_resized {
                            return;
                        }
                        self.finish();
                        return;
                    }
                    self.handle_interrupt_event();
                    return;
                }
                Err(error) => {
                    tracing::warn!(%error, "error reading from stdin");
                    self.input_error = Some(Error::Io(error));
                    self.finish();
                    return;
                }
            }
        } else if !had_carry {
            // A stale wake token (e.g. after a nested session consumed
            // the bytes) must not park us in a blocking read.
            return;
        }

        self.process_pending_input();
    }

    /// Decode the maximal valid UTF-8 prefix of the carry buffer and run
    /// each code point through the input state machine.
    pub(crate) fn process_pending_input(&mut self) {
        let bytes = std::mem::take(&mut self.incomplete_data);
        let mut chars: Vec<char> = Vec::with_capacity(bytes.len());
        let mut tail: Vec<u8> = Vec::new();

        let mut rest: &[u8] = &bytes;
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    chars.extend(text.chars());
                    rest = &[];
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    chars.extend(
                        std::str::from_utf8(&rest[..valid])
                            .expect("valid prefix")
                            .chars(),
                    );
                    match error.error_len() {
                        // An invalid byte: drop it and resynchronize.
                        Some(skip) => rest = &rest[valid + skip..],
                        // A sequence split across reads: carry it over.
                        None => {
                            tail = rest[valid..].to_vec();
                            rest = &[];
                        }
                    }
                }
            }
        }

        let mut reverse_tab = false;
        let mut consumed = 0;
        for (index, &code_point) in chars.iter().enumerate() {
            if self.finish {
                break;
            }
            consumed = index + 1;
            self.process_code_point(code_point, &mut reverse_tab);
        }

        let mut carry: Vec<u8> = Vec::new();
        for &c in &chars[consumed..] {
            let mut bytes = [0u8; 4];
            carry.extend_from_slice(c.encode_utf8(&mut bytes).as_bytes());
        }
        carry.extend_from_slice(&tail);
        self.incomplete_data = carry;

        // Unprocessed whole code points get another pass; a bare
        // incomplete UTF-8 tail waits for the next read instead.
        if consumed < chars.len() && !self.finish {
            self.later_queue.push_back(LaterEvent::TryUpdateOnce);
        }
    }

    fn process_code_point(&mut self, code_point: char, reverse_tab: &mut bool) {
        if code_point == '\0' {
            return;
        }

        match self.decoder.state {
            InputState::GotEscape => match code_point {
                '[' => self.decoder.state = InputState::CsiExpectParameter,
                _ => {
                    self.dispatch_key(Key::alt(code_point));
                    self.decoder.state = InputState::Free;
                }
            },
            InputState::CsiExpectParameter
            | InputState::CsiExpectIntermediate
            | InputState::CsiExpectFinal => self.process_csi(code_point, reverse_tab),
            InputState::Verbatim => {
                self.decoder.state = InputState::Free;
                // Verbatim bypasses every mechanism and just inserts.
                self.insert_char(code_point);
            }
            InputState::Paste => {
                if code_point == '\x1b' {
                    self.decoder.previous_free_state = InputState::Paste;
                    self.decoder.state = InputState::GotEscape;
                    return;
                }
                if self.paste_handler.is_some() {
                    self.paste_buffer.push(code_point);
                } else {
                    self.insert_char(code_point);
                }
            }
            InputState::Free => {
                self.decoder.previous_free_state = InputState::Free;
                if code_point == '\x1b' {
                    if self.dispatch_key(Key::new(code_point)) {
                        self.decoder.state = InputState::GotEscape;
                    }
                    return;
                }
                if code_point == '\x16' {
                    // ^V: take the next code point verbatim.
                    if self.dispatch_key(Key::new(code_point)) {
                        self.decoder.state = InputState::Verbatim;
                    }
                    return;
                }
                self.free_tail(code_point, reverse_tab);
            }
        }
    }

    fn process_csi(&mut self, code_point: char, reverse_tab: &mut bool) {
        if self.decoder.state == InputState::CsiExpectParameter {
            if (0x30..=0x3f).contains(&(code_point as u32)) {
                self.decoder.csi_parameter_bytes.push(code_point as u8);
                return;
            }
            self.decoder.state = InputState::CsiExpectIntermediate;
        }
        if self.decoder.state == InputState::CsiExpectIntermediate {
            if (0x20..=0x2f).contains(&(code_point as u32)) {
                self.decoder.csi_intermediate_bytes.push(code_point as u8);
                return;
            }
            self.decoder.state = InputState::CsiExpectFinal;
        }

        // The final byte.
        self.decoder.state = self.decoder.previous_free_state;
        let is_in_paste = self.decoder.state == InputState::Paste;

        let parameters = parse_csi_parameters(&self.decoder.csi_parameter_bytes);
        let param1 = parameters.first().copied().unwrap_or(0);
        let param2 = parameters.get(1).copied().unwrap_or(0);
        let modifiers = param2.saturating_sub(1) as u8;

        if is_in_paste && !(code_point == '~' && param1 == 201) {
            // The only escape honored inside a paste is stop-paste;
            // everything else is pasted data, replayed verbatim.
            tracing::trace!("reinjecting CSI received inside a paste");
            let params = std::mem::take(&mut self.decoder.csi_parameter_bytes);
            let intermediates = std::mem::take(&mut self.decoder.csi_intermediate_bytes);
            self.insert_char('\x1b');
            self.insert_char('[');
            for byte in params.iter().chain(intermediates.iter()) {
                self.insert_char(*byte as char);
            }
            self.insert_char(code_point);
            return;
        }

        if !(0x40..=0x7f).contains(&(code_point as u32)) {
            tracing::warn!(byte = code_point as u32, "invalid CSI final byte");
            self.decoder.csi_parameter_bytes.clear();
            self.decoder.csi_intermediate_bytes.clear();
            return;
        }

        let csi_final = code_point;
        self.decoder.csi_parameter_bytes.clear();
        self.decoder.csi_intermediate_bytes.clear();

        if csi_final == 'Z' {
            // Shift-tab: goes through the ordinary tail as a reverse tab.
            *reverse_tab = true;
            self.free_tail('Z', reverse_tab);
            return;
        }

        self.cleanup_suggestions();

        let word_modifier =
            modifiers == Modifiers::ALT.bits() || modifiers == Modifiers::CTRL.bits();

        match csi_final {
            'A' => ops::search_backwards(self),
            'B' => ops::search_forwards(self),
            'D' => {
                if word_modifier {
                    ops::cursor_left_word(self);
                } else {
                    ops::cursor_left_character(self);
                }
            }
            'C' => {
                if word_modifier {
                    ops::cursor_right_word(self);
                } else {
                    ops::cursor_right_character(self);
                }
            }
            'H' => ops::go_home(self),
            'F' => ops::go_end(self),
            '~' => {
                if param1 == 3 {
                    if modifiers == Modifiers::CTRL.bits() {
                        ops::erase_alnum_word_forwards(self);
                    } else {
                        ops::erase_character_forwards(self);
                    }
                    self.search_offset = 0;
                    return;
                }
                if self.enable_bracketed_paste {
                    if !is_in_paste && param1 == 200 {
                        self.decoder.state = InputState::Paste;
                        return;
                    }
                    if is_in_paste && param1 == 201 {
                        self.decoder.state = InputState::Free;
                        if let Some(mut handler) = self.paste_handler.take() {
                            let pasted: String = self.paste_buffer.iter().collect();
                            self.paste_buffer.clear();
                            handler(&pasted, self);
                            self.paste_handler = Some(handler);
                        }
                        if !self.paste_buffer.is_empty() {
                            let pasted: String = self.paste_buffer.iter().collect();
                            self.insert_string(&pasted);
                            self.paste_buffer.clear();
                        }
                        return;
                    }
                }
                tracing::warn!(param = param1, "unknown '~' CSI parameter");
            }
            other => {
                tracing::warn!(byte = other as u32, "unknown CSI final");
            }
        }
    }

    /// The free-state tail: EOF handling, binding dispatch, completion,
    /// and plain insertion.
    fn free_tail(&mut self, code_point: char, reverse_tab: &mut bool) {
        // Normally ^D; `stty eof` can rebind it. Only applies to an
        // empty buffer — at any other time the behavior is bindable.
        let veof = self.special_char_or(SpecialChar::Eof, 0x04);
        if code_point as u32 == u32::from(veof) && self.buffer.is_empty() {
            ops::finish_edit(self);
            self.cleanup_suggestions();
            return;
        }

        if !self.dispatch_key(Key::new(code_point)) {
            self.cleanup_suggestions();
            return;
        }

        // Any processed key resets the search offset.
        self.search_offset = 0;

        if code_point == '\t' || *reverse_tab {
            self.tab_completion(reverse_tab);
            return;
        }

        self.remembered_suggestion_static_data.clear();
        self.cleanup_suggestions();
        self.insert_char(code_point);
    }

    /// Feed a key through the binding machine; returns the
    /// should-process verdict.
    pub(crate) fn dispatch_key(&mut self, key: Key) -> bool {
        match self.keymap.key_pressed(key) {
            KeyPress::Unbound => true,
            KeyPress::Pending => false,
            KeyPress::Replay(prefix) => {
                for captured in prefix {
                    self.insert_char(captured.code);
                }
                true
            }
            KeyPress::Matched { keys, callback } => callback(self, &keys),
        }
    }

    // -- Tab completion ----------------------------------------------------

    /// The tab-press state machine: first press completes the common
    /// prefix, second shows the pager, later presses cycle.
    fn tab_completion(&mut self, reverse_tab: &mut bool) {
        if self.tab_completion_handler.is_none() {
            return;
        }

        // Reverse tab counts as a regular tab here.
        self.times_tab_pressed += 1;

        let token_start = self.cursor;

        if self.times_tab_pressed == 1 {
            if let Some(mut handler) = self.tab_completion_handler.take() {
                let suggestions = handler(self);
                self.tab_completion_handler = Some(handler);
                self.suggestion_manager.set_suggestions(suggestions);
            }
            self.suggestion_manager.set_start_index(0);
            self.prompt_lines_at_suggestion_initiation = self.num_lines();
            if self.suggestion_manager.count() == 0 {
                let _ = ansi::bell(&mut io::stderr());
            }
        }

        // Adjust the already advanced/retreated index when the tab
        // direction flips.
        if *reverse_tab && self.tab_direction != TabDirection::Backward {
            self.suggestion_manager.previous();
            self.suggestion_manager.previous();
            self.tab_direction = TabDirection::Backward;
        }
        if !*reverse_tab && self.tab_direction != TabDirection::Forward {
            self.suggestion_manager.next();
            self.suggestion_manager.next();
            self.tab_direction = TabDirection::Forward;
        }
        *reverse_tab = false;

        let mode = match self.times_tab_pressed {
            1 => CompletionMode::CompletePrefix,
            2 => CompletionMode::ShowSuggestions,
            _ => CompletionMode::CycleSuggestions,
        };

        // Reinstate the static context captured by the previous attempt.
        let remembered: String = std::mem::take(&mut self.remembered_suggestion_static_data)
            .into_iter()
            .collect();
        self.insert_string(&remembered);

        let result = self
            .suggestion_manager
            .attempt_completion(mode, token_start);

        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        let mut new_cursor =
            (self.cursor as isize + result.new_cursor_offset).max(0) as usize;
        for _ in result.offset_start_to_remove..result.offset_end_to_remove {
            self.remove_at_index(new_cursor);
        }

        new_cursor = new_cursor.saturating_sub(result.static_offset_from_cursor);
        for _ in 0..result.static_offset_from_cursor {
            if new_cursor >= self.buffer.len() {
                break;
            }
            self.remembered_suggestion_static_data
                .push(self.buffer[new_cursor]);
            self.remove_at_index(new_cursor);
        }

        self.cursor = new_cursor.min(self.buffer.len());
        self.inline_search_cursor = self.cursor;
        self.refresh_needed = true;
        self.chars_touched_in_the_middle += 1;

        let insert: String = result.insert.iter().collect();
        self.insert_string(&insert);

        {
            let mut err = io::stderr().lock();
            self.reposition_cursor(&mut err, false);
            let _ = err.flush();
        }

        if let Some(style) = result.style_to_apply {
            let start = self.suggestion_manager.current_suggestion().start_index;
            self.stylize(
                Span {
                    start,
                    end: self.cursor,
                    mode: SpanMode::Rune,
                },
                style,
            );
        }

        match result.new_completion_mode {
            CompletionMode::DontComplete => {
                self.times_tab_pressed = 0;
                self.remembered_suggestion_static_data.clear();
            }
            CompletionMode::CompletePrefix => {}
            _ => self.times_tab_pressed += 1,
        }

        if self.times_tab_pressed > 1 && self.suggestion_manager.count() > 0 {
            let mut err = io::stderr().lock();
            if self.suggestion_display.cleanup(&mut err) {
                self.reposition_cursor(&mut err, false);
            }
            self.suggestion_display
                .set_initial_prompt_lines(self.prompt_lines_at_suggestion_initiation);
            let _ = self
                .suggestion_display
                .display(&mut self.suggestion_manager, &mut err);
            self.origin_row = self.suggestion_display.origin_row();
            let _ = err.flush();
        }

        if self.times_tab_pressed > 2 {
            if self.tab_direction == TabDirection::Forward {
                self.suggestion_manager.next();
            } else {
                self.suggestion_manager.previous();
            }
        }

        if self.suggestion_manager.count() < 2
            && !result.avoid_committing_to_single_suggestion
        {
            // Zero or one suggestion: commit it and continue as if it had
            // been auto-completed.
            {
                let mut err = io::stderr().lock();
                self.reposition_cursor(&mut err, true);
                let _ = err.flush();
            }
            self.cleanup_suggestions();
            self.remembered_suggestion_static_data.clear();
        }
    }

    /// Close the pager, stamp the last suggestion's style over what it
    /// inserted, and reset the tab counter.
    pub(crate) fn cleanup_suggestions(&mut self) {
        if self.times_tab_pressed != 0 {
            let current = self.suggestion_manager.current_suggestion();
            let (start, style) = (current.start_index, current.style.clone());
            self.stylize(
                Span {
                    start,
                    end: self.cursor,
                    mode: SpanMode::Rune,
                },
                style,
            );

            let mut err = io::stderr().lock();
            if self.suggestion_display.cleanup(&mut err) {
                self.reposition_cursor(&mut err, false);
                self.refresh_needed = true;
            }
            drop(err);
            self.suggestion_manager.reset();
            self.suggestion_display.finish();
        }
        self.times_tab_pressed = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Color, XtermColor};
    use std::cell::RefCell;

    /// Feed raw terminal bytes straight into the decoder, as if read
    /// from stdin.
    fn feed(editor: &mut Editor, bytes: &[u8]) {
        editor.incomplete_data.extend_from_slice(bytes);
        editor.process_pending_input();
    }

    fn editor() -> Editor {
        let mut editor = Editor::new();
        editor.initialize();
        editor
    }

    // -- Buffer API --------------------------------------------------------

    #[test]
    fn set_line_then_line_round_trips() {
        let mut editor = Editor::new();
        editor.set_line("hello world");
        assert_eq!(editor.line(), "hello world");
    }

    #[test]
    fn line_up_to_takes_code_points() {
        let mut editor = Editor::new();
        editor.set_line("héllo");
        assert_eq!(editor.line_up_to(2), "hé");
    }

    #[test]
    fn insert_char_at_end_does_not_touch_middle() {
        let mut editor = Editor::new();
        editor.insert_string("ab");
        assert_eq!(editor.chars_touched_in_the_middle, 0);
        assert_eq!(editor.cursor, 2);
    }

    #[test]
    fn insert_char_in_middle_counts_damage() {
        let mut editor = Editor::new();
        editor.insert_string("ab");
        editor.cursor = 1;
        editor.insert_char('x');
        assert_eq!(editor.line(), "axb");
        assert_eq!(editor.chars_touched_in_the_middle, 1);
        assert_eq!(editor.inline_search_cursor, editor.cursor);
    }

    #[test]
    fn cursor_stays_in_bounds_after_edits() {
        let mut editor = editor();
        feed(&mut editor, b"hello");
        assert!(editor.cursor <= editor.buffer.len());
        assert_eq!(editor.inline_search_cursor, editor.cursor);
    }

    // -- Styling API -------------------------------------------------------

    #[test]
    fn stylize_mirrors_spans_and_strip_clears() {
        let mut editor = Editor::new();
        editor.set_line("hello");
        let style = Style::foreground(Color::Xterm(XtermColor::Blue));
        editor.stylize(
            Span {
                start: 1,
                end: 3,
                mode: SpanMode::Rune,
            },
            style.clone(),
        );
        assert_eq!(editor.current_spans.starting[&1][&3], style);
        assert_eq!(editor.current_spans.ending[&3][&1], style);

        editor.strip_styles();
        assert!(editor.current_spans.is_empty());
    }

    #[test]
    fn stylize_empty_style_is_ignored() {
        let mut editor = Editor::new();
        editor.set_line("hello");
        editor.stylize(
            Span {
                start: 0,
                end: 2,
                mode: SpanMode::Rune,
            },
            Style::default(),
        );
        assert!(editor.current_spans.is_empty());
    }

    #[test]
    fn stylize_byte_span_translates_to_code_points() {
        let mut editor = Editor::new();
        editor.set_line("héllo");
        // Bytes 0..3 cover 'h' (1 byte) and 'é' (2 bytes).
        editor.stylize(
            Span {
                start: 0,
                end: 3,
                mode: SpanMode::Byte,
            },
            Style::foreground(Color::Xterm(XtermColor::Red)),
        );
        assert!(editor.current_spans.starting[&0].contains_key(&2));
    }

    #[test]
    fn transform_suggestion_offsets_rune_mode_is_identity() {
        let editor = Editor::new();
        assert_eq!(
            editor.transform_suggestion_offsets(4, 2, SpanMode::Rune),
            (2, 4)
        );
    }

    // -- History -----------------------------------------------------------

    #[test]
    fn history_is_append_only_and_dirty() {
        let mut editor = Editor::new();
        editor.add_to_history("one");
        editor.add_to_history("two");
        assert_eq!(editor.history.len(), 2);
        assert!(editor.history_dirty);
    }

    #[test]
    fn history_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");

        let mut editor = Editor::new();
        editor.add_to_history("make check");
        editor.save_history(&path).unwrap();
        assert!(!editor.history_dirty);

        let mut fresh = Editor::new();
        fresh.load_history(&path).unwrap();
        assert_eq!(fresh.history.last().unwrap().entry, "make check");
    }

    #[test]
    fn search_skips_offset_matches() {
        let mut editor = Editor::new();
        editor.add_to_history("echo one");
        editor.add_to_history("echo two");
        editor.add_to_history("other");
        editor.history_cursor = editor.history.len();

        assert!(editor.search("echo", false, false));
        assert_eq!(editor.line(), "echo two");

        editor.buffer.clear();
        editor.cursor = 0;
        editor.search_offset = 1;
        assert!(editor.search("echo", false, false));
        assert_eq!(editor.line(), "echo one");
    }

    #[test]
    fn search_from_beginning_requires_prefix() {
        let mut editor = Editor::new();
        editor.add_to_history("say echo");
        editor.history_cursor = editor.history.len();
        assert!(!editor.search("echo", false, true));
        assert!(editor.search("say", false, true));
    }

    // -- End-to-end byte-stream scenarios ----------------------------------

    #[test]
    fn scenario_plain_line() {
        let mut editor = editor();
        feed(&mut editor, b"hello\n");
        assert!(editor.finish);
        assert_eq!(editor.line(), "hello");
    }

    #[test]
    fn scenario_backspace() {
        let mut editor = editor();
        feed(&mut editor, b"ab\x7fc\n");
        assert!(editor.finish);
        assert_eq!(editor.line(), "ac");
    }

    #[test]
    fn scenario_arrow_left_insert() {
        let mut editor = editor();
        feed(&mut editor, b"abc\x1b[D\x1b[Dx\n");
        assert!(editor.finish);
        assert_eq!(editor.line(), "axbc");
    }

    #[test]
    fn scenario_alt_b_moves_one_character() {
        // M-b is bound to cursor-left-character, so the backspace
        // removes the character before the moved cursor.
        let mut editor = editor();
        feed(&mut editor, b"abcd\x1bb\x7f\n");
        assert!(editor.finish);
        assert_eq!(editor.line(), "abd");
    }

    #[test]
    fn scenario_bracketed_paste_without_handler() {
        let mut editor = editor();
        editor.set_enable_bracketed_paste(true);
        feed(&mut editor, b"\x1b[200~XYZ\x1b[201~\n");
        assert!(editor.finish);
        assert_eq!(editor.line(), "XYZ");
    }

    #[test]
    fn scenario_bracketed_paste_with_handler() {
        let captured = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&captured);

        let mut editor = editor();
        editor.set_enable_bracketed_paste(true);
        editor.set_paste_handler(move |pasted, _editor| {
            sink.borrow_mut().push_str(pasted);
        });
        feed(&mut editor, b"\x1b[200~XYZ\x1b[201~\n");
        assert!(editor.finish);
        assert_eq!(editor.line(), "");
        assert_eq!(&*captured.borrow(), "XYZ");
    }

    #[test]
    fn scenario_single_completion_commits() {
        let mut editor = editor();
        editor.set_tab_completion_handler(|editor| {
            let mut completion = Completion::new("exit");
            completion.invariant_offset = editor.line().len();
            completion.allow_commit_without_listing = true;
            vec![completion]
        });
        feed(&mut editor, b"exi\t");
        assert_eq!(editor.line(), "exit");
        assert_eq!(editor.times_tab_pressed, 0, "tab counter resets");
    }

    #[test]
    fn scenario_erase_at_start_is_a_bell_noop() {
        let mut editor = editor();
        feed(&mut editor, b"\x7f");
        assert_eq!(editor.line(), "");
        assert_eq!(editor.cursor, 0);
    }

    #[test]
    fn scenario_delete_forward_at_end_is_a_noop() {
        let mut editor = editor();
        feed(&mut editor, b"ab\x1b[3~");
        assert_eq!(editor.line(), "ab");
    }

    #[test]
    fn scenario_verbatim_insert() {
        let mut editor = editor();
        // ^V then ^L: the ^L is inserted, not dispatched to clear-screen.
        feed(&mut editor, b"a\x16\x0cb");
        assert_eq!(editor.line(), "a\x0cb");
    }

    #[test]
    fn scenario_home_end_keys() {
        let mut editor = editor();
        feed(&mut editor, b"abc\x1b[Hx");
        assert_eq!(editor.line(), "xabc");
        feed(&mut editor, b"\x1b[Fy");
        assert_eq!(editor.line(), "xabcy");
    }

    #[test]
    fn scenario_ctrl_word_motion() {
        let mut editor = editor();
        feed(&mut editor, b"foo bar");
        // Home, then Ctrl-Right stops at the end of "foo".
        feed(&mut editor, b"\x1b[H\x1b[1;5C");
        assert_eq!(editor.cursor, 3);
        // Ctrl-Left crosses the space and stops right of the nearest
        // alphanumeric character.
        feed(&mut editor, b"\x1b[F\x1b[1;5D");
        assert_eq!(editor.cursor, 6);
    }

    #[test]
    fn scenario_kill_line() {
        let mut editor = editor();
        feed(&mut editor, b"hello world");
        // ^U kills everything before the cursor.
        let kill = editor.special_char_or(SpecialChar::Kill, 0x15);
        feed(&mut editor, &[kill]);
        assert_eq!(editor.line(), "");
        assert_eq!(editor.cursor, 0);
    }

    #[test]
    fn scenario_split_utf8_across_reads() {
        let mut editor = editor();
        let bytes = "é".as_bytes();
        feed(&mut editor, &bytes[..1]);
        assert_eq!(editor.line(), "", "incomplete sequence is carried");
        feed(&mut editor, &bytes[1..]);
        assert_eq!(editor.line(), "é");
    }

    #[test]
    fn scenario_eof_on_empty_buffer_cancels() {
        let mut editor = editor();
        let veof = editor.special_char_or(SpecialChar::Eof, 0x04);
        feed(&mut editor, &[veof]);
        assert!(editor.finish);
        assert!(matches!(editor.input_error, Some(Error::Canceled)));
    }

    #[test]
    fn scenario_eof_on_nonempty_buffer_deletes_forward() {
        let mut editor = editor();
        feed(&mut editor, b"ab\x1b[D");
        let veof = editor.special_char_or(SpecialChar::Eof, 0x04);
        feed(&mut editor, &[veof]);
        // ^D with content is erase-character-forwards.
        assert_eq!(editor.line(), "a");
        assert!(!editor.finish);
    }

    #[test]
    fn scenario_history_navigation_with_arrows() {
        let mut editor = editor();
        editor.add_to_history("first");
        editor.add_to_history("second");
        editor.history_cursor = editor.history.len();
        feed(&mut editor, b"\x1b[A");
        assert_eq!(editor.line(), "second");
    }

    #[test]
    fn reset_clears_session_state() {
        let mut editor = Editor::new();
        editor.set_line("junk");
        editor.reset();
        // The buffer survives reset (set_line owns it), but cursors and
        // errors are back to the session defaults.
        assert_eq!(editor.cursor, 0);
        assert!(editor.input_error.is_none());
        assert!(editor.refresh_needed);
    }

    #[test]
    fn finish_inside_interrupt_handler_only_requests() {
        let mut editor = Editor::new();
        editor.in_interrupt_handler = true;
        editor.finish();
        assert!(editor.interrupt_handler_requested_finish);
        assert!(editor.finish);
    }

    #[test]
    fn keybinding_consumes_key() {
        let mut editor = editor();
        editor.register_keybinding(&[Key::new('q')], |_, _| false);
        feed(&mut editor, b"aqb");
        assert_eq!(editor.line(), "ab");
    }

    #[test]
    fn keybinding_can_decline_to_consume() {
        let mut editor = editor();
        editor.register_keybinding(&[Key::new('q')], |_, _| true);
        feed(&mut editor, b"q");
        assert_eq!(editor.line(), "q");
    }

    #[test]
    fn partial_binding_match_replays_prefix() {
        let mut editor = editor();
        editor.register_keybinding(&[Key::new('g'), Key::new('g')], |_, _| false);
        feed(&mut editor, b"gx");
        assert_eq!(editor.line(), "gx");
    }
}
