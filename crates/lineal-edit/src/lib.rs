//! # lineal-edit — a readline-style interactive line editor
//!
//! Reads a single logical input line from the controlling terminal while
//! offering live re-stylization, multi-line editing, reverse incremental
//! search, a tab-completion protocol, history, input masking, bracketed
//! paste, and configurable key bindings. Intended to be embedded by
//! interactive programs (shells, REPLs) that need richer editing than a
//! cooked TTY provides.
//!
//! The pieces:
//!
//! - **[`metrics`]** — rendered-width model of prompt and buffer text
//! - **[`style`]** / **[`mask`]** — span styling and input masking
//! - **[`key`]** / [`keymap`](crate::Editor::register_keybinding) — the
//!   key-binding trie
//! - **[`suggest`]** — the tab-completion protocol and state machine
//! - **[`Editor`]** — the engine: input decoding, refresh, history,
//!   search, the `get_line` loop
//!
//! ```no_run
//! use lineal_edit::Editor;
//!
//! let mut editor = Editor::new();
//! editor.add_to_history("previous command");
//! let line = editor.get_line("> ")?;
//! println!("got: {line}");
//! # Ok::<(), lineal_edit::Error>(())
//! ```

mod decode;
mod editor;
mod error;
mod history;
pub mod key;
mod keymap;
pub mod mask;
pub mod metrics;
mod ops;
mod pager;
mod refresh;
mod search;
mod span;
pub mod style;
pub mod suggest;

pub use editor::{
    Editor, InterruptHandler, PasteHandler, RefreshHandler, Span, SpanMode, TabCompletionHandler,
};
pub use error::{Error, Result};
pub use history::HistoryEntry;
pub use key::{ctrl, Key, Modifiers};
pub use mask::{Mask, MaskMode};
pub use metrics::{LineMetrics, MaskedChar, StringMetrics};
pub use style::{Color, Style, XtermColor};
pub use suggest::Completion;

pub use lineal_term::terminal::Size;
