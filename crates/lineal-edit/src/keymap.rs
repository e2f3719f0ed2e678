//! The key-binding machine — ordered key sequences mapped to callbacks.
//!
//! Bindings are sequences of [`Key`]s. On each press the machine narrows
//! the set of candidate bindings; when a candidate's full length is
//! reached its callback fires, and when the candidate set empties the
//! captured prefix is replayed as ordinary input so partial matches never
//! swallow typed text.
//!
//! Dispatch is expressed as a returned [`KeyPress`] value rather than an
//! internally-invoked callback: the callback needs `&mut Editor`, and the
//! machine lives inside the editor, so the editor runs the callback after
//! the machine's borrow has ended. A callback's return value is the
//! "should process" verdict — `false` means the key was consumed.

use std::rc::Rc;

use crate::editor::Editor;
use crate::key::{ctrl, Key};

/// A binding callback. Returns `true` when the key should still be
/// processed as ordinary input (i.e. the binding did NOT consume it).
pub type KeybindingCallback = dyn Fn(&mut Editor, &[Key]) -> bool;

struct Binding {
    keys: Vec<Key>,
    callback: Rc<KeybindingCallback>,
}

/// What the editor should do with the key it just fed in.
pub(crate) enum KeyPress {
    /// No binding involves this key: process it normally.
    Unbound,
    /// Mid-sequence: swallow the key for now.
    Pending,
    /// A partial match fell through: insert the captured prefix as
    /// ordinary input, then process the key normally.
    Replay(Vec<Key>),
    /// A full sequence matched: run the callback; its return value is the
    /// should-process verdict.
    Matched {
        keys: Vec<Key>,
        callback: Rc<KeybindingCallback>,
    },
}

/// The binding trie and its in-flight match state.
#[derive(Default)]
pub(crate) struct KeyCallbackMachine {
    bindings: Vec<Binding>,
    current_matching: Vec<usize>,
    sequence_length: usize,
}

impl KeyCallbackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `keys` to `callback`, replacing any binding with the identical
    /// sequence.
    pub fn register(&mut self, keys: Vec<Key>, callback: Rc<KeybindingCallback>) {
        if keys.is_empty() {
            return;
        }
        if let Some(existing) = self.bindings.iter_mut().find(|b| b.keys == keys) {
            existing.callback = callback;
        } else {
            self.bindings.push(Binding { keys, callback });
        }
    }

    /// Advance the match state with `key`.
    pub fn key_pressed(&mut self, key: Key) -> KeyPress {
        if self.sequence_length == 0 {
            self.current_matching = self
                .bindings
                .iter()
                .enumerate()
                .filter(|(_, b)| b.keys[0] == key)
                .map(|(i, _)| i)
                .collect();
            if self.current_matching.is_empty() {
                return KeyPress::Unbound;
            }
        }

        self.sequence_length += 1;
        let old_matching = std::mem::take(&mut self.current_matching);
        self.current_matching = old_matching
            .iter()
            .copied()
            .filter(|&i| {
                let keys = &self.bindings[i].keys;
                keys.len() >= self.sequence_length && keys[self.sequence_length - 1] == key
            })
            .collect();

        if self.current_matching.is_empty() {
            // Replay the keys that were captured while the sequence looked
            // like it might match.
            let prefix = old_matching
                .first()
                .map(|&i| self.bindings[i].keys[..self.sequence_length - 1].to_vec())
                .unwrap_or_default();
            self.sequence_length = 0;
            return KeyPress::Replay(prefix);
        }

        for &i in &self.current_matching {
            if self.bindings[i].keys.len() == self.sequence_length {
                let matched = KeyPress::Matched {
                    keys: self.bindings[i].keys.clone(),
                    callback: Rc::clone(&self.bindings[i].callback),
                };
                self.sequence_length = 0;
                self.current_matching.clear();
                return matched;
            }
        }

        KeyPress::Pending
    }

    /// Reset pending state and look up the Ctrl-C binding, if one is
    /// registered. The caller runs the callback (or treats the interrupt
    /// as should-process when there is none).
    pub fn interrupted(&mut self) -> Option<(Vec<Key>, Rc<KeybindingCallback>)> {
        self.sequence_length = 0;
        self.current_matching.clear();
        let sequence = [Key::new(ctrl('C'))];
        self.bindings
            .iter()
            .find(|b| b.keys == sequence)
            .map(|b| (b.keys.clone(), Rc::clone(&b.callback)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
