//! Key identity for the binding machine.
//!
//! A [`Key`] is a code point plus a modifier mask — exactly what the input
//! decoder can recover from a byte stream. Control characters are their
//! own code points (`ctrl('A')` is `\x01`), so `Ctrl` appears in the mask
//! only for keys the terminal reports with an explicit modifier parameter
//! (arrow-key CSI sequences and friends).

use bitflags::bitflags;

bitflags! {
    /// Keyboard modifier flags, matching the xterm CSI modifier encoding
    /// (`param = 1 + bitmask`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 1;
        const ALT   = 2;
        const CTRL  = 4;
    }
}

/// A single logical key: code point + modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    /// The code point delivered by the decoder.
    pub code: char,
    /// Active modifier keys.
    pub modifiers: Modifiers,
}

impl Key {
    /// A plain key with no modifiers.
    #[must_use]
    pub const fn new(code: char) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
        }
    }

    /// An Alt-modified key (`ESC` prefix on the wire).
    #[must_use]
    pub const fn alt(code: char) -> Self {
        Self {
            code,
            modifiers: Modifiers::ALT,
        }
    }
}

impl From<char> for Key {
    fn from(code: char) -> Self {
        Self::new(code)
    }
}

/// The control-key code point for a letter: `ctrl('A')` is `\x01`.
#[must_use]
pub const fn ctrl(c: char) -> char {
    ((c as u8) & 0x3f) as char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_letters() {
        assert_eq!(ctrl('A'), '\x01');
        assert_eq!(ctrl('C'), '\x03');
        assert_eq!(ctrl('R'), '\x12');
        assert_eq!(ctrl('Z'), '\x1a');
    }

    #[test]
    fn ctrl_is_case_insensitive() {
        assert_eq!(ctrl('a'), ctrl('A'));
    }

    #[test]
    fn plain_key_has_no_modifiers() {
        assert_eq!(Key::new('x').modifiers, Modifiers::empty());
    }

    #[test]
    fn alt_key_carries_alt() {
        assert_eq!(Key::alt('b').modifiers, Modifiers::ALT);
    }

    #[test]
    fn key_equality_includes_modifiers() {
        assert_ne!(Key::new('b'), Key::alt('b'));
        assert_eq!(Key::new('b'), Key::from('b'));
    }

    #[test]
    fn modifier_values_match_wire_encoding() {
        assert_eq!(Modifiers::SHIFT.bits(), 1);
        assert_eq!(Modifiers::ALT.bits(), 2);
        assert_eq!(Modifiers::CTRL.bits(), 4);
    }
}
