//! Styles — colors, attributes, hyperlinks, and their SGR encoding.
//!
//! A [`Style`] describes how a span of the buffer is painted: foreground
//! and background color (8-color xterm palette or 24-bit RGB), the three
//! boolean attributes, an optional OSC-8 hyperlink, and an optional
//! [`Mask`](crate::mask::Mask) that replaces the covered glyphs entirely.
//!
//! Overlapping styles unify field-wise: bold/italic/underline OR together,
//! colors and the hyperlink take the latest value.

use std::io::{self, Write};

use crate::mask::Mask;

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// The classic 8-color xterm palette, plus two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XtermColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    /// Keep whatever color is currently active.
    Unchanged,
    /// The terminal's default color (SGR 39 / 49).
    Default,
}

impl XtermColor {
    /// SGR offset within the palette block (`30+i` foreground, `40+i`
    /// background). `Default` maps to 9 (SGR 39/49).
    const fn index(self) -> u8 {
        match self {
            Self::Black => 0,
            Self::Red => 1,
            Self::Green => 2,
            Self::Yellow => 3,
            Self::Blue => 4,
            Self::Magenta => 5,
            Self::Cyan => 6,
            Self::White => 7,
            Self::Unchanged => 8,
            Self::Default => 9,
        }
    }
}

/// A color value: unset, palette, or truecolor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// No color requested; emits nothing.
    #[default]
    Unset,
    /// 8-color xterm palette entry.
    Xterm(XtermColor),
    /// 24-bit RGB.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Write this color as an SGR sequence.
    ///
    /// `Unset` and `Xterm(Unchanged)` emit nothing. Palette colors use the
    /// compact `30+i` / `40+i` codes; RGB uses `38;2;r;g;b` / `48;2;r;g;b`.
    fn write_vt(self, w: &mut impl Write, foreground: bool) -> io::Result<()> {
        let base: u16 = if foreground { 30 } else { 40 };
        match self {
            Self::Unset | Self::Xterm(XtermColor::Unchanged) => Ok(()),
            Self::Xterm(color) => write!(w, "\x1b[{}m", base + u16::from(color.index())),
            Self::Rgb(r, g, b) => write!(w, "\x1b[{};2;{r};{g};{b}m", base + 8),
        }
    }
}

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

/// A style overlay for a span of buffer code points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Style {
    pub foreground: Color,
    pub background: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// OSC-8 hyperlink target; empty means no link.
    pub hyperlink: String,
    /// Replace the covered glyphs instead of styling them (input masking).
    pub mask: Option<Mask>,
}

impl Style {
    /// The reset style: default foreground/background, all attributes off,
    /// hyperlink closed.
    #[must_use]
    pub fn reset() -> Self {
        Self {
            foreground: Color::Xterm(XtermColor::Default),
            background: Color::Xterm(XtermColor::Default),
            ..Self::default()
        }
    }

    /// A style that only sets the foreground color.
    #[must_use]
    pub fn foreground(color: Color) -> Self {
        Self {
            foreground: color,
            ..Self::default()
        }
    }

    /// True when the style requests nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.foreground == Color::Unset
            && self.background == Color::Unset
            && !self.bold
            && !self.italic
            && !self.underline
            && self.hyperlink.is_empty()
            && self.mask.is_none()
    }

    /// Merge `other` into `self`: booleans OR, colors and hyperlink take
    /// the latest value.
    pub fn unify_with(&mut self, other: &Style) {
        self.foreground = other.foreground;
        self.background = other.background;
        self.bold = self.bold || other.bold;
        self.italic = self.italic || other.italic;
        self.underline = self.underline || other.underline;
        self.hyperlink.clone_from(&other.hyperlink);
    }
}

// ---------------------------------------------------------------------------
// SGR emission
// ---------------------------------------------------------------------------

/// Write a style transition.
///
/// A starting style emits the attribute triplet (`1`/`22` bold, `4`/`24`
/// underline, `3`/`23` italic) in a single SGR, then colors, then the
/// hyperlink open. An ending style emits only the hyperlink close — colors
/// and attributes are re-established by whatever style still applies.
pub fn apply_style(w: &mut impl Write, style: &Style, starting: bool) -> io::Result<()> {
    if starting {
        let b = if style.bold { 1 } else { 22 };
        let u = if style.underline { 4 } else { 24 };
        let i = if style.italic { 3 } else { 23 };
        write!(w, "\x1b[{b};{u};{i}m")?;
        style.foreground.write_vt(w, true)?;
        style.background.write_vt(w, false)?;
        write!(w, "\x1b]8;;{}\x1b\\", style.hyperlink)
    } else {
        w.write_all(b"\x1b]8;;\x1b\\")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{Mask, MaskMode};

    fn emit(style: &Style, starting: bool) -> String {
        let mut buf = Vec::new();
        apply_style(&mut buf, style, starting).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn color_vt(color: Color, foreground: bool) -> String {
        let mut buf = Vec::new();
        color.write_vt(&mut buf, foreground).unwrap();
        String::from_utf8(buf).unwrap()
    }

    // -- Colors ----------------------------------------------------------

    #[test]
    fn unset_color_emits_nothing() {
        assert_eq!(color_vt(Color::Unset, true), "");
    }

    #[test]
    fn unchanged_color_emits_nothing() {
        assert_eq!(color_vt(Color::Xterm(XtermColor::Unchanged), true), "");
    }

    #[test]
    fn palette_foreground() {
        assert_eq!(color_vt(Color::Xterm(XtermColor::Red), true), "\x1b[31m");
        assert_eq!(color_vt(Color::Xterm(XtermColor::Blue), true), "\x1b[34m");
    }

    #[test]
    fn palette_background() {
        assert_eq!(color_vt(Color::Xterm(XtermColor::Green), false), "\x1b[42m");
    }

    #[test]
    fn default_color_codes() {
        assert_eq!(color_vt(Color::Xterm(XtermColor::Default), true), "\x1b[39m");
        assert_eq!(
            color_vt(Color::Xterm(XtermColor::Default), false),
            "\x1b[49m"
        );
    }

    #[test]
    fn rgb_foreground() {
        assert_eq!(
            color_vt(Color::Rgb(255, 128, 0), true),
            "\x1b[38;2;255;128;0m"
        );
    }

    #[test]
    fn rgb_background() {
        assert_eq!(
            color_vt(Color::Rgb(0, 100, 200), false),
            "\x1b[48;2;0;100;200m"
        );
    }

    // -- Style predicates ------------------------------------------------

    #[test]
    fn default_style_is_empty() {
        assert!(Style::default().is_empty());
    }

    #[test]
    fn reset_style_is_not_empty() {
        assert!(!Style::reset().is_empty());
    }

    #[test]
    fn bold_makes_style_non_empty() {
        let style = Style {
            bold: true,
            ..Style::default()
        };
        assert!(!style.is_empty());
    }

    #[test]
    fn mask_makes_style_non_empty() {
        let style = Style {
            mask: Some(Mask::new("*", MaskMode::ReplaceEachCodePoint)),
            ..Style::default()
        };
        assert!(!style.is_empty());
    }

    // -- Unification -----------------------------------------------------

    #[test]
    fn unify_ors_attributes() {
        let mut a = Style {
            bold: true,
            ..Style::default()
        };
        let b = Style {
            italic: true,
            ..Style::default()
        };
        a.unify_with(&b);
        assert!(a.bold);
        assert!(a.italic);
    }

    #[test]
    fn unify_takes_latest_colors() {
        let mut a = Style::foreground(Color::Xterm(XtermColor::Red));
        let b = Style::foreground(Color::Xterm(XtermColor::Blue));
        a.unify_with(&b);
        assert_eq!(a.foreground, Color::Xterm(XtermColor::Blue));
    }

    #[test]
    fn unify_takes_latest_hyperlink() {
        let mut a = Style {
            hyperlink: "https://old".into(),
            ..Style::default()
        };
        let b = Style {
            hyperlink: "https://new".into(),
            ..Style::default()
        };
        a.unify_with(&b);
        assert_eq!(a.hyperlink, "https://new");
    }

    // -- SGR emission ----------------------------------------------------

    #[test]
    fn starting_plain_style_resets_attributes() {
        let s = emit(&Style::default(), true);
        assert!(s.starts_with("\x1b[22;24;23m"));
    }

    #[test]
    fn starting_bold_underline_italic() {
        let style = Style {
            bold: true,
            underline: true,
            italic: true,
            ..Style::default()
        };
        assert!(emit(&style, true).starts_with("\x1b[1;4;3m"));
    }

    #[test]
    fn starting_style_includes_colors() {
        let style = Style {
            foreground: Color::Xterm(XtermColor::Blue),
            ..Style::default()
        };
        assert!(emit(&style, true).contains("\x1b[34m"));
    }

    #[test]
    fn starting_style_opens_hyperlink() {
        let style = Style {
            hyperlink: "https://example.com".into(),
            ..Style::default()
        };
        assert!(emit(&style, true).ends_with("\x1b]8;;https://example.com\x1b\\"));
    }

    #[test]
    fn ending_style_only_closes_hyperlink() {
        let style = Style {
            bold: true,
            foreground: Color::Xterm(XtermColor::Red),
            hyperlink: "https://example.com".into(),
            ..Style::default()
        };
        assert_eq!(emit(&style, false), "\x1b]8;;\x1b\\");
    }
}
