//! String metrics — the rendered-width model of prompt and buffer text.
//!
//! [`measure`] walks a string by code point while running a small VT
//! tokenizer, so escape sequences contribute zero width. Each displayable
//! code point is one column. Control characters render in caret notation
//! (`^A`, width 2; `\x9b`-style hex for high forms, width 4) and masked
//! regions render as their replacement — both are recorded as
//! [`MaskedChar`] adjustments over the original code-point count, so the
//! same metrics answer "how many code points" and "how many columns".
//!
//! [`StringMetrics::lines_with_addition`] and
//! [`StringMetrics::offset_with_addition`] compose two measured strings as
//! if concatenated (prompt + buffer) and answer how many terminal rows
//! they wrap to and which column the end lands in. These are the only
//! primitives the refresh algorithm consults for geometry.

use crate::mask::{Mask, MaskMode, MaskSet};

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// A run of original code points whose rendered width differs from their
/// count (caret-notation control characters, masked regions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskedChar {
    /// Code-point position within the measured string.
    pub position: usize,
    /// How many original code points the run covers.
    pub original_length: usize,
    /// How many columns the run renders as.
    pub masked_length: usize,
}

/// Metrics for one logical line (between `\n`s).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMetrics {
    pub masked_chars: Vec<MaskedChar>,
    /// Original code-point count of the line.
    pub length: usize,
}

impl LineMetrics {
    /// Rendered width of the line, counting masked adjustments at
    /// positions `<= upto` (all of them when `upto` is `None`).
    #[must_use]
    pub fn total_length(&self, upto: Option<usize>) -> usize {
        let mut length = self.length;
        for masked in &self.masked_chars {
            if upto.is_none_or(|limit| masked.position <= limit) {
                length -= masked.original_length;
                length += masked.masked_length;
            }
        }
        length
    }
}

/// Metrics for a whole string, one [`LineMetrics`] per logical line.
///
/// Invariant: `line_metrics` always contains at least one (possibly
/// empty) element; a trailing implicit newline is never present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMetrics {
    pub line_metrics: Vec<LineMetrics>,
    /// Total rendered width across all lines.
    pub total_length: usize,
    /// Rendered width of the widest line.
    pub max_line_length: usize,
}

impl Default for StringMetrics {
    fn default() -> Self {
        Self {
            line_metrics: vec![LineMetrics::default()],
            total_length: 0,
            max_line_length: 0,
        }
    }
}

impl StringMetrics {
    /// Reset to the metrics of an empty string.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Terminal rows consumed by this string followed immediately by
    /// `offset` (prompt followed by buffer), wrapped at `column_width`.
    #[must_use]
    pub fn lines_with_addition(&self, offset: &StringMetrics, column_width: usize) -> usize {
        let width = column_width.max(1);
        let mut lines = 0;

        for line in &self.line_metrics[..self.line_metrics.len() - 1] {
            lines += (line.total_length(None) + width) / width;
        }

        let mut joined = self.line_metrics[self.line_metrics.len() - 1].total_length(None);
        joined += offset.line_metrics[0].total_length(None);
        lines += (joined + width) / width;

        for line in &offset.line_metrics[1..] {
            lines += (line.total_length(None) + width) / width;
        }

        lines
    }

    /// Column of the cursor within the final wrapped row when this string
    /// is followed immediately by `offset`.
    #[must_use]
    pub fn offset_with_addition(&self, offset: &StringMetrics, column_width: usize) -> usize {
        let width = column_width.max(1);
        if offset.line_metrics.len() > 1 {
            return offset.line_metrics[offset.line_metrics.len() - 1].total_length(None) % width;
        }

        let mut joined = self.line_metrics[self.line_metrics.len() - 1].total_length(None);
        joined += offset.line_metrics[0].total_length(None);
        joined % width
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// VT tokenizer state. Escape sequences contribute zero width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VtState {
    Free,
    Escape,
    Bracket,
    BracketArgsSemi,
    Title,
}

/// Caret-notation width of a control character: `^X` for the low forms,
/// `\xHH` for DEL and friends.
fn control_width(c: char) -> usize {
    if (c as u32) > 64 {
        4
    } else {
        2
    }
}

fn is_control(c: char) -> bool {
    c == '\x7f' || (c as u32) < 0x20
}

/// Rendered width of a replacement string, run through the same
/// tokenizer so escapes in a replacement stay width-zero.
fn rendered_width(chars: &[char]) -> usize {
    let mut width = 0;
    let mut state = VtState::Free;
    for (i, &c) in chars.iter().enumerate() {
        let next = chars.get(i + 1).copied().unwrap_or('\0');
        state = match state {
            VtState::Free => {
                if c == '\x1b' {
                    VtState::Escape
                } else if c == '\r' || c == '\n' {
                    state
                } else {
                    width += if is_control(c) { control_width(c) } else { 1 };
                    state
                }
            }
            other => tokenize_escape(other, c, next),
        };
    }
    width
}

/// Advance the tokenizer through the escape states.
fn tokenize_escape(state: VtState, c: char, next: char) -> VtState {
    match state {
        VtState::Escape => {
            if c == ']' {
                if next == '0' {
                    VtState::Title
                } else {
                    state
                }
            } else if c == '[' {
                VtState::Bracket
            } else {
                state
            }
        }
        VtState::Bracket => {
            if c.is_ascii_digit() {
                VtState::BracketArgsSemi
            } else {
                state
            }
        }
        VtState::BracketArgsSemi => {
            if c == ';' {
                VtState::Bracket
            } else if c.is_ascii_digit() {
                state
            } else {
                VtState::Free
            }
        }
        VtState::Title => {
            if c == '\x07' {
                VtState::Free
            } else {
                state
            }
        }
        VtState::Free => unreachable!("free state handled by the caller"),
    }
}

/// Measure the rendered metrics of `line` under `masks`.
#[must_use]
pub fn measure(line: &str, masks: &MaskSet) -> StringMetrics {
    let runes: Vec<char> = line.chars().collect();
    let mut metrics = StringMetrics {
        line_metrics: Vec::new(),
        total_length: 0,
        max_line_length: 0,
    };
    let mut current = LineMetrics::default();
    let mut state = VtState::Free;

    let mut i = 0;
    while i < runes.len() {
        // A replace-entire-selection mask collapses its whole region into
        // the replacement's width, once.
        if let Some(active) = masks.active_at(i) {
            if active.mask.mode() == MaskMode::ReplaceEntireSelection {
                let region_end = active.end.unwrap_or(runes.len()).min(runes.len());
                let masked = rendered_width(active.mask.replacement_view());
                current.masked_chars.push(MaskedChar {
                    position: i,
                    original_length: region_end - i,
                    masked_length: masked,
                });
                current.length += region_end - i;
                i = region_end;
                continue;
            }
        }

        let c = runes[i];
        let next = runes.get(i + 1).copied().unwrap_or('\0');
        let mask = masks
            .active_at(i)
            .map(|active| active.mask)
            .filter(|mask| mask.mode() == MaskMode::ReplaceEachCodePoint);

        state = match state {
            VtState::Free => {
                if c == '\x1b' {
                    VtState::Escape
                } else if c == '\r' {
                    current = LineMetrics::default();
                    state
                } else if c == '\n' {
                    metrics.line_metrics.push(std::mem::take(&mut current));
                    state
                } else {
                    free_step(&mut current, i, c, mask);
                    state
                }
            }
            other => tokenize_escape(other, c, next),
        };
        i += 1;
    }

    metrics.line_metrics.push(current);
    for line in &metrics.line_metrics {
        let rendered = line.total_length(None);
        metrics.total_length += rendered;
        metrics.max_line_length = metrics.max_line_length.max(rendered);
    }
    metrics
}

/// One displayable code point in the free state.
fn free_step(current: &mut LineMetrics, index: usize, c: char, mask: Option<&Mask>) {
    if let Some(mask) = mask {
        current.masked_chars.push(MaskedChar {
            position: index,
            original_length: 1,
            masked_length: rendered_width(mask.replacement_view()),
        });
    } else if is_control(c) {
        current.masked_chars.push(MaskedChar {
            position: index,
            original_length: 1,
            masked_length: control_width(c),
        });
    }
    current.length += 1;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
