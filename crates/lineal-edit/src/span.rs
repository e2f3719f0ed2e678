//! Span bookkeeping — styled code-point ranges over the buffer.
//!
//! Spans are stored as two mirrored maps keyed by code-point offset:
//! `starting[start][end] = style` and `ending[end][start] = style`. Every
//! range present in one map is present in the other. The refresh
//! algorithm walks the buffer position by position, closing styles from
//! `ending`, re-establishing whatever still applies, and opening styles
//! from `starting`.
//!
//! A snapshot of the spans last painted (`drawn`) is compared against the
//! current spans to decide whether an incremental tail redraw is safe.

use std::collections::BTreeMap;

use crate::style::Style;

/// The mirrored start/end span maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Spans {
    /// `starting[start][end] = style`
    pub starting: BTreeMap<usize, BTreeMap<usize, Style>>,
    /// `ending[end][start] = style`
    pub ending: BTreeMap<usize, BTreeMap<usize, Style>>,
}

impl Spans {
    /// Record `style` over `[start, end)` in both maps.
    ///
    /// Returns `true` when this range was not present before (the display
    /// needs a refresh).
    pub fn insert(&mut self, start: usize, end: usize, style: Style) -> bool {
        let mut fresh = false;
        let starting = self.starting.entry(start).or_default();
        if !starting.contains_key(&end) {
            fresh = true;
        }
        starting.insert(end, style.clone());

        let ending = self.ending.entry(end).or_default();
        if !ending.contains_key(&start) {
            fresh = true;
        }
        ending.insert(start, style);
        fresh
    }

    pub fn clear(&mut self) {
        self.starting.clear();
        self.ending.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starting.is_empty() && self.ending.is_empty()
    }

    /// The style that applies at `offset`: the unification of every span
    /// with `start <= offset < end`, over the reset style.
    #[must_use]
    pub fn find_applicable_style(&self, offset: usize) -> Style {
        let mut style = Style::reset();
        for (&start, ends) in &self.starting {
            if start > offset {
                break;
            }
            for (&end, span_style) in ends {
                if end > offset {
                    style.unify_with(span_style);
                }
            }
        }
        style
    }

    /// Whether this (drawn) snapshot already covers `other` (the current
    /// spans) up to `offset`.
    ///
    /// The relation tolerates a current span that is longer than the drawn
    /// one as long as it still covers the offset with the same style —
    /// extending a span past the drawn region does not invalidate what is
    /// already on screen.
    #[must_use]
    pub fn contains_up_to_offset(&self, other: &Spans, offset: usize) -> bool {
        for (&start, current_ends) in &other.starting {
            if start > offset + 1 {
                continue;
            }
            let Some(drawn_ends) = self.starting.get(&start) else {
                return false;
            };
            for (&drawn_end, drawn_style) in drawn_ends {
                if let Some(current_style) = current_ends.get(&drawn_end) {
                    if current_style != drawn_style {
                        return false;
                    }
                } else {
                    // Might be the same style with a longer span.
                    let found = current_ends.iter().any(|(&end, style)| {
                        end > drawn_end && end > offset && style == drawn_style
                    });
                    if !found {
                        return false;
                    }
                }
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Color, Style, XtermColor};

    fn blue() -> Style {
        Style::foreground(Color::Xterm(XtermColor::Blue))
    }

    fn red() -> Style {
        Style::foreground(Color::Xterm(XtermColor::Red))
    }

    // -- Mirror invariant ------------------------------------------------

    #[test]
    fn insert_mirrors_both_maps() {
        let mut spans = Spans::default();
        spans.insert(2, 5, blue());
        assert_eq!(spans.starting[&2][&5], blue());
        assert_eq!(spans.ending[&5][&2], blue());
    }

    #[test]
    fn insert_reports_fresh_ranges() {
        let mut spans = Spans::default();
        assert!(spans.insert(0, 3, blue()));
        assert!(!spans.insert(0, 3, red()), "same range is not fresh");
        assert!(spans.insert(0, 4, red()), "new end is fresh");
    }

    #[test]
    fn clear_empties_both_maps() {
        let mut spans = Spans::default();
        spans.insert(0, 3, blue());
        spans.clear();
        assert!(spans.is_empty());
    }

    // -- Applicable style ------------------------------------------------

    #[test]
    fn applicable_style_inside_span() {
        let mut spans = Spans::default();
        spans.insert(2, 5, blue());
        let style = spans.find_applicable_style(3);
        assert_eq!(style.foreground, Color::Xterm(XtermColor::Blue));
    }

    #[test]
    fn applicable_style_outside_span_is_reset() {
        let mut spans = Spans::default();
        spans.insert(2, 5, blue());
        assert_eq!(
            spans.find_applicable_style(5).foreground,
            Color::Xterm(XtermColor::Default)
        );
        assert_eq!(
            spans.find_applicable_style(1).foreground,
            Color::Xterm(XtermColor::Default)
        );
    }

    #[test]
    fn applicable_style_unifies_overlaps_latest_color_wins() {
        let mut spans = Spans::default();
        spans.insert(0, 10, blue());
        spans.insert(2, 5, red());
        // BTreeMap order: the later-starting red span unifies last.
        assert_eq!(
            spans.find_applicable_style(3).foreground,
            Color::Xterm(XtermColor::Red)
        );
    }

    #[test]
    fn applicable_style_boundary_is_half_open() {
        let mut spans = Spans::default();
        spans.insert(2, 5, blue());
        // start <= offset < end: offset 2 is in, offset 5 is out.
        assert_eq!(
            spans.find_applicable_style(2).foreground,
            Color::Xterm(XtermColor::Blue)
        );
    }

    // -- Drawn-spans comparison ------------------------------------------

    #[test]
    fn identical_spans_contain_each_other() {
        let mut a = Spans::default();
        a.insert(0, 3, blue());
        let b = a.clone();
        assert!(a.contains_up_to_offset(&b, 10));
    }

    #[test]
    fn missing_start_fails_containment() {
        let drawn = Spans::default();
        let mut current = Spans::default();
        current.insert(0, 3, blue());
        assert!(!drawn.contains_up_to_offset(&current, 10));
    }

    #[test]
    fn longer_current_span_past_offset_is_tolerated() {
        let mut drawn = Spans::default();
        drawn.insert(0, 3, blue());
        let mut current = Spans::default();
        current.insert(0, 8, blue());
        // Offset 2: the current span still covers it with the same style.
        assert!(drawn.contains_up_to_offset(&current, 2));
    }

    #[test]
    fn changed_style_fails_containment() {
        let mut drawn = Spans::default();
        drawn.insert(0, 3, blue());
        let mut current = Spans::default();
        current.insert(0, 3, red());
        assert!(!drawn.contains_up_to_offset(&current, 10));
    }

    #[test]
    fn spans_past_offset_are_ignored() {
        let drawn = Spans::default();
        let mut current = Spans::default();
        current.insert(20, 25, blue());
        assert!(drawn.contains_up_to_offset(&current, 2));
    }
}
