//! Tab-completion suggestions — the completion list and the attempt
//! state machine.
//!
//! The manager owns the current completion list, precomputes the largest
//! common prefix across entries, and answers
//! [`attempt_completion`](SuggestionManager::attempt_completion) with a
//! delta the editor applies to its buffer: what to remove, what to
//! insert, where the cursor lands, and which mode the tab state machine
//! moves to.
//!
//! Offsets, briefly: a suggestion's `invariant_offset` is how many of its
//! leading code points are already in the buffer (and therefore invariant
//! under completion); `static_offset` is non-matching context captured
//! from the buffer that must be preserved across successive tab presses.

use crate::style::Style;

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// One completion candidate, as produced by the embedder's handler.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// The full suggestion text.
    pub text: String,
    /// Inserted after the suggestion when it is committed (a space, a
    /// path separator).
    pub trailing_trivia: String,
    /// Shown only in the suggestion pager (type hints, annotations).
    pub display_trivia: String,
    /// Applied over the committed suggestion.
    pub style: Style,
    /// Buffer offset where the suggestion text begins; maintained by the
    /// manager.
    pub start_index: usize,
    /// Context code points preceding the completion point that are
    /// removed and re-inserted on each cycle.
    pub static_offset: usize,
    /// Leading code points of the suggestion already present in the
    /// buffer.
    pub invariant_offset: usize,
    /// Whether the first tab may commit this entry without showing the
    /// pager.
    pub allow_commit_without_listing: bool,

    pub(crate) text_view: Vec<char>,
    pub(crate) trailing_trivia_view: Vec<char>,
    pub(crate) display_trivia_view: Vec<char>,
}

impl Completion {
    /// A plain completion with just text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt results
// ---------------------------------------------------------------------------

/// Where the tab-press state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum CompletionMode {
    #[default]
    DontComplete,
    /// First tab: insert the common prefix (peek only).
    CompletePrefix,
    /// Second tab: show the pager.
    ShowSuggestions,
    /// Third and later tabs: cycle through entries.
    CycleSuggestions,
}

/// The buffer delta produced by one completion attempt.
#[derive(Debug, Default)]
pub(crate) struct CompletionAttemptResult {
    pub new_completion_mode: CompletionMode,
    /// Relative cursor adjustment applied before removals.
    pub new_cursor_offset: isize,
    /// Half-open code-point range to remove at the adjusted cursor.
    pub offset_start_to_remove: usize,
    pub offset_end_to_remove: usize,
    /// How many code points left of the cursor to capture as remembered
    /// static data.
    pub static_offset_from_cursor: usize,
    pub insert: Vec<char>,
    pub style_to_apply: Option<Style>,
    /// A single suggestion that forbade committing without listing.
    pub avoid_committing_to_single_suggestion: bool,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the current completion list and selection state.
#[derive(Default)]
pub(crate) struct SuggestionManager {
    suggestions: Vec<Completion>,
    last_shown_suggestion: Completion,
    last_shown_suggestion_display_length: usize,
    last_shown_suggestion_was_complete: bool,
    next_suggestion_index: usize,
    largest_common_suggestion_prefix_length: usize,
    last_displayed_suggestion_index: usize,
}

impl SuggestionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new completion list and precompute the code-point views
    /// and the largest common prefix.
    pub fn set_suggestions(&mut self, mut suggestions: Vec<Completion>) {
        for suggestion in &mut suggestions {
            suggestion.text_view = suggestion.text.chars().collect();
            suggestion.trailing_trivia_view = suggestion.trailing_trivia.chars().collect();
            suggestion.display_trivia_view = suggestion.display_trivia.chars().collect();
        }

        self.largest_common_suggestion_prefix_length = match suggestions.len() {
            0 => 0,
            1 => suggestions[0].text_view.len(),
            _ => {
                let first = &suggestions[0].text_view;
                let mut prefix = 0;
                'scan: while prefix < first.len() {
                    let candidate = first[prefix];
                    for suggestion in &suggestions {
                        if suggestion.text_view.len() <= prefix
                            || suggestion.text_view[prefix] != candidate
                        {
                            break 'scan;
                        }
                    }
                    prefix += 1;
                }
                prefix
            }
        };
        self.suggestions = suggestions;
    }

    pub fn count(&self) -> usize {
        self.suggestions.len()
    }

    pub fn suggestions(&self) -> &[Completion] {
        &self.suggestions
    }

    pub fn next_index(&self) -> usize {
        self.next_suggestion_index
    }

    pub fn start_index(&self) -> usize {
        self.last_displayed_suggestion_index
    }

    pub fn set_start_index(&mut self, index: usize) {
        self.last_displayed_suggestion_index = index;
    }

    #[cfg(test)]
    pub fn common_prefix_length(&self) -> usize {
        self.largest_common_suggestion_prefix_length
    }

    /// Advance the selection, wrapping around.
    pub fn next(&mut self) {
        if self.suggestions.is_empty() {
            self.next_suggestion_index = 0;
        } else {
            self.next_suggestion_index = (self.next_suggestion_index + 1) % self.suggestions.len();
        }
    }

    /// Retreat the selection, wrapping around.
    pub fn previous(&mut self) {
        if self.suggestions.is_empty() {
            self.next_suggestion_index = 0;
            return;
        }
        if self.next_suggestion_index == 0 {
            self.next_suggestion_index = self.suggestions.len();
        }
        self.next_suggestion_index -= 1;
    }

    /// Select the current entry as the shown suggestion.
    fn suggest(&mut self) -> Completion {
        self.last_shown_suggestion = self.suggestions[self.next_suggestion_index].clone();
        self.last_shown_suggestion.clone()
    }

    pub fn current_suggestion(&self) -> &Completion {
        &self.last_shown_suggestion
    }

    pub fn is_current_suggestion_complete(&self) -> bool {
        self.last_shown_suggestion_was_complete
    }

    /// Anchor the shown suggestion's `start_index` relative to where the
    /// completion was initiated.
    fn set_current_suggestion_initiation_index(&mut self, index: usize) {
        let suggestion = &self.suggestions[self.next_suggestion_index];
        let backoff = if self.last_shown_suggestion_display_length > 0 {
            suggestion.static_offset + self.last_shown_suggestion_display_length
        } else {
            suggestion.static_offset + suggestion.invariant_offset
        };
        self.last_shown_suggestion.start_index = index.saturating_sub(backoff);
        self.last_shown_suggestion_display_length = self.last_shown_suggestion.text_view.len();
        self.last_shown_suggestion_was_complete = false;
    }

    /// Compute the buffer delta for one tab press.
    pub fn attempt_completion(
        &mut self,
        mode: CompletionMode,
        initiation_start_index: usize,
    ) -> CompletionAttemptResult {
        let mut result = CompletionAttemptResult {
            new_completion_mode: mode,
            ..CompletionAttemptResult::default()
        };

        if self.next_suggestion_index >= self.suggestions.len() {
            self.next_suggestion_index = 0;
            return result;
        }

        let next = &self.suggestions[self.next_suggestion_index];
        if mode == CompletionMode::CompletePrefix && !next.allow_commit_without_listing {
            result.new_completion_mode = CompletionMode::ShowSuggestions;
            result.avoid_committing_to_single_suggestion = true;
            self.last_shown_suggestion_display_length = 0;
            self.last_shown_suggestion_was_complete = false;
            self.last_shown_suggestion = Completion::default();
            return result;
        }

        let invariant = next.invariant_offset;
        let static_offset = next.static_offset;
        let allow_commit = next.allow_commit_without_listing;
        let prefix = self.largest_common_suggestion_prefix_length;
        let can_complete = invariant <= prefix;

        #[allow(clippy::cast_possible_wrap)]
        let mut shown_length = self.last_shown_suggestion_display_length as isize;
        #[allow(clippy::cast_possible_wrap)]
        let actual_offset: isize = match mode {
            CompletionMode::CompletePrefix => 0,
            CompletionMode::ShowSuggestions => {
                if can_complete && allow_commit {
                    shown_length = (prefix + self.last_shown_suggestion.trailing_trivia_view.len())
                        as isize;
                }
                invariant as isize - prefix as isize
            }
            _ => {
                if self.last_shown_suggestion_display_length == 0 {
                    0
                } else {
                    invariant as isize - self.last_shown_suggestion_display_length as isize
                }
            }
        };

        let suggestion = self.suggest();
        self.set_current_suggestion_initiation_index(initiation_start_index);

        result.offset_start_to_remove = invariant;
        #[allow(clippy::cast_sign_loss)]
        {
            result.offset_end_to_remove = shown_length.max(0) as usize;
        }
        result.new_cursor_offset = actual_offset;
        result.static_offset_from_cursor = static_offset;

        if mode == CompletionMode::CompletePrefix {
            if can_complete {
                result
                    .insert
                    .extend_from_slice(&suggestion.text_view[invariant..prefix]);
                self.last_shown_suggestion_display_length = prefix;
                // The first tab is only a peek; the selection does not
                // advance. With exactly one entry, commit and forget.
                if self.suggestions.len() == 1 {
                    result.new_completion_mode = CompletionMode::DontComplete;
                    result
                        .insert
                        .extend_from_slice(&self.last_shown_suggestion.trailing_trivia_view);
                    self.last_shown_suggestion_display_length = 0;
                    if !suggestion.style.is_empty() {
                        result.style_to_apply = Some(suggestion.style.clone());
                    }
                    self.last_shown_suggestion_was_complete = true;
                    return result;
                }
            } else {
                self.last_shown_suggestion_display_length = 0;
            }
            result.new_completion_mode = CompletionMode::ShowSuggestions;
            self.last_shown_suggestion_was_complete = false;
            self.last_shown_suggestion = Completion::default();
        } else {
            result
                .insert
                .extend_from_slice(&suggestion.text_view[invariant.min(suggestion.text_view.len())..]);
            result
                .insert
                .extend_from_slice(&self.last_shown_suggestion.trailing_trivia_view);
            self.last_shown_suggestion_display_length += suggestion.trailing_trivia_view.len();
        }

        result
    }

    /// Forget the list and all selection state.
    pub fn reset(&mut self) {
        self.last_shown_suggestion = Completion::default();
        self.last_shown_suggestion_display_length = 0;
        self.suggestions.clear();
        self.last_displayed_suggestion_index = 0;
        self.next_suggestion_index = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> Completion {
        Completion::new(text)
    }

    fn manager_with(texts: &[&str]) -> SuggestionManager {
        let mut manager = SuggestionManager::new();
        manager.set_suggestions(texts.iter().map(|t| completion(t)).collect());
        manager
    }

    // -- Common prefix ---------------------------------------------------

    #[test]
    fn empty_list_has_zero_prefix() {
        assert_eq!(manager_with(&[]).common_prefix_length(), 0);
    }

    #[test]
    fn single_entry_prefix_is_full_length() {
        assert_eq!(manager_with(&["exit"]).common_prefix_length(), 4);
    }

    #[test]
    fn common_prefix_across_entries() {
        assert_eq!(
            manager_with(&["insert", "inspect", "install"]).common_prefix_length(),
            3
        );
    }

    #[test]
    fn disjoint_entries_have_zero_prefix() {
        assert_eq!(manager_with(&["abc", "xyz"]).common_prefix_length(), 0);
    }

    #[test]
    fn prefix_is_code_point_wise() {
        assert_eq!(manager_with(&["héllo", "hémmo"]).common_prefix_length(), 2);
    }

    // -- Selection cycling -----------------------------------------------

    #[test]
    fn next_wraps_around() {
        let mut manager = manager_with(&["a", "b", "c"]);
        manager.next();
        manager.next();
        manager.next();
        assert_eq!(manager.next_index(), 0);
    }

    #[test]
    fn previous_wraps_around() {
        let mut manager = manager_with(&["a", "b", "c"]);
        manager.previous();
        assert_eq!(manager.next_index(), 2);
    }

    #[test]
    fn cycling_empty_list_is_safe() {
        let mut manager = manager_with(&[]);
        manager.next();
        manager.previous();
        assert_eq!(manager.next_index(), 0);
    }

    // -- attempt_completion: complete-prefix -----------------------------

    #[test]
    fn first_tab_inserts_common_prefix_slice() {
        let mut manager = SuggestionManager::new();
        let mut a = completion("install");
        a.invariant_offset = 3;
        a.allow_commit_without_listing = true;
        let mut b = completion("inspect");
        b.invariant_offset = 3;
        b.allow_commit_without_listing = true;
        manager.set_suggestions(vec![a, b]);
        // Common prefix "ins" (3); invariant 3 -> nothing new to insert.
        let result = manager.attempt_completion(CompletionMode::CompletePrefix, 3);
        assert!(result.insert.is_empty());
        assert_eq!(result.new_completion_mode, CompletionMode::ShowSuggestions);
    }

    #[test]
    fn first_tab_extends_to_common_prefix() {
        let mut manager = SuggestionManager::new();
        let mut a = completion("install");
        a.invariant_offset = 1;
        a.allow_commit_without_listing = true;
        let mut b = completion("inspect");
        b.invariant_offset = 1;
        b.allow_commit_without_listing = true;
        manager.set_suggestions(vec![a, b]);
        let result = manager.attempt_completion(CompletionMode::CompletePrefix, 1);
        let inserted: String = result.insert.iter().collect();
        assert_eq!(inserted, "ns");
    }

    #[test]
    fn single_suggestion_commits_and_resets() {
        let mut manager = SuggestionManager::new();
        let mut c = completion("exit");
        c.invariant_offset = 3;
        c.allow_commit_without_listing = true;
        c.trailing_trivia = " ".into();
        manager.set_suggestions(vec![c]);
        let result = manager.attempt_completion(CompletionMode::CompletePrefix, 3);
        let inserted: String = result.insert.iter().collect();
        assert_eq!(inserted, "t ");
        assert_eq!(result.new_completion_mode, CompletionMode::DontComplete);
        assert!(manager.is_current_suggestion_complete());
    }

    #[test]
    fn commit_refused_without_listing_forces_pager() {
        let mut manager = SuggestionManager::new();
        let c = completion("lol no actual completions");
        manager.set_suggestions(vec![c]);
        let result = manager.attempt_completion(CompletionMode::CompletePrefix, 0);
        assert!(result.insert.is_empty());
        assert!(result.avoid_committing_to_single_suggestion);
        assert_eq!(result.new_completion_mode, CompletionMode::ShowSuggestions);
    }

    // -- attempt_completion: show / cycle --------------------------------

    #[test]
    fn show_suggestions_backs_cursor_to_invariant_point() {
        let mut manager = SuggestionManager::new();
        let mut a = completion("install");
        a.invariant_offset = 1;
        a.allow_commit_without_listing = true;
        let mut b = completion("inspect");
        b.invariant_offset = 1;
        b.allow_commit_without_listing = true;
        manager.set_suggestions(vec![a, b]);
        let _ = manager.attempt_completion(CompletionMode::CompletePrefix, 1);
        let result = manager.attempt_completion(CompletionMode::ShowSuggestions, 3);
        // invariant(1) - prefix(3) = -2.
        assert_eq!(result.new_cursor_offset, -2);
    }

    #[test]
    fn cycle_inserts_full_suffix_and_trivia() {
        let mut manager = SuggestionManager::new();
        let mut a = completion("alpha");
        a.invariant_offset = 0;
        a.trailing_trivia = " ".into();
        let mut b = completion("beta");
        b.invariant_offset = 0;
        b.trailing_trivia = " ".into();
        manager.set_suggestions(vec![a, b]);
        let result = manager.attempt_completion(CompletionMode::CycleSuggestions, 0);
        let inserted: String = result.insert.iter().collect();
        assert_eq!(inserted, "alpha ");
    }

    #[test]
    fn out_of_range_selection_resets_index() {
        let mut manager = manager_with(&["a"]);
        manager.next_suggestion_index = 5;
        let result = manager.attempt_completion(CompletionMode::CycleSuggestions, 0);
        assert_eq!(manager.next_index(), 0);
        assert!(result.insert.is_empty());
    }

    // -- Reset -----------------------------------------------------------

    #[test]
    fn reset_clears_everything() {
        let mut manager = manager_with(&["a", "b"]);
        manager.next();
        manager.reset();
        assert_eq!(manager.count(), 0);
        assert_eq!(manager.next_index(), 0);
        assert!(!manager.is_current_suggestion_complete());
    }
}
