//! Input decoder state.
//!
//! The decoder turns a stream of code points into editor actions: plain
//! text, escape-prefixed Alt keys, CSI sequences, verbatim insertion, and
//! bracketed paste. The state machine itself is driven by the editor (it
//! needs to dispatch through the binding trie and mutate the buffer);
//! this module owns the per-editor state — including the CSI parameter
//! and intermediate byte accumulators, which are deliberately instance
//! fields rather than globals.

/// Decoder states. `Paste` accumulates code points until the stop-paste
/// CSI; an escape inside a paste stashes `Paste` in
/// [`Decoder::previous_free_state`] so the decoder can resume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum InputState {
    #[default]
    Free,
    Verbatim,
    Paste,
    GotEscape,
    CsiExpectParameter,
    CsiExpectIntermediate,
    CsiExpectFinal,
}

/// Per-editor decoder state.
#[derive(Debug, Default)]
pub(crate) struct Decoder {
    pub state: InputState,
    /// The free-ish state to return to after a CSI final byte — `Free`
    /// normally, `Paste` when the escape interrupted a paste.
    pub previous_free_state: InputState,
    pub csi_parameter_bytes: Vec<u8>,
    pub csi_intermediate_bytes: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parse semicolon-separated numeric CSI parameters. Unparsable or empty
/// segments become 0, so `ESC [ ; 5 ~` reads as `[0, 5]` and a bare final
/// reads as `[0]`.
pub(crate) fn parse_csi_parameters(bytes: &[u8]) -> Vec<u32> {
    let text: std::borrow::Cow<'_, str> = String::from_utf8_lossy(bytes);
    text.split(';')
        .map(|part| part.parse::<u32>().unwrap_or(0))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_parameters_read_as_single_zero() {
        assert_eq!(parse_csi_parameters(b""), vec![0]);
    }

    #[test]
    fn single_parameter() {
        assert_eq!(parse_csi_parameters(b"200"), vec![200]);
    }

    #[test]
    fn semicolon_separated_parameters() {
        assert_eq!(parse_csi_parameters(b"3;5"), vec![3, 5]);
    }

    #[test]
    fn empty_segments_become_zero() {
        assert_eq!(parse_csi_parameters(b";5"), vec![0, 5]);
        assert_eq!(parse_csi_parameters(b"1;"), vec![1, 0]);
    }

    #[test]
    fn non_numeric_segments_become_zero() {
        assert_eq!(parse_csi_parameters(b"1;?;2"), vec![1, 0, 2]);
    }

    #[test]
    fn decoder_starts_free() {
        let decoder = Decoder::new();
        assert_eq!(decoder.state, InputState::Free);
        assert_eq!(decoder.previous_free_state, InputState::Free);
        assert!(decoder.csi_parameter_bytes.is_empty());
    }
}
