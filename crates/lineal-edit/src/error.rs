//! The public error taxonomy.
//!
//! Only two things can fail a [`get_line`](crate::Editor::get_line) call:
//! the input was canceled (EOF on an empty buffer, or a zero-byte read
//! with nothing carried over), or the underlying read failed. Everything
//! else degrades gracefully — a bell, a log line, a deferred retry.

use thiserror::Error;

/// Errors surfaced by [`Editor::get_line`](crate::Editor::get_line).
#[derive(Debug, Error)]
pub enum Error {
    /// The input was canceled: `read` yielded zero bytes with no buffered
    /// data, or end-of-file was requested on an empty buffer.
    #[error("input canceled")]
    Canceled,

    /// Reading from the terminal failed with something other than `EINTR`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_displays_reason() {
        assert_eq!(Error::Canceled.to_string(), "input canceled");
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
