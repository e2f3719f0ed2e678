// SPDX-License-Identifier: MIT
//
// lineal-term — Terminal platform layer for the lineal line editor.
//
// Everything here is editor-agnostic plumbing: escape-sequence emission,
// the termios/ioctl shim, a background stdin readiness watcher, and
// signal-to-flag translation. The editor crate composes these into a
// readline-style engine; this crate never looks at a buffer or a key
// binding.
//
// This crate intentionally avoids terminal abstraction frameworks
// (crossterm, termion) in favor of direct control via ANSI escape
// sequences and raw termios. The editor needs to reason about every
// byte on the wire — both directions — and an abstraction layer in the
// middle would make different choices than we would.

#[allow(clippy::missing_errors_doc)] // ANSI functions all just forward io::Write errors.
pub mod ansi;
pub mod reader;
pub mod signal;
pub mod terminal;
