// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Signal-to-flag translation for SIGWINCH and SIGINT.
//
// The handlers do the only thing that is async-signal-safe here: store
// into an `AtomicBool`. The editor loop consumes the flags at its next
// tick via `take_resize` / `take_interrupt` — signals never mutate editor
// state directly.
//
// Handlers are installed once per process. A nested editor that runs with
// signal handling disabled simply never consumes the flags; its driver
// forwards them to the owning editor instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

/// Set by the SIGWINCH handler; consumed by [`take_resize`].
static RESIZE_PENDING: AtomicBool = AtomicBool::new(false);

/// Set by the SIGINT handler; consumed by [`take_interrupt`].
static INTERRUPT_PENDING: AtomicBool = AtomicBool::new(false);

/// Install guard — handlers are registered at most once per process.
static HANDLERS_INSTALLED: Once = Once::new();

/// Install the SIGWINCH and SIGINT handlers.
///
/// Idempotent. Uses `SA_RESTART` so slow syscalls are resumed rather than
/// failing with `EINTR` where the platform allows it.
#[cfg(unix)]
pub fn install() {
    HANDLERS_INSTALLED.call_once(|| unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);

        sa.sa_sigaction = sigwinch_handler as *const () as usize;
        libc::sigaction(libc::SIGWINCH, &sa, std::ptr::null_mut());

        sa.sa_sigaction = sigint_handler as *const () as usize;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    });
}

#[cfg(not(unix))]
pub fn install() {}

#[cfg(unix)]
extern "C" fn sigwinch_handler(_sig: libc::c_int) {
    RESIZE_PENDING.store(true, Ordering::Relaxed);
}

#[cfg(unix)]
extern "C" fn sigint_handler(_sig: libc::c_int) {
    INTERRUPT_PENDING.store(true, Ordering::Relaxed);
}

/// Consume a pending window-change notification.
#[must_use]
pub fn take_resize() -> bool {
    RESIZE_PENDING.swap(false, Ordering::Relaxed)
}

/// Consume a pending interrupt notification.
#[must_use]
pub fn take_interrupt() -> bool {
    INTERRUPT_PENDING.swap(false, Ordering::Relaxed)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_resize_consumes_flag() {
        RESIZE_PENDING.store(true, Ordering::Relaxed);
        assert!(take_resize());
        assert!(!take_resize());
    }

    #[test]
    fn take_interrupt_consumes_flag() {
        INTERRUPT_PENDING.store(true, Ordering::Relaxed);
        assert!(take_interrupt());
        assert!(!take_interrupt());
    }

    #[test]
    fn install_is_idempotent() {
        install();
        install();
    }
}
