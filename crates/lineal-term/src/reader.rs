// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Background stdin readiness watcher.
//
// A dedicated thread polls stdin for readability and sends a unit token
// through a rendezvous-sized channel whenever bytes are waiting. It never
// reads the bytes itself: the editor performs every read(2) on the loop
// thread, so the cursor-position (DSR) parser and the input decoder see a
// coherent byte stream. The token just means "a read would not block".
//
// Why a dedicated thread? Because the editor loop must stay responsive
// for deferred resize handling and signal flags, so it blocks on a
// channel with a timeout rather than on stdin itself.
//
// Shutdown: the thread polls with a short timeout, checking a stop flag
// between polls. A pending blocking send is unblocked when the receiver
// is dropped, so drop the `Receiver` before calling [`StdinWatcher::stop`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::terminal::stdin_ready_timeout;

/// How often the watcher thread re-checks the stop flag (milliseconds).
const POLL_TIMEOUT_MS: i32 = 50;

/// Token meaning "stdin has readable bytes".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake;

/// Background stdin readiness watcher thread.
///
/// Spawned per editing session; [`stop`](Self::stop) (or drop) terminates
/// the thread. The channel is rendezvous-sized: while a token is pending
/// and the editor has not consumed it, the watcher blocks instead of
/// spinning on an already-readable descriptor.
pub struct StdinWatcher {
    /// The watcher thread handle. `None` after `stop()` joins it.
    handle: Option<JoinHandle<()>>,
    /// Shared flag to signal the thread to exit.
    stop: Arc<AtomicBool>,
}

impl StdinWatcher {
    /// Spawn the watcher thread.
    ///
    /// # Panics
    ///
    /// Panics if the OS cannot spawn a new thread (extremely rare).
    #[must_use]
    pub fn spawn() -> (Self, Receiver<Wake>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("stdin-watcher".into())
            .spawn(move || {
                Self::watch_loop(&tx, &stop_flag);
            })
            .expect("failed to spawn stdin watcher thread");

        (
            Self {
                handle: Some(handle),
                stop,
            },
            rx,
        )
    }

    /// Signal the watcher thread to stop and wait for it to exit.
    ///
    /// Idempotent. The session's `Receiver` must be dropped first so a
    /// blocked send can fail out.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn watch_loop(tx: &SyncSender<Wake>, stop: &AtomicBool) {
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }

            if !stdin_ready_timeout(POLL_TIMEOUT_MS) {
                continue;
            }

            // Data is waiting. Post a token; if one is already pending the
            // send blocks until the editor consumes it (the data is still
            // there, so no wakeup is lost and we do not spin).
            if tx.send(Wake).is_err() {
                break; // Receiver dropped — session over.
            }
        }
    }
}

impl Drop for StdinWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn poll_timeout_reasonable() {
        assert!(POLL_TIMEOUT_MS >= 10);
        assert!(POLL_TIMEOUT_MS <= 500);
    }

    #[test]
    fn spawn_and_stop() {
        let (mut watcher, rx) = StdinWatcher::spawn();
        drop(rx);
        watcher.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut watcher, rx) = StdinWatcher::spawn();
        drop(rx);
        watcher.stop();
        watcher.stop();
    }

    #[test]
    fn drop_stops_watcher() {
        let (watcher, rx) = StdinWatcher::spawn();
        drop(rx);
        drop(watcher); // Must not hang.
    }

    #[test]
    fn channel_closes_after_stop() {
        let (mut watcher, rx) = StdinWatcher::spawn();
        // Consume anything that raced in, then stop.
        while rx.try_recv().is_ok() {}
        // Dropping rx before stop is the documented order; emulate a
        // session teardown.
        drop(rx);
        watcher.stop();
    }

    #[test]
    fn recv_timeout_does_not_hang_without_input() {
        let (mut watcher, rx) = StdinWatcher::spawn();
        // In the test harness stdin may or may not be readable; either a
        // token or a timeout is fine, hanging is not.
        let _ = rx.recv_timeout(Duration::from_millis(20));
        drop(rx);
        watcher.stop();
    }
}
