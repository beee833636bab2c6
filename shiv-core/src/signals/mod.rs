//! Reload/abort flags shared between the host context and the hosted context.
//!
//! Each flag has one writer and one reader, and the two contexts never run at the same
//! time, so plain `Cell`s are enough. `Signals` is `!Sync`; moving the hosted context to
//! another thread would need atomics or a channel here.

use std::cell::Cell;

#[derive(Debug, Default)]
pub struct Signals {
    reload_requested: Cell<bool>,
    abort_requested: Cell<bool>,
}

impl Signals {
    /// Set by the host side when the entry point is (re)entered.
    pub fn request_reload(&self) {
        self.reload_requested.set(true);
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested.get()
    }

    /// Cleared by the hosted outer loop right after `initialize`.
    pub fn clear_reload(&self) {
        self.reload_requested.set(false);
    }

    /// Set by input dispatch when the abort hotkey is released.
    pub fn request_abort(&self) {
        self.abort_requested.set(true);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort_requested.get()
    }

    /// Cleared by the hosted inner loop once the abort has been carried out.
    pub fn clear_abort(&self) {
        self.abort_requested.set(false);
    }
}
