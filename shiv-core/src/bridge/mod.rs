//! Cooperative execution bridge.
//!
//! The host only knows "call this once per frame and get control back quickly". The module
//! wants to be an ordinary program: initialize once, then loop forever. The bridge gives it
//! a persistent coroutine (its own stack) that runs that program and suspends back to the
//! host exactly once per frame, right after `tick`:
//!
//! ```text
//! loop {
//!     initialize
//!     clear reload
//!     while !reload {
//!         tick
//!         suspend to host          <- one frame ends here
//!         if abort { abort; clear abort; break }
//!     }
//! }
//! ```
//!
//! The coroutine is created lazily on the first entry and lives until the bridge is
//! dropped. A reload unwinds the inner loop and runs `initialize` again on the same
//! coroutine.
//!
//! A callback that never returns stalls the host; nothing here can preempt it.

use std::cell::{Ref, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use crate::input::KeyEvent;
use crate::signals::Signals;
use crate::supervisor::{KeyDisposition, Supervisor};

type HostedContext = Coroutine<(), (), Infallible>;

pub struct ExecutionBridge {
    supervisor: Rc<RefCell<Supervisor>>,
    signals: Rc<Signals>,
    hosted: Option<HostedContext>,
    stack_size: usize,
    entered: bool,
    contexts_created: u32,
    frames: u64,
}

impl ExecutionBridge {
    pub fn new(supervisor: Supervisor) -> Self {
        let signals = supervisor.signals();
        let stack_size = supervisor.config().hosted_stack_size();
        Self {
            supervisor: Rc::new(RefCell::new(supervisor)),
            signals,
            hosted: None,
            stack_size,
            entered: false,
            contexts_created: 0,
            frames: 0,
        }
    }

    /// The host (re)invoked the entry point. Raises the reload flag and creates the hosted
    /// context if there is none yet.
    pub fn enter(&mut self) {
        if self.entered {
            tracing::info!("entry point re-entered; reloading module");
        }
        self.entered = true;
        self.signals.request_reload();
        self.ensure_hosted();
    }

    /// Ask the hosted program to run `initialize` again at its next check.
    pub fn request_reload(&self) {
        self.signals.request_reload();
    }

    /// Run one frame's worth of the hosted program.
    pub fn frame(&mut self) {
        if !self.entered {
            self.enter();
        }
        if !self.ensure_hosted() {
            return;
        }
        let Some(hosted) = self.hosted.as_mut() else {
            return;
        };

        self.frames += 1;
        let _span = tracing::trace_span!("frame", n = self.frames).entered();
        match hosted.resume(()) {
            CoroutineResult::Yield(()) => {}
            CoroutineResult::Return(never) => match never {},
        }
    }

    /// Deliver a key event between frames.
    pub fn dispatch_key(&self, event: &KeyEvent) -> KeyDisposition {
        match self.supervisor.try_borrow_mut() {
            Ok(mut supervisor) => supervisor.dispatch_key(event),
            Err(_) => {
                tracing::warn!(key = event.key_code, "key event arrived during a frame; dropped");
                KeyDisposition::Busy
            }
        }
    }

    pub fn supervisor(&self) -> Ref<'_, Supervisor> {
        self.supervisor.borrow()
    }

    pub fn has_hosted_context(&self) -> bool {
        self.hosted.is_some()
    }

    /// How many hosted contexts this bridge has created; at most one unless stack
    /// allocation failed and was retried.
    pub fn contexts_created(&self) -> u32 {
        self.contexts_created
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn ensure_hosted(&mut self) -> bool {
        if self.hosted.is_some() {
            return true;
        }

        let stack = match DefaultStack::new(self.stack_size) {
            Ok(stack) => stack,
            Err(err) => {
                tracing::error!(size = self.stack_size, error = %err, "cannot allocate hosted context stack");
                return false;
            }
        };

        let supervisor = Rc::clone(&self.supervisor);
        let signals = Rc::clone(&self.signals);
        self.hosted = Some(Coroutine::with_stack(
            stack,
            move |yielder: &Yielder<(), ()>, ()| hosted_main(yielder, &supervisor, &signals),
        ));
        self.contexts_created += 1;
        tracing::debug!(stack_size = self.stack_size, "hosted context created");
        true
    }
}

/// Body of the hosted context. Borrows of the supervisor never span a suspension, so the
/// host side can dispatch keys while this is suspended.
fn hosted_main(
    yielder: &Yielder<(), ()>,
    supervisor: &RefCell<Supervisor>,
    signals: &Signals,
) -> Infallible {
    loop {
        // Failures are already logged and leave the module unbound; ticks become no-ops.
        let _ = supervisor.borrow_mut().initialize();
        signals.clear_reload();

        while !signals.reload_requested() {
            supervisor.borrow_mut().tick();
            yielder.suspend(());

            if signals.abort_requested() {
                supervisor.borrow_mut().abort();
                signals.clear_abort();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests;
