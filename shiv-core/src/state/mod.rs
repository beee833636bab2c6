//! Process-side state behind the registered entry points.
//!
//! The host calls plain function pointers, so the attached bridge has to live somewhere
//! those functions can reach. It lives in a thread-local slot on the host's frame thread:
//! the hosted context is a coroutine with its own stack and cannot move between threads.
//!
//! Lifecycle:
//! - `attach`: build the supervisor and bridge, register the entry points. No hosted context
//!   and no load yet; the first frame does both.
//! - `frame_entry` / `keyboard_entry`: called by the host.
//! - `request_reload`: same as the host invoking the entry point again.
//! - `detach`: unregister, then drop the bridge and its suspended hosted context.

use std::cell::RefCell;

use thiserror::Error;

use crate::bridge::ExecutionBridge;
use crate::config::SupervisorConfig;
use crate::host::Host;
use crate::input::{KeyEvent, ModifierSource};
use crate::supervisor::{ModuleLoader, Supervisor, SupervisorStats};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum AttachError {
    #[error("a module supervisor is already attached on this thread")]
    AlreadyAttached,
    #[error("attach called from inside a frame or key callback")]
    Reentrant,
}

struct Process {
    bridge: ExecutionBridge,
    modifiers: Box<dyn ModifierSource>,
}

thread_local! {
    static PROCESS: RefCell<Option<Process>> = const { RefCell::new(None) };
}

/// Set up the supervisor for this thread and register the entry points with `host`.
pub fn attach(
    host: &mut dyn Host,
    config: SupervisorConfig,
    loader: impl ModuleLoader + 'static,
) -> Result<(), AttachError> {
    PROCESS.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| AttachError::Reentrant)?;
        if slot.is_some() {
            return Err(AttachError::AlreadyAttached);
        }
        tracing::info!(image = %config.image, log = %config.log_path.display(), "attaching");
        *slot = Some(Process {
            bridge: ExecutionBridge::new(Supervisor::new(config, loader)),
            modifiers: host.modifiers(),
        });
        Ok(())
    })?;

    host.register_frame(frame_entry);
    host.register_keyboard(keyboard_entry);
    Ok(())
}

/// Unregister from `host` and tear everything down. Returns whether anything was attached.
pub fn detach(host: &mut dyn Host) -> bool {
    host.unregister_frame();
    host.unregister_keyboard();

    let process = PROCESS.with(|slot| match slot.try_borrow_mut() {
        Ok(mut slot) => slot.take(),
        Err(_) => {
            tracing::error!("detach called from inside a frame or key callback; ignored");
            None
        }
    });
    let attached = process.is_some();
    // Dropped outside the slot borrow; this unwinds the suspended hosted context.
    drop(process);
    if attached {
        tracing::info!("detached");
    }
    attached
}

pub fn is_attached() -> bool {
    PROCESS.with(|slot| slot.try_borrow().map(|s| s.is_some()).unwrap_or(true))
}

/// The host (re)invoked the entry point.
pub fn request_reload() {
    with_process("reload", |process| process.bridge.enter());
}

pub fn stats() -> Option<SupervisorStats> {
    with_process("stats", |process| process.bridge.supervisor().stats())
}

/// Registered as the host's frame callback.
pub extern "C" fn frame_entry() {
    with_process("frame", |process| process.bridge.frame());
}

/// Registered as the host's keyboard callback.
pub extern "C" fn keyboard_entry(
    key: u32,
    repeats: u16,
    scan_code: u8,
    is_extended: bool,
    is_with_alt: bool,
    was_down_before: bool,
    is_up_now: bool,
) {
    with_process("key", |process| {
        let event = KeyEvent::from_host(
            key,
            repeats,
            scan_code,
            is_extended,
            is_with_alt,
            was_down_before,
            is_up_now,
            process.modifiers.as_ref(),
        );
        process.bridge.dispatch_key(&event)
    });
}

fn with_process<R>(what: &'static str, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    PROCESS.with(|slot| {
        let Ok(mut slot) = slot.try_borrow_mut() else {
            tracing::warn!(call = what, "re-entrant call from inside a callback; ignored");
            return None;
        };
        match slot.as_mut() {
            Some(process) => Some(f(process)),
            None => {
                tracing::trace!(call = what, "nothing attached");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Callbacks;
    use crate::host::{FrameEntry, KeyboardHandler};
    use crate::log_sink::LogSink;
    use crate::supervisor::SupervisorError;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeHost {
        frame: Option<FrameEntry>,
        keyboard: Option<KeyboardHandler>,
        ctrl: Rc<Cell<bool>>,
    }

    struct FakeModifiers {
        ctrl: Rc<Cell<bool>>,
    }

    impl ModifierSource for FakeModifiers {
        fn ctrl(&self) -> bool {
            self.ctrl.get()
        }

        fn shift(&self) -> bool {
            false
        }
    }

    impl Host for FakeHost {
        fn register_frame(&mut self, entry: FrameEntry) {
            self.frame = Some(entry);
        }

        fn unregister_frame(&mut self) {
            self.frame = None;
        }

        fn register_keyboard(&mut self, handler: KeyboardHandler) {
            self.keyboard = Some(handler);
        }

        fn unregister_keyboard(&mut self) {
            self.keyboard = None;
        }

        fn modifiers(&self) -> Box<dyn ModifierSource> {
            Box::new(FakeModifiers {
                ctrl: self.ctrl.clone(),
            })
        }
    }

    #[derive(Default)]
    struct Probe {
        inits: Cell<u32>,
        ticks: Cell<u32>,
        keys: RefCell<Vec<KeyEvent>>,
    }

    fn attach_probe(host: &mut FakeHost, dir: &std::path::Path) -> Rc<Probe> {
        let probe = Rc::new(Probe::default());
        let p = probe.clone();
        let config =
            SupervisorConfig::for_image_bytes(b"image".to_vec()).with_log_path(dir.join("s.log"));
        let loader = move |_: &[u8], _: &LogSink| -> Result<Callbacks, SupervisorError> {
            let (i, t, k) = (p.clone(), p.clone(), p.clone());
            Ok(Callbacks::new()
                .on_init(move |_| {
                    i.inits.set(i.inits.get() + 1);
                    Ok(())
                })
                .on_tick(move || {
                    t.ticks.set(t.ticks.get() + 1);
                    Ok(())
                })
                .on_key(move |event| {
                    k.keys.borrow_mut().push(*event);
                    Ok(())
                }))
        };
        attach(host, config, loader).unwrap();
        probe
    }

    #[test]
    fn attach_registers_and_defers_loading() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::default();
        let probe = attach_probe(&mut host, dir.path());

        assert!(host.frame.is_some());
        assert!(host.keyboard.is_some());
        assert!(is_attached());
        assert_eq!(probe.inits.get(), 0);
        assert_eq!(stats().unwrap().load_attempts, 0);

        let frame = host.frame.unwrap();
        for _ in 0..3 {
            frame();
        }
        assert_eq!(probe.inits.get(), 1);
        assert_eq!(probe.ticks.get(), 3);

        assert!(detach(&mut host));
        assert!(host.frame.is_none());
        assert!(host.keyboard.is_none());
        assert!(!is_attached());

        // A stale pointer called after detach is a no-op.
        frame();
        assert_eq!(probe.ticks.get(), 3);
        assert!(!detach(&mut host));
    }

    #[test]
    fn keyboard_entry_polls_modifiers() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::default();
        let probe = attach_probe(&mut host, dir.path());
        (host.frame.unwrap())();

        host.ctrl.set(true);
        (host.keyboard.unwrap())(65, 1, 30, false, true, false, false);

        assert_eq!(*probe.keys.borrow(), vec![KeyEvent {
            key_code: 65,
            repeat_count: 1,
            scan_code: 30,
            was_down_before: false,
            is_up_now: false,
            ctrl: true,
            shift: false,
            alt: true,
        }]);
        detach(&mut host);
    }

    #[test]
    fn request_reload_reinitializes_on_next_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::default();
        let probe = attach_probe(&mut host, dir.path());
        let frame = host.frame.unwrap();

        frame();
        frame();
        request_reload();
        frame();
        frame();

        assert_eq!(probe.inits.get(), 2);
        assert_eq!(probe.ticks.get(), 4);
        detach(&mut host);
    }

    #[test]
    fn second_attach_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::default();
        attach_probe(&mut host, dir.path());

        let mut other = FakeHost::default();
        let err = attach(
            &mut other,
            SupervisorConfig::for_image_bytes(Vec::<u8>::new()),
            |_: &[u8], _: &LogSink| -> Result<Callbacks, SupervisorError> {
                Ok(Callbacks::new())
            },
        )
        .unwrap_err();
        assert_eq!(err, AttachError::AlreadyAttached);
        assert!(other.frame.is_none());

        detach(&mut host);
    }
}
