use super::*;
use crate::abi::{CallbackKind, KEY_F3};
use crate::binding::{BindingState, Callbacks};
use crate::config::SupervisorConfig;
use crate::loader::LoadError;
use crate::log_sink::LogSink;
use crate::supervisor::SupervisorError;
use std::cell::Cell;
use std::path::Path;

#[derive(Default)]
struct Probe {
    loads: Cell<u32>,
    inits: Cell<u32>,
    ticks: Cell<u32>,
    keys: Cell<u32>,
    aborts: Cell<u32>,
}

fn count(cell: &Cell<u32>) {
    cell.set(cell.get() + 1);
}

fn full(probe: &Rc<Probe>) -> Callbacks {
    let (i, t, k, a) = (probe.clone(), probe.clone(), probe.clone(), probe.clone());
    Callbacks::new()
        .on_init(move |_| {
            count(&i.inits);
            Ok(())
        })
        .on_tick(move || {
            count(&t.ticks);
            Ok(())
        })
        .on_key(move |_| {
            count(&k.keys);
            Ok(())
        })
        .on_abort(move || {
            count(&a.aborts);
            Ok(())
        })
}

fn bridge_with(
    dir: &Path,
    probe: &Rc<Probe>,
    make: impl Fn(&Rc<Probe>) -> Result<Callbacks, SupervisorError> + 'static,
) -> ExecutionBridge {
    let config = SupervisorConfig::for_image_bytes(b"image".to_vec())
        .with_log_path(dir.join("bridge.log"));
    let p = probe.clone();
    let supervisor = Supervisor::new(config, move |_: &[u8], _: &LogSink| {
        count(&p.loads);
        make(&p)
    });
    ExecutionBridge::new(supervisor)
}

#[test]
fn context_is_created_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| Ok(full(p)));

    assert!(!bridge.has_hosted_context());
    assert_eq!(probe.loads.get(), 0);

    bridge.frame();
    assert!(bridge.has_hosted_context());
    assert_eq!(probe.inits.get(), 1);
    assert_eq!(probe.ticks.get(), 1);
}

#[test]
fn hundred_frames_are_hundred_ticks_and_no_reinit() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| Ok(full(p)));

    for _ in 0..100 {
        bridge.frame();
    }

    assert_eq!(probe.ticks.get(), 100);
    assert_eq!(probe.inits.get(), 1);
    assert_eq!(probe.loads.get(), 1);
    assert_eq!(bridge.frames(), 100);
    assert_eq!(bridge.contexts_created(), 1);
}

#[test]
fn only_tick_bound_still_ticks_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| {
        let t = p.clone();
        Ok(Callbacks::new().on_tick(move || {
            count(&t.ticks);
            Ok(())
        }))
    });

    for _ in 0..10 {
        bridge.frame();
    }
    assert_eq!(probe.ticks.get(), 10);
    assert_eq!(bridge.supervisor().binding_state(), BindingState::Partial);
    assert_eq!(bridge.dispatch_key(&KeyEvent::press(65)), KeyDisposition::Unbound);
}

#[test]
fn failing_tick_unbinds_and_later_frames_are_idle() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| {
        let t = p.clone();
        Ok(full(p).on_tick(move || {
            count(&t.ticks);
            if t.ticks.get() == 5 {
                anyhow::bail!("frame five");
            }
            Ok(())
        }))
    });

    for _ in 0..10 {
        bridge.frame();
    }

    // Ticks 1-4 succeeded, the 5th failed, 6-10 had nothing to call.
    assert_eq!(probe.ticks.get(), 5);
    assert_eq!(probe.aborts.get(), 1);
    assert_eq!(probe.inits.get(), 1);
    assert_eq!(bridge.supervisor().binding_state(), BindingState::Unbound);
    assert_eq!(bridge.supervisor().stats().tick_failures, 1);

    let log = std::fs::read_to_string(dir.path().join("bridge.log")).unwrap();
    assert!(log.contains("frame five"), "{log}");
}

#[test]
fn failing_key_does_not_unbind() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| {
        Ok(full(p).on_key(|_| anyhow::bail!("bad key")))
    });

    bridge.frame();
    assert_eq!(bridge.dispatch_key(&KeyEvent::press(65)), KeyDisposition::Failed);
    bridge.frame();

    assert_eq!(probe.ticks.get(), 2);
    assert_eq!(probe.aborts.get(), 0);
    assert!(bridge.supervisor().is_bound(CallbackKind::Tick));
}

#[test]
fn abort_hotkey_aborts_then_reinitializes_next_frame() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| Ok(full(p)));

    bridge.frame();
    bridge.frame();
    assert_eq!(bridge.dispatch_key(&KeyEvent::press(KEY_F3)), KeyDisposition::Delivered);
    assert_eq!(
        bridge.dispatch_key(&KeyEvent::release(KEY_F3)),
        KeyDisposition::AbortRequested
    );
    // Only the press reached the module.
    assert_eq!(probe.keys.get(), 1);
    assert_eq!(probe.aborts.get(), 0);

    bridge.frame();
    assert_eq!(probe.aborts.get(), 1);
    assert_eq!(probe.inits.get(), 2);
    assert_eq!(probe.ticks.get(), 3);
    assert!(!bridge.supervisor().signals().abort_requested());

    bridge.frame();
    assert_eq!(probe.inits.get(), 2);
    assert_eq!(probe.ticks.get(), 4);
}

#[test]
fn reentering_reuses_the_context_and_reloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| Ok(full(p)));

    bridge.enter();
    bridge.frame();
    bridge.frame();
    assert_eq!(probe.inits.get(), 1);

    bridge.enter();
    bridge.frame();
    assert_eq!(probe.inits.get(), 2);
    assert_eq!(probe.aborts.get(), 1);

    for _ in 0..5 {
        bridge.frame();
    }
    assert_eq!(probe.inits.get(), 2);
    assert_eq!(probe.ticks.get(), 8);
    assert_eq!(bridge.contexts_created(), 1);
}

#[test]
fn failed_load_idles_until_reentered() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| {
        if p.loads.get() == 1 {
            return Err(LoadError::UnrecognizedFormat.into());
        }
        Ok(full(p))
    });

    for _ in 0..3 {
        bridge.frame();
    }
    assert_eq!(probe.loads.get(), 1);
    assert_eq!(probe.ticks.get(), 0);
    assert_eq!(bridge.supervisor().binding_state(), BindingState::Unbound);

    bridge.enter();
    bridge.frame();
    assert_eq!(probe.loads.get(), 2);
    assert_eq!(probe.inits.get(), 1);
    assert_eq!(probe.ticks.get(), 1);
}

#[test]
fn keys_during_a_frame_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let mut bridge = bridge_with(dir.path(), &probe, |p| Ok(full(p)));
    bridge.frame();

    let held = Rc::clone(&bridge.supervisor);
    let _busy = held.borrow_mut();
    assert_eq!(bridge.dispatch_key(&KeyEvent::press(65)), KeyDisposition::Busy);
    assert_eq!(probe.keys.get(), 0);
}

#[test]
fn dropping_the_bridge_unwinds_the_suspended_context() {
    struct SetOnDrop(Rc<Cell<bool>>);
    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let probe = Rc::new(Probe::default());
    let dropped = Rc::new(Cell::new(false));
    let d = dropped.clone();
    let mut bridge = bridge_with(dir.path(), &probe, move |p| {
        let guard = SetOnDrop(d.clone());
        Ok(full(p).on_abort(move || {
            let _keep = &guard;
            Ok(())
        }))
    });

    bridge.frame();
    assert!(!dropped.get());
    drop(bridge);
    assert!(dropped.get());
}

#[test]
fn runaway_recursion_on_a_small_stack_traps() {
    let dir = tempfile::tempdir().unwrap();
    let config = SupervisorConfig {
        stack_size: 128 * 1024,
        ..SupervisorConfig::for_image_bytes(
            br#"(module (func $r (export "Shiv.OnTick") (call $r)))"#.to_vec(),
        )
        .with_log_path(dir.path().join("bridge.log"))
    };
    let loader = crate::runtime::WasmLoader::new(config.hosted_stack_size()).unwrap();
    let mut bridge = ExecutionBridge::new(Supervisor::new(config, loader));

    for _ in 0..3 {
        bridge.frame();
    }

    let stats = bridge.supervisor().stats();
    assert_eq!(stats.tick_failures, 1);
    assert_eq!(stats.ticks, 0);
    assert_eq!(bridge.supervisor().binding_state(), BindingState::Unbound);

    let log = std::fs::read_to_string(dir.path().join("bridge.log")).unwrap();
    assert!(log.contains("Shiv::OnTick failed"), "{log}");
}
