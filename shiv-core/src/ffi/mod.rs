//! C ABI for hosts that are not libretro frontends.
//!
//! The host fills a [`HostVTable`] with its registration functions and calls
//! `shiv_process_attach` once from its frame thread. The image and log locations come from
//! the `SHIV_*` environment (see `crate::config`), defaulting to `Main.shiv` in the working
//! directory. `shiv_process_detach` undoes the registration.

use std::cell::Cell;

use crate::abi::{KEY_CONTROL, KEY_SHIFT};
use crate::config::SupervisorConfig;
use crate::host::{FrameEntry, Host, KeyboardHandler};
use crate::input::{ModifierSource, NoModifiers};
use crate::runtime::WasmLoader;
use crate::state;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct HostVTable {
    pub register_frame: extern "C" fn(FrameEntry),
    pub unregister_frame: extern "C" fn(),
    pub register_keyboard: extern "C" fn(KeyboardHandler),
    pub unregister_keyboard: extern "C" fn(),
    /// Live key state by virtual key code. May be null, in which case ctrl/shift always
    /// read as released.
    pub is_key_down: Option<extern "C" fn(u32) -> bool>,
}

thread_local! {
    static ATTACHED_HOST: Cell<Option<HostVTable>> = const { Cell::new(None) };
}

struct VTableHost(HostVTable);

impl Host for VTableHost {
    fn register_frame(&mut self, entry: FrameEntry) {
        (self.0.register_frame)(entry);
    }

    fn unregister_frame(&mut self) {
        (self.0.unregister_frame)();
    }

    fn register_keyboard(&mut self, handler: KeyboardHandler) {
        (self.0.register_keyboard)(handler);
    }

    fn unregister_keyboard(&mut self) {
        (self.0.unregister_keyboard)();
    }

    fn modifiers(&self) -> Box<dyn ModifierSource> {
        match self.0.is_key_down {
            Some(is_key_down) => Box::new(PolledModifiers { is_key_down }),
            None => Box::new(NoModifiers),
        }
    }
}

struct PolledModifiers {
    is_key_down: extern "C" fn(u32) -> bool,
}

impl ModifierSource for PolledModifiers {
    fn ctrl(&self) -> bool {
        (self.is_key_down)(KEY_CONTROL)
    }

    fn shift(&self) -> bool {
        (self.is_key_down)(KEY_SHIFT)
    }
}

fn attach_vtable(vtable: HostVTable, config: SupervisorConfig) -> bool {
    let loader = match WasmLoader::new(config.hosted_stack_size()) {
        Ok(loader) => loader,
        Err(err) => {
            tracing::error!(error = ?err, "cannot create the wasm runtime");
            return false;
        }
    };

    match state::attach(&mut VTableHost(vtable), config, loader) {
        Ok(()) => {
            ATTACHED_HOST.with(|host| host.set(Some(vtable)));
            true
        }
        Err(err) => {
            tracing::error!(error = %err, "attach failed");
            false
        }
    }
}

fn detach_vtable() -> bool {
    match ATTACHED_HOST.with(Cell::take) {
        Some(vtable) => state::detach(&mut VTableHost(vtable)),
        None => false,
    }
}

/// Attach the supervisor to the calling thread's frame loop. Returns `false` if the vtable
/// is null, the runtime cannot be created, or a supervisor is already attached.
///
/// # Safety
/// `vtable` must be null or point to a valid `HostVTable` for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shiv_process_attach(vtable: *const HostVTable) -> bool {
    crate::telemetry::init();

    // SAFETY: the caller guarantees `vtable` is null or valid; it is copied out here.
    let Some(vtable) = (unsafe { vtable.as_ref() }).copied() else {
        tracing::error!("shiv_process_attach called with a null vtable");
        return false;
    };
    attach_vtable(vtable, SupervisorConfig::default().with_env_overrides())
}

/// Unregister and tear down. Must be called on the thread that attached.
#[unsafe(no_mangle)]
pub extern "C" fn shiv_process_detach() {
    detach_vtable();
}
