#![cfg_attr(not(feature = "std"), no_std)]

//! shiv-sdk (handwritten)
//!
//! This crate is used by **guest** WASM modules that run under the `shiv` supervisor.
//!
//! ABI model:
//! - The guest exports up to four callbacks under the `Shiv` type prefix
//!   (`Shiv.OnInit`, `Shiv.OnTick`, `Shiv.OnKey`, `Shiv.OnAbort`). All are optional.
//! - The host imports `shiv_abi_version` and `shiv_log` from module `"env"`.
//! - `OnInit` receives a log handle; lines written through it end up in the supervisor's
//!   log file next to the module image.
//!
//! Export names contain a `.`, so they cannot be spelled as Rust identifiers. Use
//! [`shiv_module!`] to generate the exports from ordinary functions.
//!
//! A callback must return promptly: the host's frame loop waits for it.

/// ABI version this SDK was written against.
pub const ABI_VERSION: u32 = 1;

/// Virtual key code of F3. Releasing it makes the supervisor abort and reload the module;
/// that release is never delivered to `OnKey`.
pub const KEY_F3: u32 = 114;

/// Joypad buttons reach `OnKey` with key codes starting here (libretro hosts).
pub const JOYPAD_KEY_BASE: u32 = 0x1000;

/// Joypad button ids.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Button {
    B = 0,
    Y = 1,
    Select = 2,
    Start = 3,
    Up = 4,
    Down = 5,
    Left = 6,
    Right = 7,
    A = 8,
    X = 9,
    L1 = 10,
    R1 = 11,
    L2 = 12,
    R2 = 13,
    L3 = 14,
    R3 = 15,
}

impl Button {
    /// The key code a press or release of this button arrives with.
    pub const fn key_code(self) -> u32 {
        JOYPAD_KEY_BASE + self as u32
    }
}

/// Low-level raw ABI imports.
#[allow(non_camel_case_types)]
pub mod sys {
    unsafe extern "C" {
        #[link_name = "shiv_abi_version"]
        pub fn abi_version() -> i32;
        #[link_name = "shiv_log"]
        pub fn log(handle: i32, ptr: u32, len: u32);
    }
}

/// ABI version offered by the host.
pub fn host_abi_version() -> u32 {
    unsafe { sys::abi_version() as u32 }
}

/// Handle to the supervisor's log file, as passed to `OnInit`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Log(i32);

impl Log {
    pub const fn from_raw(handle: i32) -> Self {
        Self(handle)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Append one line to the log file.
    pub fn line(self, message: &str) {
        unsafe { sys::log(self.0, message.as_ptr() as u32, message.len() as u32) }
    }
}

/// One key transition, as delivered to `OnKey`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyEvent {
    pub key_code: u32,
    pub repeat_count: u16,
    pub scan_code: u8,
    pub was_down_before: bool,
    pub is_up_now: bool,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyEvent {
    /// Rebuild the event from the eight `i32` parameters of `Shiv.OnKey`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        key: i32,
        repeats: i32,
        scan: i32,
        was_down: i32,
        is_up: i32,
        ctrl: i32,
        shift: i32,
        alt: i32,
    ) -> Self {
        Self {
            key_code: key as u32,
            repeat_count: repeats as u16,
            scan_code: scan as u8,
            was_down_before: was_down != 0,
            is_up_now: is_up != 0,
            ctrl: ctrl != 0,
            shift: shift != 0,
            alt: alt != 0,
        }
    }

    pub fn is_press(&self) -> bool {
        !self.was_down_before && !self.is_up_now
    }

    pub fn is_release(&self) -> bool {
        self.was_down_before && self.is_up_now
    }

    pub fn is_button(&self, button: Button) -> bool {
        self.key_code == button.key_code()
    }
}

/// Export guest functions as the `Shiv.*` callbacks.
///
/// Every entry is optional, but the order is fixed:
///
/// ```ignore
/// shiv_sdk::shiv_module! {
///     init: on_init,   // fn(Log)
///     tick: on_tick,   // fn()
///     key: on_key,     // fn(KeyEvent)
///     abort: on_abort, // fn()
/// }
/// ```
#[macro_export]
macro_rules! shiv_module {
    (
        $(init: $init:path,)?
        $(tick: $tick:path,)?
        $(key: $key:path,)?
        $(abort: $abort:path,)?
    ) => {
        $(
            #[unsafe(export_name = "Shiv.OnInit")]
            pub extern "C" fn __shiv_on_init(log: i32) {
                $init($crate::Log::from_raw(log))
            }
        )?
        $(
            #[unsafe(export_name = "Shiv.OnTick")]
            pub extern "C" fn __shiv_on_tick() {
                $tick()
            }
        )?
        $(
            #[unsafe(export_name = "Shiv.OnKey")]
            #[allow(clippy::too_many_arguments)]
            pub extern "C" fn __shiv_on_key(
                key: i32,
                repeats: i32,
                scan: i32,
                was_down: i32,
                is_up: i32,
                ctrl: i32,
                shift: i32,
                alt: i32,
            ) {
                $key($crate::KeyEvent::from_raw(
                    key, repeats, scan, was_down, is_up, ctrl, shift, alt,
                ))
            }
        )?
        $(
            #[unsafe(export_name = "Shiv.OnAbort")]
            pub extern "C" fn __shiv_on_abort() {
                $abort()
            }
        )?
    };
}

/// Convenience prelude for guest modules.
pub mod prelude {
    pub use crate::Button;
    pub use crate::KeyEvent;
    pub use crate::Log;
    pub use crate::shiv_module;
}
