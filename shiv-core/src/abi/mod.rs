//! shiv-core ABI module
//!
//! This module defines the contract between:
//! - **Host**: `shiv-core`, embedded in a process that owns a frame loop
//! - **Guest**: the hot-reloadable WASM module loaded from the image file
//!
//! ## Entry type
//! WASM exports are flat names, so the guest groups its callbacks under a dotted
//! "type" prefix. The supervisor looks for a type whose short name is [`ENTRY_TYPE`]:
//!
//! - `Shiv.OnInit(log: i32)`
//! - `Shiv.OnTick()`
//! - `Shiv.OnKey(key: i32, repeats: i32, scan_code: i32, was_down_before: i32,
//!   is_up_now: i32, ctrl: i32, shift: i32, alt: i32)`
//! - `Shiv.OnAbort()`
//!
//! Every callback is optional. A namespaced type path (`Game.Shiv.OnTick`) is accepted,
//! and a member may carry an overload tag (`Shiv.OnKey#2`); two exports resolving to the
//! same member are ambiguous and fail the bind.
//!
//! ## Imports (guest -> host)
//! Imported from module `"env"`:
//! - `shiv_abi_version() -> i32`
//! - `shiv_log(handle: i32, ptr: i32, len: i32)`
//!     - Appends the UTF-8 bytes at `ptr..ptr+len` (in the `memory` export) as one line of
//!       the supervisor log. `handle` is the value passed to `Shiv.OnInit`.
//!
//! ## ABI Stability
//! We version this ABI with a single integer. Incompatible changes bump the number.

/// Current ABI version offered to guests.
pub const ABI_VERSION: u32 = 1;

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Short name of the exported type that carries the guest callbacks.
pub const ENTRY_TYPE: &str = "Shiv";

/// Separator between a type path and its member in an export name.
pub const MEMBER_SEPARATOR: char = '.';

/// Marks an overload tag at the end of a member name (`OnKey#2`).
pub const OVERLOAD_MARKER: char = '#';

/// Handle value passed to `Shiv.OnInit`; the guest hands it back to `shiv_log`.
pub const LOG_SINK_HANDLE: i32 = 1;

/// Guest callback member names on the entry type.
pub mod guest_exports {
    pub const ON_INIT: &str = "OnInit";
    pub const ON_TICK: &str = "OnTick";
    pub const ON_KEY: &str = "OnKey";
    pub const ON_ABORT: &str = "OnAbort";
}

/// Host import names provided to the guest under [`IMPORT_MODULE`].
pub mod host_imports {
    pub const ABI_VERSION: &str = "shiv_abi_version";
    pub const LOG: &str = "shiv_log";
}

/// The four callbacks a hosted module may provide.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CallbackKind {
    Init,
    Tick,
    Key,
    Abort,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 4] = [
        CallbackKind::Init,
        CallbackKind::Tick,
        CallbackKind::Key,
        CallbackKind::Abort,
    ];

    /// Member name of this callback on the entry type.
    pub const fn member(self) -> &'static str {
        match self {
            CallbackKind::Init => guest_exports::ON_INIT,
            CallbackKind::Tick => guest_exports::ON_TICK,
            CallbackKind::Key => guest_exports::ON_KEY,
            CallbackKind::Abort => guest_exports::ON_ABORT,
        }
    }
}

impl core::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{ENTRY_TYPE}::{}", self.member())
    }
}

/// Virtual key code of F3, the default abort hotkey.
pub const KEY_F3: u32 = 114;

/// Virtual key codes polled for live modifier state.
pub const KEY_SHIFT: u32 = 16;
pub const KEY_CONTROL: u32 = 17;

/// Key codes synthesised for joypad buttons start here, clear of virtual key codes.
pub const JOYPAD_KEY_BASE: u32 = 0x1000;

/// Joypad button ids, aligned with libretro joypad ids.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoypadButton {
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

impl JoypadButton {
    pub const ALL: [JoypadButton; 16] = [
        JoypadButton::B,
        JoypadButton::Y,
        JoypadButton::Select,
        JoypadButton::Start,
        JoypadButton::Up,
        JoypadButton::Down,
        JoypadButton::Left,
        JoypadButton::Right,
        JoypadButton::A,
        JoypadButton::X,
        JoypadButton::L1,
        JoypadButton::R1,
        JoypadButton::L2,
        JoypadButton::R2,
        JoypadButton::L3,
        JoypadButton::R3,
    ];

    /// Key code delivered to the guest for this button.
    pub const fn key_code(self) -> u32 {
        JOYPAD_KEY_BASE + self as u32
    }
}
