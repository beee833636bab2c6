//! What the supervisor needs from the process that embeds it.
//!
//! A host hands out two registrations: a frame callback it invokes once per frame, and a
//! keyboard callback it invokes for every key transition. Both are plain `extern "C"`
//! function pointers because the hosts we target are C frame loops; the state behind them
//! lives in `crate::state`.

use crate::input::ModifierSource;

/// Invoked once per host frame.
pub type FrameEntry = extern "C" fn();

/// `(key, repeats, scan_code, is_extended, is_with_alt, was_down_before, is_up_now)`
pub type KeyboardHandler = extern "C" fn(u32, u16, u8, bool, bool, bool, bool);

pub trait Host {
    fn register_frame(&mut self, entry: FrameEntry);
    fn unregister_frame(&mut self);
    fn register_keyboard(&mut self, handler: KeyboardHandler);
    fn unregister_keyboard(&mut self);

    /// Live ctrl/shift state, polled when a key event arrives.
    fn modifiers(&self) -> Box<dyn ModifierSource>;
}
