//! Input module for shiv-core.
//!
//! Responsibilities:
//! - Describe the key-event payload delivered to `Shiv.OnKey`.
//! - Recognise the abort hotkey (a release that follows a recorded press).
//! - Poll live modifier state when the host reports a key.
//! - Turn libretro joypad polling into key transitions, since `libretro_backend::RuntimeHandle`
//!   only exposes joypad state.

use crate::abi::JoypadButton;
use libretro_backend::JoypadButton as LrJoypadButton;

/// One key transition as seen by the guest.
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
    pub fn press(key_code: u32) -> Self {
        Self {
            key_code,
            repeat_count: 1,
            ..Self::default()
        }
    }

    pub fn release(key_code: u32) -> Self {
        Self {
            key_code,
            repeat_count: 1,
            was_down_before: true,
            is_up_now: true,
            ..Self::default()
        }
    }

    /// Build an event from the host keyboard payload, polling ctrl/shift now.
    #[allow(clippy::too_many_arguments)]
    pub fn from_host(
        key_code: u32,
        repeat_count: u16,
        scan_code: u8,
        _is_extended: bool,
        is_with_alt: bool,
        was_down_before: bool,
        is_up_now: bool,
        modifiers: &dyn ModifierSource,
    ) -> Self {
        Self {
            key_code,
            repeat_count,
            scan_code,
            was_down_before,
            is_up_now,
            ctrl: modifiers.ctrl(),
            shift: modifiers.shift(),
            alt: is_with_alt,
        }
    }

    /// A release of a key that was recorded down.
    pub fn is_release(&self) -> bool {
        self.was_down_before && self.is_up_now
    }
}

/// Live modifier state, polled at the moment a key event arrives.
pub trait ModifierSource {
    fn ctrl(&self) -> bool;
    fn shift(&self) -> bool;
}

/// For hosts that cannot report modifiers.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoModifiers;

impl ModifierSource for NoModifiers {
    fn ctrl(&self) -> bool {
        false
    }

    fn shift(&self) -> bool {
        false
    }
}

/// The key whose release asks the supervisor to tear the module down and reload it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AbortHotkey {
    pub key_code: u32,
}

impl AbortHotkey {
    pub const fn new(key_code: u32) -> Self {
        Self { key_code }
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        event.key_code == self.key_code && event.is_release()
    }
}

/// Convert ABI joypad button id into libretro-backend joypad button enum.
fn map_joypad_button(button: JoypadButton) -> LrJoypadButton {
    match button {
        JoypadButton::B => LrJoypadButton::B,
        JoypadButton::Y => LrJoypadButton::Y,
        JoypadButton::Select => LrJoypadButton::Select,
        JoypadButton::Start => LrJoypadButton::Start,
        JoypadButton::Up => LrJoypadButton::Up,
        JoypadButton::Down => LrJoypadButton::Down,
        JoypadButton::Left => LrJoypadButton::Left,
        JoypadButton::Right => LrJoypadButton::Right,
        JoypadButton::A => LrJoypadButton::A,
        JoypadButton::X => LrJoypadButton::X,
        JoypadButton::L1 => LrJoypadButton::L1,
        JoypadButton::R1 => LrJoypadButton::R1,
        JoypadButton::L2 => LrJoypadButton::L2,
        JoypadButton::R2 => LrJoypadButton::R2,
        JoypadButton::L3 => LrJoypadButton::L3,
        JoypadButton::R3 => LrJoypadButton::R3,
    }
}

/// Tracks joypad button state between polls and reports the transitions as key events.
#[derive(Clone, Debug, Default)]
pub struct JoypadEdges {
    held: [bool; 16],
}

impl JoypadEdges {
    /// Feed one poll (`pressed(button)` for every button) and return what changed since the
    /// previous poll, in button order.
    pub fn poll(&mut self, mut pressed: impl FnMut(JoypadButton) -> bool) -> Vec<KeyEvent> {
        let mut events = Vec::new();
        for (held, button) in self.held.iter_mut().zip(JoypadButton::ALL) {
            let now = pressed(button);
            if now == *held {
                continue;
            }
            events.push(if now {
                KeyEvent::press(button.key_code())
            } else {
                KeyEvent::release(button.key_code())
            });
            *held = now;
        }
        events
    }

    /// Poll port 0 of a libretro runtime handle.
    pub fn poll_libretro(&mut self, handle: &mut libretro_backend::RuntimeHandle) -> Vec<KeyEvent> {
        self.poll(|button| handle.is_joypad_button_pressed(0, map_joypad_button(button)))
    }
}
