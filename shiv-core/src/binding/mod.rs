//! Module callbacks and the binding that owns them.
//!
//! [`Callbacks`] is the registration a module hands to the supervisor: four independently
//! optional closures. Native modules build one directly; wasm images get one from
//! `crate::runtime::WasmLoader`, which resolves exports through the symbol binder.
//! [`ModuleBinding`] is the supervisor's slot for the currently loaded registration.

use crate::abi::CallbackKind;
use crate::input::KeyEvent;
use crate::log_sink::LogSink;

pub type InitCallback = Box<dyn FnMut(&LogSink) -> anyhow::Result<()>>;
pub type TickCallback = Box<dyn FnMut() -> anyhow::Result<()>>;
pub type KeyCallback = Box<dyn FnMut(&KeyEvent) -> anyhow::Result<()>>;
pub type AbortCallback = Box<dyn FnMut() -> anyhow::Result<()>>;

#[derive(Default)]
pub struct Callbacks {
    pub on_init: Option<InitCallback>,
    pub on_tick: Option<TickCallback>,
    pub on_key: Option<KeyCallback>,
    pub on_abort: Option<AbortCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_init(mut self, f: impl FnMut(&LogSink) -> anyhow::Result<()> + 'static) -> Self {
        self.on_init = Some(Box::new(f));
        self
    }

    pub fn on_tick(mut self, f: impl FnMut() -> anyhow::Result<()> + 'static) -> Self {
        self.on_tick = Some(Box::new(f));
        self
    }

    pub fn on_key(mut self, f: impl FnMut(&KeyEvent) -> anyhow::Result<()> + 'static) -> Self {
        self.on_key = Some(Box::new(f));
        self
    }

    pub fn on_abort(mut self, f: impl FnMut() -> anyhow::Result<()> + 'static) -> Self {
        self.on_abort = Some(Box::new(f));
        self
    }

    pub fn has(&self, kind: CallbackKind) -> bool {
        match kind {
            CallbackKind::Init => self.on_init.is_some(),
            CallbackKind::Tick => self.on_tick.is_some(),
            CallbackKind::Key => self.on_key.is_some(),
            CallbackKind::Abort => self.on_abort.is_some(),
        }
    }

    pub fn missing(&self) -> impl Iterator<Item = CallbackKind> + '_ {
        CallbackKind::ALL.into_iter().filter(|&k| !self.has(k))
    }
}

impl core::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_init", &self.on_init.is_some())
            .field("on_tick", &self.on_tick.is_some())
            .field("on_key", &self.on_key.is_some())
            .field("on_abort", &self.on_abort.is_some())
            .finish()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BindingState {
    Unbound,
    /// Loaded, with at least one callback missing.
    Partial,
    Full,
}

/// The callbacks of the currently loaded module, if any.
#[derive(Debug, Default)]
pub struct ModuleBinding {
    callbacks: Option<Callbacks>,
}

impl ModuleBinding {
    pub fn bind(&mut self, callbacks: Callbacks) {
        self.callbacks = Some(callbacks);
    }

    /// Drop every callback.
    pub fn clear(&mut self) {
        self.callbacks = None;
    }

    pub fn is_bound(&self) -> bool {
        self.callbacks.is_some()
    }

    pub fn state(&self) -> BindingState {
        match &self.callbacks {
            None => BindingState::Unbound,
            Some(cb) if cb.missing().next().is_none() => BindingState::Full,
            Some(_) => BindingState::Partial,
        }
    }

    pub fn callbacks_mut(&mut self) -> Option<&mut Callbacks> {
        self.callbacks.as_mut()
    }

    pub fn has(&self, kind: CallbackKind) -> bool {
        self.callbacks.as_ref().is_some_and(|cb| cb.has(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_state_tracks_missing_callbacks() {
        let mut binding = ModuleBinding::default();
        assert_eq!(binding.state(), BindingState::Unbound);

        binding.bind(Callbacks::new().on_tick(|| Ok(())));
        assert_eq!(binding.state(), BindingState::Partial);
        assert!(binding.has(CallbackKind::Tick));
        assert!(!binding.has(CallbackKind::Init));

        binding.bind(
            Callbacks::new()
                .on_init(|_| Ok(()))
                .on_tick(|| Ok(()))
                .on_key(|_| Ok(()))
                .on_abort(|| Ok(())),
        );
        assert_eq!(binding.state(), BindingState::Full);

        binding.clear();
        assert_eq!(binding.state(), BindingState::Unbound);
        assert!(!binding.has(CallbackKind::Tick));
    }

    #[test]
    fn empty_registration_is_bound_but_partial() {
        let callbacks = Callbacks::new();
        assert_eq!(callbacks.missing().collect::<Vec<_>>(), CallbackKind::ALL);

        let mut binding = ModuleBinding::default();
        binding.bind(callbacks);
        assert!(binding.is_bound());
        assert_eq!(binding.state(), BindingState::Partial);
    }
}
