//! Lifecycle supervisor.
//!
//! Owns the module binding and routes initialize/tick/key/abort into it. Every failure a
//! module raises (an `Err`, a wasm trap, or a native panic) stops here: it is written to
//! the log sink and turned into a binding transition, never returned into the host.
//!
//! Binding transitions:
//! - `Unbound -> Partial | Full` on a successful load
//! - `Partial | Full -> Unbound` on `abort`, or on a failing `OnInit` or `OnTick`
//!
//! A failing `OnKey` or `OnAbort` is logged and otherwise ignored.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;

use crate::abi::CallbackKind;
use crate::binder::BindError;
use crate::binding::{BindingState, Callbacks, ModuleBinding};
use crate::config::SupervisorConfig;
use crate::input::{AbortHotkey, KeyEvent};
use crate::loader::LoadError;
use crate::log_sink::{LogSink, LogSlot};
use crate::signals::Signals;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    ModuleLoad(#[from] LoadError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("{callback} failed: {message}")]
    CallbackInvocation {
        callback: CallbackKind,
        message: String,
    },
}

/// Turns a module image into callbacks. Implemented by `crate::runtime::WasmLoader`, and by
/// any `FnMut(&[u8], &LogSink) -> Result<Callbacks, SupervisorError>` for native modules.
pub trait ModuleLoader {
    fn load(&mut self, image: &[u8], log: &LogSink) -> Result<Callbacks, SupervisorError>;
}

impl<F> ModuleLoader for F
where
    F: FnMut(&[u8], &LogSink) -> Result<Callbacks, SupervisorError>,
{
    fn load(&mut self, image: &[u8], log: &LogSink) -> Result<Callbacks, SupervisorError> {
        self(image, log)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    /// No `OnTick` bound; nothing ran.
    Unbound,
    Ticked,
    /// `OnTick` failed and the module was torn down.
    Failed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyDisposition {
    /// The abort hotkey was released; the event was not forwarded.
    AbortRequested,
    Delivered,
    /// No `OnKey` bound.
    Unbound,
    /// `OnKey` failed; the binding is kept.
    Failed,
    /// The event arrived while a frame was running and was dropped.
    Busy,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SupervisorStats {
    pub load_attempts: u64,
    pub loads: u64,
    pub ticks: u64,
    pub tick_failures: u64,
    pub key_failures: u64,
    /// Bound modules that were torn down.
    pub aborts: u64,
}

pub struct Supervisor {
    config: SupervisorConfig,
    hotkey: AbortHotkey,
    loader: Box<dyn ModuleLoader>,
    binding: ModuleBinding,
    signals: Rc<Signals>,
    log: LogSlot,
    stats: SupervisorStats,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            hotkey: AbortHotkey::new(config.abort_key),
            config,
            loader: Box::new(loader),
            binding: ModuleBinding::default(),
            signals: Rc::new(Signals::default()),
            log: LogSlot::default(),
            stats: SupervisorStats::default(),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Flags shared with the execution bridge.
    pub fn signals(&self) -> Rc<Signals> {
        Rc::clone(&self.signals)
    }

    pub fn binding_state(&self) -> BindingState {
        self.binding.state()
    }

    pub fn is_bound(&self, kind: CallbackKind) -> bool {
        self.binding.has(kind)
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    /// The log sink, once the first load has opened it.
    pub fn log_sink(&self) -> Option<&LogSink> {
        self.log.get()
    }

    /// Read the configured image and load it.
    pub fn initialize(&mut self) -> Result<BindingState, SupervisorError> {
        match self.config.image.read() {
            Ok(image) => self.restart(Ok(image.as_slice())),
            Err(err) => self.restart(Err(err)),
        }
    }

    /// Tear down the current module, then load `image`, bind it and run its `OnInit`.
    pub fn load_and_initialize(&mut self, image: &[u8]) -> Result<BindingState, SupervisorError> {
        self.restart(Ok(image))
    }

    fn restart(
        &mut self,
        image: Result<&[u8], LoadError>,
    ) -> Result<BindingState, SupervisorError> {
        self.log("shiv: restarting");
        self.abort();

        let sink = self
            .log
            .get_or_open(&self.config.log_path, self.config.log_mode)
            .clone();
        self.stats.load_attempts += 1;
        self.log(&format!("shiv: loading {}", self.config.image));

        let loaded = image
            .map_err(SupervisorError::from)
            .and_then(|bytes| self.loader.load(bytes, &sink));
        let callbacks = match loaded {
            Ok(callbacks) => callbacks,
            Err(err) => {
                self.log_error(&format!("shiv: fatal error loading module: {err}"));
                return Err(err);
            }
        };
        self.binding.bind(callbacks);

        let init = self
            .binding
            .callbacks_mut()
            .and_then(|cb| cb.on_init.as_mut())
            .map(|on_init| invoke(CallbackKind::Init, || on_init(&sink)));
        if let Some(Err(err)) = init {
            self.binding.clear();
            self.log_error(&format!("shiv: fatal error in {err}"));
            return Err(err);
        }

        for kind in CallbackKind::ALL {
            if !self.binding.has(kind) {
                self.log_warning(&format!("shiv: warning: module has no {kind}"));
            }
        }

        self.stats.loads += 1;
        let state = self.binding.state();
        self.log("shiv: initialize complete");
        tracing::info!(?state, "module loaded");
        Ok(state)
    }

    /// Run `OnTick` once. A failure tears the module down.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(on_tick) = self.binding.callbacks_mut().and_then(|cb| cb.on_tick.as_mut()) else {
            return TickOutcome::Unbound;
        };

        match invoke(CallbackKind::Tick, || on_tick()) {
            Ok(()) => {
                self.stats.ticks += 1;
                TickOutcome::Ticked
            }
            Err(err) => {
                self.stats.tick_failures += 1;
                self.log_error(&format!("shiv: in {err}"));
                self.abort();
                TickOutcome::Failed
            }
        }
    }

    /// Route a key event: the abort hotkey release raises the abort flag, anything else goes
    /// to `OnKey`.
    pub fn dispatch_key(&mut self, event: &KeyEvent) -> KeyDisposition {
        if self.hotkey.matches(event) {
            tracing::debug!(key = event.key_code, "abort hotkey released");
            self.signals.request_abort();
            return KeyDisposition::AbortRequested;
        }

        let Some(on_key) = self.binding.callbacks_mut().and_then(|cb| cb.on_key.as_mut()) else {
            return KeyDisposition::Unbound;
        };

        match invoke(CallbackKind::Key, || on_key(event)) {
            Ok(()) => KeyDisposition::Delivered,
            Err(err) => {
                self.stats.key_failures += 1;
                self.log_error(&format!("shiv: in {err}"));
                KeyDisposition::Failed
            }
        }
    }

    /// Run `OnAbort` if bound, then drop the binding. Safe to call when nothing is loaded.
    pub fn abort(&mut self) {
        self.log("shiv: abort");

        let result = self
            .binding
            .callbacks_mut()
            .and_then(|cb| cb.on_abort.as_mut())
            .map(|on_abort| invoke(CallbackKind::Abort, || on_abort()));
        if let Some(Err(err)) = result {
            self.log_error(&format!("shiv: in {err}"));
        }

        if self.binding.is_bound() {
            tracing::info!("module unbound");
            self.stats.aborts += 1;
        }
        self.binding.clear();

        if let Some(sink) = self.log.get() {
            sink.flush();
        }
        self.log("shiv: abort complete");
    }

    fn log(&self, line: &str) {
        tracing::debug!("{line}");
        if let Some(sink) = self.log.get() {
            sink.write_line(line);
        }
    }

    fn log_warning(&self, line: &str) {
        tracing::warn!("{line}");
        if let Some(sink) = self.log.get() {
            sink.write_line(line);
        }
    }

    fn log_error(&self, line: &str) {
        tracing::error!("{line}");
        if let Some(sink) = self.log.get() {
            sink.write_line(line);
        }
    }
}

/// Call into the module, turning both `Err` and panics into `CallbackInvocation`.
fn invoke<R>(
    callback: CallbackKind,
    f: impl FnOnce() -> anyhow::Result<R>,
) -> Result<R, SupervisorError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(SupervisorError::CallbackInvocation {
            callback,
            message: format!("{err:?}"),
        }),
        Err(payload) => Err(SupervisorError::CallbackInvocation {
            callback,
            message: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
