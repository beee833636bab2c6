//! Wasmtime-backed module loader.
//!
//! One [`WasmLoader`] lives as long as the supervisor and keeps the `Engine` and `Linker`.
//! Every load gets its own `Store`, so dropping the callbacks of a torn-down module frees
//! its instance and memory.

use std::cell::RefCell;
use std::rc::Rc;

use wasmtime::{Engine, ExternType, Func, Instance, Linker, Module, Store, Val};

use crate::abi::{CallbackKind, LOG_SINK_HANDLE};
use crate::binder::{self, ExportedSymbol, SymbolTable};
use crate::binding::Callbacks;
use crate::input::KeyEvent;
use crate::loader::{self, LoadError};
use crate::log_sink::LogSink;
use crate::supervisor::{ModuleLoader, SupervisorError};

/// Per-store data visible to host imports.
pub struct GuestState {
    pub log: LogSink,
}

/// A live instance and the store that owns it. Shared by the four callbacks of one load.
struct GuestInstance {
    store: Store<GuestState>,
    instance: Instance,
}

impl GuestInstance {
    fn func(&mut self, name: &str) -> Result<Func, LoadError> {
        self.instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| LoadError::InstantiateFailed(format!("export `{name}` is not a function")))
    }

    fn call(&mut self, func: &Func, params: &[Val]) -> anyhow::Result<()> {
        // Return values are ignored, but wasmtime wants room for them.
        let mut results = vec![Val::I32(0); func.ty(&self.store).results().len()];
        func.call(&mut self.store, params, &mut results)?;
        Ok(())
    }
}

pub struct WasmLoader {
    engine: Engine,
    linker: Linker<GuestState>,
}

impl WasmLoader {
    /// `stack_size` is the hosted context's stack. Guest code may use half of it; the rest
    /// is left to the host frames below it and to compilation, so a runaway guest hits
    /// wasmtime's stack limit and traps before it reaches the guard page.
    pub fn new(stack_size: usize) -> Result<Self, anyhow::Error> {
        let mut cfg = wasmtime::Config::new();

        cfg.max_wasm_stack(stack_size / 2);

        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);
        cfg.wasm_multi_memory(true);
        cfg.wasm_tail_call(true);

        let engine = Engine::new(&cfg)?;
        let mut linker = Linker::new(&engine);
        super::imports::define_imports(&mut linker)?;

        Ok(Self { engine, linker })
    }

    /// Compile `image`, bind its `Shiv.*` exports and instantiate it.
    pub fn instantiate(&self, image: &[u8], log: &LogSink) -> Result<Callbacks, SupervisorError> {
        let detected = loader::normalize_to_wasm(image)?;
        tracing::debug!(format = ?detected.format, bytes = detected.wasm_bytes.len(), "compiling module");

        let module = Module::new(&self.engine, &detected.wasm_bytes)
            .map_err(|e| LoadError::CompileFailed(format!("{e:?}")))?;

        let exports: Vec<ExportedSymbol> = module
            .exports()
            .map(|export| ExportedSymbol {
                name: export.name().to_string(),
                callable: matches!(export.ty(), ExternType::Func(_)),
            })
            .collect();
        let table = binder::bind(&exports)?;
        log.write_line(&resolved_line(&table));

        let mut store = Store::new(&self.engine, GuestState { log: log.clone() });
        let instance = self
            .linker
            .instantiate(&mut store, &module)
            .map_err(|e| LoadError::InstantiateFailed(format!("{e:?}")))?;

        let guest = Rc::new(RefCell::new(GuestInstance { store, instance }));
        wrap_callbacks(&guest, &table).map_err(SupervisorError::from)
    }
}

impl ModuleLoader for WasmLoader {
    fn load(&mut self, image: &[u8], log: &LogSink) -> Result<Callbacks, SupervisorError> {
        self.instantiate(image, log)
    }
}

fn wrap_callbacks(
    guest: &Rc<RefCell<GuestInstance>>,
    table: &SymbolTable,
) -> Result<Callbacks, LoadError> {
    let mut callbacks = Callbacks::new();

    for kind in CallbackKind::ALL {
        let Some(name) = table.get(kind) else {
            continue;
        };
        let func = guest.borrow_mut().func(name)?;
        let g = Rc::clone(guest);

        callbacks = match kind {
            CallbackKind::Init => {
                // A guest that does not want the log handle may take no parameters.
                let takes_log = func.ty(&g.borrow().store).params().len() == 1;
                let handle = [Val::I32(LOG_SINK_HANDLE)];
                callbacks.on_init(move |_log| {
                    let params = if takes_log { &handle[..] } else { &[] };
                    g.borrow_mut().call(&func, params)
                })
            }
            CallbackKind::Tick => callbacks.on_tick(move || g.borrow_mut().call(&func, &[])),
            CallbackKind::Key => {
                callbacks.on_key(move |event| g.borrow_mut().call(&func, &key_params(event)))
            }
            CallbackKind::Abort => callbacks.on_abort(move || g.borrow_mut().call(&func, &[])),
        };
    }

    Ok(callbacks)
}

/// Operator log line naming the entry type and the exports that were bound.
fn resolved_line(table: &SymbolTable) -> String {
    let bound: Vec<&str> = CallbackKind::ALL
        .into_iter()
        .filter_map(|kind| table.get(kind))
        .collect();
    if bound.is_empty() {
        format!("shiv: found type {}, no callbacks", table.entry_type)
    } else {
        format!("shiv: found type {}, callbacks {}", table.entry_type, bound.join(", "))
    }
}

/// `OnKey(key, repeats, scan, was_down, is_up, ctrl, shift, alt)`, all `i32`.
fn key_params(event: &KeyEvent) -> [Val; 8] {
    [
        Val::I32(event.key_code as i32),
        Val::I32(i32::from(event.repeat_count)),
        Val::I32(i32::from(event.scan_code)),
        Val::I32(i32::from(event.was_down_before)),
        Val::I32(i32::from(event.is_up_now)),
        Val::I32(i32::from(event.ctrl)),
        Val::I32(i32::from(event.shift)),
        Val::I32(i32::from(event.alt)),
    ]
}
