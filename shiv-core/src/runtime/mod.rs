//! Wasmtime-backed module runtime.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine` and `Linker` once, with the host imports defined.
//! - Per load: compile the image, bind its exports by name, and instantiate it in a fresh
//!   `Store` carrying the log sink.
//! - Wrap the bound exports as [`crate::binding::Callbacks`] so the supervisor never sees
//!   wasmtime types.
//!
//! Guest ABI: imports are `"env"` + `shiv_*` symbols (see `crate::abi::host_imports`).

pub mod imports;
pub mod runtime;

pub use runtime::{GuestState, WasmLoader};
