//! Host import definitions for the Wasmtime runtime.
//!
//! Everything a guest may import lives under module `"env"`.

use crate::abi::{ABI_VERSION, IMPORT_MODULE, LOG_SINK_HANDLE, host_imports};

use super::runtime::GuestState;

use wasmtime::{Caller, Extern, Linker};

/// Define all host imports expected by guests under module `"env"`.
///
/// Must be called before instantiating the module.
pub fn define_imports(linker: &mut Linker<GuestState>) -> Result<(), anyhow::Error> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::ABI_VERSION,
        |_caller: Caller<'_, GuestState>| -> i32 { ABI_VERSION as i32 },
    )?;

    // (handle, ptr, len): one line of UTF-8 for the log file.
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::LOG,
        |mut caller: Caller<'_, GuestState>, handle: i32, ptr: u32, len: u32| {
            if handle != LOG_SINK_HANDLE {
                tracing::warn!(handle, "guest wrote to an unknown log handle");
                return;
            }
            let Some(line) = read_guest_str(&mut caller, ptr, len) else {
                tracing::warn!(ptr, len, "guest log line is outside its memory");
                return;
            };
            caller.data().log.write_line(&line);
        },
    )?;

    Ok(())
}

/// Copy `len` bytes at `ptr` out of the guest's exported memory. Invalid UTF-8 is replaced
/// rather than rejected.
fn read_guest_str(caller: &mut Caller<'_, GuestState>, ptr: u32, len: u32) -> Option<String> {
    let memory = caller.get_export("memory").and_then(Extern::into_memory)?;
    let end = (ptr as usize).checked_add(len as usize)?;
    if end > memory.data_size(&*caller) {
        return None;
    }

    let mut buf = vec![0u8; len as usize];
    memory.read(&*caller, ptr as usize, &mut buf).ok()?;
    Some(String::from_utf8_lossy(&buf).into_owned())
}
