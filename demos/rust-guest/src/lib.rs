#![no_std]

// Minimal shiv Rust guest.
//
// Build for `wasm32-unknown-unknown` and copy the `.wasm` next to the host as `Main.shiv`.
// Rebuild and press F3 (or Select under libretro) to hot-reload it.
//
// The supervisor calls:
// - `Shiv.OnInit(log)` after every (re)load.
// - `Shiv.OnTick()` once per host frame.
// - `Shiv.OnKey(...)` for every key transition except the abort hotkey release.
// - `Shiv.OnAbort()` before the module is torn down.

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use shiv_sdk::prelude::*;

static LOG: AtomicI32 = AtomicI32::new(0);
static TICKS: AtomicU32 = AtomicU32::new(0);

const TICKS_PER_SECOND: u32 = 60;

fn log() -> Log {
    Log::from_raw(LOG.load(Ordering::Relaxed))
}

fn on_init(log: Log) {
    LOG.store(log.raw(), Ordering::Relaxed);
    // Globals survive only as long as the instance; a reload starts from zero anyway.
    TICKS.store(0, Ordering::Relaxed);
    log.line("demo: hello");
}

fn on_tick() {
    let ticks = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if ticks % TICKS_PER_SECOND == 0 {
        log().line("demo: another second");
    }
}

fn on_key(event: KeyEvent) {
    if !event.is_press() {
        return;
    }
    if event.is_button(Button::A) {
        log().line("demo: A");
    } else if event.ctrl && event.key_code == u32::from(b'S') {
        log().line("demo: ctrl+S");
    }
}

fn on_abort() {
    log().line("demo: bye");
}

shiv_module! {
    init: on_init,
    tick: on_tick,
    key: on_key,
    abort: on_abort,
}

// A panic becomes a trap, which the supervisor logs and contains.
#[cfg(target_arch = "wasm32")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    core::arch::wasm32::unreachable()
}
