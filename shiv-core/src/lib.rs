//! shiv-core: runs a hot-reloadable module inside a host's single-threaded frame loop.
//!
//! The host gives us one short call per frame. The module gets what looks like its own
//! program: `OnInit` once, `OnTick` every frame, `OnKey` for input, `OnAbort` on teardown.
//! Between the two sits a persistent coroutine (`bridge`) that suspends back to the host
//! after every tick, and a supervisor (`supervisor`) that contains every module failure,
//! so a crashing or reloaded module never takes the host down with it.
//!
//! Modules are WASM images (see `crate::abi` for the export/import contract), or native
//! Rust code handing over a [`Callbacks`] registration directly.
//!
//! Hosts:
//! - libretro frontends: this crate is a libretro core (`ShivCore`). The content file is
//!   the module image; reset reloads it, the Select button aborts it.
//! - C frame loops: `shiv_process_attach` / `shiv_process_detach` (see `crate::ffi`).
//!
//! Reloading: the host re-invoking the entry point (or libretro reset, or the abort hotkey)
//! makes the hosted program run `initialize` again, which re-reads the image from disk.

pub mod abi;
pub mod binder;
pub mod binding;
pub mod bridge;
pub mod config;
pub mod ffi;
pub mod host;
pub mod input;
pub mod loader;
pub mod log_sink;
pub mod runtime;
pub mod signals;
pub mod state;
pub mod supervisor;
pub mod telemetry;

pub use binding::{BindingState, Callbacks};
pub use bridge::ExecutionBridge;
pub use config::SupervisorConfig;
pub use host::Host;
pub use input::KeyEvent;
pub use runtime::WasmLoader;
pub use supervisor::{ModuleLoader, Supervisor, SupervisorError};

use crate::abi::JoypadButton;
use crate::host::{FrameEntry, KeyboardHandler};
use crate::input::{JoypadEdges, ModifierSource, NoModifiers};
use libretro_backend::{
    AudioVideoInfo, Core, CoreInfo, GameData, LoadGameResult, RuntimeHandle, libretro_core,
};

/// The libretro core instance. It is also the [`Host`] the supervisor registers with:
/// libretro drives `on_run`, which calls whatever was registered.
#[derive(Default)]
pub struct ShivCore {
    game_data: Option<GameData>,
    joypad: JoypadEdges,
    frame: Option<FrameEntry>,
    keyboard: Option<KeyboardHandler>,
}

impl ShivCore {
    fn config_for(game_data: &GameData) -> Option<SupervisorConfig> {
        // A path is preferred so reloads pick up a rebuilt image.
        let config = match game_data.path() {
            Some(path) => SupervisorConfig::for_image_path(path),
            None => SupervisorConfig::for_image_bytes(game_data.data()?.to_vec()),
        };
        Some(
            config
                .with_abort_key(JoypadButton::Select.key_code())
                .with_env_overrides(),
        )
    }
}

impl Host for ShivCore {
    fn register_frame(&mut self, entry: FrameEntry) {
        self.frame = Some(entry);
    }

    fn unregister_frame(&mut self) {
        self.frame = None;
    }

    fn register_keyboard(&mut self, handler: KeyboardHandler) {
        self.keyboard = Some(handler);
    }

    fn unregister_keyboard(&mut self) {
        self.keyboard = None;
    }

    fn modifiers(&self) -> Box<dyn ModifierSource> {
        // libretro joypads have no modifier keys.
        Box::new(NoModifiers)
    }
}

impl Core for ShivCore {
    fn save_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn rtc_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn system_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn video_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn info() -> CoreInfo {
        CoreInfo::new("Shiv", env!("CARGO_PKG_VERSION"))
            .supports_roms_with_extension("shiv")
            .supports_roms_with_extension("wasm")
            .supports_roms_with_extension("wat")
    }

    fn on_load_game(&mut self, game_data: GameData) -> LoadGameResult {
        telemetry::init();

        let Some(config) = Self::config_for(&game_data) else {
            tracing::error!("content has neither a path nor data");
            return LoadGameResult::Failed(game_data);
        };

        let loader = match WasmLoader::new(config.hosted_stack_size()) {
            Ok(loader) => loader,
            Err(err) => {
                tracing::error!(error = ?err, "cannot create the wasm runtime");
                return LoadGameResult::Failed(game_data);
            }
        };

        if let Err(err) = state::attach(self, config, loader) {
            tracing::error!(error = %err, "attach failed");
            return LoadGameResult::Failed(game_data);
        }

        self.joypad = JoypadEdges::default();
        self.game_data = Some(game_data);
        LoadGameResult::Success(AudioVideoInfo::new())
    }

    fn on_unload_game(&mut self) -> GameData {
        state::detach(self);
        self.game_data
            .take()
            .expect("libretro unloads only after a successful load")
    }

    fn on_run(&mut self, handle: &mut RuntimeHandle) {
        let events = self.joypad.poll_libretro(handle);
        if let Some(keyboard) = self.keyboard {
            for event in events {
                keyboard(
                    event.key_code,
                    event.repeat_count,
                    event.scan_code,
                    false,
                    event.alt,
                    event.was_down_before,
                    event.is_up_now,
                );
            }
        }

        if let Some(frame) = self.frame {
            frame();
        }
    }

    fn on_reset(&mut self) {
        state::request_reload();
    }
}

libretro_core!(ShivCore);
