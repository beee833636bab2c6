//! Supervisor configuration.
//!
//! Defaults match a host that keeps `Main.shiv` in its working directory and uses F3 as
//! the abort hotkey. Every field can be overridden through `SHIV_*` environment variables;
//! values that do not parse are reported and ignored.

use std::path::{Path, PathBuf};

use crate::abi::KEY_F3;
use crate::loader::ImageSource;
use crate::log_sink::LogMode;

/// Default module image, relative to the host's working directory.
pub const DEFAULT_IMAGE_PATH: &str = "Main.shiv";

/// Log file used when the image does not come from a file.
pub const FALLBACK_LOG_PATH: &str = "shiv.log";

/// Guest code runs on the hosted context's stack, so it must leave room for wasmtime's
/// own stack limit on top of the host frames.
pub const DEFAULT_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Smallest hosted stack accepted. Half of the stack goes to wasm, the rest to host frames
/// and compilation.
pub const MIN_STACK_SIZE: usize = 1024 * 1024;

pub mod env {
    pub const MODULE: &str = "SHIV_MODULE";
    pub const LOG: &str = "SHIV_LOG";
    pub const LOG_APPEND: &str = "SHIV_LOG_APPEND";
    pub const ABORT_KEY: &str = "SHIV_ABORT_KEY";
    pub const STACK_SIZE: &str = "SHIV_STACK_SIZE";
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupervisorConfig {
    pub image: ImageSource,
    pub log_path: PathBuf,
    pub log_mode: LogMode,
    /// Key code whose release (after a recorded press) requests an abort.
    pub abort_key: u32,
    /// Stack size of the hosted execution context, in bytes.
    pub stack_size: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::for_image_path(DEFAULT_IMAGE_PATH)
    }
}

impl SupervisorConfig {
    /// Config for an image file; the log sits next to it with a `.log` extension.
    pub fn for_image_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            image: ImageSource::File(path.to_path_buf()),
            log_path: path.with_extension("log"),
            log_mode: LogMode::default(),
            abort_key: KEY_F3,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Config for an image the host already holds in memory.
    pub fn for_image_bytes(bytes: impl Into<std::sync::Arc<[u8]>>) -> Self {
        Self {
            image: ImageSource::Memory(bytes.into()),
            log_path: PathBuf::from(FALLBACK_LOG_PATH),
            ..Self::default()
        }
    }

    pub fn with_abort_key(mut self, key: u32) -> Self {
        self.abort_key = key;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Stack size the hosted context is actually created with: `stack_size`, raised to
    /// [`MIN_STACK_SIZE`].
    pub fn hosted_stack_size(&self) -> usize {
        self.stack_size.max(MIN_STACK_SIZE)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(env::MODULE).filter(|p| !p.is_empty()) {
            let abort_key = self.abort_key;
            let log_mode = self.log_mode;
            let stack_size = self.stack_size;
            self = Self::for_image_path(path);
            self.abort_key = abort_key;
            self.log_mode = log_mode;
            self.stack_size = stack_size;
        }
        if let Some(path) = lookup(env::LOG).filter(|p| !p.is_empty()) {
            self.log_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(env::LOG_APPEND) {
            match parse_flag(&value) {
                Some(true) => self.log_mode = LogMode::Append,
                Some(false) => self.log_mode = LogMode::Truncate,
                None => tracing::warn!(var = env::LOG_APPEND, %value, "ignoring unparsable flag"),
            }
        }
        if let Some(value) = lookup(env::ABORT_KEY) {
            match value.trim().parse() {
                Ok(key) => self.abort_key = key,
                Err(_) => tracing::warn!(var = env::ABORT_KEY, %value, "ignoring unparsable key code"),
            }
        }
        if let Some(value) = lookup(env::STACK_SIZE) {
            match value.trim().parse::<usize>() {
                Ok(size) if size >= MIN_STACK_SIZE => self.stack_size = size,
                _ => tracing::warn!(
                    var = env::STACK_SIZE,
                    %value,
                    min = MIN_STACK_SIZE,
                    "ignoring invalid stack size"
                ),
            }
        }
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
