//! Operator-facing log file.
//!
//! The sink is opened once and then lives as long as the supervisor that owns it; reloads
//! and aborts only flush it. Every write appends one line and flushes under the sink's lock,
//! so a teardown that logs from inside error handling never interleaves partial lines.
//!
//! Developer diagnostics go through `tracing`; this file is what module authors read.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// How the log file is opened the first time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LogMode {
    /// Start a fresh file for this process.
    #[default]
    Truncate,
    /// Keep what earlier processes wrote.
    Append,
}

#[derive(Debug)]
struct SinkInner {
    writer: Mutex<Option<LineWriter<File>>>,
}

/// Cloneable handle to the log file. Clones write to the same file.
#[derive(Clone, Debug)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

impl LogSink {
    /// Open (creating if needed) the log file at `path`.
    pub fn open(path: &Path, mode: LogMode) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            LogMode::Truncate => options.write(true).truncate(true),
            LogMode::Append => options.append(true),
        };
        let file = options.open(path)?;

        Ok(Self {
            inner: Arc::new(SinkInner {
                writer: Mutex::new(Some(LineWriter::new(file))),
            }),
        })
    }

    /// A sink that drops every line. Used when the log file cannot be opened so that
    /// guests still receive a valid handle.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(SinkInner {
                writer: Mutex::new(None),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().is_some()
    }

    /// Append one line and flush it.
    pub fn write_line(&self, line: &str) {
        let mut writer = self.lock();
        let Some(w) = writer.as_mut() else {
            return;
        };
        if let Err(err) = writeln!(w, "{line}").and_then(|()| w.flush()) {
            tracing::warn!(error = %err, "failed to write to shiv log");
        }
    }

    pub fn flush(&self) {
        if let Some(w) = self.lock().as_mut() {
            if let Err(err) = w.flush() {
                tracing::warn!(error = %err, "failed to flush shiv log");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<LineWriter<File>>> {
        // A panic while holding the lock leaves at worst a partial line behind.
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open-once slot for a [`LogSink`]. Later opens return the first sink whatever path they ask
/// for. There is no way to close it.
#[derive(Debug, Default)]
pub struct LogSlot {
    sink: Option<LogSink>,
}

impl LogSlot {
    pub fn get_or_open(&mut self, path: &Path, mode: LogMode) -> &LogSink {
        self.sink.get_or_insert_with(|| match LogSink::open(path, mode) {
            Ok(sink) => sink,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "cannot open shiv log; continuing without it");
                LogSink::disabled()
            }
        })
    }

    pub fn get(&self) -> Option<&LogSink> {
        self.sink.as_ref()
    }
}
