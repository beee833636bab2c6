//! Loader utilities for shiv-core.
//!
//! Responsibilities:
//! - Read the module image in full from its source (a file, or bytes handed over by the host).
//! - Detect whether the image is a `.wasm` binary or `.wat` text.
//! - If it looks like WAT, convert it to WASM bytes (via the `wat` crate).
//!
//! Notes:
//! - The image file keeps a neutral extension (`Main.shiv`), so we sniff the bytes themselves.
//! - We accept a BOM and leading whitespace for WAT as best-effort.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Error returned by loader helpers and by module instantiation.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read module image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The input was empty or otherwise not recognized as WASM/WAT.
    #[error("unrecognized module image format (expected wasm or wat)")]
    UnrecognizedFormat,
    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[from] wat::Error),
    #[error("failed to compile WASM module: {0}")]
    CompileFailed(String),
    #[error("failed to instantiate WASM module: {0}")]
    InstantiateFailed(String),
}

/// Where module image bytes come from. Each load reads the source again, which is what
/// makes a reload pick up a rebuilt image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl ImageSource {
    /// Read the whole image.
    pub fn read(&self) -> Result<Vec<u8>, LoadError> {
        match self {
            ImageSource::File(path) => std::fs::read(path).map_err(|source| LoadError::Read {
                path: path.clone(),
                source,
            }),
            ImageSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageSource::File(path) => Some(path),
            ImageSource::Memory(_) => None,
        }
    }
}

impl core::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ImageSource::File(path) => write!(f, "{}", path.display()),
            ImageSource::Memory(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
        }
    }
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedFormat {
    Wasm,
    Wat,
}

/// Result of normalizing (detecting + possibly converting) the input.
#[derive(Clone, Debug)]
pub struct Detected {
    pub format: DetectedFormat,
    /// Always valid WASM bytes (for WASM/WAT inputs).
    pub wasm_bytes: Vec<u8>,
}

/// Detect format and normalize to WASM bytes.
pub fn normalize_to_wasm(image: &[u8]) -> Result<Detected, LoadError> {
    let format = detect_format(image).ok_or(LoadError::UnrecognizedFormat)?;

    match format {
        DetectedFormat::Wasm => Ok(Detected {
            format,
            wasm_bytes: image.to_vec(),
        }),
        DetectedFormat::Wat => {
            let bytes = wat::parse_bytes(image)?;
            Ok(Detected {
                format,
                wasm_bytes: bytes.into(),
            })
        }
    }
}

/// Best-effort detection.
///
/// Rules:
/// - If the first 4 bytes are `\0asm`, treat as WASM.
/// - Else, after stripping UTF-8 BOM / leading whitespace, if the first non-ws byte is `(`,
///   treat as WAT (common WAT starts with `(module ...)`).
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if is_wasm_magic(bytes) {
        return Some(DetectedFormat::Wasm);
    }

    let i = skip_bom_and_leading_ws(bytes);
    if i < bytes.len() && bytes[i] == b'(' {
        return Some(DetectedFormat::Wat);
    }

    None
}

fn is_wasm_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0..4] == *b"\0asm"
}

fn skip_bom_and_leading_ws(bytes: &[u8]) -> usize {
    let mut i = 0;

    // UTF-8 BOM: EF BB BF
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        i = 3;
    }

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            _ => break,
        }
    }

    i
}
