//! Symbol binder.
//!
//! Finds the entry type among a module's exports and resolves the four callback members
//! on it. This is pure name lookup over the export listing; nothing is instantiated or
//! called here.
//!
//! Export naming (see `crate::abi`):
//! - `Shiv.OnTick`: type path `Shiv`, member `OnTick`
//! - `Game.Shiv.OnTick`: type path `Game.Shiv`, short name `Shiv`
//! - `Shiv.OnKey#2`: overload tag `2`, matched as `OnKey`

use thiserror::Error;

use crate::abi::{CallbackKind, ENTRY_TYPE, MEMBER_SEPARATOR, OVERLOAD_MARKER};

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum BindError {
    #[error("no '{0}' type found as entry point")]
    EntryTypeNotFound(String),
    #[error("ambiguous match for {entry_type}.{member}: {}", candidates.join(", "))]
    AmbiguousSymbol {
        entry_type: String,
        member: String,
        candidates: Vec<String>,
    },
}

/// One export of a module image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportedSymbol {
    pub name: String,
    pub callable: bool,
}

impl ExportedSymbol {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callable: true,
        }
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callable: false,
        }
    }

    /// Split into (type path, member without overload tag).
    fn split(&self) -> Option<(&str, &str)> {
        let (type_path, member) = self.name.rsplit_once(MEMBER_SEPARATOR)?;
        let member = member
            .split_once(OVERLOAD_MARKER)
            .map_or(member, |(base, _tag)| base);
        Some((type_path, member))
    }
}

fn short_name(type_path: &str) -> &str {
    type_path
        .rsplit_once(MEMBER_SEPARATOR)
        .map_or(type_path, |(_, short)| short)
}

/// Export names resolved for each callback; `None` means unbound.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SymbolTable {
    pub entry_type: String,
    pub on_init: Option<String>,
    pub on_tick: Option<String>,
    pub on_key: Option<String>,
    pub on_abort: Option<String>,
}

impl SymbolTable {
    pub fn get(&self, kind: CallbackKind) -> Option<&str> {
        match kind {
            CallbackKind::Init => self.on_init.as_deref(),
            CallbackKind::Tick => self.on_tick.as_deref(),
            CallbackKind::Key => self.on_key.as_deref(),
            CallbackKind::Abort => self.on_abort.as_deref(),
        }
    }

    fn slot(&mut self, kind: CallbackKind) -> &mut Option<String> {
        match kind {
            CallbackKind::Init => &mut self.on_init,
            CallbackKind::Tick => &mut self.on_tick,
            CallbackKind::Key => &mut self.on_key,
            CallbackKind::Abort => &mut self.on_abort,
        }
    }
}

/// Bind against the default entry type.
pub fn bind(exports: &[ExportedSymbol]) -> Result<SymbolTable, BindError> {
    bind_entry(exports, ENTRY_TYPE)
}

/// Locate the type whose short name is `entry_type` and resolve its callbacks.
///
/// When several type paths share the short name the first in export order wins.
pub fn bind_entry(exports: &[ExportedSymbol], entry_type: &str) -> Result<SymbolTable, BindError> {
    let mut type_paths: Vec<&str> = Vec::new();
    for (type_path, _) in exports.iter().filter_map(ExportedSymbol::split) {
        if short_name(type_path) == entry_type && !type_paths.contains(&type_path) {
            type_paths.push(type_path);
        }
    }

    let Some(&type_path) = type_paths.first() else {
        return Err(BindError::EntryTypeNotFound(entry_type.to_string()));
    };
    if type_paths.len() > 1 {
        tracing::warn!(
            chosen = type_path,
            ignored = ?&type_paths[1..],
            "several exported types match the entry type"
        );
    }
    tracing::debug!(entry_type = type_path, "found entry type");

    let mut table = SymbolTable {
        entry_type: type_path.to_string(),
        ..SymbolTable::default()
    };

    for kind in CallbackKind::ALL {
        let candidates: Vec<&str> = exports
            .iter()
            .filter(|e| e.callable)
            .filter(|e| e.split() == Some((type_path, kind.member())))
            .map(|e| e.name.as_str())
            .collect();

        match candidates.as_slice() {
            [] => {}
            [name] => {
                tracing::debug!(callback = %kind, export = name, "resolved callback");
                *table.slot(kind) = Some(name.to_string());
            }
            _ => {
                return Err(BindError::AmbiguousSymbol {
                    entry_type: type_path.to_string(),
                    member: kind.member().to_string(),
                    candidates: candidates.iter().map(|c| c.to_string()).collect(),
                });
            }
        }
    }

    Ok(table)
}
