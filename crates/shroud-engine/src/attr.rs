//! Legal attribute names
//!
//! Change notification is only accepted for attribute names in the legal set.
//! The set is a process-wide interner: names are stored once and referred to
//! by small copyable [`Attr`] symbols. The three core source attributes are
//! always present; host code may register further names for generic
//! attributes it wants to observe.

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::num::NonZeroU32;

/// Identifier attribute
pub const ID: &str = "id";
/// Transform attribute
pub const TRANSFORM: &str = "transform";
/// Parent attribute
pub const PARENT: &str = "parent";

/// Prefix of the readers that bypass a source's shadow overlay
pub const REAL_PREFIX: &str = "_real_";

const CORE: [&str; 3] = [ID, TRANSFORM, PARENT];

/// An interned attribute name (32-bit index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attr(NonZeroU32);

impl Attr {
    #[inline]
    fn from_index(index: usize) -> Self {
        // Index 0 maps to 1; the table never grows near u32::MAX.
        Attr(NonZeroU32::MIN.saturating_add(index as u32))
    }

    #[inline]
    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Resolve the symbol back to its name
    pub fn name(self) -> String {
        TABLE.read().resolve(self).to_string()
    }

    /// Check if this is one of the core source attributes
    pub fn is_core(self) -> bool {
        self.index() < CORE.len()
    }
}

struct AttrTable {
    map: FxHashMap<String, Attr>,
    names: Vec<String>,
}

impl AttrTable {
    fn with_core() -> Self {
        let mut table = Self {
            map: FxHashMap::with_capacity_and_hasher(16, Default::default()),
            names: Vec::with_capacity(16),
        };
        for name in CORE {
            table.intern(name);
        }
        table
    }

    fn intern(&mut self, name: &str) -> Attr {
        if let Some(&attr) = self.map.get(name) {
            return attr;
        }
        let attr = Attr::from_index(self.names.len());
        self.names.push(name.to_string());
        self.map.insert(name.to_string(), attr);
        attr
    }

    fn resolve(&self, attr: Attr) -> &str {
        &self.names[attr.index()]
    }
}

static TABLE: Lazy<RwLock<AttrTable>> = Lazy::new(|| RwLock::new(AttrTable::with_core()));

/// Add a name to the legal set, returning its symbol
///
/// Registering an existing name returns the existing symbol. Empty names and
/// names with the unshadowed-reader prefix are rejected.
pub fn register(name: &str) -> EngineResult<Attr> {
    if name.is_empty() || name.starts_with(REAL_PREFIX) {
        return Err(EngineError::InvalidAttribute {
            name: name.to_string(),
        });
    }
    if let Some(attr) = lookup(name) {
        return Ok(attr);
    }
    Ok(TABLE.write().intern(name))
}

/// Look up a legal name
pub fn lookup(name: &str) -> Option<Attr> {
    TABLE.read().map.get(name).copied()
}

/// Check whether a name is in the legal set
pub fn is_legal(name: &str) -> bool {
    lookup(name).is_some()
}

/// Number of legal names
pub fn count() -> usize {
    TABLE.read().names.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_names_are_legal() {
        for name in [ID, TRANSFORM, PARENT] {
            let attr = lookup(name).unwrap();
            assert!(attr.is_core());
            assert_eq!(attr.name(), name);
        }
        assert!(count() >= 3);
    }

    #[test]
    fn test_register_deduplicates() {
        let a = register("test_attr_color").unwrap();
        let b = register("test_attr_color").unwrap();
        assert_eq!(a, b);
        assert!(!a.is_core());
        assert!(is_legal("test_attr_color"));
    }

    #[test]
    fn test_unknown_is_illegal() {
        assert!(lookup("test_attr_never_registered").is_none());
    }

    #[test]
    fn test_register_rejects_reserved() {
        assert!(matches!(register(""), Err(EngineError::InvalidAttribute { .. })));
        assert!(matches!(
            register("_real_id"),
            Err(EngineError::InvalidAttribute { .. })
        ));
    }
}
