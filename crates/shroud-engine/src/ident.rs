//! Path-like identifiers
//!
//! An [`Id`] names an object relative to a context: `"a/b"` inside context
//! `"a"` is `"b"`. Ids are translatable, so the engine never proxies them; it
//! asks them to re-express themselves instead.

use crate::error::{EngineError, EngineResult};
use crate::object::{Object, Translatable, ValueIter};
use crate::value::Value;
use rustc_hash::FxHasher;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::str::FromStr;

const PARENT: &str = "..";

/// Normalised relative path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id {
    parts: Vec<Rc<str>>,
}

impl Id {
    /// Parse and normalise a `/`-separated path
    pub fn new(path: &str) -> Self {
        Self::from_parts(path.split('/'))
    }

    /// The empty id, rendered as `.`
    pub fn root() -> Self {
        Self::default()
    }

    /// Build from parts, normalising `.`, empty parts and `..`
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut stack: Vec<Rc<str>> = Vec::new();
        for part in parts {
            match part {
                "" | "." => {}
                PARENT if stack.last().is_some_and(|top| &**top != PARENT) => {
                    stack.pop();
                }
                part => stack.push(Rc::from(part)),
            }
        }
        Self { parts: stack }
    }

    /// Path components
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|part| &**part)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check if this is the root id
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// `self` followed by `other`
    pub fn join(&self, other: &Id) -> Id {
        Self::from_parts(self.parts().chain(other.parts()))
    }

    /// `self` expressed relative to `base`
    ///
    /// Strips `base` when it is a prefix, otherwise climbs out of `base` with
    /// one `..` per component.
    pub fn relative_to(&self, base: &Id) -> Id {
        if self.parts.starts_with(&base.parts) {
            return Id {
                parts: self.parts[base.parts.len()..].to_vec(),
            };
        }
        Self::from_parts(
            std::iter::repeat(PARENT)
                .take(base.len())
                .chain(self.parts()),
        )
    }

    /// Read an id out of a value: an `Id` object or a path string
    pub fn from_value(value: &Value) -> EngineResult<Id> {
        if let Some(id) = value.downcast_ref::<Id>() {
            return Ok(id.clone());
        }
        match value {
            Value::Str(path) => Ok(Id::new(path)),
            Value::None => Ok(Id::root()),
            other => Err(EngineError::wrong_type("Id", other.type_name())),
        }
    }

    /// The id of a context, read through the attribute protocol
    fn of_context(context: &Value) -> EngineResult<Id> {
        Id::from_value(&context.get_attr(crate::attr::ID)?)
    }

    /// Move into a value
    pub fn into_value(self) -> Value {
        Value::object(self)
    }
}

impl FromStr for Id {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Id::new(s))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return f.write_str(".");
        }
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str("/")?;
            }
            f.write_str(part)?;
            first = false;
        }
        Ok(())
    }
}

impl Object for Id {
    fn type_name(&self) -> &str {
        "Id"
    }

    fn len(&self) -> EngineResult<usize> {
        Ok(self.parts.len())
    }

    fn iter(&self) -> EngineResult<ValueIter> {
        let parts: Vec<Value> = self.parts.iter().map(|p| Value::Str(p.clone())).collect();
        Ok(Box::new(parts.into_iter().map(Ok)))
    }

    fn eq_value(&self, other: &Value) -> EngineResult<Option<bool>> {
        Ok(Some(other.downcast_ref::<Id>().is_some_and(|id| id == self)))
    }

    fn compare(&self, other: &Value) -> EngineResult<Ordering> {
        match other.downcast_ref::<Id>() {
            Some(id) => Ok(self.cmp(id)),
            None => Err(EngineError::Unorderable {
                left: "Id".to_string(),
                right: other.type_name(),
            }),
        }
    }

    fn hash_value(&self) -> EngineResult<Option<u64>> {
        let mut hasher = FxHasher::default();
        Hash::hash(self, &mut hasher);
        Ok(Some(hasher.finish()))
    }

    fn to_str(&self) -> EngineResult<String> {
        Ok(self.to_string())
    }

    fn repr(&self) -> EngineResult<String> {
        Ok(format!("Id('{}')", self))
    }

    fn as_translatable(&self) -> Option<&dyn Translatable> {
        Some(self)
    }
}

impl Translatable for Id {
    fn apply_context(&self, context: &Value) -> EngineResult<Value> {
        Ok(Id::of_context(context)?.join(self).into_value())
    }

    fn remove_context(&self, context: &Value) -> EngineResult<Value> {
        Ok(self.relative_to(&Id::of_context(context)?).into_value())
    }
}
