//! Weak set of identity-keyed values

use super::WeakTable;
use crate::error::{EngineError, EngineResult};
use crate::value::{Identity, Value};

/// Set of values that does not keep its members alive
///
/// A member disappears from the set as soon as it is dropped, even if the set
/// itself has already been dropped (in which case nothing happens at all).
#[derive(Debug, Clone, Default)]
pub struct WeakRegistry {
    members: WeakTable<Identity, ()>,
}

impl WeakRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value to the set
    ///
    /// Returns `true` if the value was not already a member. Fails with
    /// `WrongType` if the value cannot be weakly referenced.
    pub fn add(&self, value: &Value) -> EngineResult<bool> {
        let Some(identity) = value.downgrade().map(|weak| weak.identity()) else {
            return Err(EngineError::wrong_type(
                "weakly referenceable object",
                value.type_name(),
            ));
        };
        if self.members.contains_key(&identity) {
            return Ok(false);
        }
        self.members.insert(identity, value, ())?;
        Ok(true)
    }

    /// Check whether a value is a member
    pub fn contains(&self, value: &Value) -> bool {
        match value.lifeline().and(value.identity()) {
            Some(identity) => self.members.contains_key(&identity),
            None => false,
        }
    }

    /// Remove a value from the set; returns whether it was a member
    pub fn discard(&self, value: &Value) -> bool {
        match value.lifeline().and(value.identity()) {
            Some(identity) => self.members.remove(&identity).is_some(),
            None => false,
        }
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Live members, in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = Value> {
        self.members.live_values().into_iter()
    }

    /// Remove every member
    pub fn clear(&self) {
        self.members.drain();
    }
}
