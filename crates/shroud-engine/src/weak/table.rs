//! Weakly-targeted entry table

use super::{Released, WatchId, WeakValue};
use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

struct Slot<V> {
    target: WeakValue,
    watch: WatchId,
    value: V,
}

impl<V> Slot<V> {
    /// Remove this slot's hook from a still-alive target
    fn disarm(&self) {
        if let Some(target) = self.target.upgrade() {
            if let Some(lifeline) = target.lifeline() {
                lifeline.unwatch(self.watch);
            }
        }
    }
}

type EvictFn<K> = Rc<dyn Fn(&K)>;

struct TableInner<K, V> {
    slots: RefCell<FxHashMap<K, Slot<V>>>,
    on_evict: RefCell<Option<EvictFn<K>>>,
}

impl<K: Eq + Hash, V> TableInner<K, V> {
    /// Called from a dying target's lifeline
    ///
    /// The removed value is handed back to the lifeline instead of being
    /// dropped here: its drop may run host code, which must not see the
    /// dead target's entries in other tables.
    fn evict(&self, key: &K, watch: WatchId) -> Option<V> {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            match slots.get(key) {
                Some(slot) if slot.watch == watch => slots.remove(key),
                _ => None,
            }
        }?;
        let observer = self.on_evict.borrow().clone();
        if let Some(observer) = observer {
            observer(key);
        }
        Some(removed.value)
    }
}

impl<K, V> Drop for TableInner<K, V> {
    fn drop(&mut self) {
        for (_, slot) in self.slots.get_mut().drain() {
            slot.disarm();
        }
    }
}

/// Table whose entries live exactly as long as their target
///
/// Each entry is `(key, weak target, value)`. Inserting an entry arms a hook
/// on the target's [`Lifeline`](super::Lifeline) that removes the entry when
/// the target dies. The hook only holds a weak link back to the table, so it
/// does nothing if the table is gone by then.
///
/// Cloning a `WeakTable` yields another handle to the same entries.
///
/// Entries are always removed from the table before the removed value is
/// dropped; no borrow is held while foreign code runs.
pub struct WeakTable<K, V> {
    inner: Rc<TableInner<K, V>>,
}

impl<K, V> Clone for WeakTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Default for WeakTable<K, V> {
    fn default() -> Self {
        Self {
            inner: Rc::new(TableInner {
                slots: RefCell::new(FxHashMap::default()),
                on_evict: RefCell::new(None),
            }),
        }
    }
}

impl<K, V> WeakTable<K, V>
where
    K: Copy + Eq + Hash + 'static,
    V: 'static,
{
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an observer called after an entry is evicted by its
    /// target's death. Explicit removals do not notify.
    pub fn on_evict(&self, observer: impl Fn(&K) + 'static) {
        *self.inner.on_evict.borrow_mut() = Some(Rc::new(observer));
    }

    /// Insert an entry targeting `target`
    ///
    /// Returns the value previously stored under `key`. Fails with
    /// `WrongType` if `target` cannot be weakly referenced.
    pub fn insert(&self, key: K, target: &Value, value: V) -> EngineResult<Option<V>> {
        let (Some(weak), Some(lifeline)) = (target.downgrade(), target.lifeline()) else {
            return Err(EngineError::wrong_type(
                "weakly referenceable object",
                target.type_name(),
            ));
        };

        let table: Weak<TableInner<K, V>> = Rc::downgrade(&self.inner);
        let watch = lifeline.watch_with_id(move |watch| {
            let table = table.upgrade()?;
            let value = table.evict(&key, watch)?;
            Some(Box::new(value) as Released)
        });

        let previous = self.inner.slots.borrow_mut().insert(
            key,
            Slot {
                target: weak,
                watch,
                value,
            },
        );
        Ok(previous.map(|slot| {
            slot.disarm();
            slot.value
        }))
    }

    /// Check whether `key` has a live entry
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner
            .slots
            .borrow()
            .get(key)
            .is_some_and(|slot| slot.target.is_alive())
    }

    /// Get the live target stored under `key`
    pub fn target(&self, key: &K) -> Option<Value> {
        let target = self.inner.slots.borrow().get(key).map(|slot| slot.target.clone())?;
        target.upgrade()
    }

    /// Remove an entry without waiting for its target to die
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.inner.slots.borrow_mut().remove(key)?;
        removed.disarm();
        Some(removed.value)
    }

    /// Detach every entry, leaving the table empty
    pub fn drain(&self) -> Vec<(K, WeakValue, V)> {
        let slots = std::mem::take(&mut *self.inner.slots.borrow_mut());
        slots
            .into_iter()
            .map(|(key, slot)| {
                slot.disarm();
                (key, slot.target, slot.value)
            })
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.inner.slots.borrow().is_empty()
    }

    /// All keys currently in the table
    pub fn keys(&self) -> Vec<K> {
        self.inner.slots.borrow().keys().copied().collect()
    }

    /// All live targets
    pub fn live_values(&self) -> Vec<Value> {
        let targets: Vec<WeakValue> = self
            .inner
            .slots
            .borrow()
            .values()
            .map(|slot| slot.target.clone())
            .collect();
        targets.iter().filter_map(WeakValue::upgrade).collect()
    }
}

impl<K, V> WeakTable<K, V>
where
    K: Copy + Eq + Hash + 'static,
    V: Clone + 'static,
{
    /// Get the value stored under `key`, if its target is alive
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner
            .slots
            .borrow()
            .get(key)
            .filter(|slot| slot.target.is_alive())
            .map(|slot| slot.value.clone())
    }
}

impl<K, V> fmt::Debug for WeakTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTable")
            .field("len", &self.inner.slots.try_borrow().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}
