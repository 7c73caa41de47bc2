//! Drop hooks attached to weakly-referenceable values

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle for a hook registered on a [`Lifeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        WatchId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Payload a hook detached from some table, dropped once every hook has run
pub type Released = Box<dyn Any>;

type Hook = Box<dyn FnOnce() -> Option<Released>>;

/// Per-object list of drop hooks
///
/// Every weakly-referenceable value owns exactly one lifeline. When the value
/// is dropped, the lifeline detaches all hooks first and then runs each of
/// them once, so a hook may freely touch other lifelines or tables.
///
/// Whatever the hooks release is dropped only after the last hook returned.
/// Dropping a released value may run host code; by then no table holds an
/// entry for the dead owner.
#[derive(Default)]
pub struct Lifeline {
    hooks: RefCell<Vec<(WatchId, Hook)>>,
}

impl Lifeline {
    /// Create an empty lifeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook to run when the owner dies
    pub fn watch(&self, hook: impl FnOnce() + 'static) -> WatchId {
        self.watch_with_id(move |_| {
            hook();
            None
        })
    }

    /// Register a hook that receives its own [`WatchId`] when it runs
    ///
    /// The hook may hand back a payload it removed from a table. Payloads
    /// are held until every hook of this lifeline has run.
    pub fn watch_with_id(&self, hook: impl FnOnce(WatchId) -> Option<Released> + 'static) -> WatchId {
        let id = WatchId::next();
        self.hooks.borrow_mut().push((id, Box::new(move || hook(id))));
        id
    }

    /// Remove a hook without running it
    ///
    /// Returns `false` if the hook was not registered (or already ran).
    pub fn unwatch(&self, id: WatchId) -> bool {
        let removed = {
            let mut hooks = self.hooks.borrow_mut();
            hooks
                .iter()
                .position(|(watch, _)| *watch == id)
                .map(|index| hooks.swap_remove(index))
        };
        removed.is_some()
    }

    /// Number of registered hooks
    pub fn watcher_count(&self) -> usize {
        self.hooks.borrow().len()
    }
}

impl Drop for Lifeline {
    fn drop(&mut self) {
        let hooks = std::mem::take(self.hooks.get_mut());
        let released: Vec<Released> = hooks.into_iter().filter_map(|(_, hook)| hook()).collect();
        drop(released);
    }
}

impl fmt::Debug for Lifeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifeline")
            .field("watchers", &self.hooks.try_borrow().map(|h| h.len()).unwrap_or(0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_hooks_run_on_drop() {
        let fired = Rc::new(Cell::new(0));
        let lifeline = Lifeline::new();
        for _ in 0..3 {
            let fired = fired.clone();
            lifeline.watch(move || fired.set(fired.get() + 1));
        }
        assert_eq!(lifeline.watcher_count(), 3);
        drop(lifeline);
        assert_eq!(fired.get(), 3);
    }

    #[test]
    fn test_unwatch() {
        let fired = Rc::new(Cell::new(false));
        let lifeline = Lifeline::new();
        let flag = fired.clone();
        let id = lifeline.watch(move || flag.set(true));

        assert!(lifeline.unwatch(id));
        assert!(!lifeline.unwatch(id));
        drop(lifeline);
        assert!(!fired.get());
    }

    #[test]
    fn test_released_payloads_outlive_every_hook() {
        struct Payload(Rc<Cell<usize>>, Rc<Cell<usize>>);

        impl Drop for Payload {
            fn drop(&mut self) {
                // Every hook has already run.
                self.1.set(self.0.get());
            }
        }

        let hooks_run = Rc::new(Cell::new(0));
        let seen_at_drop = Rc::new(Cell::new(usize::MAX));
        let lifeline = Lifeline::new();

        let (run, seen) = (hooks_run.clone(), seen_at_drop.clone());
        lifeline.watch_with_id(move |_| {
            run.set(run.get() + 1);
            Some(Box::new(Payload(run, seen)) as Released)
        });
        for _ in 0..2 {
            let run = hooks_run.clone();
            lifeline.watch(move || run.set(run.get() + 1));
        }

        drop(lifeline);
        assert_eq!(hooks_run.get(), 3);
        assert_eq!(seen_at_drop.get(), 3);
    }

    #[test]
    fn test_watch_ids_are_unique() {
        let lifeline = Lifeline::new();
        let a = lifeline.watch(|| {});
        let b = lifeline.watch(|| {});
        assert_ne!(a, b);
    }
}
