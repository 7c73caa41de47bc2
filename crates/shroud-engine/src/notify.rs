//! Change notification
//!
//! Observers register one-shot callbacks for an attribute of a source. The
//! next write to that attribute (through either view of the source) calls
//! every registered callback once, with the observer as its only argument.
//!
//! Neither side is kept alive by a registration: the observer's death removes
//! its callback, and the subject's death removes all of its callbacks.
//!
//! ```text
//! subject key ─▶ attr ─▶ WeakTable<observer identity, callback>
//! ```

use crate::attr::{self, Attr};
use crate::error::{EngineError, EngineResult};
use crate::object::Args;
use crate::proxy;
use crate::source::{SharedState, Source};
use crate::value::{Identity, Value};
use crate::weak::{Released, WatchId, WeakTable};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type CallbackTable = WeakTable<Identity, Value>;
type SubjectMap = FxHashMap<Identity, SubjectEntry>;

struct SubjectEntry {
    shared: Weak<SharedState>,
    watch: WatchId,
    attrs: FxHashMap<Attr, CallbackTable>,
}

impl SubjectEntry {
    /// Remove the subject-death hook from a still-alive subject
    fn disarm(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.lifeline().unwatch(self.watch);
        }
    }
}

/// Cleanup triggered by a death
#[derive(Debug, Clone, Copy)]
enum Sweep {
    /// An observer died; the attr entry may be empty now
    Attr(Identity, Attr),
    /// The subject died
    Subject(Identity),
}

#[derive(Default)]
struct Tables {
    subjects: RefCell<SubjectMap>,
    /// Cleanups that found `subjects` in use, applied by the next operation
    deferred: RefCell<Vec<Sweep>>,
}

impl Tables {
    /// Apply a cleanup now, or queue it if the subject map is borrowed
    ///
    /// Returns what the cleanup removed; the caller drops it outside every
    /// borrow.
    fn sweep(&self, sweep: Sweep) -> Option<Released> {
        let Ok(mut subjects) = self.subjects.try_borrow_mut() else {
            self.deferred.borrow_mut().push(sweep);
            return None;
        };
        match sweep {
            Sweep::Subject(key) => subjects.remove(&key).map(|entry| Box::new(entry) as Released),
            Sweep::Attr(key, attr) => {
                let entry = subjects.get_mut(&key)?;
                let table = match entry.attrs.get(&attr) {
                    Some(table) if table.is_empty() => entry.attrs.remove(&attr),
                    _ => None,
                };
                let emptied = if entry.attrs.is_empty() {
                    subjects.remove(&key)
                } else {
                    None
                };
                drop(subjects);
                if let Some(entry) = &emptied {
                    entry.disarm();
                }
                Some(Box::new((table, emptied)) as Released)
            }
        }
    }

    /// Apply every queued cleanup
    fn settle(&self) {
        let queued = std::mem::take(&mut *self.deferred.borrow_mut());
        if queued.is_empty() {
            return;
        }
        tracing::debug!(sweeps = queued.len(), "applying deferred notifier cleanup");
        let released: Vec<Released> = queued.into_iter().filter_map(|sweep| self.sweep(sweep)).collect();
        drop(released);
    }
}

#[derive(Default)]
struct Notifier {
    tables: Rc<Tables>,
}

impl Notifier {
    /// Callback table for (subject, attr), created on demand
    fn table(&self, subject: &Source, attr: Attr) -> CallbackTable {
        self.tables.settle();
        let key = subject.subject_key();
        let mut subjects = self.tables.subjects.borrow_mut();
        let entry = subjects.entry(key).or_insert_with(|| {
            let tables = Rc::downgrade(&self.tables);
            let watch = subject.shared().lifeline().watch_with_id(move |_| {
                tables.upgrade()?.sweep(Sweep::Subject(key))
            });
            SubjectEntry {
                shared: Rc::downgrade(subject.shared()),
                watch,
                attrs: FxHashMap::default(),
            }
        });
        entry
            .attrs
            .entry(attr)
            .or_insert_with(|| {
                let table = CallbackTable::new();
                let tables = Rc::downgrade(&self.tables);
                table.on_evict(move |_| {
                    if let Some(tables) = tables.upgrade() {
                        // Only emptied tables come back; dropping them runs no host code.
                        drop(tables.sweep(Sweep::Attr(key, attr)));
                    }
                });
                table
            })
            .clone()
    }

    /// Take the callback table for (subject, attr) out of the notifier
    fn detach(&self, key: Identity, attr: Attr) -> Option<CallbackTable> {
        self.tables.settle();
        let (table, emptied) = {
            let mut subjects = self.tables.subjects.borrow_mut();
            let entry = subjects.get_mut(&key)?;
            let table = entry.attrs.remove(&attr);
            let emptied = if entry.attrs.is_empty() {
                subjects.remove(&key)
            } else {
                None
            };
            (table, emptied)
        };
        if let Some(entry) = emptied {
            entry.disarm();
        }
        table
    }

    fn pending(&self, key: Identity, attr: Attr) -> usize {
        self.tables.settle();
        self.tables
            .subjects
            .borrow()
            .get(&key)
            .and_then(|entry| entry.attrs.get(&attr))
            .map_or(0, CallbackTable::len)
    }

    fn tracked_subjects(&self) -> usize {
        self.tables.settle();
        self.tables.subjects.borrow().len()
    }
}

thread_local! {
    static NOTIFIER: Notifier = Notifier::default();
}

/// Register `callback` to be called once, with `observer`, after the next
/// write to `subject.attr`
///
/// Registering the same observer again for the same (subject, attr) replaces
/// its callback.
///
/// # Errors
///
/// - `ImmutableContext` if `subject` is a shadowless view
/// - `InvalidAttribute` if `attr` is not a legal attribute name
/// - `NotCallable` if `callback` is not callable
/// - `WrongType` if `observer` cannot be weakly referenced
pub fn register(subject: &Source, attr: &str, observer: &Value, callback: Value) -> EngineResult<()> {
    if subject.is_shadowless() {
        return Err(EngineError::ImmutableContext);
    }
    let Some(symbol) = attr::lookup(attr) else {
        return Err(EngineError::InvalidAttribute {
            name: attr.to_string(),
        });
    };
    if !callback.is_callable() {
        return Err(EngineError::NotCallable {
            type_name: callback.type_name(),
        });
    }
    let Some(observer_key) = observer.downgrade().map(|weak| weak.identity()) else {
        return Err(EngineError::wrong_type(
            "weakly referenceable observer",
            observer.type_name(),
        ));
    };

    let table = NOTIFIER.with(|notifier| notifier.table(subject, symbol));
    let previous = table.insert(observer_key, observer, callback)?;
    if previous.is_some() {
        tracing::debug!(attr, "replaced change callback");
    }
    drop(previous);
    Ok(())
}

/// Validate dynamic arguments and register a change callback
///
/// `subject` may be a source or a proxy of one.
///
/// # Errors
///
/// `WrongType` if `subject` is not a source or `attr` is not a string, plus
/// every error of [`register`].
pub fn notify(subject: &Value, attr: &Value, observer: &Value, callback: Value) -> EngineResult<()> {
    let subject = proxy::unwrap(subject);
    let Some(source) = subject.as_source() else {
        return Err(EngineError::wrong_type("Source", subject.type_name()));
    };
    let Some(attr) = attr.as_str() else {
        return Err(EngineError::wrong_type("str", attr.type_name()));
    };
    register(source, attr, observer, callback)
}

/// Call and forget every callback registered for (subject, attr)
///
/// The callback set is detached before anything is called, so callbacks that
/// register again are kept for the next write. Every callback runs even if
/// another one fails; the first failure is returned.
///
/// # Panics
///
/// Panics with `DeadObserverInvariantViolation` if the detached set holds a
/// callback for an observer that is already dead.
pub(crate) fn fire(subject: &Source, attr: &str) -> EngineResult<()> {
    let Some(symbol) = attr::lookup(attr) else {
        return Ok(());
    };
    let key = subject.subject_key();
    let Some(table) = NOTIFIER
        .try_with(|notifier| notifier.detach(key, symbol))
        .ok()
        .flatten()
    else {
        return Ok(());
    };
    let entries = table.drain();
    drop(table);

    if entries.iter().any(|(_, observer, _)| !observer.is_alive()) {
        panic!(
            "{}",
            EngineError::DeadObserverInvariantViolation {
                attr: attr.to_string()
            }
        );
    }
    tracing::debug!(attr, callbacks = entries.len(), "firing change callbacks");

    let mut first_error = None;
    for (_, observer, callback) in entries {
        // An earlier callback may have dropped the last reference.
        let Some(observer) = observer.upgrade() else {
            tracing::debug!(attr, "observer died during notification, skipping");
            continue;
        };
        if let Err(err) = callback.call(Args::new(vec![observer])) {
            tracing::debug!(attr, error = %err, "change callback failed");
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Number of callbacks pending for (subject, attr)
pub fn pending(subject: &Source, attr: &str) -> usize {
    let Some(symbol) = attr::lookup(attr) else {
        return 0;
    };
    NOTIFIER.with(|notifier| notifier.pending(subject.subject_key(), symbol))
}

/// Number of subjects with at least one pending callback
pub fn tracked_subjects() -> usize {
    NOTIFIER.with(Notifier::tracked_subjects)
}
