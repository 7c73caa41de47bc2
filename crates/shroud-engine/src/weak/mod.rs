//! Weak references
//!
//! One primitive serves every weak structure in the engine: a [`Lifeline`]
//! (per-object drop hooks) plus a [`WeakTable`] (entries that disappear when
//! their target dies). The proxy cache, the change notifier and the public
//! [`WeakRegistry`] are all built on it.

mod lifeline;
mod registry;
mod table;

pub use lifeline::{Lifeline, Released, WatchId};
pub use registry::WeakRegistry;
pub use table::WeakTable;

use crate::object::{FunctionCell, FunctionRef, MethodCell, MethodRef, Object, ObjectCell, ObjectRef};
use crate::proxy::{Proxy, ProxyCell};
use crate::source::{Source, SourceCell};
use crate::value::{Identity, Value};
use std::fmt;
use std::rc::Weak;

#[derive(Clone)]
enum WeakInner {
    Object(Weak<ObjectCell<dyn Object>>),
    Function(Weak<FunctionCell>),
    Method(Weak<MethodCell>),
    Source(Weak<SourceCell>),
    Proxy(Weak<ProxyCell>),
}

/// Weak handle to a weakly-referenceable [`Value`]
///
/// Objects, functions, bound methods, sources and proxies can be weakly
/// referenced. Everything else cannot.
#[derive(Clone)]
pub struct WeakValue {
    inner: WeakInner,
    identity: Identity,
}

impl WeakValue {
    pub(crate) fn new(value: &Value) -> Option<Self> {
        let inner = match value {
            Value::Object(o) => WeakInner::Object(o.downgrade()),
            Value::Function(f) => WeakInner::Function(f.downgrade()),
            Value::Method(m) => WeakInner::Method(m.downgrade()),
            Value::Source(s) => WeakInner::Source(s.downgrade()),
            Value::Proxy(p) => WeakInner::Proxy(p.downgrade()),
            _ => return None,
        };
        let identity = value.identity()?;
        Some(Self { inner, identity })
    }

    /// Recover a strong value if the target is still alive
    pub fn upgrade(&self) -> Option<Value> {
        match &self.inner {
            WeakInner::Object(w) => w.upgrade().map(|rc| Value::Object(ObjectRef::from_rc(rc))),
            WeakInner::Function(w) => w.upgrade().map(|rc| Value::Function(FunctionRef::from_rc(rc))),
            WeakInner::Method(w) => w.upgrade().map(|rc| Value::Method(MethodRef::from_rc(rc))),
            WeakInner::Source(w) => w.upgrade().map(|rc| Value::Source(Source::from_rc(rc))),
            WeakInner::Proxy(w) => w.upgrade().map(|rc| Value::Proxy(Proxy::from_rc(rc))),
        }
    }

    /// Check whether the target is still alive, without upgrading
    pub fn is_alive(&self) -> bool {
        match &self.inner {
            WeakInner::Object(w) => w.strong_count() > 0,
            WeakInner::Function(w) => w.strong_count() > 0,
            WeakInner::Method(w) => w.strong_count() > 0,
            WeakInner::Source(w) => w.strong_count() > 0,
            WeakInner::Proxy(w) => w.strong_count() > 0,
        }
    }

    /// Identity of the target (stable while the target is alive)
    pub fn identity(&self) -> Identity {
        self.identity
    }
}

impl fmt::Debug for WeakValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_alive() { "alive" } else { "dead" };
        write!(f, "<weak {} at {}>", state, self.identity)
    }
}
