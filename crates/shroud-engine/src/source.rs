//! Context sources
//!
//! A [`Source`] is the context object proxies are created against. It owns an
//! identifier, a transform and a parent, plus an open table of generic
//! attributes. Each source is created together with a *shadowless* twin:
//!
//! ```text
//!   owner (shadow overlay) ──Rc──▶ twin (fixed empty overlay)
//!        │                             │
//!        └──────────Rc──▶ SharedState ◀┘   real/generic attributes
//! ```
//!
//! The owner sees its overlay first; the twin (and anything reading
//! `_real_<attr>`) sees only the stored values. The twin refers to itself
//! implicitly, so the pair has no reference cycle.

use crate::attr::{self, REAL_PREFIX};
use crate::error::{EngineError, EngineResult};
use crate::notify;
use crate::object::{Args, MethodDef};
use crate::value::{Identity, Value};
use crate::weak::Lifeline;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Name of the reader returning the shadowless view
pub const SHADOWLESS: &str = "shadowless";

/// Lifecycle method returning its receiver untransformed
pub static ENTER: MethodDef = MethodDef {
    name: "enter",
    body: enter,
};

/// Methods that reach callers without being wrapped
pub(crate) static PASSTHROUGH_METHODS: &[&MethodDef] = &[&ENTER];

fn enter(receiver: &Value, _args: Args) -> EngineResult<Value> {
    Ok(receiver.clone())
}

fn is_builtin_reader(name: &str) -> bool {
    name == SHADOWLESS || name == ENTER.name
}

type AttrMap = FxHashMap<Rc<str>, Value>;

/// Attribute storage shared by a source and its shadowless view
pub(crate) struct SharedState {
    lifeline: Lifeline,
    attrs: RefCell<AttrMap>,
}

impl SharedState {
    pub(crate) fn lifeline(&self) -> &Lifeline {
        &self.lifeline
    }
}

enum Overlay {
    Shadow(RefCell<AttrMap>),
    ReadOnlyEmpty,
}

/// Heap cell of a source
pub struct SourceCell {
    lifeline: Lifeline,
    shared: Rc<SharedState>,
    overlay: Overlay,
    twin: Option<Rc<SourceCell>>,
}

/// Context source
#[derive(Clone)]
pub struct Source(Rc<SourceCell>);

impl Source {
    /// Create a source and its shadowless twin
    pub fn new(id: Value, transform: Value, parent: Value) -> Self {
        let mut attrs = AttrMap::default();
        attrs.insert(Rc::from(attr::ID), id);
        attrs.insert(Rc::from(attr::TRANSFORM), transform);
        attrs.insert(Rc::from(attr::PARENT), parent);

        let shared = Rc::new(SharedState {
            lifeline: Lifeline::new(),
            attrs: RefCell::new(attrs),
        });
        let twin = Rc::new(SourceCell {
            lifeline: Lifeline::new(),
            shared: shared.clone(),
            overlay: Overlay::ReadOnlyEmpty,
            twin: None,
        });
        Source(Rc::new(SourceCell {
            lifeline: Lifeline::new(),
            shared,
            overlay: Overlay::Shadow(RefCell::default()),
            twin: Some(twin),
        }))
    }

    pub(crate) fn from_rc(rc: Rc<SourceCell>) -> Self {
        Source(rc)
    }

    pub(crate) fn downgrade(&self) -> Weak<SourceCell> {
        Rc::downgrade(&self.0)
    }

    /// The shadowless view; a shadowless view is its own view
    pub fn shadowless(&self) -> Source {
        match &self.0.twin {
            Some(twin) => Source(twin.clone()),
            None => self.clone(),
        }
    }

    /// Check whether this is a shadowless view
    pub fn is_shadowless(&self) -> bool {
        self.0.twin.is_none()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Source) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of this view
    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    /// Lifeline of this view
    pub fn lifeline(&self) -> &Lifeline {
        &self.0.lifeline
    }

    /// Key shared by both views; callbacks are registered under it
    pub(crate) fn subject_key(&self) -> Identity {
        Identity::of(&self.0.shared)
    }

    pub(crate) fn shared(&self) -> &Rc<SharedState> {
        &self.0.shared
    }

    /// Read an attribute
    ///
    /// The shadow overlay wins over the stored value; `_real_<attr>` reads
    /// the stored value directly.
    pub fn get(&self, name: &str) -> EngineResult<Value> {
        if name == SHADOWLESS {
            return Ok(Value::Source(self.shadowless()));
        }
        if name == ENTER.name {
            return Ok(Value::method(Value::Source(self.clone()), &ENTER));
        }
        if let Some(real) = name.strip_prefix(REAL_PREFIX) {
            return self.stored(real, name);
        }
        if let Overlay::Shadow(overlay) = &self.0.overlay {
            if let Some(value) = overlay.borrow().get(name) {
                return Ok(value.clone());
            }
        }
        self.stored(name, name)
    }

    fn stored(&self, key: &str, requested: &str) -> EngineResult<Value> {
        self.0
            .shared
            .attrs
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::NoSuchAttribute {
                type_name: "Source".to_string(),
                name: requested.to_string(),
            })
    }

    /// Resolve the stored key for a write, enforcing read-only rules
    fn writable_key<'a>(&self, name: &'a str) -> EngineResult<&'a str> {
        let key = match name.strip_prefix(REAL_PREFIX) {
            Some(real) => real,
            None if self.is_shadowless() => return Err(EngineError::ImmutableContext),
            None => name,
        };
        if is_builtin_reader(key) {
            return Err(EngineError::ReadOnlyAttribute {
                name: key.to_string(),
            });
        }
        if key.is_empty() {
            return Err(EngineError::InvalidAttribute {
                name: name.to_string(),
            });
        }
        Ok(key)
    }

    /// Write an attribute, then fire its change callbacks
    ///
    /// Writes always commit the stored (real) value. Callbacks run after the
    /// write, so they observe the new value.
    pub fn set(&self, name: &str, value: Value) -> EngineResult<()> {
        let key = self.writable_key(name)?;
        let previous = self.0.shared.attrs.borrow_mut().insert(Rc::from(key), value);
        drop(previous);
        notify::fire(self, key)
    }

    /// Delete a generic attribute, then fire its change callbacks
    pub fn del(&self, name: &str) -> EngineResult<()> {
        let key = self.writable_key(name)?;
        if attr::lookup(key).is_some_and(|a| a.is_core()) {
            return Err(EngineError::ReadOnlyAttribute {
                name: key.to_string(),
            });
        }
        let removed = self.0.shared.attrs.borrow_mut().remove(key);
        if removed.is_none() {
            return Err(EngineError::NoSuchAttribute {
                type_name: "Source".to_string(),
                name: name.to_string(),
            });
        }
        drop(removed);
        notify::fire(self, key)
    }

    /// Install a shadow value, visible only through this view
    pub fn shadow(&self, name: &str, value: Value) -> EngineResult<()> {
        let Overlay::Shadow(overlay) = &self.0.overlay else {
            return Err(EngineError::ImmutableContext);
        };
        if name == attr::PARENT || is_builtin_reader(name) {
            return Err(EngineError::ReadOnlyAttribute {
                name: name.to_string(),
            });
        }
        if name.is_empty() || name.starts_with(REAL_PREFIX) {
            return Err(EngineError::InvalidAttribute {
                name: name.to_string(),
            });
        }
        let previous = overlay.borrow_mut().insert(Rc::from(name), value);
        drop(previous);
        Ok(())
    }

    /// Remove a shadow value, returning it
    pub fn unshadow(&self, name: &str) -> EngineResult<Option<Value>> {
        let Overlay::Shadow(overlay) = &self.0.overlay else {
            return Err(EngineError::ImmutableContext);
        };
        let removed = overlay.borrow_mut().remove(name);
        Ok(removed)
    }

    /// Check whether `name` is currently shadowed
    pub fn is_shadowed(&self, name: &str) -> bool {
        match &self.0.overlay {
            Overlay::Shadow(overlay) => overlay.borrow().contains_key(name),
            Overlay::ReadOnlyEmpty => false,
        }
    }

    /// Names of all stored attributes, sorted
    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .shared
            .attrs
            .borrow()
            .keys()
            .map(|k| k.to_string())
            .collect();
        names.sort();
        names
    }

    /// Register a one-shot change callback for `attr`, see [`notify`](crate::notify)
    pub fn notify(&self, attr: &str, observer: &Value, callback: Value) -> EngineResult<()> {
        notify::register(self, attr, observer, callback)
    }

    /// Number of callbacks pending for `attr`
    pub fn callback_count(&self, attr: &str) -> usize {
        notify::pending(self, attr)
    }

    /// The identifier, as seen through this view
    pub fn id(&self) -> EngineResult<Value> {
        self.get(attr::ID)
    }

    /// The transform, as seen through this view
    pub fn transform(&self) -> EngineResult<Value> {
        self.get(attr::TRANSFORM)
    }

    /// The parent
    pub fn parent(&self) -> EngineResult<Value> {
        self.get(attr::PARENT)
    }

    /// The lifecycle `enter` method: this source, untransformed
    pub fn enter(&self) -> Source {
        self.clone()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_shadowless() {
            "shadowless Source"
        } else {
            "Source"
        };
        write!(f, "<{} at {}>", kind, self.identity())
    }
}
