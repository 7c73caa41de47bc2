//! Dynamic value representation
//!
//! Every value that flows through the engine is a [`Value`]. The enum is
//! closed: the engine classifies values into a small set of kinds
//! ([`ValueKind`]) and handles each kind with a dedicated rule, rather than
//! probing open-ended runtime types.
//!
//! # Sharing
//!
//! ```text
//! Atomic:      None, Bool, Int, Float, Complex, Type, Str, Bytes, File, Slice
//! Immutable:   Tuple                      (Rc<[Value]>)
//! Mutable:     List, Dict                 (Rc<RefCell<..>>)
//! Referenced:  Object, Function, Method, Source, Proxy
//! ```
//!
//! Cloning a `Value` never deep-copies: heap variants clone their `Rc`.
//! Referenced variants carry a [`Lifeline`](crate::weak::Lifeline) and can be
//! weakly referenced; everything else cannot.

use crate::object::{Dict, FunctionRef, MethodRef, Object, ObjectRef};
use crate::proxy::Proxy;
use crate::source::Source;
use crate::weak::{Lifeline, WeakValue};
use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::rc::Rc;

/// Identity of a heap value (its allocation address)
///
/// Two live values have the same identity iff they are the same object.
/// Identities are only meaningful while the value is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(usize);

impl Identity {
    /// Identity of an `Rc` allocation
    #[inline]
    pub fn of<T: ?Sized>(rc: &Rc<T>) -> Self {
        Identity(Rc::as_ptr(rc) as *const () as usize)
    }

    /// Get the raw address
    #[inline]
    pub fn addr(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Complex number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl Complex {
    /// Create a complex number
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// Slice bounds, as produced by `a[start:stop:step]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Slice {
    /// Start index
    pub start: Option<i64>,
    /// Stop index (exclusive)
    pub stop: Option<i64>,
    /// Step
    pub step: Option<i64>,
}

impl Slice {
    /// Create a `start:stop` slice
    pub const fn new(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// Resolve the bounds against a sequence length, clamping like a
    /// sequence slice does. Steps other than 1 are not supported.
    pub fn resolve(&self, len: usize) -> (usize, usize) {
        let clamp = |i: i64| -> usize {
            if i < 0 {
                (len as i64 + i).max(0) as usize
            } else {
                (i as usize).min(len)
            }
        };
        let start = self.start.map(clamp).unwrap_or(0);
        let stop = self.stop.map(clamp).unwrap_or(len);
        (start, stop.max(start))
    }
}

/// Open file handle, shared by reference
#[derive(Clone)]
pub struct FileHandle(Rc<RefCell<File>>);

impl FileHandle {
    /// Wrap an open file
    pub fn new(file: File) -> Self {
        Self(Rc::new(RefCell::new(file)))
    }

    /// Run `f` with exclusive access to the file
    pub fn with_file<R>(&self, f: impl FnOnce(&mut File) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    /// Identity of the handle
    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<file at {}>", self.identity())
    }
}

/// Engine value
#[derive(Clone, Default)]
pub enum Value {
    /// The none value
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Complex number
    Complex(Complex),
    /// Type/class object, by name
    Type(Rc<str>),
    /// String
    Str(Rc<str>),
    /// Byte buffer
    Bytes(Rc<[u8]>),
    /// File handle
    File(FileHandle),
    /// Slice bounds
    Slice(Slice),
    /// Fixed-size ordered sequence
    Tuple(Rc<[Value]>),
    /// Resizable ordered sequence
    List(Rc<RefCell<Vec<Value>>>),
    /// Key/value mapping
    Dict(Rc<RefCell<Dict>>),
    /// Host object implementing the [`Object`] protocol
    Object(ObjectRef),
    /// Native function
    Function(FunctionRef),
    /// Method bound to a receiver
    Method(MethodRef),
    /// Context source
    Source(Source),
    /// Context proxy
    Proxy(Proxy),
}

/// Classification used by the transformation engine
///
/// Variants are listed in the priority order in which the engine tests them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Host object that transforms itself under a context
    Translatable,
    /// Never wrapped: none, bool, numbers, type, str, bytes, file, slice
    Atomic,
    /// An existing proxy
    Proxy,
    /// Fixed-size sequence, transformed element-wise into a new tuple
    Tuple,
    /// Resizable sequence, transformed element-wise into a new list
    List,
    /// Mapping, transformed key- and value-wise into a new dict
    Dict,
    /// Bound method that must reach the caller unwrapped
    EscapeHatch,
    /// Everything else: wrapped in a proxy
    Other,
}

impl Value {
    /// Create a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Create a bytes value
    pub fn bytes(b: impl AsRef<[u8]>) -> Self {
        Value::Bytes(Rc::from(b.as_ref()))
    }

    /// Create a type value
    pub fn type_of(name: impl AsRef<str>) -> Self {
        Value::Type(Rc::from(name.as_ref()))
    }

    /// Create a tuple from its elements
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    /// Create a list from its elements
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Create a dict value
    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    /// Wrap a host object
    pub fn object<T: Object>(object: T) -> Self {
        Value::Object(ObjectRef::new(object))
    }

    /// Classify this value for transformation
    pub fn kind(&self) -> ValueKind {
        match self {
            // Translatable is checked first: a translatable host object may
            // also behave like a sequence.
            Value::Object(obj) if obj.as_translatable().is_some() => ValueKind::Translatable,
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Complex(_)
            | Value::Type(_)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::File(_)
            | Value::Slice(_) => ValueKind::Atomic,
            Value::Proxy(_) => ValueKind::Proxy,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Method(method) if method.is_passthrough() => ValueKind::EscapeHatch,
            Value::Object(_) | Value::Function(_) | Value::Method(_) | Value::Source(_) => {
                ValueKind::Other
            }
        }
    }

    /// Check if this value is none
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Check if this value is a proxy
    #[inline]
    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }

    /// Extract a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a source
    pub fn as_source(&self) -> Option<&Source> {
        match self {
            Value::Source(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a proxy
    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Extract a host object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Downcast a host object value to its concrete type
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_object()?.downcast_ref::<T>()
    }

    /// Identity of a heap value; `None` for values without identity
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Value::Tuple(t) => Some(Identity::of(t)),
            Value::List(l) => Some(Identity::of(l)),
            Value::Dict(d) => Some(Identity::of(d)),
            Value::File(f) => Some(f.identity()),
            Value::Object(o) => Some(o.identity()),
            Value::Function(f) => Some(f.identity()),
            Value::Method(m) => Some(m.identity()),
            Value::Source(s) => Some(s.identity()),
            Value::Proxy(p) => Some(p.identity()),
            _ => None,
        }
    }

    /// Identity comparison
    ///
    /// Heap values compare by identity; values without identity compare by
    /// content.
    pub fn is(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (self, other) {
                (Value::None, Value::None) => true,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
                (Value::Complex(a), Value::Complex(b)) => a == b,
                (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b) || a == b,
                (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
                (Value::Bytes(a), Value::Bytes(b)) => Rc::ptr_eq(a, b),
                (Value::Slice(a), Value::Slice(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    /// Lifeline of a weakly-referenceable value
    pub fn lifeline(&self) -> Option<&Lifeline> {
        match self {
            Value::Object(o) => Some(o.lifeline()),
            Value::Function(f) => Some(f.lifeline()),
            Value::Method(m) => Some(m.lifeline()),
            Value::Source(s) => Some(s.lifeline()),
            Value::Proxy(p) => Some(p.lifeline()),
            _ => None,
        }
    }

    /// Create a weak handle; `None` if the value cannot be weakly referenced
    pub fn downgrade(&self) -> Option<WeakValue> {
        WeakValue::new(self)
    }

    /// Get type name for diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Complex(_) => "complex".to_string(),
            Value::Type(_) => "type".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::File(_) => "file".to_string(),
            Value::Slice(_) => "slice".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Object(o) => o.type_name().to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Method(_) => "method".to_string(),
            Value::Source(_) => "Source".to_string(),
            Value::Proxy(_) => "Proxy".to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "bool({})", b),
            Value::Int(i) => write!(f, "int({})", i),
            Value::Float(x) => write!(f, "float({})", x),
            Value::Complex(c) => write!(f, "complex({}, {})", c.re, c.im),
            Value::Type(name) => write!(f, "type({})", name),
            Value::Str(s) => write!(f, "str({:?})", s),
            Value::Bytes(b) => write!(f, "bytes({:?})", b),
            Value::File(h) => write!(f, "{:?}", h),
            Value::Slice(s) => write!(f, "slice({:?}, {:?}, {:?})", s.start, s.stop, s.step),
            Value::Tuple(items) => f.debug_tuple("tuple").field(&&items[..]).finish(),
            Value::List(items) => match items.try_borrow() {
                Ok(items) => f.debug_tuple("list").field(&&items[..]).finish(),
                Err(_) => write!(f, "list(<borrowed>)"),
            },
            Value::Dict(d) => write!(f, "dict(len={})", d.try_borrow().map(|d| d.len()).unwrap_or(0)),
            Value::Object(o) => write!(f, "<{} object at {}>", o.type_name(), o.identity()),
            Value::Function(func) => write!(f, "<function {} at {}>", func.name(), func.identity()),
            Value::Method(m) => write!(f, "<method {} at {}>", m.name(), m.identity()),
            Value::Source(s) => write!(f, "{:?}", s),
            Value::Proxy(p) => write!(f, "{:?}", p),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Source> for Value {
    fn from(s: Source) -> Self {
        Value::Source(s)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Proxy(p)
    }
}
