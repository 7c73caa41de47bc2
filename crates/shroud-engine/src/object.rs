//! Host object protocol
//!
//! Host code plugs its own types into the engine by implementing [`Object`].
//! Every operation has a default that fails with a typed error, so an
//! implementation only overrides what its type supports.
//!
//! Values that transform themselves under a context (rather than being
//! proxied) additionally expose [`Translatable`] through
//! [`Object::as_translatable`].

use crate::error::{EngineError, EngineResult};
use crate::render::RenderMode;
use crate::value::{Identity, Value};
use crate::weak::Lifeline;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

/// Iterator over values produced by an iteration protocol
pub type ValueIter = Box<dyn Iterator<Item = EngineResult<Value>>>;

/// Host object protocol
pub trait Object: Any {
    /// Type name used in diagnostics and rendering
    fn type_name(&self) -> &str;

    /// Attribute read
    fn get_attr(&self, name: &str) -> EngineResult<Value> {
        Err(EngineError::NoSuchAttribute {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        })
    }

    /// Attribute write
    fn set_attr(&self, _name: &str, _value: Value) -> EngineResult<()> {
        Err(EngineError::unsupported(self.type_name(), "attribute assignment"))
    }

    /// Attribute deletion
    fn del_attr(&self, _name: &str) -> EngineResult<()> {
        Err(EngineError::unsupported(self.type_name(), "attribute deletion"))
    }

    /// Whether [`Object::call`] is supported
    fn is_callable(&self) -> bool {
        false
    }

    /// Call the object
    fn call(&self, _args: Args) -> EngineResult<Value> {
        Err(EngineError::NotCallable {
            type_name: self.type_name().to_string(),
        })
    }

    /// Number of items
    fn len(&self) -> EngineResult<usize> {
        Err(EngineError::unsupported(self.type_name(), "len()"))
    }

    /// Item read
    fn get_item(&self, _key: &Value) -> EngineResult<Value> {
        Err(EngineError::unsupported(self.type_name(), "item access"))
    }

    /// Item write
    fn set_item(&self, _key: Value, _value: Value) -> EngineResult<()> {
        Err(EngineError::unsupported(self.type_name(), "item assignment"))
    }

    /// Item deletion
    fn del_item(&self, _key: &Value) -> EngineResult<()> {
        Err(EngineError::unsupported(self.type_name(), "item deletion"))
    }

    /// Slice read
    fn get_slice(&self, _start: i64, _stop: i64) -> EngineResult<Value> {
        Err(EngineError::unsupported(self.type_name(), "slicing"))
    }

    /// Slice write
    fn set_slice(&self, _start: i64, _stop: i64, _value: Value) -> EngineResult<()> {
        Err(EngineError::unsupported(self.type_name(), "slice assignment"))
    }

    /// Membership test
    fn contains(&self, _item: &Value) -> EngineResult<bool> {
        Err(EngineError::unsupported(self.type_name(), "membership test"))
    }

    /// Iteration
    fn iter(&self) -> EngineResult<ValueIter> {
        Err(EngineError::unsupported(self.type_name(), "iteration"))
    }

    /// Equality; `None` falls back to identity
    fn eq_value(&self, _other: &Value) -> EngineResult<Option<bool>> {
        Ok(None)
    }

    /// Ordering
    fn compare(&self, other: &Value) -> EngineResult<Ordering> {
        Err(EngineError::Unorderable {
            left: self.type_name().to_string(),
            right: other.type_name(),
        })
    }

    /// Hash; `None` falls back to identity
    fn hash_value(&self) -> EngineResult<Option<u64>> {
        Ok(None)
    }

    /// Informal string form
    fn to_str(&self) -> EngineResult<String> {
        self.repr()
    }

    /// Debugging string form
    fn repr(&self) -> EngineResult<String> {
        Ok(format!("<{} object>", self.type_name()))
    }

    /// Structured rendering: the chunks that make up this object's string
    /// form, to be rendered under a proxy's context
    fn render_parts(&self, _mode: RenderMode) -> Option<EngineResult<Vec<Value>>> {
        None
    }

    /// Self-transformation capability
    fn as_translatable(&self) -> Option<&dyn Translatable> {
        None
    }
}

/// Capability of values that transform themselves under a context
///
/// The context handed in is the shadowless view when the engine was given a
/// raw source, or the context proxy unchanged otherwise.
pub trait Translatable {
    /// Express this value in `context`'s coordinates
    fn apply_context(&self, context: &Value) -> EngineResult<Value>;

    /// Express this value outside `context`'s coordinates
    fn remove_context(&self, context: &Value) -> EngineResult<Value>;
}

/// Call arguments
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Positional arguments
    pub positional: Vec<Value>,
    /// Keyword arguments, in call order
    pub keyword: Vec<(Rc<str>, Value)>,
}

impl Args {
    /// Positional-only arguments
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keyword: Vec::new(),
        }
    }

    /// Add a keyword argument
    pub fn with_keyword(mut self, name: &str, value: Value) -> Self {
        self.keyword.push((Rc::from(name), value));
        self
    }

    /// Positional argument at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument by name
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, value)| value)
    }

    /// Total number of arguments
    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    /// Check if there are no arguments
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to every argument, failing on the first error
    pub fn try_map(self, mut f: impl FnMut(Value) -> EngineResult<Value>) -> EngineResult<Args> {
        let positional = self
            .positional
            .into_iter()
            .map(&mut f)
            .collect::<EngineResult<Vec<_>>>()?;
        let keyword = self
            .keyword
            .into_iter()
            .map(|(name, value)| Ok((name, f(value)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Args { positional, keyword })
    }
}

/// Heap cell of a host object; the lifeline is dropped before the object
pub struct ObjectCell<T: ?Sized> {
    lifeline: Lifeline,
    object: T,
}

/// Shared reference to a host object
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell<dyn Object>>);

impl ObjectRef {
    /// Move a host object onto the heap
    pub fn new<T: Object>(object: T) -> Self {
        let cell: Rc<ObjectCell<dyn Object>> = Rc::new(ObjectCell {
            lifeline: Lifeline::new(),
            object,
        });
        Self(cell)
    }

    pub(crate) fn from_rc(rc: Rc<ObjectCell<dyn Object>>) -> Self {
        Self(rc)
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectCell<dyn Object>> {
        Rc::downgrade(&self.0)
    }

    /// Downcast to the concrete host type
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        let any: &dyn Any = &self.0.object;
        any.downcast_ref::<T>()
    }

    /// Identity of the object
    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    /// Lifeline of the object
    pub fn lifeline(&self) -> &Lifeline {
        &self.0.lifeline
    }
}

impl std::ops::Deref for ObjectRef {
    type Target = dyn Object;

    fn deref(&self) -> &Self::Target {
        &self.0.object
    }
}

/// Native function body
pub type NativeFn = dyn Fn(Args) -> EngineResult<Value>;

/// Heap cell of a native function
pub struct FunctionCell {
    lifeline: Lifeline,
    name: Rc<str>,
    body: Box<NativeFn>,
}

/// Shared reference to a native function
#[derive(Clone)]
pub struct FunctionRef(Rc<FunctionCell>);

impl FunctionRef {
    pub(crate) fn from_rc(rc: Rc<FunctionCell>) -> Self {
        Self(rc)
    }

    pub(crate) fn downgrade(&self) -> Weak<FunctionCell> {
        Rc::downgrade(&self.0)
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Invoke the function
    pub fn call(&self, args: Args) -> EngineResult<Value> {
        (self.0.body)(args)
    }

    /// Identity of the function
    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    /// Lifeline of the function
    pub fn lifeline(&self) -> &Lifeline {
        &self.0.lifeline
    }
}

impl Value {
    /// Wrap a Rust closure as a callable value
    pub fn function(
        name: &str,
        body: impl Fn(Args) -> EngineResult<Value> + 'static,
    ) -> Value {
        Value::Function(FunctionRef(Rc::new(FunctionCell {
            lifeline: Lifeline::new(),
            name: Rc::from(name),
            body: Box::new(body),
        })))
    }

    /// Bind a method definition to a receiver
    pub fn method(receiver: Value, def: &'static MethodDef) -> Value {
        Value::Method(MethodRef(Rc::new(MethodCell {
            lifeline: Lifeline::new(),
            receiver,
            def,
        })))
    }
}

/// Static method definition
pub struct MethodDef {
    /// Method name
    pub name: &'static str,
    /// Method body; receives the bound receiver
    pub body: fn(&Value, Args) -> EngineResult<Value>,
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDef({})", self.name)
    }
}

/// Heap cell of a bound method
pub struct MethodCell {
    lifeline: Lifeline,
    receiver: Value,
    def: &'static MethodDef,
}

/// Shared reference to a bound method
#[derive(Clone)]
pub struct MethodRef(Rc<MethodCell>);

impl MethodRef {
    pub(crate) fn from_rc(rc: Rc<MethodCell>) -> Self {
        Self(rc)
    }

    pub(crate) fn downgrade(&self) -> Weak<MethodCell> {
        Rc::downgrade(&self.0)
    }

    /// Method name
    pub fn name(&self) -> &str {
        self.0.def.name
    }

    /// Bound receiver
    pub fn receiver(&self) -> &Value {
        &self.0.receiver
    }

    /// Method definition
    pub fn def(&self) -> &'static MethodDef {
        self.0.def
    }

    /// Whether this method must reach callers untransformed
    pub fn is_passthrough(&self) -> bool {
        crate::source::PASSTHROUGH_METHODS
            .iter()
            .any(|def| std::ptr::eq(*def, self.0.def))
    }

    /// Invoke the method
    pub fn call(&self, args: Args) -> EngineResult<Value> {
        (self.0.def.body)(&self.0.receiver, args)
    }

    /// Identity of the bound method
    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    /// Lifeline of the bound method
    pub fn lifeline(&self) -> &Lifeline {
        &self.0.lifeline
    }
}

/// Entry of a [`Dict`]
#[derive(Debug, Clone)]
pub(crate) struct DictEntry {
    pub(crate) hash: u64,
    pub(crate) key: Value,
    pub(crate) value: Value,
}

/// Insertion-ordered mapping
///
/// Keys must be hashable. Entries live in insertion order; a side index maps
/// each key hash to the positions holding it, so a lookup only runs full
/// equality against keys with the same hash. All key comparison goes through
/// the protocol layer (`Value::dict_get` and friends) so that no borrow is
/// held while host code runs.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<DictEntry>,
    by_hash: FxHashMap<u64, Vec<usize>>,
}

impl Dict {
    /// Create an empty dict
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dict from key/value pairs; later keys replace earlier ones
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> EngineResult<Self> {
        let mut dict = Dict::new();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the dict is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    /// Values in insertion order
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.value.clone()).collect()
    }

    /// Key/value pairs in insertion order
    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }

    /// Look up `key`
    pub fn get(&self, key: &Value) -> EngineResult<Option<Value>> {
        let hash = key.hash_value()?;
        Ok(self
            .position(hash, key)?
            .map(|index| self.entries[index].value.clone()))
    }

    /// Insert, returning the previous value for an equal key
    pub fn insert(&mut self, key: Value, value: Value) -> EngineResult<Option<Value>> {
        let hash = key.hash_value()?;
        match self.position(hash, &key)? {
            Some(index) => Ok(self.replace_value(index, value)),
            None => {
                self.push(hash, key, value);
                Ok(None)
            }
        }
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &Value) -> EngineResult<Option<Value>> {
        let hash = key.hash_value()?;
        Ok(self
            .position(hash, key)?
            .and_then(|index| self.remove_at(index))
            .map(|entry| entry.value))
    }

    fn position(&self, hash: u64, key: &Value) -> EngineResult<Option<usize>> {
        for &index in self.candidates(hash) {
            if self.entries[index].key.eq_value(key)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Positions of the entries whose key hashes to `hash`
    pub(crate) fn candidates(&self, hash: u64) -> &[usize] {
        self.by_hash.get(&hash).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&DictEntry> {
        self.entries.get(index)
    }

    pub(crate) fn replace_value(&mut self, index: usize, value: Value) -> Option<Value> {
        let entry = self.entries.get_mut(index)?;
        Some(std::mem::replace(&mut entry.value, value))
    }

    /// Append an entry for a key known to be absent
    pub(crate) fn push(&mut self, hash: u64, key: Value, value: Value) {
        self.by_hash.entry(hash).or_default().push(self.entries.len());
        self.entries.push(DictEntry { hash, key, value });
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Option<DictEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        if let Some(positions) = self.by_hash.get_mut(&removed.hash) {
            positions.retain(|&position| position != index);
            if positions.is_empty() {
                self.by_hash.remove(&removed.hash);
            }
        }
        // Later entries moved down by one.
        for positions in self.by_hash.values_mut() {
            for position in positions.iter_mut().filter(|position| **position > index) {
                *position -= 1;
            }
        }
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        count: std::cell::Cell<i64>,
    }

    impl Object for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }

        fn get_attr(&self, name: &str) -> EngineResult<Value> {
            match name {
                "count" => Ok(Value::Int(self.count.get())),
                _ => Err(EngineError::NoSuchAttribute {
                    type_name: "Counter".to_string(),
                    name: name.to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_default_protocol_errors() {
        let obj = Value::object(Counter {
            count: std::cell::Cell::new(3),
        });
        let counter = obj.as_object().unwrap();
        assert!(matches!(counter.len(), Err(EngineError::Unsupported { .. })));
        assert!(matches!(
            counter.call(Args::default()),
            Err(EngineError::NotCallable { .. })
        ));
        assert!(matches!(
            counter.get_attr("missing"),
            Err(EngineError::NoSuchAttribute { .. })
        ));
        assert_eq!(counter.get_attr("count").unwrap().as_int(), Some(3));
    }

    #[test]
    fn test_downcast() {
        let obj = Value::object(Counter {
            count: std::cell::Cell::new(0),
        });
        let counter = obj.downcast_ref::<Counter>().unwrap();
        counter.count.set(5);
        assert_eq!(obj.get_attr("count").unwrap().as_int(), Some(5));
    }

    #[test]
    fn test_function_call() {
        let add = Value::function("add", |args| {
            let a = args.get(0).and_then(Value::as_int).unwrap_or(0);
            let b = args.keyword("b").and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        let args = Args::new(vec![Value::Int(2)]).with_keyword("b", Value::Int(3));
        assert_eq!(args.len(), 2);
        assert_eq!(add.call(args).unwrap().as_int(), Some(5));
    }

    #[test]
    fn test_args_try_map() {
        let args = Args::new(vec![Value::Int(1), Value::Int(2)]).with_keyword("k", Value::Int(3));
        let doubled = args
            .try_map(|v| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)))
            .unwrap();
        assert_eq!(doubled.get(1).and_then(Value::as_int), Some(4));
        assert_eq!(doubled.keyword("k").and_then(Value::as_int), Some(6));
    }

    #[test]
    fn test_dict_operations() {
        let mut dict = Dict::new();
        assert!(dict.insert(Value::str("a"), Value::Int(1)).unwrap().is_none());
        assert!(dict.insert(Value::Int(1), Value::Int(2)).unwrap().is_none());
        assert!(dict
            .insert(Value::str("a"), Value::Int(3))
            .unwrap()
            .is_some_and(|v| v.as_int() == Some(1)));
        assert_eq!(dict.len(), 2);

        // 1 and 1.0 are the same key
        assert_eq!(dict.get(&Value::Float(1.0)).unwrap().and_then(|v| v.as_int()), Some(2));
        assert!(dict.remove(&Value::str("a")).unwrap().is_some());
        assert_eq!(dict.keys().len(), 1);
    }

    #[test]
    fn test_dict_lookups_after_removal() {
        let mut dict = Dict::from_pairs((0..1000).map(|i| (Value::Int(i), Value::Int(i * 10)))).unwrap();
        for i in (0..1000).step_by(2) {
            assert!(dict.remove(&Value::Int(i)).unwrap().is_some());
        }
        assert_eq!(dict.len(), 500);
        for i in 0..1000 {
            let found = dict.get(&Value::Int(i)).unwrap().and_then(|v| v.as_int());
            assert_eq!(found, (i % 2 == 1).then_some(i * 10));
        }

        // Order survives removal and re-insertion.
        dict.insert(Value::Int(0), Value::None).unwrap();
        let keys: Vec<i64> = dict.keys().iter().filter_map(Value::as_int).collect();
        assert_eq!(keys.first(), Some(&1));
        assert_eq!(keys.last(), Some(&0));
        assert!(dict.remove(&Value::Int(0)).unwrap().is_some());
        assert!(dict.get(&Value::Int(999)).unwrap().is_some());
    }

    #[test]
    fn test_dict_rejects_unhashable_key() {
        let mut dict = Dict::new();
        let err = dict.insert(Value::list([]), Value::None).unwrap_err();
        assert!(matches!(err, EngineError::Unhashable { .. }));
    }
}
