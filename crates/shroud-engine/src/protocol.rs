//! Operation dispatch
//!
//! Every operation a caller can perform on a [`Value`] is dispatched here:
//! built-in containers are handled directly, host objects go through their
//! [`Object`](crate::object::Object) implementation, sources through their
//! attribute table, and proxies forward to the wrapped value.
//!
//! Container operations never hold a `RefCell` borrow while they compare,
//! hash or call into host code: they work on snapshots and re-borrow to
//! commit.

use crate::error::{EngineError, EngineResult};
use crate::object::{Args, Dict, ValueIter};
use crate::options;
use crate::value::{Complex, Slice, Value};
use rustc_hash::FxHasher;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Resolve a possibly-negative index against `len`
fn resolve_index(index: i64, len: usize) -> EngineResult<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(EngineError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

/// Integer value of an index operand
fn index_operand(key: &Value) -> EngineResult<i64> {
    match key {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(EngineError::wrong_type("int", other.type_name())),
    }
}

/// Render a key for `KeyNotFound`
fn describe_key(key: &Value) -> String {
    key.repr().unwrap_or_else(|_| format!("<{}>", key.type_name()))
}

/// Numeric view of bool, int and float operands
#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }

    fn eq(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }

    fn partial_cmp(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    /// Equal numbers hash equally, whatever their representation
    fn hash<H: Hasher>(self, state: &mut H) {
        match self {
            Number::Int(i) => i.hash(state),
            Number::Float(x) if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 => {
                (x as i64).hash(state)
            }
            Number::Float(x) => x.to_bits().hash(state),
        }
    }
}

fn snapshot(list: &Rc<RefCell<Vec<Value>>>) -> Vec<Value> {
    list.borrow().clone()
}

/// Position of `key` in `dict`, comparing outside the borrow
fn dict_position(dict: &Rc<RefCell<Dict>>, key: &Value) -> EngineResult<Option<usize>> {
    let hash = key.hash_value()?;
    let candidates: Vec<(usize, Value)> = {
        let dict = dict.borrow();
        let keys = dict
            .candidates(hash)
            .iter()
            .filter_map(|&index| dict.entry(index).map(|entry| (index, entry.key.clone())))
            .collect();
        keys
    };
    for (index, candidate) in candidates {
        if candidate.eq_value(key)? {
            // Equality may have mutated the dict; only trust an unmoved key.
            let unmoved = dict
                .borrow()
                .entry(index)
                .is_some_and(|entry| entry.key.is(&candidate));
            return Ok(unmoved.then_some(index));
        }
    }
    Ok(None)
}

fn dict_get(dict: &Rc<RefCell<Dict>>, key: &Value) -> EngineResult<Option<Value>> {
    let Some(index) = dict_position(dict, key)? else {
        return Ok(None);
    };
    Ok(dict.borrow().entry(index).map(|entry| entry.value.clone()))
}

fn dict_insert(dict: &Rc<RefCell<Dict>>, key: Value, value: Value) -> EngineResult<()> {
    match dict_position(dict, &key)? {
        Some(index) => {
            let previous = dict.borrow_mut().replace_value(index, value);
            drop(previous);
        }
        None => {
            let hash = key.hash_value()?;
            dict.borrow_mut().push(hash, key, value);
        }
    }
    Ok(())
}

fn dict_remove(dict: &Rc<RefCell<Dict>>, key: &Value) -> EngineResult<Option<Value>> {
    let Some(index) = dict_position(dict, key)? else {
        return Ok(None);
    };
    let removed = dict.borrow_mut().remove_at(index);
    Ok(removed.map(|entry| entry.value))
}

/// Lexicographic comparison of two sequences
fn compare_sequences(a: &[Value], b: &[Value]) -> EngineResult<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.eq_value(y)? {
            return x.compare(y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

fn eq_sequences(a: &[Value], b: &[Value]) -> EngineResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.eq_value(y)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn hash_identity(addr: usize) -> u64 {
    let mut hasher = FxHasher::default();
    addr.hash(&mut hasher);
    hasher.finish()
}

impl Value {
    /// Attribute read
    pub fn get_attr(&self, name: &str) -> EngineResult<Value> {
        match self {
            Value::Object(object) => object.get_attr(name),
            Value::Source(source) => source.get(name),
            Value::Proxy(proxy) => proxy.get_attr(name),
            Value::Function(function) if name == "__name__" => Ok(Value::str(function.name())),
            Value::Method(method) if name == "__name__" => Ok(Value::str(method.name())),
            Value::Method(method) if name == "__self__" => Ok(method.receiver().clone()),
            _ => Err(EngineError::NoSuchAttribute {
                type_name: self.type_name(),
                name: name.to_string(),
            }),
        }
    }

    /// Attribute write
    pub fn set_attr(&self, name: &str, value: Value) -> EngineResult<()> {
        match self {
            Value::Object(object) => object.set_attr(name, value),
            Value::Source(source) => source.set(name, value),
            Value::Proxy(proxy) => proxy.set_attr(name, &value),
            _ => Err(EngineError::unsupported(self.type_name(), "attribute assignment")),
        }
    }

    /// Attribute deletion
    pub fn del_attr(&self, name: &str) -> EngineResult<()> {
        match self {
            Value::Object(object) => object.del_attr(name),
            Value::Source(source) => source.del(name),
            Value::Proxy(proxy) => proxy.del_attr(name),
            _ => Err(EngineError::unsupported(self.type_name(), "attribute deletion")),
        }
    }

    /// Check whether [`Value::call`] can succeed
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Method(_) => true,
            Value::Object(object) => object.is_callable(),
            Value::Proxy(proxy) => proxy.wrapped().is_callable(),
            _ => false,
        }
    }

    /// Call with arguments
    pub fn call(&self, args: Args) -> EngineResult<Value> {
        match self {
            Value::Function(function) => function.call(args),
            Value::Method(method) => method.call(args),
            Value::Object(object) => object.call(args),
            Value::Proxy(proxy) => proxy.call(args),
            _ => Err(EngineError::NotCallable {
                type_name: self.type_name(),
            }),
        }
    }

    /// Number of items
    pub fn len(&self) -> EngineResult<usize> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::Bytes(b) => Ok(b.len()),
            Value::Tuple(items) => Ok(items.len()),
            Value::List(items) => Ok(items.borrow().len()),
            Value::Dict(dict) => Ok(dict.borrow().len()),
            Value::Object(object) => object.len(),
            Value::Proxy(proxy) => proxy.len(),
            _ => Err(EngineError::unsupported(self.type_name(), "len()")),
        }
    }

    /// Item read; sequences accept integer indices and slices
    pub fn get_item(&self, key: &Value) -> EngineResult<Value> {
        match (self, key) {
            (Value::Tuple(_) | Value::List(_) | Value::Str(_) | Value::Bytes(_), Value::Slice(slice)) => {
                self.slice_by(slice)
            }
            (Value::Tuple(items), _) => {
                let index = resolve_index(index_operand(key)?, items.len())?;
                Ok(items[index].clone())
            }
            (Value::List(items), _) => {
                let items = items.borrow();
                let index = resolve_index(index_operand(key)?, items.len())?;
                Ok(items[index].clone())
            }
            (Value::Str(s), _) => {
                let len = s.chars().count();
                let index = resolve_index(index_operand(key)?, len)?;
                Ok(s.chars().nth(index).map(|c| Value::str(c.to_string())).unwrap_or_default())
            }
            (Value::Bytes(b), _) => {
                let index = resolve_index(index_operand(key)?, b.len())?;
                Ok(Value::Int(b[index] as i64))
            }
            (Value::Dict(dict), _) => dict_get(dict, key)?.ok_or_else(|| EngineError::KeyNotFound {
                key: describe_key(key),
            }),
            (Value::Object(object), _) => object.get_item(key),
            (Value::Proxy(proxy), _) => proxy.get_item(key),
            _ => Err(EngineError::unsupported(self.type_name(), "item access")),
        }
    }

    /// Item write
    pub fn set_item(&self, key: Value, value: Value) -> EngineResult<()> {
        match self {
            Value::List(items) => {
                let index = index_operand(&key)?;
                let previous = {
                    let mut items = items.borrow_mut();
                    let index = resolve_index(index, items.len())?;
                    std::mem::replace(&mut items[index], value)
                };
                drop(previous);
                Ok(())
            }
            Value::Dict(dict) => dict_insert(dict, key, value),
            Value::Object(object) => object.set_item(key, value),
            Value::Proxy(proxy) => proxy.set_item(&key, &value),
            _ => Err(EngineError::unsupported(self.type_name(), "item assignment")),
        }
    }

    /// Item deletion
    pub fn del_item(&self, key: &Value) -> EngineResult<()> {
        match self {
            Value::List(items) => {
                let index = index_operand(key)?;
                let removed = {
                    let mut items = items.borrow_mut();
                    let index = resolve_index(index, items.len())?;
                    items.remove(index)
                };
                drop(removed);
                Ok(())
            }
            Value::Dict(dict) => match dict_remove(dict, key)? {
                Some(_) => Ok(()),
                None => Err(EngineError::KeyNotFound {
                    key: describe_key(key),
                }),
            },
            Value::Object(object) => object.del_item(key),
            Value::Proxy(proxy) => proxy.del_item(key),
            _ => Err(EngineError::unsupported(self.type_name(), "item deletion")),
        }
    }

    fn slice_by(&self, slice: &Slice) -> EngineResult<Value> {
        if slice.step.is_some_and(|step| step != 1) {
            return Err(EngineError::unsupported(self.type_name(), "extended slicing"));
        }
        match self {
            Value::Tuple(items) => {
                let (start, stop) = slice.resolve(items.len());
                Ok(Value::tuple(items[start..stop].iter().cloned()))
            }
            Value::List(items) => {
                let items = items.borrow();
                let (start, stop) = slice.resolve(items.len());
                Ok(Value::list(items[start..stop].iter().cloned()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (start, stop) = slice.resolve(chars.len());
                Ok(Value::str(chars[start..stop].iter().collect::<String>()))
            }
            Value::Bytes(b) => {
                let (start, stop) = slice.resolve(b.len());
                Ok(Value::bytes(&b[start..stop]))
            }
            _ => Err(EngineError::unsupported(self.type_name(), "slicing")),
        }
    }

    /// Slice read, `self[start:stop]`
    pub fn get_slice(&self, start: i64, stop: i64) -> EngineResult<Value> {
        match self {
            Value::Object(object) => object.get_slice(start, stop),
            Value::Proxy(proxy) => proxy.get_slice(start, stop),
            _ => self.slice_by(&Slice::new(start, stop)),
        }
    }

    /// Slice write, `self[start:stop] = value`
    pub fn set_slice(&self, start: i64, stop: i64, value: Value) -> EngineResult<()> {
        match self {
            Value::List(items) => {
                let replacement = value.to_vec()?;
                let removed: Vec<Value> = {
                    let mut items = items.borrow_mut();
                    let (start, stop) = Slice::new(start, stop).resolve(items.len());
                    items.splice(start..stop, replacement).collect()
                };
                drop(removed);
                Ok(())
            }
            Value::Object(object) => object.set_slice(start, stop, value),
            Value::Proxy(proxy) => proxy.set_slice(start, stop, &value),
            _ => Err(EngineError::unsupported(self.type_name(), "slice assignment")),
        }
    }

    /// Membership test
    pub fn contains(&self, item: &Value) -> EngineResult<bool> {
        match self {
            Value::Tuple(items) => Self::any_eq(items, item),
            Value::List(items) => Self::any_eq(&snapshot(items), item),
            Value::Dict(dict) => Ok(dict_position(dict, item)?.is_some()),
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(&**needle)),
                other => Err(EngineError::wrong_type("str", other.type_name())),
            },
            Value::Object(object) => object.contains(item),
            Value::Proxy(proxy) => proxy.contains(item),
            _ => Err(EngineError::unsupported(self.type_name(), "membership test")),
        }
    }

    fn any_eq(items: &[Value], item: &Value) -> EngineResult<bool> {
        for candidate in items {
            if candidate.eq_value(item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Iterate; lists and dicts iterate over a snapshot
    pub fn iter(&self) -> EngineResult<ValueIter> {
        let items: Vec<Value> = match self {
            Value::Tuple(items) => items.to_vec(),
            Value::List(items) => snapshot(items),
            Value::Dict(dict) => dict.borrow().keys(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Bytes(b) => b.iter().map(|byte| Value::Int(*byte as i64)).collect(),
            Value::Object(object) => return object.iter(),
            Value::Proxy(proxy) => return proxy.iter(),
            _ => return Err(EngineError::unsupported(self.type_name(), "iteration")),
        };
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    /// Collect the iteration into a vector
    pub fn to_vec(&self) -> EngineResult<Vec<Value>> {
        self.iter()?.collect()
    }

    /// Equality
    ///
    /// Proxies compare through to their wrapped value on either side.
    /// Numbers compare by value across bool, int and float.
    pub fn eq_value(&self, other: &Value) -> EngineResult<bool> {
        match (self, other) {
            (Value::Proxy(proxy), _) => proxy.eq_value(other),
            (_, Value::Proxy(proxy)) => proxy.eq_value(self),
            (Value::None, Value::None) => Ok(true),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a == b),
            (Value::Type(a), Value::Type(b)) => Ok(a == b),
            (Value::Slice(a), Value::Slice(b)) => Ok(a == b),
            (Value::Complex(a), Value::Complex(b)) => Ok(a == b),
            (Value::Complex(c), n) | (n, Value::Complex(c)) if Number::of(n).is_some() => {
                Ok(c.im == 0.0 && Number::of(n).is_some_and(|n| n.as_f64() == c.re))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let _guard = options::enter()?;
                eq_sequences(a, b)
            }
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let _guard = options::enter()?;
                eq_sequences(&snapshot(a), &snapshot(b))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let _guard = options::enter()?;
                let items = a.borrow().items();
                if items.len() != b.borrow().len() {
                    return Ok(false);
                }
                for (key, value) in items {
                    match dict_get(b, &key)? {
                        Some(theirs) if value.eq_value(&theirs)? => {}
                        _ => return Ok(false),
                    }
                }
                Ok(true)
            }
            (Value::Object(a), _) => match a.eq_value(other)? {
                Some(equal) => Ok(equal),
                None => match other {
                    Value::Object(b) => Ok(b.eq_value(self)?.unwrap_or(false) || self.is(other)),
                    _ => Ok(self.is(other)),
                },
            },
            (_, Value::Object(b)) => Ok(b.eq_value(self)?.unwrap_or(false)),
            (Value::Method(a), Value::Method(b)) => {
                Ok(std::ptr::eq(a.def(), b.def()) && a.receiver().is(b.receiver()))
            }
            _ => match (Number::of(self), Number::of(other)) {
                (Some(a), Some(b)) => Ok(a.eq(b)),
                _ => Ok(self.is(other)),
            },
        }
    }

    /// Ordering
    pub fn compare(&self, other: &Value) -> EngineResult<Ordering> {
        let unorderable = || EngineError::Unorderable {
            left: self.type_name(),
            right: other.type_name(),
        };
        match (self, other) {
            (Value::Proxy(proxy), _) => proxy.compare(other),
            (_, Value::Proxy(proxy)) => proxy.compare(self).map(Ordering::reverse),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a.cmp(b)),
            (Value::Tuple(a), Value::Tuple(b)) => {
                let _guard = options::enter()?;
                compare_sequences(a, b)
            }
            (Value::List(a), Value::List(b)) => {
                let _guard = options::enter()?;
                compare_sequences(&snapshot(a), &snapshot(b))
            }
            (Value::Object(object), _) => object.compare(other),
            (_, Value::Object(object)) => object.compare(self).map(Ordering::reverse),
            _ => match (Number::of(self), Number::of(other)) {
                (Some(a), Some(b)) => a.partial_cmp(b).ok_or_else(unorderable),
                _ => Err(unorderable()),
            },
        }
    }

    /// Hash consistent with [`Value::eq_value`]
    pub fn hash_value(&self) -> EngineResult<u64> {
        let mut hasher = FxHasher::default();
        match self {
            Value::None => 0u8.hash(&mut hasher),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                if let Some(number) = Number::of(self) {
                    number.hash(&mut hasher);
                }
            }
            Value::Complex(Complex { re, im }) => {
                if *im == 0.0 {
                    Number::Float(*re).hash(&mut hasher);
                } else {
                    (re.to_bits(), im.to_bits()).hash(&mut hasher);
                }
            }
            Value::Type(name) => ("type", &**name).hash(&mut hasher),
            Value::Str(s) => s.hash(&mut hasher),
            Value::Bytes(b) => ("bytes", &**b).hash(&mut hasher),
            Value::Slice(s) => s.hash(&mut hasher),
            Value::Tuple(items) => {
                let _guard = options::enter()?;
                items.len().hash(&mut hasher);
                for item in items.iter() {
                    item.hash_value()?.hash(&mut hasher);
                }
            }
            Value::List(_) | Value::Dict(_) => {
                return Err(EngineError::Unhashable {
                    type_name: self.type_name(),
                })
            }
            Value::Object(object) => {
                return match object.hash_value()? {
                    Some(hash) => Ok(hash),
                    None => Ok(hash_identity(object.identity().addr())),
                }
            }
            Value::Method(method) => {
                let receiver = match method.receiver().identity() {
                    Some(identity) => hash_identity(identity.addr()),
                    None => method.receiver().hash_value()?,
                };
                (receiver, method.def() as *const _ as usize).hash(&mut hasher);
            }
            Value::Proxy(proxy) => return proxy.hash_value(),
            Value::File(_) | Value::Function(_) | Value::Source(_) => {
                let identity = self.identity().map_or(0, |id| id.addr());
                return Ok(hash_identity(identity));
            }
        }
        Ok(hasher.finish())
    }
}
