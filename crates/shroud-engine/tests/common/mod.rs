//! Host objects shared by the integration tests

#![allow(dead_code)]

use rustc_hash::FxHasher;
use shroud_engine::object::ValueIter;
use shroud_engine::{Args, EngineError, EngineResult, Object, RenderMode, Source, Value};
use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Plain host object with no protocol beyond its name
pub struct Plain(pub &'static str);

impl Object for Plain {
    fn type_name(&self) -> &str {
        "Plain"
    }

    fn to_str(&self) -> EngineResult<String> {
        Ok(self.0.to_string())
    }
}

/// Container-like host object that records what it receives
///
/// - attributes: an open table
/// - items: a list indexed by integers
/// - calling it records the arguments and returns the first one
/// - renders as `Skit(<ident>)` through the structured protocol
pub struct Skit {
    pub name: String,
    attrs: RefCell<Vec<(String, Value)>>,
    items: RefCell<Vec<Value>>,
    pub received: RefCell<Vec<Value>>,
}

impl Skit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: RefCell::new(Vec::new()),
            items: RefCell::new(Vec::new()),
            received: RefCell::new(Vec::new()),
        }
    }

    pub fn with_items(name: &str, items: Vec<Value>) -> Self {
        let skit = Self::new(name);
        *skit.items.borrow_mut() = items;
        skit
    }

    pub fn item(&self, index: usize) -> Value {
        self.items.borrow()[index].clone()
    }

    pub fn attr(&self, name: &str) -> Option<Value> {
        self.attrs
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn index(&self, key: &Value) -> EngineResult<usize> {
        let len = self.items.borrow().len();
        match key.as_int() {
            Some(i) if i >= 0 && (i as usize) < len => Ok(i as usize),
            Some(i) => Err(EngineError::IndexOutOfRange { index: i, len }),
            None => Err(EngineError::wrong_type("int", key.type_name())),
        }
    }
}

impl Object for Skit {
    fn type_name(&self) -> &str {
        "Skit"
    }

    fn get_attr(&self, name: &str) -> EngineResult<Value> {
        if name == "name" {
            return Ok(Value::str(&self.name));
        }
        self.attr(name).ok_or_else(|| EngineError::NoSuchAttribute {
            type_name: "Skit".to_string(),
            name: name.to_string(),
        })
    }

    fn set_attr(&self, name: &str, value: Value) -> EngineResult<()> {
        self.received.borrow_mut().push(value.clone());
        let mut attrs = self.attrs.borrow_mut();
        match attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => attrs.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn del_attr(&self, name: &str) -> EngineResult<()> {
        let mut attrs = self.attrs.borrow_mut();
        let before = attrs.len();
        attrs.retain(|(key, _)| key != name);
        if attrs.len() == before {
            return Err(EngineError::NoSuchAttribute {
                type_name: "Skit".to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: Args) -> EngineResult<Value> {
        self.received.borrow_mut().extend(args.positional.iter().cloned());
        self.received
            .borrow_mut()
            .extend(args.keyword.iter().map(|(_, v)| v.clone()));
        Ok(args.positional.first().cloned().unwrap_or_default())
    }

    fn len(&self) -> EngineResult<usize> {
        Ok(self.items.borrow().len())
    }

    fn get_item(&self, key: &Value) -> EngineResult<Value> {
        let index = self.index(key)?;
        Ok(self.items.borrow()[index].clone())
    }

    fn set_item(&self, key: Value, value: Value) -> EngineResult<()> {
        let index = self.index(&key)?;
        self.received.borrow_mut().push(value.clone());
        self.items.borrow_mut()[index] = value;
        Ok(())
    }

    fn del_item(&self, key: &Value) -> EngineResult<()> {
        let index = self.index(key)?;
        self.items.borrow_mut().remove(index);
        Ok(())
    }

    fn get_slice(&self, start: i64, stop: i64) -> EngineResult<Value> {
        let items = self.items.borrow();
        let (start, stop) = shroud_engine::Slice::new(start, stop).resolve(items.len());
        Ok(Value::list(items[start..stop].iter().cloned()))
    }

    fn set_slice(&self, start: i64, stop: i64, value: Value) -> EngineResult<()> {
        let replacement = value.to_vec()?;
        self.received.borrow_mut().extend(replacement.iter().cloned());
        let mut items = self.items.borrow_mut();
        let (start, stop) = shroud_engine::Slice::new(start, stop).resolve(items.len());
        items.splice(start..stop, replacement);
        Ok(())
    }

    fn contains(&self, item: &Value) -> EngineResult<bool> {
        self.received.borrow_mut().push(item.clone());
        let items = self.items.borrow().clone();
        for candidate in &items {
            if candidate.is(item) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn iter(&self) -> EngineResult<ValueIter> {
        let items = self.items.borrow().clone();
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn hash_value(&self) -> EngineResult<Option<u64>> {
        let mut hasher = FxHasher::default();
        self.name.hash(&mut hasher);
        Ok(Some(hasher.finish()))
    }

    fn render_parts(&self, _mode: RenderMode) -> Option<EngineResult<Vec<Value>>> {
        let ident = self.attr("ident")?;
        Some(Ok(vec![Value::str("Skit("), ident, Value::str(")")]))
    }
}

/// Host object that reports the cache size when it is dropped
pub struct DropWatch {
    pub seen: Rc<Cell<Option<usize>>>,
}

impl Object for DropWatch {
    fn type_name(&self) -> &str {
        "DropWatch"
    }
}

impl Drop for DropWatch {
    fn drop(&mut self) {
        self.seen.set(Some(shroud_engine::proxy::cache::len()));
    }
}

pub fn source(id: &str) -> Source {
    Source::new(shroud_engine::Id::new(id).into_value(), Value::str("T0"), Value::None)
}

pub fn context(id: &str) -> Value {
    Value::Source(source(id))
}

pub fn skit(name: &str) -> Value {
    Value::object(Skit::new(name))
}

pub fn as_skit(value: &Value) -> &Skit {
    value.downcast_ref::<Skit>().expect("value is a Skit")
}
