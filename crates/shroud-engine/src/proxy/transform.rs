//! The transformation engine

use super::{cache, Direction};
use crate::error::{EngineError, EngineResult};
use crate::object::Dict;
use crate::options;
use crate::value::{Value, ValueKind};
use std::rc::Rc;

/// Strip every proxy layer
pub fn unwrap(value: &Value) -> Value {
    let mut current = value;
    while let Value::Proxy(proxy) = current {
        current = proxy.wrapped();
    }
    current.clone()
}

/// Transform `value` into `context`'s coordinates
pub fn wrap(value: &Value, context: &Value) -> EngineResult<Value> {
    transform(value, context, Direction::Apply)
}

/// Transform `value` in an explicit direction
///
/// `apply == false` takes the value out of `context`'s coordinates.
pub fn wrap_with(value: &Value, context: &Value, apply: bool) -> EngineResult<Value> {
    transform(value, context, Direction::from_apply(apply))
}

/// Check that `context` is a source or a proxy of one
fn check_context(context: &Value) -> EngineResult<()> {
    match context {
        Value::Source(_) => Ok(()),
        Value::Proxy(_) if matches!(unwrap(context), Value::Source(_)) => Ok(()),
        _ => Err(EngineError::InvalidContext {
            type_name: context.type_name(),
        }),
    }
}

/// Context handed to translatable values: the shadowless view of a raw
/// source, or the context proxy unchanged
fn translation_context(context: &Value) -> Value {
    match context {
        Value::Source(source) => Value::Source(source.shadowless()),
        other => other.clone(),
    }
}

/// Transform `value` under `context` in `direction`
///
/// Values are handled by kind, in this order:
///
/// 1. translatable host objects transform themselves;
/// 2. atomic values are returned unchanged;
/// 3. a proxy with the same context and the opposite direction is unwrapped;
/// 4. tuples, lists and dicts are rebuilt from transformed elements (keys
///    included), never aliased;
/// 5. the source `enter` method is returned unchanged;
/// 6. anything else is wrapped in the cached proxy for
///    (value, context, direction).
///
/// # Errors
///
/// `InvalidContext` if `context` is neither a source nor a proxy of one;
/// `RecursionLimit` if containers nest deeper than the configured bound; any
/// error raised while transforming an element (no partial container is
/// returned).
pub fn transform(value: &Value, context: &Value, direction: Direction) -> EngineResult<Value> {
    check_context(context)?;
    let _guard = options::enter()?;

    match (value.kind(), value) {
        (ValueKind::Translatable, Value::Object(object)) => {
            let Some(translatable) = object.as_translatable() else {
                return Ok(value.clone());
            };
            let context = translation_context(context);
            match direction {
                Direction::Apply => translatable.apply_context(&context),
                Direction::Remove => translatable.remove_context(&context),
            }
        }
        (ValueKind::Atomic | ValueKind::EscapeHatch, _) => Ok(value.clone()),
        (ValueKind::Proxy, Value::Proxy(proxy))
            if proxy.direction() == direction.reverse() && proxy.context().is(context) =>
        {
            Ok(proxy.wrapped().clone())
        }
        (ValueKind::Tuple, Value::Tuple(items)) => {
            let items = transform_all(items, context, direction)?;
            Ok(Value::Tuple(Rc::from(items)))
        }
        (ValueKind::List, Value::List(items)) => {
            let snapshot = items.borrow().clone();
            Ok(Value::list(transform_all(&snapshot, context, direction)?))
        }
        (ValueKind::Dict, Value::Dict(dict)) => {
            let snapshot = dict.borrow().items();
            let mut transformed = Dict::new();
            for (key, item) in snapshot {
                let key = transform(&key, context, direction)?;
                let item = transform(&item, context, direction)?;
                transformed.insert(key, item)?;
            }
            Ok(Value::dict(transformed))
        }
        _ => cache::get_or_create(value, context, direction),
    }
}

fn transform_all(items: &[Value], context: &Value, direction: Direction) -> EngineResult<Vec<Value>> {
    items
        .iter()
        .map(|item| transform(item, context, direction))
        .collect()
}
