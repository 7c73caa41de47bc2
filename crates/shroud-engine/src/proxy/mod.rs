//! Context proxies
//!
//! A [`Proxy`] stands in for a value seen through a context. Every operation
//! on the proxy is forwarded to the wrapped value; values passed in are first
//! transformed in the reverse direction, and values coming out are
//! transformed in the proxy's direction:
//!
//! ```text
//!   caller ── args ──▶ transform(arg, ctx, !dir) ──▶ wrapped
//!   caller ◀─ result ─ transform(res, ctx,  dir) ◀── wrapped
//! ```
//!
//! Proxies are created only by [`transform`] and are cached per
//! (value, context, direction), so wrapping the same value twice yields the
//! same proxy.

pub mod cache;
mod transform;

pub use transform::{transform, unwrap, wrap, wrap_with};

use crate::error::EngineResult;
use crate::object::{Args, ValueIter};
use crate::render::{self, RenderMode};
use crate::value::{Identity, Value};
use crate::weak::Lifeline;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

/// Direction of a context transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Express values in the context's coordinates
    Apply,
    /// Express values outside the context's coordinates
    Remove,
}

impl Direction {
    /// The opposite direction
    #[inline]
    pub fn reverse(self) -> Self {
        match self {
            Direction::Apply => Direction::Remove,
            Direction::Remove => Direction::Apply,
        }
    }

    /// `Apply` for `true`, `Remove` for `false`
    #[inline]
    pub fn from_apply(apply: bool) -> Self {
        if apply {
            Direction::Apply
        } else {
            Direction::Remove
        }
    }
}

impl std::ops::Not for Direction {
    type Output = Direction;

    fn not(self) -> Direction {
        self.reverse()
    }
}

/// Heap cell of a proxy
///
/// The lifeline is the first field: it is dropped (and the cache entry
/// removed) before the wrapped value and the context.
pub struct ProxyCell {
    lifeline: Lifeline,
    wrapped: Value,
    context: Value,
    direction: Direction,
}

/// Transparent stand-in for a value seen through a context
#[derive(Clone)]
pub struct Proxy(Rc<ProxyCell>);

impl Proxy {
    pub(crate) fn new(wrapped: Value, context: Value, direction: Direction) -> Self {
        Proxy(Rc::new(ProxyCell {
            lifeline: Lifeline::new(),
            wrapped,
            context,
            direction,
        }))
    }

    pub(crate) fn from_rc(rc: Rc<ProxyCell>) -> Self {
        Proxy(rc)
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyCell> {
        Rc::downgrade(&self.0)
    }

    /// The wrapped value
    pub fn wrapped(&self) -> &Value {
        &self.0.wrapped
    }

    /// The context
    pub fn context(&self) -> &Value {
        &self.0.context
    }

    /// The direction
    pub fn direction(&self) -> Direction {
        self.0.direction
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the proxy
    pub fn identity(&self) -> Identity {
        Identity::of(&self.0)
    }

    /// Lifeline of the proxy
    pub fn lifeline(&self) -> &Lifeline {
        &self.0.lifeline
    }

    fn outbound(&self, value: Value) -> EngineResult<Value> {
        transform(&value, &self.0.context, self.0.direction)
    }

    fn inbound(&self, value: &Value) -> EngineResult<Value> {
        transform(value, &self.0.context, self.0.direction.reverse())
    }

    /// Forwarded attribute read
    pub fn get_attr(&self, name: &str) -> EngineResult<Value> {
        self.outbound(self.0.wrapped.get_attr(name)?)
    }

    /// Forwarded attribute write
    pub fn set_attr(&self, name: &str, value: &Value) -> EngineResult<()> {
        self.0.wrapped.set_attr(name, self.inbound(value)?)
    }

    /// Forwarded attribute deletion
    pub fn del_attr(&self, name: &str) -> EngineResult<()> {
        self.0.wrapped.del_attr(name)
    }

    /// Forwarded call
    pub fn call(&self, args: Args) -> EngineResult<Value> {
        let args = args.try_map(|arg| self.inbound(&arg))?;
        self.outbound(self.0.wrapped.call(args)?)
    }

    /// Forwarded length
    pub fn len(&self) -> EngineResult<usize> {
        self.0.wrapped.len()
    }

    /// Forwarded item read
    pub fn get_item(&self, key: &Value) -> EngineResult<Value> {
        let key = self.inbound(key)?;
        self.outbound(self.0.wrapped.get_item(&key)?)
    }

    /// Forwarded item write
    pub fn set_item(&self, key: &Value, value: &Value) -> EngineResult<()> {
        let key = self.inbound(key)?;
        let value = self.inbound(value)?;
        self.0.wrapped.set_item(key, value)
    }

    /// Forwarded item deletion
    pub fn del_item(&self, key: &Value) -> EngineResult<()> {
        self.0.wrapped.del_item(&self.inbound(key)?)
    }

    /// Forwarded slice read
    pub fn get_slice(&self, start: i64, stop: i64) -> EngineResult<Value> {
        self.outbound(self.0.wrapped.get_slice(start, stop)?)
    }

    /// Forwarded slice write
    pub fn set_slice(&self, start: i64, stop: i64, value: &Value) -> EngineResult<()> {
        self.0.wrapped.set_slice(start, stop, self.inbound(value)?)
    }

    /// Forwarded membership test
    pub fn contains(&self, item: &Value) -> EngineResult<bool> {
        self.0.wrapped.contains(&self.inbound(item)?)
    }

    /// Forwarded iteration; every item is transformed as it is produced
    pub fn iter(&self) -> EngineResult<ValueIter> {
        let items = self.0.wrapped.iter()?;
        let context = self.0.context.clone();
        let direction = self.0.direction;
        Ok(Box::new(items.map(move |item| {
            item.and_then(|value| transform(&value, &context, direction))
        })))
    }

    /// Forwarded equality; the other operand is compared unwrapped
    pub fn eq_value(&self, other: &Value) -> EngineResult<bool> {
        self.0.wrapped.eq_value(&unwrap(other))
    }

    /// Forwarded ordering; the other operand is compared unwrapped
    pub fn compare(&self, other: &Value) -> EngineResult<Ordering> {
        self.0.wrapped.compare(&unwrap(other))
    }

    /// Hash of the wrapped value
    pub fn hash_value(&self) -> EngineResult<u64> {
        self.0.wrapped.hash_value()
    }

    /// Informal string form, rendered under the context
    pub fn to_str(&self) -> EngineResult<String> {
        render::render_proxy(self, RenderMode::Str)
    }

    /// Debugging string form, rendered under the context
    pub fn repr(&self) -> EngineResult<String> {
        render::render_proxy(self, RenderMode::Repr)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render::placeholder(self))
    }
}
