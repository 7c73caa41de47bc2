//! Identity-keyed proxy cache
//!
//! At most one live proxy exists per (value, context, direction) triple. The
//! cache only holds weak handles: a proxy's entry is removed from its
//! lifeline, which is the first thing torn down when the proxy drops, so the
//! entry is gone before the wrapped value and the context are released.

use super::{Direction, Proxy};
use crate::error::{EngineError, EngineResult};
use crate::options;
use crate::value::{Identity, Value};
use crate::weak::WeakTable;

/// Cache key: identities of the wrapped value and the context, and the
/// direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Identity of the wrapped value
    pub value: Identity,
    /// Identity of the context
    pub context: Identity,
    /// Transformation direction
    pub direction: Direction,
}

impl CacheKey {
    fn of(value: &Value, context: &Value, direction: Direction) -> EngineResult<Self> {
        let identity = |v: &Value| {
            v.identity()
                .ok_or_else(|| EngineError::wrong_type("object with identity", v.type_name()))
        };
        Ok(Self {
            value: identity(value)?,
            context: identity(context)?,
            direction,
        })
    }
}

struct ProxyCache {
    entries: WeakTable<CacheKey, ()>,
}

impl ProxyCache {
    fn new() -> Self {
        let entries = WeakTable::new();
        entries.on_evict(|key: &CacheKey| {
            if options::trace_cache() {
                tracing::trace!(value = %key.value, context = %key.context, direction = ?key.direction, "proxy evicted");
            }
        });
        Self { entries }
    }
}

thread_local! {
    static CACHE: ProxyCache = ProxyCache::new();
}

/// Return the live proxy for (value, context, direction), creating it on a
/// miss
pub(crate) fn get_or_create(value: &Value, context: &Value, direction: Direction) -> EngineResult<Value> {
    let key = CacheKey::of(value, context, direction)?;
    let cached = CACHE.with(|cache| cache.entries.target(&key));
    if let Some(proxy) = cached {
        if options::trace_cache() {
            tracing::trace!(value = %key.value, context = %key.context, "proxy cache hit");
        }
        return Ok(proxy);
    }

    let proxy = Value::Proxy(Proxy::new(value.clone(), context.clone(), direction));
    CACHE.with(|cache| cache.entries.insert(key, &proxy, ()))?;
    if options::trace_cache() {
        tracing::trace!(value = %key.value, context = %key.context, "proxy cache miss");
    }
    Ok(proxy)
}

/// Look up a live proxy without creating one
pub fn lookup(value: &Value, context: &Value, direction: Direction) -> Option<Proxy> {
    let key = CacheKey::of(value, context, direction).ok()?;
    match CACHE.with(|cache| cache.entries.target(&key))? {
        Value::Proxy(proxy) => Some(proxy),
        _ => None,
    }
}

/// Number of live cache entries on this thread
pub fn len() -> usize {
    CACHE.try_with(|cache| cache.entries.len()).unwrap_or(0)
}

/// Check whether the cache is empty
pub fn is_empty() -> bool {
    len() == 0
}
