//! Engine options and the recursion guard
//!
//! Options are per thread, like the rest of the engine state. They can be
//! built in code, deserialized from an embedder's configuration file, or read
//! from the environment.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

/// Environment variable overriding [`EngineOptions::max_depth`]
pub const MAX_DEPTH_ENV: &str = "SHROUD_MAX_DEPTH";

/// Default nesting bound for transformation and container comparison
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Engine options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum nesting of transformations (and of container comparison,
    /// hashing and rendering) before `RecursionLimit` is reported
    pub max_depth: usize,

    /// Emit `trace` events for proxy cache hits, misses and evictions
    pub trace_cache: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            trace_cache: false,
        }
    }
}

impl EngineOptions {
    /// Options with a specific depth bound
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }

    /// Options with cache tracing enabled
    pub fn with_cache_tracing() -> Self {
        Self {
            trace_cache: true,
            ..Default::default()
        }
    }

    /// Defaults, overridden by `SHROUD_MAX_DEPTH` when it holds a valid
    /// positive integer
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(raw) = std::env::var(MAX_DEPTH_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => options.max_depth = depth,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", MAX_DEPTH_ENV),
            }
        }
        options
    }
}

thread_local! {
    static OPTIONS: RefCell<EngineOptions> = RefCell::new(EngineOptions::default());
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Install options for the current thread
pub fn configure(options: EngineOptions) {
    tracing::debug!(?options, "engine options configured");
    OPTIONS.with(|current| *current.borrow_mut() = options);
}

/// Options of the current thread
pub fn current() -> EngineOptions {
    OPTIONS.with(|current| current.borrow().clone())
}

pub(crate) fn trace_cache() -> bool {
    OPTIONS
        .try_with(|current| current.borrow().trace_cache)
        .unwrap_or(false)
}

/// Current nesting depth of the thread
pub fn depth() -> usize {
    DEPTH.with(Cell::get)
}

/// Nesting level held for the guard's lifetime
pub(crate) struct DepthGuard(());

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let _ = DEPTH.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Enter one nesting level, failing once the configured bound is reached
pub(crate) fn enter() -> EngineResult<DepthGuard> {
    let limit = OPTIONS.with(|current| current.borrow().max_depth);
    DEPTH.with(|depth| {
        let level = depth.get();
        if level >= limit {
            return Err(EngineError::RecursionLimit { limit });
        }
        depth.set(level + 1);
        Ok(DepthGuard(()))
    })
}
