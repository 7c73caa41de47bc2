//! Shroud contextual proxy engine
//!
//! This crate provides:
//! - Context sources with shadowed identifiers and transforms
//! - Context-aware wrapping of arbitrary values in cached proxies
//! - Weak-keyed, one-shot change notification
//! - A weak set and the weak-table primitive it is built on
//!
//! ```text
//! let s = Source::new(id, transform, parent);
//! let p = wrap(&value, &s.into())?;     // proxy, or a rebuilt container
//! p.get_attr("x")?;                     // result is wrapped again
//! unwrap(&p);                           // the wrapped value
//! ```
//!
//! The engine is single-threaded: values are `Rc`-based, and the proxy cache
//! and change notifier are per-thread.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod attr;
pub mod error;
pub mod ident;
pub mod notify;
pub mod object;
pub mod options;
pub mod protocol;
pub mod proxy;
pub mod render;
pub mod source;
pub mod value;
pub mod weak;

pub use error::{EngineError, EngineResult};
pub use ident::Id;
pub use notify::notify;
pub use object::{Args, Dict, Object, ObjectRef, Translatable, ValueIter};
pub use options::EngineOptions;
pub use proxy::{transform, unwrap, wrap, wrap_with, Direction, Proxy};
pub use render::{joined_repr, joined_str, RenderMode};
pub use source::Source;
pub use value::{Complex, Identity, Slice, Value, ValueKind};
pub use weak::{WeakRegistry, WeakValue};
