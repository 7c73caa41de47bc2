//! String conversion
//!
//! Plain values render the familiar way (`None`, `'text'`, `(1, 'a')`, ...).
//! Proxies render under their context: an object can describe its string
//! form as a list of chunks ([`Object::render_parts`](crate::object::Object::render_parts)),
//! and each chunk is transformed with the proxy's context before being
//! rendered, so that nested values appear in the context's coordinates.

use crate::error::EngineResult;
use crate::options;
use crate::proxy::{self, Proxy};
use crate::value::{Complex, Value};
use std::fmt;
use std::fmt::Write as _;

/// Which string form to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Informal form
    Str,
    /// Debugging form
    Repr,
}

/// Render `value` in `mode`
pub fn render(value: &Value, mode: RenderMode) -> EngineResult<String> {
    match mode {
        RenderMode::Str => value.to_str(),
        RenderMode::Repr => value.repr(),
    }
}

/// Placeholder for a proxy met while rendering
///
/// When a chunk of `proxy` turns into a proxy itself, the placeholder names
/// `proxy`, the wrapper being rendered, not the chunk's proxy; rendering
/// never recurses into the chunk.
pub fn placeholder(proxy: &Proxy) -> String {
    let describe = |value: &Value| match value.identity() {
        Some(identity) => format!("{} at {}", value.type_name(), identity),
        None => value.type_name(),
    };
    format!(
        "<Proxy at {} wrapping {} with {}>",
        proxy.identity(),
        describe(proxy.wrapped()),
        describe(proxy.context())
    )
}

/// Render a proxy under its context
pub(crate) fn render_proxy(proxy: &Proxy, mode: RenderMode) -> EngineResult<String> {
    let mut out = String::new();
    render_chunk(proxy, proxy.wrapped(), mode, &mut out)?;
    Ok(out)
}

fn render_chunk(proxy: &Proxy, chunk: &Value, mode: RenderMode, out: &mut String) -> EngineResult<()> {
    let _guard = options::enter()?;
    if let Some(parts) = chunk.render_parts(mode) {
        for part in parts? {
            render_chunk(proxy, &part, mode, out)?;
        }
        return Ok(());
    }
    match proxy::transform(chunk, proxy.context(), proxy.direction())? {
        Value::Str(s) => out.push_str(&s),
        Value::Proxy(_) => out.push_str(&placeholder(proxy)),
        other => out.push_str(&render(&other, mode)?),
    }
    Ok(())
}

/// Join the chunks of an object outside any context
fn joined(value: &Value, mode: RenderMode) -> EngineResult<String> {
    let Some(parts) = value.render_parts(mode) else {
        return render(value, mode);
    };
    let mut out = String::new();
    for part in parts? {
        match &part {
            Value::Str(s) => out.push_str(s),
            other => out.push_str(&render(other, mode)?),
        }
    }
    Ok(out)
}

/// Informal form of an unwrapped object built from its chunks
pub fn joined_str(value: &Value) -> EngineResult<String> {
    joined(value, RenderMode::Str)
}

/// Debugging form of an unwrapped object built from its chunks
pub fn joined_repr(value: &Value) -> EngineResult<String> {
    joined(value, RenderMode::Repr)
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// Complex components drop a trailing `.0`
fn format_component(x: f64) -> String {
    let formatted = format_float(x);
    match formatted.strip_suffix(".0") {
        Some(integral) => integral.to_string(),
        None => formatted,
    }
}

fn format_complex(c: &Complex) -> String {
    if c.re == 0.0 && c.re.is_sign_positive() {
        format!("{}j", format_component(c.im))
    } else {
        let sign = if c.im < 0.0 || (c.im == 0.0 && c.im.is_sign_negative()) {
            '-'
        } else {
            '+'
        };
        format!(
            "({}{}{}j)",
            format_component(c.re),
            sign,
            format_component(c.im.abs())
        )
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn quote_bytes(b: &[u8]) -> String {
    let mut out = String::with_capacity(b.len() + 3);
    out.push_str("b'");
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", byte);
            }
        }
    }
    out.push('\'');
    out
}

fn format_optional(bound: Option<i64>) -> String {
    bound.map_or_else(|| "None".to_string(), |b| b.to_string())
}

fn join_reprs<'a>(items: impl IntoIterator<Item = &'a Value>) -> EngineResult<Vec<String>> {
    items.into_iter().map(Value::repr).collect()
}

impl Value {
    /// Structured rendering chunks, for host objects that provide them
    pub fn render_parts(&self, mode: RenderMode) -> Option<EngineResult<Vec<Value>>> {
        match self {
            Value::Object(object) => object.render_parts(mode),
            _ => None,
        }
    }

    /// Informal string form
    pub fn to_str(&self) -> EngineResult<String> {
        match self {
            Value::Str(s) => Ok(s.to_string()),
            Value::Object(object) => object.to_str(),
            Value::Proxy(proxy) => proxy.to_str(),
            _ => self.repr(),
        }
    }

    /// Debugging string form
    pub fn repr(&self) -> EngineResult<String> {
        let rendered = match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => format_float(*x),
            Value::Complex(c) => format_complex(c),
            Value::Type(name) => format!("<class '{}'>", name),
            Value::Str(s) => quote_str(s),
            Value::Bytes(b) => quote_bytes(b),
            Value::File(handle) => format!("{:?}", handle),
            Value::Slice(s) => format!(
                "slice({}, {}, {})",
                format_optional(s.start),
                format_optional(s.stop),
                format_optional(s.step)
            ),
            Value::Tuple(items) => {
                let _guard = options::enter()?;
                let parts = join_reprs(items.iter())?;
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Value::List(items) => {
                let _guard = options::enter()?;
                let snapshot = items.borrow().clone();
                format!("[{}]", join_reprs(snapshot.iter())?.join(", "))
            }
            Value::Dict(dict) => {
                let _guard = options::enter()?;
                let items = dict.borrow().items();
                let mut parts = Vec::with_capacity(items.len());
                for (key, value) in &items {
                    parts.push(format!("{}: {}", key.repr()?, value.repr()?));
                }
                format!("{{{}}}", parts.join(", "))
            }
            Value::Object(object) => return object.repr(),
            Value::Function(function) => {
                format!("<function {} at {}>", function.name(), function.identity())
            }
            Value::Method(method) => format!(
                "<bound method {} of {} at {}>",
                method.name(),
                method.receiver().type_name(),
                method.identity()
            ),
            Value::Source(source) => format!("{:?}", source),
            Value::Proxy(proxy) => return proxy.repr(),
        };
        Ok(rendered)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_str() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<{} object>", self.type_name()),
        }
    }
}
