//! The uniform tagged value.
//!
//! A `Value` is a small copyable record: a variant payload, a 16-bit tag
//! chain id (see `tags`), and a 32-bit source-location id for
//! diagnostics. Immutable payloads (strings, regexes, function defs,
//! thread and channel handles) are shared through `Arc`; mutable
//! containers (arrays, dicts, blobs, tuples, object slot tables, capture
//! cells, generators) live on the GC heap and are referenced by id, so
//! cloning a value never deep-copies.
//!
//! Strings are immutable; a slice shares storage with its parent via an
//! offset/length view over the same `Arc<str>`.

use crate::channel::ChanState;
use crate::class::ClassId;
use crate::code::FunDef;
use crate::heap::{Heap, HeapId};
use crate::rttype::RtType;
use crate::tags::{NO_TAGS, TagChainId, TagId, TagTable};
use crate::thread::{CondVarHandle, MutexHandle, ThreadHandle};
use quill_core::intern::InternId;
use quill_core::span::{NO_SRC, SrcId};
use std::fmt;
use std::sync::Arc;

/// Immutable string with slice sharing.
#[derive(Clone)]
pub struct QStr {
    buf: Arc<str>,
    off: u32,
    len: u32,
}

impl QStr {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        let buf: Arc<str> = s.into();
        let len = buf.len() as u32;
        QStr { buf, off: 0, len }
    }

    pub fn as_str(&self) -> &str {
        &self.buf[self.off as usize..(self.off + self.len) as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte-range slice sharing this string's storage.
    ///
    /// # Panics
    /// Panics if the range is out of bounds or splits a UTF-8 sequence.
    pub fn slice(&self, start: usize, end: usize) -> QStr {
        assert!(start <= end && end <= self.len());
        // Taking the subslice validates the char boundary.
        let _ = &self.as_str()[start..end];
        QStr {
            buf: Arc::clone(&self.buf),
            off: self.off + start as u32,
            len: (end - start) as u32,
        }
    }

    #[cfg(test)]
    pub(crate) fn storage_refcount(&self) -> usize {
        Arc::strong_count(&self.buf)
    }
}

impl PartialEq for QStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for QStr {}

impl fmt::Debug for QStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for QStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for QStr {
    fn from(s: &str) -> Self {
        QStr::new(s)
    }
}

impl From<String> for QStr {
    fn from(s: String) -> Self {
        QStr::new(s)
    }
}

/// Compiled regex value. Keeps the original spelling for display.
#[derive(Debug)]
pub struct QRegex {
    pub pattern: String,
    pub re: regex::Regex,
}

impl QRegex {
    pub fn compile(pattern: &str) -> Result<QRegex, regex::Error> {
        Ok(QRegex {
            pattern: pattern.to_string(),
            re: regex::Regex::new(pattern)?,
        })
    }
}

/// Variant payload of a value.
#[derive(Debug, Clone)]
pub enum Raw {
    Int(i64),
    Real(f64),
    Bool(bool),
    Nil,
    Sentinel,
    None,
    Break,
    Uninit,
    /// Iteration cursor: logical index plus a slot offset for dicts.
    Index { i: i64, off: usize },
    Str(QStr),
    Blob(HeapId),
    Array(HeapId),
    Dict(HeapId),
    Tuple(HeapId),
    Object { slots: HeapId, class: ClassId },
    Cell(HeapId),
    Generator(HeapId),
    Class(ClassId),
    Tag(TagId),
    Type(Arc<RtType>),
    Function { def: Arc<FunDef>, env: Arc<[HeapId]> },
    Method { name: InternId, this: Box<Value>, callee: Box<Value> },
    BuiltinFn(u16),
    BuiltinMethod { name: InternId, this: Box<Value>, builtin: u16 },
    Thread(Arc<ThreadHandle>),
    Channel(Arc<ChanState>),
    Mutex(Arc<MutexHandle>),
    CondVar(Arc<CondVarHandle>),
    Regex(Arc<QRegex>),
    Ptr(u64),
}

/// A language value: payload + constructor-tag chain + source id.
#[derive(Debug, Clone)]
pub struct Value {
    pub raw: Raw,
    pub tags: TagChainId,
    pub src: SrcId,
}

impl Value {
    pub fn new(raw: Raw) -> Self {
        Value { raw, tags: NO_TAGS, src: NO_SRC }
    }

    pub fn with_src(mut self, src: SrcId) -> Self {
        self.src = src;
        self
    }

    pub fn int(i: i64) -> Self {
        Value::new(Raw::Int(i))
    }

    pub fn real(r: f64) -> Self {
        Value::new(Raw::Real(r))
    }

    pub fn boolean(b: bool) -> Self {
        Value::new(Raw::Bool(b))
    }

    pub fn nil() -> Self {
        Value::new(Raw::Nil)
    }

    pub fn none() -> Self {
        Value::new(Raw::None)
    }

    pub fn sentinel() -> Self {
        Value::new(Raw::Sentinel)
    }

    pub fn uninit() -> Self {
        Value::new(Raw::Uninit)
    }

    pub fn str(s: impl Into<QStr>) -> Self {
        Value::new(Raw::Str(s.into()))
    }

    pub fn index(i: i64, off: usize) -> Self {
        Value::new(Raw::Index { i, off })
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.raw, Raw::Nil) && self.tags == NO_TAGS
    }

    pub fn is_none(&self) -> bool {
        matches!(self.raw, Raw::None)
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.raw, Raw::Sentinel)
    }

    /// Nil and false are falsy. Tagged nils are truthy: they carry a
    /// constructor.
    pub fn truthy(&self) -> bool {
        if self.tags != NO_TAGS {
            return true;
        }
        !matches!(self.raw, Raw::Nil | Raw::Bool(false))
    }

    /// Functions, methods, classes, tags, types, regexes and generators
    /// answer calls; everything else raises.
    pub fn callable(&self) -> bool {
        matches!(
            self.raw,
            Raw::Function { .. }
                | Raw::Method { .. }
                | Raw::BuiltinFn(_)
                | Raw::BuiltinMethod { .. }
                | Raw::Class(_)
                | Raw::Tag(_)
                | Raw::Type(_)
                | Raw::Regex(_)
                | Raw::Generator(_)
        )
    }

    /// Wrap with a constructor tag.
    pub fn tagged(mut self, tags: &mut TagTable, tag: TagId) -> Result<Value, Value> {
        match tags.push(self.tags, tag) {
            Ok(chain) => {
                self.tags = chain;
                Ok(self)
            }
            Err(_) => Err(Value::str("tag stack overflow")),
        }
    }

    /// Remove the top tag, if any.
    pub fn untagged(mut self, tags: &TagTable) -> Value {
        self.tags = tags.pop(self.tags);
        self
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::nil()
    }
}

// ---------------------------------------------------------------------------
// Deep equality and hashing
//
// These walk the heap for containers; object equality here is by
// identity (the VM dispatches a user __eq__ before falling back).

pub fn value_eq(heap: &Heap, a: &Value, b: &Value) -> bool {
    if a.tags != b.tags {
        return false;
    }
    raw_eq(heap, &a.raw, &b.raw)
}

fn raw_eq(heap: &Heap, a: &Raw, b: &Raw) -> bool {
    match (a, b) {
        (Raw::Int(x), Raw::Int(y)) => x == y,
        (Raw::Real(x), Raw::Real(y)) => x == y,
        (Raw::Int(x), Raw::Real(y)) | (Raw::Real(y), Raw::Int(x)) => *x as f64 == *y,
        (Raw::Bool(x), Raw::Bool(y)) => x == y,
        (Raw::Nil, Raw::Nil) => true,
        (Raw::None, Raw::None) => true,
        (Raw::Sentinel, Raw::Sentinel) => true,
        (Raw::Str(x), Raw::Str(y)) => x == y,
        (Raw::Tag(x), Raw::Tag(y)) => x == y,
        (Raw::Class(x), Raw::Class(y)) => x == y,
        (Raw::Ptr(x), Raw::Ptr(y)) => x == y,
        (Raw::Blob(x), Raw::Blob(y)) => x == y || heap.blob(*x) == heap.blob(*y),
        (Raw::Array(x), Raw::Array(y)) => {
            if x == y {
                return true;
            }
            let (xs, ys) = (heap.array(*x), heap.array(*y));
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(u, v)| value_eq(heap, u, v))
        }
        (Raw::Tuple(x), Raw::Tuple(y)) => {
            if x == y {
                return true;
            }
            let (xt, yt) = (heap.tuple(*x), heap.tuple(*y));
            xt.ids == yt.ids
                && xt.items.len() == yt.items.len()
                && xt.items.iter().zip(yt.items.iter()).all(|(u, v)| value_eq(heap, u, v))
        }
        (Raw::Dict(x), Raw::Dict(y)) => {
            if x == y {
                return true;
            }
            let (xd, yd) = (heap.dict(*x), heap.dict(*y));
            if xd.len() != yd.len() {
                return false;
            }
            xd.iter()
                .all(|(k, v)| yd.get(heap, k).is_some_and(|w| value_eq(heap, v, w)))
        }
        (Raw::Object { slots: x, .. }, Raw::Object { slots: y, .. }) => x == y,
        (Raw::Generator(x), Raw::Generator(y)) => x == y,
        (Raw::Cell(x), Raw::Cell(y)) => x == y,
        (Raw::Thread(x), Raw::Thread(y)) => Arc::ptr_eq(x, y),
        (Raw::Channel(x), Raw::Channel(y)) => Arc::ptr_eq(x, y),
        (Raw::Mutex(x), Raw::Mutex(y)) => Arc::ptr_eq(x, y),
        (Raw::CondVar(x), Raw::CondVar(y)) => Arc::ptr_eq(x, y),
        (Raw::Regex(x), Raw::Regex(y)) => x.pattern == y.pattern,
        (Raw::Function { def: f, env: e }, Raw::Function { def: g, env: h }) => {
            Arc::ptr_eq(f, g) && Arc::ptr_eq(e, h)
        }
        (Raw::BuiltinFn(x), Raw::BuiltinFn(y)) => x == y,
        _ => false,
    }
}

pub fn value_hash(heap: &Heap, v: &Value) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ (v.tags as u64).wrapping_mul(31);
    raw_hash(heap, &v.raw, &mut h);
    h
}

fn mix(h: &mut u64, x: u64) {
    *h ^= x;
    *h = h.wrapping_mul(0x0000_0100_0000_01b3);
}

fn raw_hash(heap: &Heap, raw: &Raw, h: &mut u64) {
    match raw {
        // Ints and equal reals must hash alike: == is cross-numeric.
        Raw::Int(i) => mix(h, *i as u64),
        Raw::Real(r) => {
            if r.fract() == 0.0 && r.is_finite() {
                mix(h, *r as i64 as u64)
            } else {
                mix(h, r.to_bits())
            }
        }
        Raw::Bool(b) => mix(h, 0x10 + *b as u64),
        Raw::Nil => mix(h, 0x20),
        Raw::None => mix(h, 0x21),
        Raw::Sentinel => mix(h, 0x22),
        Raw::Str(s) => {
            for b in s.as_str().bytes() {
                mix(h, b as u64);
            }
        }
        Raw::Tag(t) => mix(h, 0x40 + *t as u64),
        Raw::Class(c) => mix(h, 0x1000 + *c as u64),
        Raw::Blob(id) => {
            for b in heap.blob(*id) {
                mix(h, *b as u64);
            }
        }
        Raw::Array(id) => {
            for item in heap.array(*id) {
                mix(h, value_hash(heap, item));
            }
        }
        Raw::Tuple(id) => {
            let t = heap.tuple(*id);
            for (item, fid) in t.items.iter().zip(t.ids.iter()) {
                mix(h, *fid as u64);
                mix(h, value_hash(heap, item));
            }
        }
        // Identity kinds hash their identity.
        Raw::Dict(id) | Raw::Object { slots: id, .. } | Raw::Generator(id) | Raw::Cell(id) => {
            mix(h, 0x2000 + id.0 as u64)
        }
        Raw::Ptr(p) => mix(h, *p),
        _ => mix(h, 0x3000),
    }
}

// ---------------------------------------------------------------------------
// Plain rendering (no method dispatch; the VM layers __str__ on top)

pub fn render_value(heap: &Heap, tags: &TagTable, v: &Value) -> String {
    let mut out = String::new();
    let spelled = tags.spell(v.tags);
    for t in &spelled {
        out.push_str(tags.name(*t));
        out.push('(');
    }
    render_raw(heap, tags, &v.raw, &mut out);
    for _ in &spelled {
        out.push(')');
    }
    out
}

fn render_raw(heap: &Heap, tags: &TagTable, raw: &Raw, out: &mut String) {
    use std::fmt::Write;
    match raw {
        Raw::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Raw::Real(r) => {
            if r.fract() == 0.0 && r.is_finite() {
                let _ = write!(out, "{r:.1}");
            } else {
                let _ = write!(out, "{r}");
            }
        }
        Raw::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Raw::Nil => out.push_str("nil"),
        Raw::None => out.push_str("none"),
        Raw::Sentinel => out.push_str("<sentinel>"),
        Raw::Break => out.push_str("<break>"),
        Raw::Uninit => out.push_str("<uninitialized>"),
        Raw::Index { i, .. } => {
            let _ = write!(out, "<index {i}>");
        }
        Raw::Str(s) => out.push_str(s.as_str()),
        Raw::Blob(id) => {
            let _ = write!(out, "<blob {}>", hex::encode(heap.blob(*id)));
        }
        Raw::Array(id) => {
            out.push('[');
            for (i, item) in heap.array(*id).iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_quoted(heap, tags, item, out);
            }
            out.push(']');
        }
        Raw::Tuple(id) => {
            let t = heap.tuple(*id);
            out.push('(');
            for (i, item) in t.items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if t.ids[i] >= 0 {
                    let _ = write!(out, "#{}: ", t.ids[i]);
                }
                render_quoted(heap, tags, item, out);
            }
            out.push(')');
        }
        Raw::Dict(id) => {
            out.push('{');
            for (i, (k, v)) in heap.dict(*id).iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_quoted(heap, tags, k, out);
                out.push_str(": ");
                render_quoted(heap, tags, v, out);
            }
            out.push('}');
        }
        Raw::Object { class, .. } => {
            let _ = write!(out, "<object of class {class}>");
        }
        Raw::Cell(id) => {
            render_raw(heap, tags, &heap.cell(*id).raw, out);
        }
        Raw::Generator(_) => out.push_str("<generator>"),
        Raw::Class(c) => {
            let _ = write!(out, "<class {c}>");
        }
        Raw::Tag(t) => out.push_str(tags.name(*t)),
        Raw::Type(t) => {
            let _ = write!(out, "{t}");
        }
        Raw::Function { def, .. } => {
            let _ = write!(out, "<function {}>", def.name.as_deref().unwrap_or("?"));
        }
        Raw::Method { .. } => out.push_str("<method>"),
        Raw::BuiltinFn(_) | Raw::BuiltinMethod { .. } => out.push_str("<builtin>"),
        Raw::Thread(_) => out.push_str("<thread>"),
        Raw::Channel(_) => out.push_str("<channel>"),
        Raw::Mutex(_) => out.push_str("<mutex>"),
        Raw::CondVar(_) => out.push_str("<condvar>"),
        Raw::Regex(r) => {
            let _ = write!(out, "/{}/", r.pattern);
        }
        Raw::Ptr(p) => {
            let _ = write!(out, "<ptr {p:#x}>");
        }
    }
}

/// Strings inside containers render quoted; everything else as usual.
fn render_quoted(heap: &Heap, tags: &TagTable, v: &Value, out: &mut String) {
    if v.tags == NO_TAGS
        && let Raw::Str(s) = &v.raw
    {
        use std::fmt::Write;
        let _ = write!(out, "{:?}", s.as_str());
    } else {
        out.push_str(&render_value(heap, tags, v));
    }
}

/// Kind name used in diagnostics ("cannot add Int and String").
pub fn kind_name(raw: &Raw) -> &'static str {
    match raw {
        Raw::Int(_) => "Int",
        Raw::Real(_) => "Float",
        Raw::Bool(_) => "Bool",
        Raw::Nil => "nil",
        Raw::None => "none",
        Raw::Sentinel => "sentinel",
        Raw::Break => "break",
        Raw::Uninit => "uninitialized",
        Raw::Index { .. } => "index",
        Raw::Str(_) => "String",
        Raw::Blob(_) => "Blob",
        Raw::Array(_) => "Array",
        Raw::Dict(_) => "Dict",
        Raw::Tuple(_) => "Tuple",
        Raw::Object { .. } => "Object",
        Raw::Cell(_) => "Cell",
        Raw::Generator(_) => "Generator",
        Raw::Class(_) => "Class",
        Raw::Tag(_) => "Tag",
        Raw::Type(_) => "Type",
        Raw::Function { .. } => "Function",
        Raw::Method { .. } => "Method",
        Raw::BuiltinFn(_) => "Function",
        Raw::BuiltinMethod { .. } => "Method",
        Raw::Thread(_) => "Thread",
        Raw::Channel(_) => "Channel",
        Raw::Mutex(_) => "Mutex",
        Raw::CondVar(_) => "CondVar",
        Raw::Regex(_) => "Regex",
        Raw::Ptr(_) => "Ptr",
    }
}
