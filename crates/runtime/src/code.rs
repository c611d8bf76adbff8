//! Compiled code objects and function info.
//!
//! A `Code` is one region of bytecode plus its constant pools and the
//! ip -> source debug table. Function values pair an `Arc<FunDef>` (the
//! immutable info block: parameters, rest/kwargs slots, capture
//! directives, body code) with a captured-environment vector of cell
//! ids, so cloning functions is cheap and bodies are shared.
//!
//! Constants are restricted to heap-free values (numbers, strings,
//! regexes, reified types): code objects are shared across threads and
//! must never pin GC ids.

use crate::value::Value;
use quill_core::bytecode::DebugTable;
use quill_core::intern::InternId;
use std::sync::Arc;

/// Field-id layout of a tuple literal; -1 entries are positional.
#[derive(Debug, Clone, Default)]
pub struct TupleShape {
    pub ids: Vec<i64>,
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub id: InternId,
    /// Required parameters produce a diagnostic when missing; optional
    /// ones default to nil.
    pub required: bool,
}

/// Where a captured cell comes from when a closure is built.
#[derive(Debug, Clone, Copy)]
pub enum CaptureSource {
    /// Share the cell already boxed into the enclosing frame's local
    /// slot (the slot was promoted by a CAPTURE instruction).
    Local(u32),
    /// Share a cell from the enclosing function's own environment.
    Outer(u32),
}

/// The fixed info block of a function: everything about it except the
/// captured environment.
#[derive(Debug)]
pub struct FunDef {
    pub name: Option<String>,
    pub proto: Option<String>,
    pub doc: Option<String>,
    pub params: Vec<ParamSpec>,
    /// Parameter slot receiving surplus positional arguments, or -1.
    pub rest: i16,
    /// Parameter slot receiving unmatched keyword arguments, or -1.
    pub kwargs: i16,
    /// Total local slots the frame needs (params included).
    pub num_locals: usize,
    pub captures: Vec<CaptureSource>,
    pub is_generator: bool,
    pub from_eval: bool,
    pub hidden: bool,
    pub code: Arc<Code>,
}

impl FunDef {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Positional parameter slots, skipping rest/kwargs.
    pub fn positional_params(&self) -> impl Iterator<Item = (usize, &ParamSpec)> {
        self.params
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as i16 != self.rest && *i as i16 != self.kwargs)
    }
}

/// Class declaration consumed by DEFINE_CLASS. Super and traits are
/// evaluated onto the stack before the opcode runs.
#[derive(Debug, Clone, Default)]
pub struct ClassSpec {
    pub name: String,
    pub fields: Vec<InternId>,
    pub is_trait: bool,
    pub has_super: bool,
    pub n_traits: u8,
}

/// Tag declaration consumed by DEFINE_TAG.
#[derive(Debug, Clone)]
pub struct TagSpec {
    pub name: String,
}

/// One compiled code region.
#[derive(Debug, Default)]
pub struct Code {
    pub name: String,
    pub file: String,
    pub bytes: Vec<u8>,
    pub consts: Vec<Value>,
    pub shapes: Vec<Arc<TupleShape>>,
    /// Key lists for ENSURE_SAME_KEYS / dict patterns.
    pub key_lists: Vec<Arc<Vec<Value>>>,
    pub funcs: Vec<Arc<FunDef>>,
    pub classes: Vec<Arc<ClassSpec>>,
    pub tagdefs: Vec<Arc<TagSpec>>,
    /// Nested code regions for EXEC_CODE.
    pub codes: Vec<Arc<Code>>,
    pub debug: DebugTable,
}

impl Code {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Code {
            name: name.into(),
            file: file.into(),
            ..Code::default()
        }
    }
}
