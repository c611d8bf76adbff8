//! Quill Core: shared foundation for the Quill language implementation.
//!
//! This crate holds the pieces both sides of the pipeline agree on:
//!
//! - `intern`: member-name and operator interning (`InternSet`)
//! - `bytecode`: the fixed opcode set, operand encoding, and the
//!   ip -> source debug table
//! - `span`: compact source-location ids and their registry
//! - `scratch`: per-thread bump arenas for compile-time temporaries
//!
//! It knows nothing about runtime values or the AST; the runtime and the
//! compiler both build on it without depending on each other's internals.

pub mod bytecode;
pub mod intern;
pub mod scratch;
pub mod span;

pub use bytecode::{DebugTable, Op};
pub use intern::{InternEntry, InternId, InternSet, str_hash};
pub use span::{NO_SRC, Pos, Span, SrcId, SrcMap};
