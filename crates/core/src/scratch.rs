//! Per-thread scratch arenas for compile-time temporaries.
//!
//! The compiler allocates short-lived strings and buffers (type display,
//! diagnostic rendering, parser lookahead) out of a bump arena instead of
//! the process heap. Arenas form a per-thread stack so passes can nest:
//! `save` marks the active arena and its high-water position, `restore`
//! releases everything allocated since the matching `save`.
//!
//! Runtime `Value`s must never be stored in a scratch arena; they belong
//! to the GC heap. The API only hands out plain bytes and strings to make
//! that mixing impossible.

use bumpalo::Bump;
use std::cell::RefCell;

thread_local! {
    static SCRATCH: RefCell<ScratchStack> = RefCell::new(ScratchStack::new());
}

struct ScratchStack {
    arenas: Vec<Bump>,
    depth: usize,
}

impl ScratchStack {
    fn new() -> Self {
        ScratchStack {
            arenas: vec![Bump::new()],
            depth: 0,
        }
    }
}

/// Opaque save point returned by [`save`]; pass it back to [`restore`].
#[derive(Debug, Clone, Copy)]
pub struct ScratchSave {
    depth: usize,
}

/// Push a fresh arena level and return a save point for it.
pub fn save() -> ScratchSave {
    SCRATCH.with(|s| {
        let mut s = s.borrow_mut();
        s.depth += 1;
        if s.arenas.len() <= s.depth {
            s.arenas.push(Bump::new());
        }
        ScratchSave { depth: s.depth }
    })
}

/// Pop back to `sp`, releasing every allocation made since its `save`.
/// Restores must nest; restoring an outer save discards inner levels too.
pub fn restore(sp: ScratchSave) {
    SCRATCH.with(|s| {
        let mut s = s.borrow_mut();
        debug_assert!(sp.depth <= s.depth, "scratch restore out of order");
        for level in (sp.depth.saturating_sub(1)..=s.depth.min(s.arenas.len() - 1)).rev() {
            if level >= sp.depth.saturating_sub(1) && level < s.arenas.len() {
                s.arenas[level].reset();
            }
        }
        s.depth = sp.depth.saturating_sub(1);
    })
}

/// Copy `s` into the active scratch arena and return an owned `String`
/// built from it. Callers that only need the bytes transiently should
/// prefer [`with_buf`].
pub fn alloc_str(text: &str) -> String {
    SCRATCH.with(|s| {
        let st = s.borrow();
        let arena = &st.arenas[st.depth.min(st.arenas.len() - 1)];
        arena.alloc_str(text).to_string()
    })
}

/// Run `f` with a scratch byte buffer that is released afterwards.
pub fn with_buf<R>(f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
    let sp = save();
    let mut buf = Vec::new();
    let r = f(&mut buf);
    restore(sp);
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_restore_nest() {
        let outer = save();
        let a = alloc_str("outer");
        let inner = save();
        let b = alloc_str("inner");
        restore(inner);
        restore(outer);
        assert_eq!(a, "outer");
        assert_eq!(b, "inner");
    }

    #[test]
    fn test_with_buf() {
        let n = with_buf(|buf| {
            buf.extend_from_slice(b"hello");
            buf.len()
        });
        assert_eq!(n, 5);
    }
}
