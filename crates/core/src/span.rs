//! Source positions and location ids.
//!
//! Every value and every compiled instruction carries a compact `SrcId`
//! rather than a full position; the `SrcMap` resolves an id back to
//! `(file, line, col)` when the error reporter or the debugger needs it.

use std::fmt;

/// Compact location id carried on values and type nodes. Zero means
/// "no location".
pub type SrcId = u32;

pub const NO_SRC: SrcId = 0;

/// A resolved source position. Line and column are 0-indexed internally;
/// `Display` renders them 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

/// A half-open byte range in one file, with the position of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        Span { start, end }
    }

    pub fn point(pos: Pos) -> Self {
        Span { start: pos, end: pos }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Registry mapping `SrcId`s to `(file, span)`. Append-only; id 0 is
/// reserved for "unknown".
#[derive(Debug, Default)]
pub struct SrcMap {
    files: Vec<String>,
    entries: Vec<(u32, Span)>,
}

impl SrcMap {
    pub fn new() -> Self {
        SrcMap {
            files: Vec::new(),
            entries: vec![(0, Span::point(Pos::new(0, 0)))],
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>) -> u32 {
        self.files.push(name.into());
        (self.files.len() - 1) as u32
    }

    pub fn add(&mut self, file: u32, span: Span) -> SrcId {
        self.entries.push((file, span));
        (self.entries.len() - 1) as SrcId
    }

    pub fn resolve(&self, id: SrcId) -> Option<(&str, Span)> {
        if id == NO_SRC {
            return None;
        }
        let (file, span) = *self.entries.get(id as usize)?;
        Some((self.files.get(file as usize).map(String::as_str).unwrap_or("<unknown>"), span))
    }

    /// Format an id as `file:line:col`, or `<unknown>` for id 0.
    pub fn describe(&self, id: SrcId) -> String {
        match self.resolve(id) {
            Some((file, span)) => format!("{}:{}", file, span.start),
            None => "<unknown>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_src_map_round_trip() {
        let mut map = SrcMap::new();
        let f = map.add_file("main.ql");
        let id = map.add(f, Span::point(Pos::new(9, 4)));
        let (file, span) = map.resolve(id).unwrap();
        assert_eq!(file, "main.ql");
        assert_eq!(span.start, Pos::new(9, 4));
        assert_eq!(map.describe(id), "main.ql:10:5");
    }

    #[test]
    fn test_zero_is_unknown() {
        let map = SrcMap::new();
        assert!(map.resolve(NO_SRC).is_none());
        assert_eq!(map.describe(NO_SRC), "<unknown>");
    }
}
