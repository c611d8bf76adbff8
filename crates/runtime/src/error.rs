//! Error kinds and their runtime representation.
//!
//! Runtime errors are ordinary tagged values: a message (or payload)
//! wrapped in one of the builtin error tags, thrown through the VM's
//! unwind machinery and caught by tag patterns. Only an error that
//! reaches the top frame uncaught becomes a Rust-level `VmError`, with
//! the formatted message and a value traceback.

use crate::tags::TagId;
use crate::thread::ThreadGroup;
use crate::value::Value;
use std::fmt;

/// Terminal interpreter failures surfaced to the embedder.
#[derive(Debug, Clone)]
pub enum VmError {
    /// A thrown value reached the top frame. The message includes the
    /// rendered value; the traceback lists frames innermost-first as
    /// `function (file:line:col)`.
    Uncaught { message: String, traceback: Vec<String> },
    /// A malformed instruction stream or interpreter invariant
    /// violation. Not raisable from the language.
    Internal(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Uncaught { message, traceback } => {
                write!(f, "uncaught error: {message}")?;
                for line in traceback {
                    write!(f, "\n  at {line}")?;
                }
                Ok(())
            }
            VmError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for VmError {}

/// Build a thrown error value: `msg` wrapped in the given error tag.
pub fn tag_error(group: &ThreadGroup, tag: TagId, msg: impl Into<String>) -> Value {
    let mut tags = group.tags.lock().expect("tag table poisoned");
    Value::str(msg.into())
        .tagged(&mut tags, tag)
        .unwrap_or_else(|v| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_error_carries_tag() {
        let group = ThreadGroup::new();
        let v = tag_error(&group, group.error_tags.type_error, "bad type");
        let tags = group.tags.lock().unwrap();
        assert_eq!(tags.top(v.tags), Some(group.error_tags.type_error));
        assert!(v.truthy());
    }

    #[test]
    fn test_uncaught_display() {
        let e = VmError::Uncaught {
            message: "TypeError(\"bad\")".into(),
            traceback: vec!["f (main.ql:3:1)".into()],
        };
        let s = e.to_string();
        assert!(s.contains("uncaught error"));
        assert!(s.contains("main.ql:3:1"));
    }
}
