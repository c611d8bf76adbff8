//! Reified runtime types.
//!
//! The inferencer works on a mutable type graph that never leaves the
//! compiler. What the *runtime* sees — the operand of `CHECK_MATCH`, the
//! payload of a `Type` value, the right-hand side of `is` — is this
//! self-contained descriptor, lowered from the graph when code is
//! emitted. It carries class ids, tags, unions/intersections, record
//! shapes and integer-literal singletons; nothing in it refers back to
//! compiler state.

use crate::class::{ClassId, ClassRegistry, class_of};
use crate::heap::Heap;
use crate::tags::{TagId, TagTable};
use crate::value::{Raw, Value};
use std::fmt;
use std::sync::Arc;

/// One field of a record shape. Named fields carry both the interned id
/// (for matching against tuple field ids) and the spelling (for display).
#[derive(Debug, Clone)]
pub struct RtField {
    pub name: Option<String>,
    /// Interned field id, or -1 for a positional field.
    pub id: i64,
    pub ty: Arc<RtType>,
}

#[derive(Debug, Clone)]
pub enum RtType {
    /// Top: every value checks.
    Any,
    /// Bottom: no value checks.
    Bottom,
    Nil,
    NoneType,
    /// Nominal instance-of check; primitives check through their builtin
    /// class ids.
    Class(ClassId),
    /// A constructor tag, optionally constraining the wrapped value.
    Tag { tag: TagId, inner: Option<Arc<RtType>> },
    Union(Vec<Arc<RtType>>),
    Intersect(Vec<Arc<RtType>>),
    /// Record/tuple shape: fields by name or position.
    Record(Vec<RtField>),
    /// Array with a homogeneous element type.
    List(Arc<RtType>),
    /// Dict with key/value element types.
    Dict(Arc<RtType>, Arc<RtType>),
    /// Any callable.
    Func,
    /// Integer-literal singleton.
    IntLit(i64),
}

impl fmt::Display for RtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtType::Any => write!(f, "Any"),
            RtType::Bottom => write!(f, "Bottom"),
            RtType::Nil => write!(f, "Nil"),
            RtType::NoneType => write!(f, "None"),
            RtType::Class(c) => write!(f, "<class {c}>"),
            RtType::Tag { tag, inner: Some(t) } => write!(f, "<tag {tag}>({t})"),
            RtType::Tag { tag, inner: None } => write!(f, "<tag {tag}>"),
            RtType::Union(ts) => {
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            RtType::Intersect(ts) => {
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            RtType::Record(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &field.name {
                        Some(n) => write!(f, "{n}: {}", field.ty)?,
                        None => write!(f, "{}", field.ty)?,
                    }
                }
                write!(f, ")")
            }
            RtType::List(t) => write!(f, "Array[{t}]"),
            RtType::Dict(k, v) => write!(f, "Dict[{k}, {v}]"),
            RtType::Func => write!(f, "Function"),
            RtType::IntLit(n) => write!(f, "{n}"),
        }
    }
}

/// Runtime bridge for explicit casts and the `is` operator. Recurses on
/// tagged variants, union and intersection members, record fields (by
/// name or position), and class hierarchies; containers validate their
/// element types up to the element count.
pub fn type_check(
    heap: &Heap,
    classes: &mut ClassRegistry,
    tags: &TagTable,
    v: &Value,
    t: &RtType,
) -> bool {
    match t {
        RtType::Any => true,
        RtType::Bottom => false,
        RtType::Nil => v.is_nil(),
        RtType::NoneType => v.is_none() && v.tags == 0,
        RtType::IntLit(n) => v.tags == 0 && matches!(v.raw, Raw::Int(m) if m == *n),
        RtType::Func => v.tags == 0 && v.callable(),
        RtType::Tag { tag, inner } => match tags.top(v.tags) {
            Some(top) if top == *tag => match inner {
                Some(inner) => {
                    let unwrapped = v.clone().untagged(tags);
                    type_check(heap, classes, tags, &unwrapped, inner)
                }
                None => true,
            },
            _ => false,
        },
        RtType::Union(ts) => ts.iter().any(|t| type_check(heap, classes, tags, v, t)),
        RtType::Intersect(ts) => ts.iter().all(|t| type_check(heap, classes, tags, v, t)),
        RtType::Class(c) => {
            if v.tags != 0 {
                return false;
            }
            classes.is_subclass(class_of(v), *c)
        }
        RtType::List(elem) => {
            if v.tags != 0 {
                return false;
            }
            match &v.raw {
                Raw::Array(id) => heap
                    .array(*id)
                    .iter()
                    .all(|item| type_check(heap, classes, tags, item, elem)),
                _ => false,
            }
        }
        RtType::Dict(kt, vt) => {
            if v.tags != 0 {
                return false;
            }
            match &v.raw {
                Raw::Dict(id) => heap.dict(*id).iter().all(|(k, val)| {
                    type_check(heap, classes, tags, k, kt)
                        && type_check(heap, classes, tags, val, vt)
                }),
                _ => false,
            }
        }
        RtType::Record(fields) => {
            if v.tags != 0 {
                return false;
            }
            match &v.raw {
                Raw::Tuple(id) => {
                    let tuple = heap.tuple(*id);
                    fields.iter().enumerate().all(|(i, field)| {
                        let item = if field.id >= 0 {
                            tuple
                                .ids
                                .iter()
                                .position(|fid| *fid == field.id)
                                .map(|j| &tuple.items[j])
                        } else {
                            tuple.items.get(i)
                        };
                        match item {
                            Some(item) => type_check(heap, classes, tags, item, &field.ty),
                            None => false,
                        }
                    })
                }
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{CLASS_INT, CLASS_STRING, CLASS_TOP};
    use crate::tags::TagTable;
    use quill_core::intern::InternSet;

    fn setup() -> (Heap, ClassRegistry, TagTable) {
        let mut members = InternSet::new();
        (Heap::new(), ClassRegistry::new(&mut members), TagTable::new())
    }

    #[test]
    fn test_primitive_checks() {
        let (heap, mut classes, tags) = setup();
        assert!(type_check(&heap, &mut classes, &tags, &Value::int(3), &RtType::Class(CLASS_INT)));
        assert!(!type_check(&heap, &mut classes, &tags, &Value::int(3), &RtType::Class(CLASS_STRING)));
        assert!(type_check(&heap, &mut classes, &tags, &Value::str("x"), &RtType::Class(CLASS_TOP)));
        assert!(type_check(&heap, &mut classes, &tags, &Value::nil(), &RtType::Nil));
        assert!(type_check(&heap, &mut classes, &tags, &Value::int(5), &RtType::IntLit(5)));
        assert!(!type_check(&heap, &mut classes, &tags, &Value::int(6), &RtType::IntLit(5)));
    }

    #[test]
    fn test_union_and_intersection() {
        let (heap, mut classes, tags) = setup();
        let int_or_str = RtType::Union(vec![
            Arc::new(RtType::Class(CLASS_INT)),
            Arc::new(RtType::Class(CLASS_STRING)),
        ]);
        assert!(type_check(&heap, &mut classes, &tags, &Value::int(1), &int_or_str));
        assert!(type_check(&heap, &mut classes, &tags, &Value::str("s"), &int_or_str));
        assert!(!type_check(&heap, &mut classes, &tags, &Value::real(1.5), &int_or_str));

        let both = RtType::Intersect(vec![
            Arc::new(RtType::Class(CLASS_INT)),
            Arc::new(RtType::IntLit(9)),
        ]);
        assert!(type_check(&heap, &mut classes, &tags, &Value::int(9), &both));
        assert!(!type_check(&heap, &mut classes, &tags, &Value::int(8), &both));
    }

    #[test]
    fn test_tagged_check_unwraps() {
        let (heap, mut classes, mut tags) = setup();
        let just = tags.define("Just");
        let v = Value::int(4).tagged(&mut tags, just).unwrap();
        let t = RtType::Tag {
            tag: just,
            inner: Some(Arc::new(RtType::Class(CLASS_INT))),
        };
        assert!(type_check(&heap, &mut classes, &tags, &v, &t));
        assert!(!type_check(&heap, &mut classes, &tags, &Value::int(4), &t));
    }

    #[test]
    fn test_list_elements_validated() {
        let (mut heap, mut classes, tags) = setup();
        let ints = heap.alloc_array(vec![Value::int(1), Value::int(2)]);
        let mixed = heap.alloc_array(vec![Value::int(1), Value::str("x")]);
        let t = RtType::List(Arc::new(RtType::Class(CLASS_INT)));
        assert!(type_check(&heap, &mut classes, &tags, &Value::new(Raw::Array(ints)), &t));
        assert!(!type_check(&heap, &mut classes, &tags, &Value::new(Raw::Array(mixed)), &t));
    }
}
