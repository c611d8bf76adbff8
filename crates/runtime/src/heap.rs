//! The GC heap: allocation list, mark phase, sweep phase.
//!
//! Every GC-managed allocation lives in a slab slot recording its kind,
//! payload, mark bit, hard-hold count and finalized bit. Values refer to
//! heap objects by integer id, never by pointer, so cycles are plain data
//! and the collector can move nothing and still free everything.
//!
//! The collector itself is stop-the-world mark/sweep:
//!
//! 1. the initiating thread parks every other mutator in the group
//!    (see `thread`),
//! 2. marks from every root source: thread stacks, frames, targets,
//!    try/defer stacks, globals, class statics, live generators, live
//!    channel queues, and the explicit root-set vector,
//! 3. sweeps the slab, handing unmarked objects with a class finalizer
//!    back to the VM (they survive one extra cycle and are never
//!    finalized twice),
//! 4. clears marks and resumes the group.
//!
//! Collection is attempted when `memory_used > memory_limit`; the limit
//! is raised to `2 * memory_used` afterwards.

use crate::class::ClassId;
use crate::dict::Dict;
use crate::value::{Raw, Value};
use crate::vm::GenState;
use std::fmt;

/// Id of a heap allocation. Plain data; meaningful only against the
/// owning group's heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(pub u32);

impl fmt::Debug for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tuple payload: items plus parallel interned field ids (-1 means
/// positional).
#[derive(Debug, Clone, Default)]
pub struct TupleData {
    pub items: Vec<Value>,
    pub ids: Vec<i64>,
}

/// Payload of one allocation.
#[derive(Debug)]
pub enum HeapObj {
    Arr(Vec<Value>),
    Dict(Dict),
    Blob(Vec<u8>),
    Tuple(TupleData),
    Obj { class: ClassId, slots: Vec<Value> },
    Cell(Value),
    Gen(Box<GenState>),
    /// Placeholder while the payload is checked out for mutation.
    CheckedOut,
}

impl HeapObj {
    fn kind(&self) -> &'static str {
        match self {
            HeapObj::Arr(_) => "Array",
            HeapObj::Dict(_) => "Dict",
            HeapObj::Blob(_) => "Blob",
            HeapObj::Tuple(_) => "Tuple",
            HeapObj::Obj { .. } => "Object",
            HeapObj::Cell(_) => "Cell",
            HeapObj::Gen(_) => "Generator",
            HeapObj::CheckedOut => "CheckedOut",
        }
    }

    fn size_estimate(&self) -> usize {
        64 + match self {
            HeapObj::Arr(v) => v.len() * size_of::<Value>(),
            HeapObj::Dict(d) => d.capacity() * (size_of::<Value>() * 2 + 9),
            HeapObj::Blob(b) => b.len(),
            HeapObj::Tuple(t) => t.items.len() * (size_of::<Value>() + 8),
            HeapObj::Obj { slots, .. } => slots.len() * size_of::<Value>(),
            HeapObj::Cell(_) => size_of::<Value>(),
            HeapObj::Gen(_) => 512,
            HeapObj::CheckedOut => 0,
        }
    }
}

#[derive(Debug)]
pub struct GcBox {
    pub obj: HeapObj,
    pub mark: bool,
    /// Hard-hold count; > 0 means the block survives collection
    /// regardless of reachability.
    pub hard: u32,
    pub finalized: bool,
}

/// A finalizable object found dead during sweep. The VM runs the class
/// finalizer under a fresh try frame; the box stays allocated until the
/// next collection finds it unreachable again.
#[derive(Debug)]
pub struct PendingFinalizer {
    pub object: Value,
    pub finalizer: Value,
}

const INITIAL_LIMIT: usize = 1 << 20;

pub struct Heap {
    slots: Vec<Option<GcBox>>,
    free: Vec<u32>,
    pub memory_used: usize,
    pub memory_limit: usize,
    /// Explicit root-set vector for builtins that temporarily hold
    /// values outside any scanned structure.
    pub roots: Vec<Value>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            memory_used: 0,
            memory_limit: INITIAL_LIMIT,
            roots: Vec::new(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Record a zero-initialised allocation of the given payload.
    pub fn alloc(&mut self, obj: HeapObj) -> HeapId {
        self.memory_used += obj.size_estimate();
        let boxed = GcBox { obj, mark: false, hard: 0, finalized: false };
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(boxed);
                HeapId(i)
            }
            None => {
                self.slots.push(Some(boxed));
                HeapId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> HeapId {
        self.alloc(HeapObj::Arr(items))
    }

    pub fn alloc_dict(&mut self, d: Dict) -> HeapId {
        self.alloc(HeapObj::Dict(d))
    }

    pub fn alloc_blob(&mut self, b: Vec<u8>) -> HeapId {
        self.alloc(HeapObj::Blob(b))
    }

    pub fn alloc_tuple(&mut self, t: TupleData) -> HeapId {
        self.alloc(HeapObj::Tuple(t))
    }

    pub fn alloc_cell(&mut self, v: Value) -> HeapId {
        self.alloc(HeapObj::Cell(v))
    }

    /// Allocate an object with `n_slots` nil-initialised instance slots.
    pub fn alloc_object(&mut self, class: ClassId, n_slots: usize) -> HeapId {
        self.alloc(HeapObj::Obj { class, slots: vec![Value::nil(); n_slots] })
    }

    pub fn should_collect(&self) -> bool {
        self.memory_used > self.memory_limit
    }

    fn boxed(&self, id: HeapId) -> &GcBox {
        self.slots[id.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling heap id {id:?}"))
    }

    fn boxed_mut(&mut self, id: HeapId) -> &mut GcBox {
        self.slots[id.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling heap id {id:?}"))
    }

    pub fn is_live(&self, id: HeapId) -> bool {
        self.slots
            .get(id.0 as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }

    pub fn kind(&self, id: HeapId) -> &'static str {
        self.boxed(id).obj.kind()
    }

    // -- typed accessors ----------------------------------------------------

    pub fn array(&self, id: HeapId) -> &Vec<Value> {
        match &self.boxed(id).obj {
            HeapObj::Arr(v) => v,
            other => panic!("expected Array at {id:?}, found {}", other.kind()),
        }
    }

    pub fn array_mut(&mut self, id: HeapId) -> &mut Vec<Value> {
        match &mut self.boxed_mut(id).obj {
            HeapObj::Arr(v) => v,
            other => panic!("expected Array at {id:?}, found {}", other.kind()),
        }
    }

    pub fn dict(&self, id: HeapId) -> &Dict {
        match &self.boxed(id).obj {
            HeapObj::Dict(d) => d,
            other => panic!("expected Dict at {id:?}, found {}", other.kind()),
        }
    }

    /// Mutate a dict while its hashing/equality can still read the heap.
    /// The payload is checked out for the duration so the borrows cannot
    /// alias.
    pub fn with_dict_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut Dict, &Heap) -> R) -> R {
        let mut d = match std::mem::replace(&mut self.boxed_mut(id).obj, HeapObj::CheckedOut) {
            HeapObj::Dict(d) => d,
            other => panic!("expected Dict at {id:?}, found {}", other.kind()),
        };
        let r = f(&mut d, self);
        self.boxed_mut(id).obj = HeapObj::Dict(d);
        r
    }

    pub fn blob(&self, id: HeapId) -> &Vec<u8> {
        match &self.boxed(id).obj {
            HeapObj::Blob(b) => b,
            other => panic!("expected Blob at {id:?}, found {}", other.kind()),
        }
    }

    pub fn blob_mut(&mut self, id: HeapId) -> &mut Vec<u8> {
        match &mut self.boxed_mut(id).obj {
            HeapObj::Blob(b) => b,
            other => panic!("expected Blob at {id:?}, found {}", other.kind()),
        }
    }

    pub fn tuple(&self, id: HeapId) -> &TupleData {
        match &self.boxed(id).obj {
            HeapObj::Tuple(t) => t,
            other => panic!("expected Tuple at {id:?}, found {}", other.kind()),
        }
    }

    pub fn tuple_mut(&mut self, id: HeapId) -> &mut TupleData {
        match &mut self.boxed_mut(id).obj {
            HeapObj::Tuple(t) => t,
            other => panic!("expected Tuple at {id:?}, found {}", other.kind()),
        }
    }

    pub fn object_slots(&self, id: HeapId) -> &Vec<Value> {
        match &self.boxed(id).obj {
            HeapObj::Obj { slots, .. } => slots,
            other => panic!("expected Object at {id:?}, found {}", other.kind()),
        }
    }

    pub fn object_slots_mut(&mut self, id: HeapId) -> &mut Vec<Value> {
        match &mut self.boxed_mut(id).obj {
            HeapObj::Obj { slots, .. } => slots,
            other => panic!("expected Object at {id:?}, found {}", other.kind()),
        }
    }

    pub fn object_class(&self, id: HeapId) -> ClassId {
        match &self.boxed(id).obj {
            HeapObj::Obj { class, .. } => *class,
            other => panic!("expected Object at {id:?}, found {}", other.kind()),
        }
    }

    pub fn cell(&self, id: HeapId) -> &Value {
        match &self.boxed(id).obj {
            HeapObj::Cell(v) => v,
            other => panic!("expected Cell at {id:?}, found {}", other.kind()),
        }
    }

    pub fn cell_mut(&mut self, id: HeapId) -> &mut Value {
        match &mut self.boxed_mut(id).obj {
            HeapObj::Cell(v) => v,
            other => panic!("expected Cell at {id:?}, found {}", other.kind()),
        }
    }

    pub fn generator(&self, id: HeapId) -> &GenState {
        match &self.boxed(id).obj {
            HeapObj::Gen(g) => g,
            other => panic!("expected Generator at {id:?}, found {}", other.kind()),
        }
    }

    pub fn generator_mut(&mut self, id: HeapId) -> &mut GenState {
        match &mut self.boxed_mut(id).obj {
            HeapObj::Gen(g) => g,
            other => panic!("expected Generator at {id:?}, found {}", other.kind()),
        }
    }

    /// Check a generator's state out for resumption. Must be paired with
    /// `put_generator`.
    pub fn take_generator(&mut self, id: HeapId) -> Box<GenState> {
        match std::mem::replace(&mut self.boxed_mut(id).obj, HeapObj::CheckedOut) {
            HeapObj::Gen(g) => g,
            other => panic!("expected Generator at {id:?}, found {}", other.kind()),
        }
    }

    pub fn put_generator(&mut self, id: HeapId, g: Box<GenState>) {
        self.boxed_mut(id).obj = HeapObj::Gen(g);
    }

    // -- hard holds ---------------------------------------------------------

    pub fn hard_inc(&mut self, id: HeapId) {
        self.boxed_mut(id).hard += 1;
    }

    pub fn hard_dec(&mut self, id: HeapId) {
        let b = self.boxed_mut(id);
        debug_assert!(b.hard > 0, "unbalanced hard hold on {id:?}");
        b.hard = b.hard.saturating_sub(1);
    }

    /// Push onto the explicit root-set vector (NOGC bracket for values).
    pub fn root_push(&mut self, v: Value) {
        self.roots.push(v);
    }

    pub fn root_pop(&mut self) -> Option<Value> {
        self.roots.pop()
    }

    // -- mark ---------------------------------------------------------------

    /// Mark everything reachable from `v`.
    pub fn mark_value(&mut self, v: &Value) {
        let mut work = Vec::new();
        value_heap_ids(v, &mut work);
        self.mark_work(work);
    }

    /// Mark everything reachable from an iterator of root values.
    pub fn mark_values<'a>(&mut self, roots: impl IntoIterator<Item = &'a Value>) {
        let mut work = Vec::new();
        for v in roots {
            value_heap_ids(v, &mut work);
        }
        self.mark_work(work);
    }

    /// Marks the explicit root-set vector itself.
    pub fn mark_own_roots(&mut self) {
        let roots = std::mem::take(&mut self.roots);
        self.mark_values(roots.iter());
        self.roots = roots;
    }

    fn mark_work(&mut self, mut work: Vec<HeapId>) {
        while let Some(id) = work.pop() {
            let b = match self.slots.get_mut(id.0 as usize).and_then(Option::as_mut) {
                Some(b) => b,
                None => continue,
            };
            if b.mark {
                continue;
            }
            b.mark = true;
            match &b.obj {
                HeapObj::Arr(items) => {
                    for v in items {
                        value_heap_ids(v, &mut work);
                    }
                }
                HeapObj::Dict(d) => {
                    for (k, v) in d.iter() {
                        value_heap_ids(k, &mut work);
                        value_heap_ids(v, &mut work);
                    }
                    if let Some(dflt) = &d.dflt {
                        value_heap_ids(dflt, &mut work);
                    }
                }
                HeapObj::Blob(_) => {}
                HeapObj::Tuple(t) => {
                    for v in &t.items {
                        value_heap_ids(v, &mut work);
                    }
                }
                HeapObj::Obj { slots, .. } => {
                    for v in slots {
                        value_heap_ids(v, &mut work);
                    }
                }
                HeapObj::Cell(v) => value_heap_ids(v, &mut work),
                HeapObj::Gen(g) => g.heap_ids(&mut work),
                HeapObj::CheckedOut => {}
            }
        }
    }

    // -- sweep --------------------------------------------------------------

    /// Free every unmarked, unheld allocation. Dead objects whose class
    /// has a finalizer are kept for one more cycle and reported so the
    /// VM can run the finalizer; the `finalized` bit guarantees a
    /// finalizer runs at most once per object.
    pub fn sweep(
        &mut self,
        finalizer_for: impl Fn(ClassId) -> Option<Value>,
    ) -> (usize, Vec<PendingFinalizer>) {
        let mut freed = 0;
        let mut pending = Vec::new();
        for i in 0..self.slots.len() {
            let keep = match &mut self.slots[i] {
                None => continue,
                Some(b) if b.mark || b.hard > 0 => {
                    b.mark = false;
                    true
                }
                Some(b) => {
                    if let HeapObj::Obj { class, .. } = &b.obj
                        && !b.finalized
                        && let Some(fin) = finalizer_for(*class)
                    {
                        b.finalized = true;
                        pending.push(PendingFinalizer {
                            object: Value::new(Raw::Object {
                                slots: HeapId(i as u32),
                                class: *class,
                            }),
                            finalizer: fin,
                        });
                        true
                    } else {
                        false
                    }
                }
            };
            if !keep {
                let b = self.slots[i].take().expect("slot checked above");
                self.memory_used = self.memory_used.saturating_sub(b.obj.size_estimate());
                self.free.push(i as u32);
                freed += 1;
            }
        }
        tracing::debug!(freed, live = self.live_count(), "heap sweep");
        (freed, pending)
    }

    /// Raise the limit to twice the surviving footprint.
    pub fn rescale_limit(&mut self) {
        self.memory_limit = (self.memory_used * 2).max(INITIAL_LIMIT);
    }
}

/// Collect the heap ids directly embedded in a value.
pub fn value_heap_ids(v: &Value, out: &mut Vec<HeapId>) {
    match &v.raw {
        Raw::Blob(id)
        | Raw::Array(id)
        | Raw::Dict(id)
        | Raw::Tuple(id)
        | Raw::Object { slots: id, .. }
        | Raw::Cell(id)
        | Raw::Generator(id) => out.push(*id),
        Raw::Function { env, .. } => out.extend(env.iter().copied()),
        Raw::Method { this, callee, .. } => {
            value_heap_ids(this, out);
            value_heap_ids(callee, out);
        }
        Raw::BuiltinMethod { this, .. } => value_heap_ids(this, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_access() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(vec![Value::int(1), Value::int(2)]);
        assert_eq!(heap.array(a).len(), 2);
        heap.array_mut(a).push(Value::int(3));
        assert_eq!(heap.array(a).len(), 3);
    }

    #[test]
    fn test_unreachable_is_swept() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(vec![]);
        let b = heap.alloc_array(vec![Value::new(Raw::Array(a))]);
        // Only b is rooted; a survives through b.
        let root = Value::new(Raw::Array(b));
        heap.mark_value(&root);
        let (freed, pending) = heap.sweep(|_| None);
        assert_eq!(freed, 0);
        assert!(pending.is_empty());

        // Nothing rooted: both go.
        let (freed, _) = heap.sweep(|_| None);
        assert_eq!(freed, 2);
        assert!(!heap.is_live(a));
        assert!(!heap.is_live(b));
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(vec![]);
        let b = heap.alloc_array(vec![Value::new(Raw::Array(a))]);
        heap.array_mut(a).push(Value::new(Raw::Array(b)));
        let (freed, _) = heap.sweep(|_| None);
        assert_eq!(freed, 2);
    }

    #[test]
    fn test_hard_hold_survives() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(vec![]);
        heap.hard_inc(a);
        let (freed, _) = heap.sweep(|_| None);
        assert_eq!(freed, 0);
        heap.hard_dec(a);
        let (freed, _) = heap.sweep(|_| None);
        assert_eq!(freed, 1);
    }

    #[test]
    fn test_root_set_protects() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(vec![]);
        heap.root_push(Value::new(Raw::Array(a)));
        heap.mark_own_roots();
        let (freed, _) = heap.sweep(|_| None);
        assert_eq!(freed, 0);
        heap.root_pop();
    }

    #[test]
    fn test_finalizable_object_survives_one_cycle() {
        let mut heap = Heap::new();
        let o = heap.alloc_object(7, 1);
        let fin = Value::nil(); // stand-in finalizer value
        let (freed, pending) = heap.sweep(|c| (c == 7).then(|| fin.clone()));
        assert_eq!(freed, 0);
        assert_eq!(pending.len(), 1);
        assert!(heap.is_live(o));

        // Second cycle: already finalized, so it is freed and the
        // finalizer is not handed back again.
        let (freed, pending) = heap.sweep(|c| (c == 7).then(|| fin.clone()));
        assert_eq!(freed, 1);
        assert!(pending.is_empty());
        assert!(!heap.is_live(o));
    }

    #[test]
    fn test_slot_reuse() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(vec![]);
        heap.sweep(|_| None);
        let b = heap.alloc_array(vec![]);
        assert_eq!(a, b);
    }
}
